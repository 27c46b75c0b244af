use bitcoincore_rpc::Auth;
use bitcoincore_rpc::bitcoin::Network;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BTCAuth {
    None,
    UserPass(String, String),
    CookieFile(PathBuf),
}

fn default_network() -> Network {
    Network::Bitcoin
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BTCConfig {
    #[serde(default = "default_network")]
    pub network: Network,

    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub rpc_url: Option<String>,

    #[serde(default)]
    pub auth: Option<BTCAuth>,
}

impl BTCConfig {
    pub fn network(&self) -> Network {
        self.network
    }

    pub fn data_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.data_dir {
            dir.clone()
        } else {
            let base_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
            match self.network() {
                Network::Testnet => base_dir.join(".bitcoin/testnet3"),
                Network::Regtest => base_dir.join(".bitcoin/regtest"),
                Network::Signet => base_dir.join(".bitcoin/signet"),
                _ => base_dir.join(".bitcoin"),
            }
        }
    }

    pub fn rpc_url(&self) -> String {
        if let Some(ref url) = self.rpc_url {
            url.clone()
        } else {
            // bitcoind default rpc ports per network
            let port = match self.network() {
                Network::Testnet => 18332,
                Network::Regtest => 18443,
                Network::Signet => 38332,
                _ => 8332,
            };

            format!("http://127.0.0.1:{}", port)
        }
    }

    pub fn auth(&self) -> Auth {
        if let Some(ref auth) = self.auth {
            match auth {
                BTCAuth::None => Auth::None,
                BTCAuth::UserPass(user, pass) => Auth::UserPass(user.clone(), pass.clone()),
                BTCAuth::CookieFile(path) => Auth::CookieFile(path.clone()),
            }
        } else {
            // Default to cookie file
            let cookie_path = self.data_dir().join(".cookie");
            Auth::CookieFile(cookie_path)
        }
    }
}

impl Default for BTCConfig {
    fn default() -> Self {
        BTCConfig {
            network: default_network(),
            data_dir: None,
            rpc_url: None,
            auth: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rpc_url_per_network() {
        let mut config = BTCConfig::default();
        assert_eq!(config.rpc_url(), "http://127.0.0.1:8332");

        config.network = Network::Testnet;
        assert_eq!(config.rpc_url(), "http://127.0.0.1:18332");

        config.network = Network::Regtest;
        assert_eq!(config.rpc_url(), "http://127.0.0.1:18443");

        config.rpc_url = Some("http://10.0.0.2:8332".to_string());
        assert_eq!(config.rpc_url(), "http://10.0.0.2:8332");
    }

    #[test]
    fn test_auth_defaults_to_cookie() {
        let config = BTCConfig {
            network: Network::Regtest,
            data_dir: Some(PathBuf::from("/tmp/btc")),
            rpc_url: None,
            auth: None,
        };

        match config.auth() {
            Auth::CookieFile(path) => assert_eq!(path, PathBuf::from("/tmp/btc/.cookie")),
            _ => panic!("Expected cookie file auth"),
        }

        let config = BTCConfig {
            auth: Some(BTCAuth::UserPass("rpcuser".to_string(), "rpcpass".to_string())),
            ..config
        };
        assert!(matches!(config.auth(), Auth::UserPass(_, _)));
    }
}
