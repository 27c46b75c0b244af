use crate::constants::first_colored_block;
use cc_util::{BTCConfig, CC_INDEXER_SERVICE_HTTP_PORT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

fn default_idle_delay_ms() -> u64 {
    1000
}

fn default_error_delay_ms() -> u64 {
    1000
}

fn default_fatal_delay_ms() -> u64 {
    30_000
}

fn default_busy_poll_ms() -> u64 {
    5000
}

fn default_info_interval_secs() -> u64 {
    10
}

fn default_import_label() -> String {
    "ccnode".to_string()
}

fn default_import_batch_size() -> usize {
    100
}

fn default_history_page_size() -> usize {
    100
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    // Overrides the first colored block of the network when set
    #[serde(default)]
    pub start_height: Option<u32>,

    // Delay after a mempool pass that found nothing new
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,

    #[serde(default = "default_error_delay_ms")]
    pub error_delay_ms: u64,

    #[serde(default = "default_fatal_delay_ms")]
    pub fatal_delay_ms: u64,

    // Poll interval while bitcoind is rescanning imported addresses
    #[serde(default = "default_busy_poll_ms")]
    pub busy_poll_ms: u64,

    #[serde(default = "default_info_interval_secs")]
    pub info_interval_secs: u64,

    #[serde(default = "default_import_label")]
    pub import_label: String,

    #[serde(default = "default_import_batch_size")]
    pub import_batch_size: usize,

    #[serde(default = "default_history_page_size")]
    pub history_page_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            start_height: None,
            idle_delay_ms: default_idle_delay_ms(),
            error_delay_ms: default_error_delay_ms(),
            fatal_delay_ms: default_fatal_delay_ms(),
            busy_poll_ms: default_busy_poll_ms(),
            info_interval_secs: default_info_interval_secs(),
            import_label: default_import_label(),
            import_batch_size: default_import_batch_size(),
            history_page_size: default_history_page_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcServer {
    #[serde(default = "default_rpc_host")]
    pub host: String,

    #[serde(default = "default_rpc_port")]
    pub port: u16,
}

fn default_rpc_host() -> String {
    "127.0.0.1".to_string()
}

fn default_rpc_port() -> u16 {
    CC_INDEXER_SERVICE_HTTP_PORT
}

impl Default for RpcServer {
    fn default() -> Self {
        RpcServer {
            host: default_rpc_host(),
            port: default_rpc_port(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IndexerConfig {
    #[serde(default)]
    pub btc: BTCConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub rpc_server: RpcServer,
}

impl IndexerConfig {
    pub fn load(root_dir: &Path) -> Result<Self, String> {
        let path = root_dir.join("config.toml");
        if !path.exists() {
            let default_config = IndexerConfig::default();
            info!(
                "Config file {} does not exist. Using default configuration.",
                path.display()
            );
            match toml::to_string_pretty(&default_config) {
                Ok(s) => info!("Default config: {}", s),
                Err(e) => warn!("Failed to render default config: {}", e),
            }
            Ok(default_config)
        } else {
            info!("Loading config from {}", path.display());
            let config_data = std::fs::read_to_string(&path).map_err(|e| {
                let msg = format!("Failed to read config file {}: {}", path.display(), e);
                error!("{}", msg);
                msg
            })?;

            Self::parse(&config_data).map_err(|e| {
                let msg = format!("Failed to parse config file {}: {}", path.display(), e);
                error!("{}", msg);
                msg
            })
        }
    }

    pub fn parse(data: &str) -> Result<Self, String> {
        toml::from_str(data).map_err(|e| e.to_string())
    }

    /// Height to fetch first when the chain head has never been written.
    pub fn start_height(&self) -> u32 {
        self.sync
            .start_height
            .unwrap_or_else(|| first_colored_block(self.btc.network()))
    }
}

pub type IndexerConfigRef = Arc<IndexerConfig>;
