use super::rpc::*;
use crate::btc::CCTransaction;
use crate::config::IndexerConfigRef;
use crate::error::IndexError;
use crate::query::{AddressUtxo, ImportResult, NodeInfo, QueryFacadeRef};
use jsonrpc_core::IoHandler;
use jsonrpc_core::{BoxFuture, Error as JsonError, ErrorCode, Result as JsonResult};
use jsonrpc_http_server::{AccessControlAllowOrigin, DomainsValidation, ServerBuilder};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

fn to_json_error(e: IndexError) -> JsonError {
    let code = match e {
        IndexError::InvalidParams(_) => ErrorCode::InvalidParams,
        _ => ErrorCode::InternalError,
    };

    JsonError {
        code,
        message: e.to_string(),
        data: None,
    }
}

#[derive(Clone)]
pub struct CCIndexerRpcServer {
    facade: QueryFacadeRef,
    shutdown_tx: watch::Sender<()>,
    server_handle: Arc<Mutex<Option<jsonrpc_http_server::CloseHandle>>>,
}

impl CCIndexerRpcServer {
    pub fn new(facade: QueryFacadeRef, shutdown_tx: watch::Sender<()>) -> Self {
        Self {
            facade,
            shutdown_tx,
            server_handle: Arc::new(Mutex::new(None)),
        }
    }

    pub fn start(
        config: IndexerConfigRef,
        facade: QueryFacadeRef,
        shutdown_tx: watch::Sender<()>,
    ) -> Result<Self, String> {
        let ret = Self::new(facade, shutdown_tx);

        let mut io = IoHandler::new();
        io.extend_with(ret.clone().to_delegate());

        let addr = format!("{}:{}", config.rpc_server.host, config.rpc_server.port)
            .parse()
            .map_err(|e| {
                let msg = format!("Failed to parse RPC server address: {}", e);
                error!("{}", msg);
                msg
            })?;

        let server = ServerBuilder::new(io)
            .cors(DomainsValidation::AllowOnly(vec![
                AccessControlAllowOrigin::Any,
            ]))
            .start_http(&addr)
            .map_err(|e| {
                let msg = format!("Unable to start RPC server: {}", e);
                error!("{}", msg);
                msg
            })?;

        let handle = server.close_handle();
        info!("RPC server listening on {}", addr);
        tokio::task::spawn_blocking(move || {
            server.wait();
        });

        *ret.server_handle.lock().unwrap() = Some(handle);

        Ok(ret)
    }

    pub async fn close(&self) {
        let handle = self.server_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            info!("Closing RPC server.");
            if let Err(e) = tokio::task::spawn_blocking(move || handle.close()).await {
                error!("Failed to close RPC server: {}", e);
            }

            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            info!("RPC server closed.");
        } else {
            warn!("RPC server handle not found.");
        }
    }
}

impl CCIndexerRpc for CCIndexerRpcServer {
    fn get_addresses_utxos(
        &self,
        params: GetAddressesUtxosParams,
    ) -> BoxFuture<JsonResult<Vec<AddressUtxo>>> {
        let facade = self.facade.clone();
        Box::pin(async move {
            facade
                .get_addresses_utxos(&params.addresses, params.num_of_confirmations)
                .await
                .map_err(to_json_error)
        })
    }

    fn get_addresses_transactions(
        &self,
        params: GetAddressesTransactionsParams,
    ) -> BoxFuture<JsonResult<Vec<CCTransaction>>> {
        let facade = self.facade.clone();
        Box::pin(async move {
            facade
                .get_addresses_transactions(&params.addresses)
                .await
                .map_err(to_json_error)
        })
    }

    fn transmit(&self, params: TransmitParams) -> BoxFuture<JsonResult<String>> {
        let facade = self.facade.clone();
        Box::pin(async move {
            facade
                .transmit(&params.tx_hex)
                .await
                .map_err(to_json_error)
        })
    }

    fn get_info(&self) -> BoxFuture<JsonResult<NodeInfo>> {
        let facade = self.facade.clone();
        Box::pin(async move { facade.get_info().await.map_err(to_json_error) })
    }

    fn import_addresses(
        &self,
        params: ImportAddressesParams,
    ) -> BoxFuture<JsonResult<ImportResult>> {
        let facade = self.facade.clone();
        Box::pin(async move {
            facade
                .import_addresses(&params.addresses, params.reindex)
                .await
                .map_err(to_json_error)
        })
    }

    fn stop(&self) -> JsonResult<()> {
        info!("Received stop command via RPC.");
        if let Err(e) = self.shutdown_tx.send(()) {
            let msg = format!("Failed to send shutdown signal: {}", e);
            error!("{}", msg);
            return Err(JsonError {
                code: ErrorCode::InternalError,
                message: msg,
                data: None,
            });
        }

        if let Some(handle) = self.server_handle.lock().unwrap().take() {
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                info!("Closing RPC server.");
                handle.close();
            });
        } else {
            warn!("RPC server handle not found.");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let e = to_json_error(IndexError::InvalidParams("addresses".to_string()));
        assert_eq!(e.code, ErrorCode::InvalidParams);

        let e = to_json_error(IndexError::PeerUnavailable("timeout".to_string()));
        assert_eq!(e.code, ErrorCode::InternalError);
        assert!(e.message.contains("timeout"));
    }

    #[test]
    fn test_params_decode() {
        let params: GetAddressesUtxosParams =
            serde_json::from_str(r#"{"addresses":["a1"]}"#).unwrap();
        assert_eq!(params.num_of_confirmations, None);

        let params: TransmitParams = serde_json::from_str(r#"{"txHex":"0200"}"#).unwrap();
        assert_eq!(params.tx_hex, "0200");

        assert!(serde_json::from_str::<TransmitParams>("{}").is_err());

        let params: ImportAddressesParams =
            serde_json::from_str(r#"{"addresses":["a1"]}"#).unwrap();
        assert!(!params.reindex);
    }
}
