#[macro_use]
extern crate log;

use cc_indexer::btc::create_btc_rpc_client;
use cc_indexer::cc::create_default_codec;
use cc_indexer::config::IndexerConfig;
use cc_indexer::db::{StateStore, UndoLog};
use cc_indexer::event::{EventBus, spawn_info_heartbeat};
use cc_indexer::index::ChainSyncEngine;
use cc_indexer::query::QueryFacade;
use cc_indexer::service::CCIndexerRpcServer;
use cc_indexer::status::SyncStatusManager;
use cc_util::{CC_INDEXER_SERVICE_NAME, LogConfig};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "cc-indexer")]
#[command(version = "0.1.0")]
#[command(about = "Colored Coins Chain Indexer", long_about = None)]
struct CCIndexerCli {
    #[command(subcommand)]
    command: Option<CCIndexerCommands>,

    /// Run the service in daemon mode
    #[arg(short, long)]
    daemon: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
#[command(rename_all = "kebab-case")]
enum CCIndexerCommands {
    /// Delete the state store and undo log, DANGEROUS: all indexed assets
    /// are lost and the chain is synced again from the first colored block.
    ClearDb {},
}

fn exit_with(msg: &str) -> ! {
    error!("{}", msg);
    println!("{}", msg);
    std::process::exit(1);
}

async fn main_run() {
    let (_lock, _guard) = match cc_util::acquire_service_lock(CC_INDEXER_SERVICE_NAME) {
        Ok(lock) => lock,
        Err(e) => {
            println!("{}", e);
            std::process::exit(1);
        }
    };

    let log_config = LogConfig::new(CC_INDEXER_SERVICE_NAME).enable_console(false);
    cc_util::init_log(log_config);

    let root_dir = cc_util::get_service_dir(CC_INDEXER_SERVICE_NAME);
    info!("Using service directory: {}", root_dir.display());
    println!("Using service directory: {}", root_dir.display());

    let config = match IndexerConfig::load(&root_dir) {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => exit_with(&format!("Failed to load config: {}", e)),
    };

    let store = match StateStore::new(&root_dir) {
        Ok(store) => Arc::new(store),
        Err(e) => exit_with(&format!("Failed to open state store: {}", e)),
    };
    let undo_log = match UndoLog::new(&root_dir) {
        Ok(undo_log) => Arc::new(undo_log),
        Err(e) => exit_with(&format!("Failed to open undo log: {}", e)),
    };

    let head = match store.get_chain_head() {
        Ok(head) => head,
        Err(e) => exit_with(&format!("Failed to load chain head: {}", e)),
    };
    match &head {
        Some(head) => info!("Resuming from chain head {:?}", head),
        None => info!("No chain head, starting at height {}", config.start_height()),
    }

    let status = Arc::new(SyncStatusManager::new(head.as_ref()));
    let events = Arc::new(EventBus::new());
    let heartbeat = spawn_info_heartbeat(
        events.clone(),
        status.clone(),
        Duration::from_secs(config.sync.info_interval_secs.max(1)),
    );

    let peer = create_btc_rpc_client(&config);
    let codec = create_default_codec();

    let engine = ChainSyncEngine::new(
        config.clone(),
        peer.clone(),
        store.clone(),
        undo_log,
        codec.clone(),
        status.clone(),
        events,
    );

    let facade = Arc::new(QueryFacade::new(
        config.clone(),
        peer,
        store.clone(),
        codec,
        status,
    ));

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(());
    let rpc_server = match CCIndexerRpcServer::start(config.clone(), facade, shutdown_tx) {
        Ok(server) => server,
        Err(e) => exit_with(&format!("Failed to start RPC server: {}", e)),
    };
    println!(
        "RPC server started at http://{}:{}",
        config.rpc_server.host, config.rpc_server.port
    );

    use tokio::signal;
    let sigint = signal::ctrl_c();

    #[cfg(unix)]
    let sigterm = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!("Failed to create SIGTERM signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = sigint => {
            info!("Received Ctrl+C, shutting down...");
            println!("Shutting down...");
        }
        _ = sigterm => {
            info!("Received SIGTERM, shutting down...");
            println!("Shutting down...");
        }
        _ = shutdown_rx.changed() => {
            info!("Shutdown signal received from RPC, shutting down...");
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        _ = engine.run_forever() => {
            warn!("Chain sync engine exited unexpectedly.");
        }
    }

    engine.shutdown();
    heartbeat.abort();

    if let Err(e) = store.flush() {
        error!("Failed to flush state store on shutdown: {}", e);
    }

    rpc_server.close().await;

    println!("Shutdown complete.");

    tokio::time::sleep(Duration::from_millis(1000)).await;
}

#[tokio::main]
async fn main() {
    let cli = CCIndexerCli::parse();

    match cli.command {
        Some(CCIndexerCommands::ClearDb {}) => {
            let log_config = LogConfig::new(CC_INDEXER_SERVICE_NAME)
                .with_file_name(&format!("{}_clear_db", CC_INDEXER_SERVICE_NAME));
            cc_util::init_log(log_config);

            let root_dir = cc_util::get_service_dir(CC_INDEXER_SERVICE_NAME);
            if let Err(e) = cc_indexer::tool::clear_db_files(&root_dir) {
                exit_with(&format!("Failed to clear database files: {}", e));
            }
            println!("Database files cleared successfully.");
            return;
        }
        None => {}
    }

    if cli.daemon {
        if let Err(e) = cc_indexer::tool::daemonize_process(CC_INDEXER_SERVICE_NAME) {
            println!("{}", e);
            std::process::exit(1);
        }
    }

    main_run().await;
    println!("Colored coins indexer exited.");
}
