use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use fleet_state::store::{ClientDataStore, MemoryDataStore, MemoryRecordStore, RecordStore};
use fleet_state::{FleetConfig, FleetManager};
use muster_hub::{
    blob::FsBlobStore,
    cli::{self, Cli, Commands},
    config::Config,
    gateway,
    storage::RedisStore,
};

#[tokio::main]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let (records, data): (Arc<dyn RecordStore>, Arc<dyn ClientDataStore>) = match &config.redis_url
    {
        Some(url) => match RedisStore::connect(url).await {
            Ok(store) => {
                info!("using redis store at {url}");
                let store = Arc::new(store);
                (store.clone(), store)
            }
            Err(err) => {
                error!("failed to connect to redis: {err}");
                std::process::exit(1);
            }
        },
        None => {
            info!("MUSTER_REDIS_URL is not set; using the volatile in-memory store");
            (
                Arc::new(MemoryRecordStore::new()),
                Arc::new(MemoryDataStore::new()),
            )
        }
    };

    let blobs = match FsBlobStore::new(config.media_root.clone()).await {
        Ok(blobs) => Arc::new(blobs),
        Err(err) => {
            error!(
                "failed to prepare media root {}: {err}",
                config.media_root.display()
            );
            std::process::exit(1);
        }
    };

    let manager = FleetManager::new(
        records,
        data,
        blobs,
        FleetConfig {
            poll_interval_secs: config.poll_interval_secs,
            max_concurrent_uploads: config.max_concurrent_uploads,
        },
    );

    if let Some(Commands::Inspect {
        client,
        page,
        filter,
    }) = cli.command
    {
        if let Err(err) = cli::run_inspect(manager, client, page, filter).await {
            error!("inspect failed: {err}");
            std::process::exit(1);
        }
        return;
    }

    let port = cli.port.unwrap_or(config.port);
    let app = gateway::router(manager.clone());
    let addr = format!("0.0.0.0:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {addr}: {err}");
            std::process::exit(1);
        }
    };

    info!("muster hub listening on {addr}");
    info!("media root: {}", config.media_root.display());

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server error: {err}");
    }
    manager.shutdown();
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        error!("failed to listen for shutdown signal");
    }
}
