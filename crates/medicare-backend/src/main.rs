//! The `medicare-backend` server.
//!
//! It exposes the device registry over HTTP, sends commands to devices
//! through an `MQTT` broker, and streams their results and telemetry to
//! real-time clients.

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

use medicare_backend::command::CommandBuilder;
use medicare_backend::config::Config;
use medicare_backend::correlation::CorrelationTable;
use medicare_backend::dispatch::Dispatcher;
use medicare_backend::fanout::Fanout;
use medicare_backend::http::{AppState, router};
use medicare_backend::relay::{Relay, RelayRunner};
use medicare_backend::store::{MemoryStore, Store};

use tokio::net::TcpListener;

use tokio_util::sync::CancellationToken;

use tracing::{error, info};

use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("impossible to seed the store: {0}")]
    Store(#[from] medicare_backend::error::Error),
    #[error("impossible to listen on {address}: {source}")]
    Bind {
        address: SocketAddr,
        source: std::io::Error,
    },
    #[error("HTTP server failure: {0}")]
    Serve(std::io::Error),
}

async fn shutdown_signal(cancellation_token: CancellationToken, fanout: Fanout) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Impossible to listen for the shutdown signal: {e}");
    }

    info!("Shutting down");
    cancellation_token.cancel();
    // Real-time streams never end on their own.
    fanout.close();
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    let store: Arc<dyn Store> = if config.no_seed {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(MemoryStore::seeded()?)
    };

    let cancellation_token = CancellationToken::new();
    let correlations = Arc::new(CorrelationTable::new(config.correlation_ttl));
    let fanout = Fanout::new(config.fanout_capacity);

    let relay = Relay::new(
        Arc::clone(&correlations),
        fanout.clone(),
        config.namespace.as_str(),
    );
    let (publisher, relay_task) = RelayRunner::start(
        &config.relay_options(),
        relay,
        cancellation_token.clone(),
    );
    let sweeper_task =
        Arc::clone(&correlations).run_sweeper(config.sweep_interval, cancellation_token.clone());

    let dispatcher = Dispatcher::new(
        CommandBuilder::new(Arc::clone(&store), config.policy()),
        correlations,
        publisher,
        config.namespace.as_str(),
    );
    let app = router(AppState::new(store, dispatcher, fanout.clone()));

    let listener = TcpListener::bind(config.address)
        .await
        .map_err(|source| StartupError::Bind {
            address: config.address,
            source,
        })?;
    info!("Listening on {}", config.address);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancellation_token.clone(), fanout))
        .await;

    // The server may also stop because of an error.
    cancellation_token.cancel();
    for task in [relay_task, sweeper_task] {
        if let Err(e) = task.await {
            error!("A background task failed: {e}");
        }
    }

    served.map_err(StartupError::Serve)
}
