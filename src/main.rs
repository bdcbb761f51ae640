//! mdsyncd - Markdown sync daemon
//!
//! Real-time collaborative editing of plain-text documents over WebSocket.
//! Every connected client of a document receives each accepted edit.

mod config;
mod error;
mod http;
mod metrics;
mod network;
mod state;
mod telemetry;

use crate::config::{Config, LogFormat, validate};
use crate::network::Gateway;
use crate::state::DocumentStore;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration before logging so the format can be honored.
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path);
    let format = config
        .as_ref()
        .map(|c| c.logging.format)
        .unwrap_or_default();
    init_tracing(format);

    let config = config.map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("configuration has {} error(s)", errors.len());
    }

    info!(
        server = %config.server.name,
        dispatch = ?config.sync.dispatch,
        "Starting mdsyncd"
    );

    // Prometheus metrics are optional.
    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    let metrics_port = config.server.metrics_port;
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        info!("Metrics initialized");

        tokio::spawn(async move {
            http::run_http_server(metrics_port).await;
        });
        info!(port = metrics_port, "Prometheus HTTP server started");
    }

    let store = Arc::new(DocumentStore::new());
    let gateway = Gateway::bind(config.listen, config.sync, Arc::clone(&store)).await?;

    tokio::select! {
        result = gateway.run() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!(documents = store.len(), "Shutdown requested");
        }
    }

    if !store.is_empty() {
        for session in store.sessions() {
            let snapshot = session.snapshot().await;
            info!(
                doc_id = snapshot.id,
                title = %snapshot.title,
                chars = snapshot.text.chars().count(),
                modified_at = %snapshot.modified_at,
                "Document state at shutdown"
            );
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
