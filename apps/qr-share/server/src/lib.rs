//! `qr-share` serves a single file to devices on the local network. The status page
//! shows a QR code for the download URL and keeps a heartbeat channel open; once the
//! page is gone the process exits on its own.

use std::{future::IntoFuture, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use qr_share_core::{SessionEngine, ShutdownReason};
use tokio::net::TcpListener;
use tracing::{info, warn};

pub mod address;
pub mod browser;
pub mod config;
pub mod front_door;
pub mod page;
pub mod share;
pub mod telemetry;
pub mod workflow;

use crate::{config::ServerConfig, front_door::AppState, share::SharedFile};

/// Runs one sharing session to completion and reports why it ended.
pub async fn run(config: ServerConfig, metrics: PrometheusHandle) -> Result<ShutdownReason> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    serve(listener, config, metrics).await
}

/// Same as [`run`] on an already bound listener; `config.listen_addr` is ignored.
pub async fn serve(
    listener: TcpListener,
    config: ServerConfig,
    metrics: PrometheusHandle,
) -> Result<ShutdownReason> {
    let file = SharedFile::open(&config.file).await?;
    let bound = listener
        .local_addr()
        .context("failed to read bound address")?;

    let host = match &config.advertise_host {
        Some(host) => host.clone(),
        None => address::resolve_local_address().to_string(),
    };
    let download_url = file.download_url(&host, bound.port())?;
    let page = page::render_status_page(
        file.name(),
        download_url.as_str(),
        config.lifecycle.heartbeat_interval(),
    )
    .context("failed to render status page")?;

    let engine = SessionEngine::new(config.lifecycle);
    engine.spawn_sweeper();

    info!(
        file = file.name(),
        bytes = file.len(),
        listen_addr = %bound,
        url = %download_url,
        "sharing file"
    );

    let state = Arc::new(AppState::new(engine.clone(), file, page, metrics));
    let router = front_door::router(state);

    if config.open_browser {
        browser::open_status_page(&config.local_page_url(bound));
    }

    serve_until_session_ends(listener, router, engine, config.shutdown_grace).await
}

async fn serve_until_session_ends(
    listener: TcpListener,
    router: axum::Router,
    engine: SessionEngine,
    grace: Duration,
) -> Result<ShutdownReason> {
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(stop_accepting(engine.clone()))
        .into_future();
    tokio::pin!(server);

    let mut ended = engine.subscribe();
    tokio::select! {
        result = &mut server => {
            result.context("server shutdown with error")?;
        }
        _ = async {
            ended.wait().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                grace_seconds = grace.as_secs(),
                "connections still open after grace period; exiting anyway"
            );
        }
    }

    let reason = engine
        .subscribe()
        .reason()
        .unwrap_or(ShutdownReason::Interrupted);
    info!(reason = ?reason, "shutdown complete");
    Ok(reason)
}

/// Resolves when the session ends, or on Ctrl-C, which ends the session too.
async fn stop_accepting(engine: SessionEngine) {
    let mut ended = engine.subscribe();
    tokio::select! {
        reason = ended.wait() => {
            info!(reason = ?reason, "session over; stopping server");
        }
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => {
                info!("interrupt received; stopping server");
                engine.shutdown(ShutdownReason::Interrupted);
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for Ctrl-C");
                ended.wait().await;
            }
        },
    }
}
