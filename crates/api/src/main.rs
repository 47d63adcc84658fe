//! calsync - calendar sync backend
//!
//! Serves the webhook receiver and admin API and keeps webhook channels
//! renewed in the background.

use std::sync::Arc;

use anyhow::Context;
use calsync_api::utils::init_tracing;
use calsync_api::{router, AppContext};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    let config = calsync_infra::config::load().context("loading configuration")?;
    init_tracing(&config.logging)?;
    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(err) => info!(error = %err, "no .env file loaded"),
    }

    let bind_address = config.server.bind_address.clone();
    let ctx = Arc::new(AppContext::new(config).context("building application context")?);

    let mut scheduler = ctx.renewal_scheduler();
    if ctx.engine.config().callback_address.is_some() {
        match scheduler.run_now().await {
            Ok(report) => info!(
                examined = report.examined,
                renewed = report.renewed,
                failed = report.failures.len(),
                "startup renewal pass finished"
            ),
            Err(err) => warn!(error = %err, "startup renewal pass failed"),
        }
        scheduler.start().await.context("starting renewal scheduler")?;
    }

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {bind_address}"))?;
    info!(address = %bind_address, "calsync listening");

    axum::serve(listener, router(Arc::clone(&ctx)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving http")?;

    if scheduler.is_running() {
        scheduler.stop().await.context("stopping renewal scheduler")?;
    }
    info!("calsync stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
