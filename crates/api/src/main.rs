use anyhow::Context;

use canopy_api::app::{build_app, build_services};
use canopy_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    canopy_observability::init();

    let config = AppConfig::from_env().context("loading configuration")?;
    tracing::info!(?config, "configuration loaded");

    let services = build_services(&config).await.context("wiring services")?;
    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
