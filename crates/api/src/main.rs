use anyhow::Context;

use construcbill_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    construcbill_observability::init();

    let config = AppConfig::load().context("failed to load configuration")?;
    let app = construcbill_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
