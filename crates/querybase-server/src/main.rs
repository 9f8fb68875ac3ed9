use querybase_server::config::RuntimeConfig;
use querybase_server::{app::Application, logging, shutdown};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RuntimeConfig::load()?;
    logging::init(&config.logging);

    tracing::info!("starting querybase-server");

    let mut app = Application::build(&config).await?;
    app.start();

    shutdown::wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining");

    app.shutdown().await;
    tracing::info!("shutdown complete");

    Ok(())
}
