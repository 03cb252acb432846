use anyhow::{Context, Result};
use facetag_core::{LoopMode, Registry};
use tracing_subscriber::EnvFilter;

mod config;
mod console;
mod engine;
mod preview;
mod store;
#[cfg(test)]
mod testing;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "facetag starting");

    let config = config::Config::load().context("failed to load configuration")?;
    tracing::info!(
        camera = %config.camera_device,
        model_dir = %config.model_dir.display(),
        output_dir = %config.output_dir.display(),
        metric = config.match_policy.metric_name(),
        threshold = config.match_policy.threshold(),
        "config loaded"
    );

    let registry = Registry::new(config.match_policy.build()).shared();
    let (handle, events) = engine::spawn_engine(&config, registry.clone())
        .context("failed to start recognition engine")?;
    tracing::info!("engine ready");

    let preview_on_start = config.preview_on_start;
    let mut console = console::Console::new(handle, registry, config);
    if preview_on_start {
        console.start(LoopMode::Preview).await?;
    }

    let handle = console.run(events).await;

    tracing::info!("facetag shutting down");
    handle.shutdown().await?;
    Ok(())
}
