use anyhow::{Context, Result};
use facegate_core::gallery::Registry;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "facegated starting");

    let config = config::Config::from_env();
    let engine_config = config.engine_config()?;

    let registry = Arc::new(
        Registry::load(&config.registry_path)
            .with_context(|| format!("opening registry {}", config.registry_path.display()))?,
    );

    let max_image_bytes = config.max_image_bytes;
    let session_bus = config.session_bus;
    let engine = engine::spawn_engine(config, engine_config, Arc::clone(&registry))
        .await
        .context("starting engine")?;

    let service = dbus_interface::GateService::new(engine, registry, max_image_bytes);
    let builder = if session_bus {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let _connection = builder
        .name(dbus_interface::BUS_NAME)?
        .serve_at(dbus_interface::OBJECT_PATH, service)?
        .build()
        .await
        .context("registering on D-Bus")?;

    tracing::info!(bus = dbus_interface::BUS_NAME, session_bus, "facegated ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facegated shutting down");

    Ok(())
}
