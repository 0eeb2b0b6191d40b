//! Service entry point.

use bootstrap_telemetry::setup_telemetry;
use service_bootstrap::{AppModule, Config, startup};
use tracing::info;

/// Build version (injected at compile time)
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::init()?;
    let telemetry = setup_telemetry(&config.telemetry());

    info!(
        version = VERSION,
        port = config.port,
        environment = config.environment.as_deref().unwrap_or("unset"),
        otlp = config.otlp_endpoint.is_some(),
        pid = std::process::id(),
        "Starting {}",
        config.service_name
    );

    let module = root_module(&config);
    let result = startup::bootstrap(module, config).await;

    telemetry.shutdown();
    result?;
    info!("Shutdown complete");
    Ok(())
}

#[cfg(feature = "prometheus")]
fn root_module(config: &Config) -> AppModule {
    if config.metrics_enabled {
        AppModule::new().with_metrics(bootstrap_telemetry::init_metrics())
    } else {
        AppModule::new()
    }
}

#[cfg(not(feature = "prometheus"))]
fn root_module(_config: &Config) -> AppModule {
    AppModule::new()
}
