//! Service startup sequence.

use bootstrap_core::ValidationPolicy;
use tokio::signal;
use tracing::info;

use crate::application::{Application, BootstrapError, Server};
use crate::config::Config;
use crate::module::Module;
use crate::versioning::VersioningOptions;

/// Interface the listener binds to.
pub const LISTEN_HOST: &str = "0.0.0.0";

/// Version applied to routes that declare none.
pub const DEFAULT_API_VERSION: &str = "1";

/// Create the application from `module`, install the global policies, and bind.
///
/// Logs the startup line once the socket is bound. Every step must succeed
/// before the next runs.
///
/// # Errors
/// Returns the first `BootstrapError`; none are retried.
pub async fn start<M: Module>(module: M, config: Config) -> Result<Server, BootstrapError> {
    let mut app = Application::create(module, config).await?;

    app.use_global_validation(ValidationPolicy::default());
    app.enable_versioning(VersioningOptions::uri().with_default_version(DEFAULT_API_VERSION));

    let config = app.config();
    let (port, service_name) = (config.port, config.service_name.clone());
    let server = app.listen(port, LISTEN_HOST).await?;

    info!(
        service = %service_name,
        address = %server.local_addr(),
        "{}",
        server.startup_message()
    );
    Ok(server)
}

/// Run the service until SIGINT or SIGTERM.
///
/// # Errors
/// Returns the first startup or serve error.
pub async fn bootstrap<M: Module>(module: M, config: Config) -> Result<(), BootstrapError> {
    start(module, config).await?.run(shutdown_signal()).await
}

/// Resolve on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use crate::module::AppModule;

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn start_logs_one_startup_line() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let server = start(AppModule::new(), Config::new(0, "demo")).await.unwrap();
        let port = server.local_addr().port().to_string();

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<_> = output
            .lines()
            .filter(|line| line.contains("is running on"))
            .collect();
        assert_eq!(lines.len(), 1, "{output}");
        assert!(lines[0].contains("demo"));
        assert!(lines[0].contains(&format!("http://localhost:{port}")));
    }
}
