//! Configuration loaded from `.env`, environment variables, and CLI arguments.

use std::time::Duration;

use bootstrap_telemetry::TelemetryConfig;
use clap::Parser;

/// Service configuration.
///
/// All values can be set via environment variables or CLI arguments.
/// Environment variables already set take precedence over `.env` entries.
#[derive(Debug, Clone, Parser)]
#[command(name = "service-bootstrap", about = "HTTP service bootstrap")]
pub struct Config {
    /// Listening port (bound on all interfaces)
    #[arg(long, env = "PORT")]
    pub port: u16,

    /// Human-readable service name
    #[arg(long, env = "SERVICE_NAME")]
    pub service_name: String,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(long, env = "LOG_LEVEL", default_value = "INFO")]
    pub log_level: String,

    /// Use JSON log format
    #[arg(long, env = "JSON_LOGS", default_value = "false")]
    pub json_logs: bool,

    /// OpenTelemetry OTLP endpoint
    #[arg(long, env = "OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Environment name (e.g., "production", "development")
    #[arg(long, env = "ENVIRONMENT")]
    pub environment: Option<String>,

    /// CORS allowed origins (comma-separated, or "*" for any)
    #[arg(long, env = "CORS_ALLOW_ORIGINS")]
    pub cors_allow_origins: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "30")]
    pub request_timeout_secs: u64,

    /// Expose Prometheus metrics at /metrics
    #[arg(long, env = "METRICS_ENABLED", default_value = "true")]
    pub metrics_enabled: bool,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Invalid(#[from] clap::Error),
    #[error("SERVICE_NAME must not be empty")]
    EmptyServiceName,
    #[error("Request timeout must be > 0")]
    InvalidRequestTimeout,
}

impl Config {
    /// Load `.env`, then parse and validate configuration.
    ///
    /// # Errors
    /// Returns `ConfigError` when a required value is missing or malformed.
    pub fn init() -> Result<Self, ConfigError> {
        if let Err(err) = dotenv::dotenv()
            && !err.not_found()
        {
            eprintln!(".env file error: {err}");
        }

        let config = Self::try_parse()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::EmptyServiceName);
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidRequestTimeout);
        }
        Ok(())
    }

    /// Per-request timeout as Duration.
    #[inline]
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Settings for the logging/tracing stack.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.service_name.clone(),
            log_level: self.log_level.clone(),
            json_logs: self.json_logs,
            otlp_endpoint: self.otlp_endpoint.clone(),
        }
    }

    /// Minimal configuration, used by tests and embedders that skip CLI parsing.
    #[must_use]
    pub fn new(port: u16, service_name: impl Into<String>) -> Self {
        Self {
            port,
            service_name: service_name.into(),
            log_level: "INFO".to_string(),
            json_logs: false,
            otlp_endpoint: None,
            environment: None,
            cors_allow_origins: None,
            request_timeout_secs: 30,
            metrics_enabled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use clap::error::ErrorKind;

    use super::*;

    #[test]
    fn parses_port_and_service_name() {
        let config =
            Config::try_parse_from(["svc", "--port", "3000", "--service-name", "demo"]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.service_name, "demo");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn non_numeric_port_fails() {
        let err = Config::try_parse_from(["svc", "--port", "abc", "--service-name", "demo"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn out_of_range_port_fails() {
        let err = Config::try_parse_from(["svc", "--port", "70000", "--service-name", "demo"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn missing_port_fails() {
        // Detach `PORT` so the process environment cannot satisfy the argument.
        let err = Config::command()
            .mut_arg("port", |arg| arg.env(None::<&'static str>))
            .try_get_matches_from(["svc", "--service-name", "demo"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn port_is_read_from_its_env_var() {
        let port = Config::command()
            .get_arguments()
            .find(|arg| arg.get_id() == "port")
            .and_then(|arg| arg.get_env().map(ToOwned::to_owned));
        assert_eq!(port.as_deref(), Some(std::ffi::OsStr::new("PORT")));
    }

    #[test]
    fn blank_service_name_fails_validation() {
        let config = Config::new(3000, "   ");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyServiceName)
        ));
    }

    #[test]
    fn zero_timeout_fails_validation() {
        let mut config = Config::new(3000, "demo");
        config.request_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRequestTimeout)
        ));
    }

    #[test]
    fn telemetry_carries_service_name() {
        let config = Config::new(3000, "demo");
        let telemetry = config.telemetry();
        assert_eq!(telemetry.service_name, "demo");
        assert_eq!(telemetry.log_level, "INFO");
    }
}
