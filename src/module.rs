//! Application modules and the root module.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::routing::get;
use serde::Serialize;

use crate::config::Config;
use crate::versioning::VersionedRoutes;

#[cfg(feature = "prometheus")]
use bootstrap_telemetry::PrometheusHandle;

/// Build version.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A unit of application composition that contributes routes.
///
/// `build` runs once while the application is created; an error aborts startup.
pub trait Module {
    fn build(
        self,
        config: Arc<Config>,
    ) -> impl Future<Output = anyhow::Result<VersionedRoutes>> + Send;
}

/// Root module: service information and health routes.
#[derive(Clone, Default)]
pub struct AppModule {
    #[cfg(feature = "prometheus")]
    metrics: Option<PrometheusHandle>,
}

impl AppModule {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose `/metrics` rendered from `handle`.
    #[cfg(feature = "prometheus")]
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// State shared by the root module's handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub started_at: Instant,
}

#[derive(Serialize)]
pub struct ServiceInfo {
    service: String,
    version: &'static str,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
}

impl Module for AppModule {
    async fn build(self, config: Arc<Config>) -> anyhow::Result<VersionedRoutes> {
        let state = AppState {
            config,
            started_at: Instant::now(),
        };

        let routes: VersionedRoutes = VersionedRoutes::new()
            .route("/", get(service_info))
            .neutral("/health", get(|| async { "OK" }))
            .neutral("/health/live", get(|| async { "OK" }))
            .neutral("/health/ready", get(readiness_handler))
            .with_state(state);

        #[cfg(feature = "prometheus")]
        let routes = match self.metrics {
            Some(handle) => routes.neutral(
                "/metrics",
                get(move || {
                    let handle = handle.clone();
                    async move { handle.render() }
                }),
            ),
            None => routes,
        };

        Ok(routes)
    }
}

async fn service_info(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: state.config.service_name.clone(),
        version: VERSION,
    })
}

async fn readiness_handler(State(state): State<AppState>) -> Json<ReadinessResponse> {
    Json(ReadinessResponse {
        status: "healthy",
        version: VERSION,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
