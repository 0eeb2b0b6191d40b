//! Application factory.
//!
//! An [`Application`] is created from a root [`Module`], configured with
//! cross-cutting policies, then bound to a socket with [`Application::listen`].

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Extension, Router};
use bootstrap_core::ValidationPolicy;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::config::Config;
use crate::middleware::{self, MetricsLayer};
use crate::module::Module;
use crate::versioning::{RouteError, VersionedRoutes, VersioningOptions};

/// Startup failures. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Module construction failed: {0:#}")]
    Module(#[source] anyhow::Error),
    #[error(transparent)]
    Routes(#[from] RouteError),
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("Server error: {0}")]
    Serve(#[source] io::Error),
}

/// Application instance assembled from a root module.
pub struct Application {
    config: Arc<Config>,
    routes: VersionedRoutes,
    validation: Option<ValidationPolicy>,
    versioning: Option<VersioningOptions>,
}

impl Application {
    /// Build the root module and wrap its routes in a new application.
    ///
    /// # Errors
    /// Returns `BootstrapError::Module` if the module fails to build.
    pub async fn create<M: Module>(module: M, config: Config) -> Result<Self, BootstrapError> {
        let config = Arc::new(config);
        let routes = module
            .build(Arc::clone(&config))
            .await
            .map_err(BootstrapError::Module)?;
        debug!(routes = routes.len(), "Application created");

        Ok(Self {
            config,
            routes,
            validation: None,
            versioning: None,
        })
    }

    /// Configuration accessor.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Apply `policy` to every validated extractor on every route.
    pub fn use_global_validation(&mut self, policy: ValidationPolicy) -> &mut Self {
        self.validation = Some(policy);
        self
    }

    /// Enable request versioning.
    pub fn enable_versioning(&mut self, options: VersioningOptions) -> &mut Self {
        self.versioning = Some(options);
        self
    }

    /// Mount routes and wrap them in the middleware stack.
    ///
    /// # Errors
    /// Returns `BootstrapError::Routes` for an invalid route table.
    pub fn into_router(self) -> Result<Router, BootstrapError> {
        let router = self
            .routes
            .layer(MetricsLayer::new())
            .into_router(self.versioning.as_ref())?;
        let router = middleware::apply(router, &self.config);
        Ok(match self.validation {
            Some(policy) => router.layer(Extension(policy)),
            None => router,
        })
    }

    /// Bind a listener on `host:port` and return the ready-to-run server.
    ///
    /// Resolves once the socket is bound; port `0` picks an ephemeral port.
    ///
    /// # Errors
    /// Returns `BootstrapError::Routes` for an invalid route table and
    /// `BootstrapError::Bind` if the address cannot be bound.
    pub async fn listen(self, port: u16, host: &str) -> Result<Server, BootstrapError> {
        let service_name = self.config.service_name.clone();
        let router = self.into_router()?;

        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|source| BootstrapError::Bind {
                addr: format!("{host}:{port}"),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| BootstrapError::Bind {
            addr: format!("{host}:{port}"),
            source,
        })?;

        Ok(Server {
            listener,
            router,
            local_addr,
            service_name,
        })
    }
}

/// A bound, not yet serving, HTTP server.
pub struct Server {
    listener: TcpListener,
    router: Router,
    local_addr: SocketAddr,
    service_name: String,
}

impl Server {
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// URL reported in the startup message.
    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.local_addr.port())
    }

    /// Startup log line naming the service and its URL.
    pub fn startup_message(&self) -> String {
        startup_message(&self.service_name, &self.url())
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    ///
    /// # Errors
    /// Returns `BootstrapError::Serve` if the accept loop fails.
    pub async fn run<F>(self, shutdown: F) -> Result<(), BootstrapError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(BootstrapError::Serve)?;
        info!("Server stopped");
        Ok(())
    }
}

/// Format the startup log line.
pub fn startup_message(service_name: &str, url: &str) -> String {
    format!("{service_name} is running on: {url}")
}

#[cfg(test)]
mod tests {
    use axum::routing::get;

    use super::*;

    struct StaticModule;

    impl Module for StaticModule {
        async fn build(self, _config: Arc<Config>) -> anyhow::Result<VersionedRoutes> {
            Ok(VersionedRoutes::new().route("/ping", get(|| async { "pong" })))
        }
    }

    struct FailingModule;

    impl Module for FailingModule {
        async fn build(self, _config: Arc<Config>) -> anyhow::Result<VersionedRoutes> {
            anyhow::bail!("database unreachable")
        }
    }

    struct DuplicateModule;

    impl Module for DuplicateModule {
        async fn build(self, _config: Arc<Config>) -> anyhow::Result<VersionedRoutes> {
            Ok(VersionedRoutes::new()
                .route("/ping", get(|| async { "a" }))
                .route("/ping", get(|| async { "b" })))
        }
    }

    #[test]
    fn startup_message_names_service_and_port() {
        let msg = startup_message("demo", "http://localhost:3000");
        assert_eq!(msg, "demo is running on: http://localhost:3000");
    }

    #[tokio::test]
    async fn config_accessor_exposes_settings() {
        let app = Application::create(StaticModule, Config::new(3000, "demo"))
            .await
            .unwrap();
        assert_eq!(app.config().port, 3000);
        assert_eq!(app.config().service_name, "demo");
    }

    #[tokio::test]
    async fn module_failure_aborts_creation() {
        let err = Application::create(FailingModule, Config::new(3000, "demo"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BootstrapError::Module(_)));
        assert!(err.to_string().contains("database unreachable"));
    }

    #[tokio::test]
    async fn duplicate_routes_fail_before_binding() {
        let app = Application::create(DuplicateModule, Config::new(0, "demo"))
            .await
            .unwrap();
        let err = app.listen(0, "127.0.0.1").await.err().unwrap();
        assert!(matches!(err, BootstrapError::Routes(RouteError::Duplicate(_))));
    }

    #[tokio::test]
    async fn unmatched_routes_render_json_not_found() {
        use axum::body::Body;
        use tower::ServiceExt;

        let mut app = Application::create(StaticModule, Config::new(0, "demo"))
            .await
            .unwrap();
        app.use_global_validation(ValidationPolicy::default());
        app.enable_versioning(VersioningOptions::uri().with_default_version("1"));
        let router = app.into_router().unwrap();

        for uri in ["/missing", "/v1/missing"] {
            let response = router
                .clone()
                .oneshot(http::Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), http::StatusCode::NOT_FOUND, "{uri}");
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["statusCode"], 404, "{uri}");
            assert_eq!(body["error"], "Not Found");
        }

        let response = router
            .oneshot(http::Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
    }

    #[tokio::test]
    async fn listen_binds_and_reports_url() {
        let app = Application::create(StaticModule, Config::new(0, "demo"))
            .await
            .unwrap();
        let server = app.listen(0, "127.0.0.1").await.unwrap();
        let port = server.local_addr().port();
        assert_ne!(port, 0);
        assert_eq!(server.url(), format!("http://localhost:{port}"));
        assert!(server.startup_message().starts_with("demo is running on: "));
    }

    #[tokio::test]
    async fn second_listener_on_same_port_fails() {
        let first = Application::create(StaticModule, Config::new(0, "demo"))
            .await
            .unwrap()
            .listen(0, "127.0.0.1")
            .await
            .unwrap();
        let port = first.local_addr().port();

        let err = Application::create(StaticModule, Config::new(port, "demo"))
            .await
            .unwrap()
            .listen(port, "127.0.0.1")
            .await
            .err()
            .unwrap();
        match err {
            BootstrapError::Bind { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::AddrInUse);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
