//! Cross-cutting HTTP middleware.
//!
//! # Middleware Order
//! Request flows top to bottom through the stack built in [`apply`]:
//! 1. `TraceLayer` - request span
//! 2. `TimeoutLayer` - request timeout
//! 3. `CorsLayer` - CORS handling
//!
//! `MetricsLayer` is not part of this stack. It wraps each route through
//! [`VersionedRoutes::layer`](crate::versioning::VersionedRoutes::layer) so it
//! runs after routing and labels by the matched template.

pub mod metrics;

use std::time::Duration;

use axum::Router;
use http::{Request, StatusCode};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::Config;

pub use metrics::MetricsLayer;

/// Wrap every route of `router` in the middleware stack.
pub fn apply(router: Router, config: &Config) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<_>| {
                    tracing::info_span!(
                        "request",
                        method = %req.method(),
                        uri = %req.uri(),
                    )
                })
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout(),
        ))
        .layer(build_cors(config.cors_allow_origins.as_deref()));

    router.layer(middleware)
}

/// CORS from a comma-separated origin list; `None` or `*` allows any origin.
fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = match origins {
        Some(o) if o.trim() != "*" => {
            let origins: Vec<_> = o.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            CorsLayer::new().allow_origin(origins)
        }
        _ => CorsLayer::permissive(),
    };

    cors.allow_headers(Any)
        .allow_methods(Any)
        .max_age(Duration::from_secs(3600))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::routing::get;
    use http::header;
    use tower::ServiceExt;

    use super::*;

    async fn preflight(router: Router, origin: &str) -> Option<String> {
        let response = router
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/ping")
                    .header(header::ORIGIN, origin)
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    fn ping_router(cors_allow_origins: Option<&str>) -> Router {
        let mut config = Config::new(0, "demo");
        config.cors_allow_origins = cors_allow_origins.map(str::to_string);
        apply(Router::new().route("/ping", get(|| async { "pong" })), &config)
    }

    #[tokio::test]
    async fn default_cors_allows_any_origin() {
        let allowed = preflight(ping_router(None), "https://example.com").await;
        assert_eq!(allowed.as_deref(), Some("*"));
    }

    #[tokio::test]
    async fn configured_origins_are_enforced() {
        let router = ping_router(Some("https://app.example.com, https://admin.example.com"));
        let allowed = preflight(router.clone(), "https://admin.example.com").await;
        assert_eq!(allowed.as_deref(), Some("https://admin.example.com"));
        assert!(preflight(router, "https://evil.example.com").await.is_none());
    }

    #[tokio::test]
    async fn stack_passes_requests_through() {
        let response = ping_router(None)
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
