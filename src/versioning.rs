//! URI-based API versioning.
//!
//! Routes declare a [`RouteVersion`]. With versioning enabled, a route for
//! version `1` registered at `/users` is mounted at `/v1/users`. Requests
//! whose first segment is not a known version segment fall back to the
//! default version. Requests that match nothing get a JSON 404.

use std::collections::HashSet;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::Router;
use axum::extract::OriginalUri;
use axum::response::IntoResponse;
use axum::routing::{MethodRouter, Route, any};
use bootstrap_core::AppError;
use http::uri::PathAndQuery;
use http::{Request, Uri};
use tower::{Layer, Service};

/// Default URI segment prefix (`/v1/...`).
pub const DEFAULT_PREFIX: &str = "v";

/// API version identifier, e.g. `"1"` or `"2"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiVersion(Arc<str>);

impl ApiVersion {
    /// Parse a version identifier.
    ///
    /// # Errors
    /// Returns `RouteError::InvalidVersion` for empty identifiers or ones containing `/`.
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let raw = raw.trim();
        if raw.is_empty() || raw.contains('/') {
            return Err(RouteError::InvalidVersion(raw.to_string()));
        }
        Ok(Self(raw.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Version declaration attached to a route.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RouteVersion {
    /// No declaration: served under the default version.
    #[default]
    Default,
    /// Served under each listed version.
    Only(Vec<String>),
    /// Served without a version segment.
    Neutral,
}

impl RouteVersion {
    pub fn of(version: impl Into<String>) -> Self {
        Self::Only(vec![version.into()])
    }

    pub fn any_of<I, V>(versions: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self::Only(versions.into_iter().map(Into::into).collect())
    }
}

/// Route table errors, surfaced as module-construction failures.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("Invalid API version: {0:?}")]
    InvalidVersion(String),
    #[error("Route path must start with '/': {0:?}")]
    InvalidPath(String),
    #[error("Route registered twice: {0}")]
    Duplicate(String),
}

/// Versioning options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersioningOptions {
    prefix: String,
    default_version: Option<String>,
}

impl VersioningOptions {
    /// URI versioning with the `v` prefix and no default version.
    #[must_use]
    pub fn uri() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            default_version: None,
        }
    }

    #[must_use]
    pub fn with_default_version(mut self, version: impl Into<String>) -> Self {
        self.default_version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn default_version(&self) -> Option<&str> {
        self.default_version.as_deref()
    }

    fn segment(&self, version: &ApiVersion) -> String {
        format!("{}{version}", self.prefix)
    }

    fn mount(&self, version: &ApiVersion, path: &str) -> String {
        if path == "/" {
            format!("/{}", self.segment(version))
        } else {
            format!("/{}{path}", self.segment(version))
        }
    }
}

struct Entry<S> {
    version: RouteVersion,
    path: String,
    handler: MethodRouter<S>,
}

/// Route table contributed by a module.
///
/// Register every method of a path in one call; registering the same
/// mounted path twice is an error.
pub struct VersionedRoutes<S = ()> {
    entries: Vec<Entry<S>>,
    fallback: MethodRouter<S>,
}

impl<S> Default for VersionedRoutes<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            fallback: any(route_not_found),
        }
    }
}

impl<S> fmt::Debug for VersionedRoutes<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (&e.version, &e.path)))
            .finish()
    }
}

impl<S> VersionedRoutes<S>
where
    S: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route under the default version.
    #[must_use]
    pub fn route(self, path: &str, handler: MethodRouter<S>) -> Self {
        self.route_versioned(RouteVersion::Default, path, handler)
    }

    /// Register a version-neutral route.
    #[must_use]
    pub fn neutral(self, path: &str, handler: MethodRouter<S>) -> Self {
        self.route_versioned(RouteVersion::Neutral, path, handler)
    }

    #[must_use]
    pub fn route_versioned(
        mut self,
        version: RouteVersion,
        path: &str,
        handler: MethodRouter<S>,
    ) -> Self {
        self.entries.push(Entry {
            version,
            path: path.to_string(),
            handler,
        });
        self
    }

    /// Append another module's routes.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.entries.extend(other.entries);
        self
    }

    /// Wrap every route and the not-found fallback in `layer`.
    ///
    /// The layer runs after routing, so [`axum::extract::MatchedPath`] holds
    /// the mounted template even for requests moved to the default version.
    #[must_use]
    pub fn layer<L>(self, layer: L) -> Self
    where
        L: Layer<Route> + Clone + Send + Sync + 'static,
        L::Service: Service<axum::extract::Request> + Clone + Send + Sync + 'static,
        <L::Service as Service<axum::extract::Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<axum::extract::Request>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<axum::extract::Request>>::Future: Send + 'static,
    {
        Self {
            entries: self
                .entries
                .into_iter()
                .map(|e| Entry {
                    version: e.version,
                    path: e.path,
                    handler: e.handler.layer(layer.clone()),
                })
                .collect(),
            fallback: self.fallback.layer(layer),
        }
    }

    /// Provide the state, producing a stateless table.
    pub fn with_state<S2>(self, state: S) -> VersionedRoutes<S2> {
        VersionedRoutes {
            entries: self
                .entries
                .into_iter()
                .map(|e| Entry {
                    version: e.version,
                    path: e.path,
                    handler: e.handler.with_state(state.clone()),
                })
                .collect(),
            fallback: self.fallback.with_state(state),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl VersionedRoutes<()> {
    /// Mount every route, versioned per `options` (or bare when `None`).
    ///
    /// # Errors
    /// Returns `RouteError` for malformed paths or versions and duplicate mounts.
    pub fn into_router(self, options: Option<&VersioningOptions>) -> Result<Router, RouteError> {
        let default = options
            .and_then(VersioningOptions::default_version)
            .map(ApiVersion::parse)
            .transpose()?;

        let mut seen = HashSet::new();
        let mut versions = HashSet::new();
        let mut neutral = Router::new();
        let mut versioned = Router::new();

        for entry in self.entries {
            if !entry.path.starts_with('/') {
                return Err(RouteError::InvalidPath(entry.path));
            }

            let mounts: Vec<Option<ApiVersion>> = match (options, &entry.version) {
                (None, _) | (Some(_), RouteVersion::Neutral) => vec![None],
                (Some(_), RouteVersion::Default) => vec![default.clone()],
                (Some(_), RouteVersion::Only(list)) => list
                    .iter()
                    .map(|v| ApiVersion::parse(v).map(Some))
                    .collect::<Result<_, _>>()?,
            };

            for version in mounts {
                let path = match (&version, options) {
                    (Some(v), Some(opts)) => opts.mount(v, &entry.path),
                    _ => entry.path.clone(),
                };
                if !seen.insert(path.clone()) {
                    return Err(RouteError::Duplicate(path));
                }
                match (version, options) {
                    (Some(v), Some(opts)) => {
                        versions.insert(opts.segment(&v));
                        versioned = versioned.route(&path, entry.handler.clone());
                    }
                    _ => neutral = neutral.route(&path, entry.handler.clone()),
                }
            }
        }

        let router = neutral.merge(versioned.clone());
        match (default, options) {
            (Some(default), Some(opts)) => Ok(router.fallback_service(DefaultVersion {
                inner: versioned.fallback(self.fallback),
                segment: opts.segment(&default).into(),
                known: Arc::new(versions),
            })),
            _ => Ok(router.fallback(self.fallback)),
        }
    }
}

/// Reports the path as the client sent it, before any default-version rewrite.
async fn route_not_found(OriginalUri(uri): OriginalUri) -> AppError {
    AppError::not_found("Route", uri.path())
}

/// Fallback that routes unversioned requests to the default version.
#[derive(Clone)]
pub struct DefaultVersion<S> {
    inner: S,
    segment: Arc<str>,
    known: Arc<HashSet<String>>,
}

impl<S> DefaultVersion<S> {
    fn rewrite(&self, uri: &Uri) -> Option<Uri> {
        let path = uri.path();
        let first = path.trim_start_matches('/').split('/').next().unwrap_or("");
        if self.known.contains(first) {
            return None;
        }

        let path = if path == "/" { "" } else { path };
        let rewritten = match uri.query() {
            Some(q) => format!("/{}{path}?{q}", self.segment),
            None => format!("/{}{path}", self.segment),
        };

        let mut parts = uri.clone().into_parts();
        parts.path_and_query = Some(PathAndQuery::try_from(rewritten).ok()?);
        Uri::from_parts(parts).ok()
    }
}

impl<S, B> Service<Request<B>> for DefaultVersion<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        if let Some(uri) = self.rewrite(req.uri()) {
            *req.uri_mut() = uri;
        }
        self.inner.call(req)
    }
}
