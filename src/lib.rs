//! HTTP service bootstrap: configuration, global validation, and URI versioning.

pub mod application;
pub mod config;
pub mod middleware;
pub mod module;
pub mod startup;
pub mod versioning;

pub use application::{Application, BootstrapError, Server};
pub use bootstrap_core::{AppError, AppResult, ValidatedJson, ValidatedQuery, ValidationPolicy};
pub use config::Config;
pub use module::{AppModule, Module};
pub use versioning::{RouteVersion, VersionedRoutes, VersioningOptions};
