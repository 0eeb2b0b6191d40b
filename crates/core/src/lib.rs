//! Core library with shared HTTP error handling and request validation.
//!
//! - Error types rendered as JSON responses with matching status codes
//! - A global validation policy and the extractors that honour it

pub mod error;
pub mod validation;

pub use error::{AppError, AppResult, ErrorBody, FieldViolation};
pub use validation::{ValidatedJson, ValidatedQuery, ValidationPolicy, violations};
