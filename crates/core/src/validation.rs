//! Request validation.
//!
//! Payload types declare their schema with `validator` derive attributes:
//!
//! ```ignore
//! #[derive(Deserialize, Validate)]
//! struct CreateUser {
//!     #[validate(email)]
//!     email: String,
//!     #[validate(length(min = 1, max = 255))]
//!     display_name: String,
//! }
//!
//! async fn create(ValidatedJson(body): ValidatedJson<CreateUser>) -> impl IntoResponse { ... }
//! ```
//!
//! The extractors always deserialize into the declared type. Schema checks
//! run only when a [`ValidationPolicy`] is present in the request extensions,
//! which is how a policy is installed globally for every route.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use http::StatusCode;
use http::request::Parts;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::error::{AppError, FieldViolation};

/// Global input-validation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// Status returned for payloads that fail validation.
    pub error_status: StatusCode,
    /// Omit per-field violations from rejection bodies.
    pub disable_error_messages: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            error_status: StatusCode::BAD_REQUEST,
            disable_error_messages: false,
        }
    }
}

impl ValidationPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_error_status(mut self, status: StatusCode) -> Self {
        self.error_status = status;
        self
    }

    #[must_use]
    pub fn without_error_messages(mut self) -> Self {
        self.disable_error_messages = true;
        self
    }

    /// Run the schema checks declared on `value`.
    ///
    /// # Errors
    /// Returns `AppError::Validation` listing every failed field.
    pub fn check<T: Validate>(&self, value: &T) -> Result<(), AppError> {
        value.validate().map_err(|e| self.reject(violations(&e)))
    }

    fn reject(&self, violations: Vec<FieldViolation>) -> AppError {
        AppError::Validation {
            status: self.error_status,
            violations: if self.disable_error_messages {
                Vec::new()
            } else {
                violations
            },
        }
    }

    fn reject_json(&self, rejection: JsonRejection) -> AppError {
        match rejection {
            JsonRejection::JsonDataError(e) => {
                self.reject(vec![FieldViolation::new("body", e.body_text())])
            }
            other => other.into(),
        }
    }

    fn reject_query(&self, rejection: QueryRejection) -> AppError {
        match rejection {
            QueryRejection::FailedToDeserializeQueryString(e) => {
                self.reject(vec![FieldViolation::new("query", e.body_text())])
            }
            other => other.into(),
        }
    }
}

/// Flatten `validator` errors into sorted, dotted field paths.
#[must_use]
pub fn violations(errors: &ValidationErrors) -> Vec<FieldViolation> {
    let mut out = Vec::new();
    collect("", errors, &mut out);
    out.sort_by(|a, b| a.field.cmp(&b.field).then_with(|| a.message.cmp(&b.message)));
    out
}

fn collect(prefix: &str, errors: &ValidationErrors, out: &mut Vec<FieldViolation>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };

        match kind {
            ValidationErrorsKind::Field(errs) => {
                out.extend(errs.iter().map(|e| FieldViolation::new(&path, describe(e))));
            }
            ValidationErrorsKind::Struct(inner) => collect(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    collect(&format!("{path}[{idx}]"), inner, out);
                }
            }
        }
    }
}

fn describe(error: &ValidationError) -> String {
    error.message.as_ref().map_or_else(
        || format!("failed `{}` check", error.code),
        ToString::to_string,
    )
}

/// JSON body extractor that applies the installed [`ValidationPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let policy = req.extensions().get::<ValidationPolicy>().copied();

        let value = match (Json::<T>::from_request(req, state).await, policy) {
            (Ok(Json(value)), _) => value,
            (Err(rejection), Some(policy)) => return Err(policy.reject_json(rejection)),
            (Err(rejection), None) => return Err(rejection.into()),
        };

        if let Some(policy) = policy {
            policy.check(&value)?;
        }
        Ok(Self(value))
    }
}

/// Query string extractor that applies the installed [`ValidationPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let policy = parts.extensions.get::<ValidationPolicy>().copied();

        let value = match (Query::<T>::from_request_parts(parts, state).await, policy) {
            (Ok(Query(value)), _) => value,
            (Err(rejection), Some(policy)) => return Err(policy.reject_query(rejection)),
            (Err(rejection), None) => return Err(rejection.into()),
        };

        if let Some(policy) = policy {
            policy.check(&value)?;
        }
        Ok(Self(value))
    }
}
