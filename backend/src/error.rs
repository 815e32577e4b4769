//! API-facing error kinds
//!
//! The five error kinds the admission service surfaces, each with a short
//! human-readable detail. Nothing recovers these internally; the embedding
//! HTTP layer maps them straight to status codes via `http_status`.

use thiserror::Error;

/// Service-level error, mapped 1:1 onto an HTTP status
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    /// A referenced entity is absent (404)
    #[error("{0}")]
    NotFound(String),

    /// The principal is unknown (401)
    #[error("{0}")]
    Unauthorized(String),

    /// The principal is not a member of the owning organization (403)
    #[error("{0}")]
    Forbidden(String),

    /// Schema violation, cross-cluster or self dependency, cycle (400)
    #[error("{0}")]
    Validation(String),

    /// Lifecycle refusal: start on non-pending, stop on non-running,
    /// insufficient resources, incomplete dependencies (400)
    #[error("{0}")]
    StateConflict(String),
}

impl ApiError {
    /// HTTP status code for this error kind
    pub fn http_status(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::Validation(_) => 400,
            ApiError::StateConflict(_) => 400,
        }
    }
}
