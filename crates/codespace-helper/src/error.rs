//! Error taxonomy shared by the lifecycle controller and the HTTP surface.

use axum::http::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by codespace operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no codespace found for tenant {0}")]
    NotFound(String),

    #[error("an operation is already in progress for tenant {0}")]
    AlreadyInProgress(String),

    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    #[error("cluster request failed: {0}")]
    RemoteFailure(String),

    #[error("template error: {0}")]
    TemplateError(String),

    #[error("tenant {0} is in a failed state and requires operator intervention")]
    TerminalState(String),
}

/// Result type for codespace operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap a remote failure with tenant and stage context.
    pub fn remote(stage: &str, tenant: &str, err: impl std::fmt::Display) -> Self {
        Self::RemoteFailure(format!("{stage} for tenant {tenant}: {err}"))
    }

    /// HTTP status this error maps to, identical for the JSON and HTML surfaces.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyInProgress(_) => StatusCode::ALREADY_REPORTED,
            Self::TerminalState(_) => StatusCode::NOT_ACCEPTABLE,
            Self::Timeout { .. } | Self::RemoteFailure(_) | Self::TemplateError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
