//! Error types for the Domain Directory

use thiserror::Error;

use crate::types::DomainStatus;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("{field} '{value}' is already in use")]
    Conflict { field: &'static str, value: String },

    #[error("Invalid {field}: {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },

    #[error("Cannot move domain from {from} to {to}")]
    InvalidTransition { from: DomainStatus, to: DomainStatus },

    #[error("Directory storage unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl DirectoryError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }

    /// True for failures of the storage layer itself rather than of the request
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_))
    }
}

impl From<sqlx::Error> for DirectoryError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = ?err, "Directory storage error");
        match err {
            sqlx::Error::RowNotFound => DirectoryError::NotFound { entity: "record" },
            other => DirectoryError::UpstreamUnavailable(other.to_string()),
        }
    }
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;
