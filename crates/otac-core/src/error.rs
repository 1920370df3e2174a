//! Error types for the OTAC access-check engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OtacError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// Strict-mode creation of an existing entity, or a parent edge that
    /// would close a cycle.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// An update resolved to zero or more than one record.
    #[error("Unprocessable: {message}")]
    Unprocessable { message: String },

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OtacError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Whether the caller can fix the failure by changing the request.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Database(_) | Self::Internal(_))
    }
}

pub type OtacResult<T> = Result<T, OtacError>;
