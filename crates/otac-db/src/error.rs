//! Database-specific error types and conversions.

use otac_core::error::OtacError;

/// Message prefixes carried by `THROW` in guarded mutations. A failed
/// statement is classified back into a typed error by its prefix.
pub(crate) const THROW_CONFLICT: &str = "otac-conflict: ";
pub(crate) const THROW_NOT_FOUND: &str = "otac-not-found: ";
pub(crate) const THROW_BAD_REQUEST: &str = "otac-bad-request: ";
pub(crate) const THROW_UNPROCESSABLE: &str = "otac-unprocessable: ";

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),
}

impl DbError {
    /// Classify a failed statement. Guard failures raised with one of the
    /// `THROW_*` prefixes become typed errors; anything else is a query
    /// failure.
    pub(crate) fn from_statement(err: surrealdb::Error) -> Self {
        let text = err.to_string();
        if let Some(message) = after_marker(&text, THROW_CONFLICT) {
            return Self::Conflict(message);
        }
        if let Some(message) = after_marker(&text, THROW_NOT_FOUND) {
            // "<entity> <id>"
            let (entity, id) = message.split_once(' ').unwrap_or(("record", &message));
            return Self::NotFound {
                entity: entity.to_owned(),
                id: id.to_owned(),
            };
        }
        if let Some(message) = after_marker(&text, THROW_BAD_REQUEST) {
            return Self::BadRequest(message);
        }
        if let Some(message) = after_marker(&text, THROW_UNPROCESSABLE) {
            return Self::Unprocessable(message);
        }
        Self::Query(text)
    }
}

fn after_marker(text: &str, marker: &str) -> Option<String> {
    text.find(marker)
        .map(|at| text[at + marker.len()..].trim_end_matches(['"', '\'']).to_owned())
}

impl From<DbError> for OtacError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => OtacError::NotFound { entity, id },
            DbError::Conflict(message) => OtacError::Conflict { message },
            DbError::BadRequest(message) => OtacError::BadRequest { message },
            DbError::Unprocessable(message) => OtacError::Unprocessable { message },
            other => OtacError::Database(other.to_string()),
        }
    }
}
