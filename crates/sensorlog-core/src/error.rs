//! Error types for Sensorlog Core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("No active recording session")]
    NoActiveSession,

    #[error(
        "Schema mismatch for device '{device_id}': unexpected field(s) {}",
        unexpected.join(", ")
    )]
    SchemaMismatch {
        device_id: String,
        unexpected: Vec<String>,
    },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Archive error: {0}")]
    Archive(String),
}

impl Error {
    /// Stable machine-readable code, used by the HTTP boundary and metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            Error::NoActiveSession => "no_active_session",
            Error::SchemaMismatch { .. } => "schema_mismatch",
            Error::InvalidPayload(_) => "invalid_payload",
            Error::Storage(_) => "storage_error",
            Error::Archive(_) => "archive_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
