//! Storage error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(
        "Schema mismatch for device '{device_id}': unexpected field(s) {}",
        unexpected.join(", ")
    )]
    SchemaMismatch {
        device_id: String,
        unexpected: Vec<String>,
    },

    /// The stream belongs to a session that is no longer live
    #[error("Stream for device '{device_id}' belongs to a retired session")]
    StreamRetired { device_id: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for sensorlog_core::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::SchemaMismatch {
                device_id,
                unexpected,
            } => sensorlog_core::Error::SchemaMismatch {
                device_id,
                unexpected,
            },
            StorageError::StreamRetired { .. } => sensorlog_core::Error::NoActiveSession,
            StorageError::Archive(e) => sensorlog_core::Error::Archive(e.to_string()),
            other => sensorlog_core::Error::Storage(other.to_string()),
        }
    }
}
