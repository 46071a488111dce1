//! Sensorlog Core Types
//!
//! This crate provides the fundamental types shared by the sensorlog crates:
//! - Device samples and their scalar field values
//! - The record encoder that turns samples into CSV rows
//! - Session identity, status and version fencing
//! - Core error types

pub mod encoder;
pub mod error;
pub mod sample;
pub mod session;

pub use encoder::{DEVICE_ID_COLUMN, Row, SERVER_TIME_COLUMN, encode_row, format_timestamp};
pub use error::{Error, Result};
pub use sample::{FieldValue, Sample, validate_device_id};
pub use session::{SessionEpoch, SessionId, SessionStatus};
