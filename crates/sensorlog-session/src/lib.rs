//! Sensorlog Session Recording
//!
//! This crate provides the recording session lifecycle:
//! - Session controller (idle/recording state machine)
//! - Per-session device registry
//! - The recorder facade used by the HTTP boundary

pub mod config;
pub mod controller;
pub mod recorder;
pub mod registry;

pub use config::RecordingConfig;
pub use controller::{
    ActiveSession, FinishedSession, SessionController, StartOutcome, StatusSnapshot,
};
pub use recorder::{
    DropReason, IngestOutcome, SessionRecorder, SessionStarted, SessionStopped, StatusReport,
};
pub use registry::{DeviceSummary, SessionRegistry};
