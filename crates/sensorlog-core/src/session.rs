//! Session identity, status and version fencing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Session identifier, derived from the session start instant
///
/// Format: `YYYYMMDD_HHMMSS_ffffff` in UTC. Safe to use as a directory or
/// file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Derive an ID from a start instant
    pub fn from_start_time(started_at: &DateTime<Utc>) -> Self {
        SessionId(started_at.format("%Y%m%d_%H%M%S_%6f").to_string())
    }

    /// Derive an ID that sorts after `previous`
    ///
    /// A start that is not later than `previous`, either on the same
    /// microsecond or because the wall clock stepped backwards, keeps the
    /// timestamp of `previous` and bumps its numeric suffix.
    pub fn next_after(started_at: &DateTime<Utc>, previous: Option<&SessionId>) -> Self {
        let base = Self::from_start_time(started_at);
        let Some(previous) = previous else {
            return base;
        };

        let (previous_base, suffix) = previous.split_suffix();
        if base.0.as_str() > previous_base {
            return base;
        }
        SessionId(format!("{}-{}", previous_base, suffix + 1))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Timestamp part and collision suffix (0 when absent)
    fn split_suffix(&self) -> (&str, u32) {
        match self.0.split_once('-') {
            Some((base, n)) => (base, n.parse().unwrap_or(0)),
            None => (&self.0, 0),
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Recording status of the session controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Recording,
}

impl SessionStatus {
    pub fn is_recording(&self) -> bool {
        matches!(self, SessionStatus::Recording)
    }
}

/// Live session version shared between the controller and its device streams
///
/// Each recording period gets a fresh, never-reused version. Streams remember
/// the version they were created under and compare it against the live value
/// right before writing; zero means no session is live.
#[derive(Debug, Default)]
pub struct SessionEpoch {
    live: AtomicU64,
}

impl SessionEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `version` as the live session
    pub fn open(&self, version: u64) {
        debug_assert!(version != 0, "version 0 is reserved for idle");
        self.live.store(version, Ordering::SeqCst);
    }

    /// Mark that no session is live
    pub fn close(&self) {
        self.live.store(0, Ordering::SeqCst);
    }

    /// Whether `version` is the live session
    pub fn is_current(&self, version: u64) -> bool {
        version != 0 && self.live.load(Ordering::SeqCst) == version
    }
}
