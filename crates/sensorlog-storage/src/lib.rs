//! Sensorlog Storage
//!
//! This crate provides the on-disk side of a recording session:
//! - Per-device append-only CSV logs (device streams)
//! - Session archiving into a single deflate-compressed ZIP
//! - Atomic file persistence for finished archives

pub mod archive;
pub mod atomic_writer;
pub mod device_stream;
pub mod error;

pub use archive::{Archiver, EMPTY_SESSION_ENTRY, SessionArchive};
pub use atomic_writer::AtomicWriter;
pub use device_stream::{DeviceStream, SealedStream};
pub use error::{StorageError, StorageResult};
