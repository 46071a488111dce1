//! Per-device append-only CSV log
//!
//! A `DeviceStream` owns the log of one device within one session. The
//! schema is provisional until the first batch is committed: until then
//! each batch brings its own schema, so a first batch that fails on disk
//! does not pin its columns. Once a batch is committed the schema is fixed
//! and every later batch is validated against it before anything touches
//! disk. A batch is written with a single `write_all` + `sync_data` so it
//! is either fully durable or rolled back by truncating to the previous
//! length.
//!
//! The stream also carries the version of the session that created it. The
//! version is checked against the live [`SessionEpoch`] under the stream lock
//! right before the write, and the archiver takes the same lock when it
//! seals the stream, so a batch never straddles a session stop.

use crate::error::{StorageError, StorageResult};
use chrono::Utc;
use sensorlog_core::{Row, Sample, SessionEpoch, encode_row};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Append-only log for one device in one session
pub struct DeviceStream {
    device_id: String,
    path: PathBuf,
    version: u64,
    epoch: Arc<SessionEpoch>,
    rows: AtomicU64,
    log: Mutex<StreamLog>,
}

/// Mutable log state, guarded by the stream lock
#[derive(Default)]
struct StreamLog {
    schema: Vec<String>,
    columns: HashSet<String>,
    /// Opened lazily on the first accepted batch
    file: Option<File>,
    /// Committed length in bytes, used to roll back failed writes
    committed_len: u64,
    sealed: bool,
}

/// A stream that has been closed for writing and handed to the archiver
#[derive(Debug, Clone)]
pub struct SealedStream {
    pub device_id: String,
    pub path: PathBuf,
    pub row_count: u64,
}

impl DeviceStream {
    /// Create a stream; nothing is written to disk until the first append
    pub fn new(
        device_id: impl Into<String>,
        schema: Vec<String>,
        path: impl Into<PathBuf>,
        version: u64,
        epoch: Arc<SessionEpoch>,
    ) -> Self {
        let mut log = StreamLog::default();
        log.set_schema(schema);
        Self {
            device_id: device_id.into(),
            path: path.into(),
            version,
            epoch,
            rows: AtomicU64::new(0),
            log: Mutex::new(log),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Current column order, fixed once the first batch is committed
    pub fn schema(&self) -> Vec<String> {
        self.lock().schema.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Version of the session this stream was created under
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Rows durably written so far
    pub fn row_count(&self) -> u64 {
        self.rows.load(Ordering::SeqCst)
    }

    /// Append a batch of samples, returning the number of rows written
    ///
    /// All-or-nothing: a schema mismatch writes nothing, and a failed disk
    /// write is rolled back before the error is returned. Until a batch has
    /// been committed the stream adopts the schema of the incoming batch.
    pub fn append(&self, samples: &[Sample]) -> StorageResult<usize> {
        let mut guard = self.lock();
        let log = &mut *guard;

        if log.sealed || !self.epoch.is_current(self.version) {
            return Err(StorageError::StreamRetired {
                device_id: self.device_id.clone(),
            });
        }

        if samples.is_empty() {
            return Ok(0);
        }

        if log.committed_len == 0 {
            log.set_schema(Sample::candidate_schema(samples));
        } else {
            log.check_schema(&self.device_id, samples)?;
        }

        let received_at = Utc::now();
        let mut buf = Vec::new();
        {
            let mut writer = csv::WriterBuilder::new()
                .terminator(csv::Terminator::Any(b'\n'))
                .from_writer(&mut buf);

            if log.committed_len == 0 {
                writer.write_record(Row::header(&log.schema).cells())?;
            }
            for sample in samples {
                let row = encode_row(&received_at, &self.device_id, &log.schema, sample);
                writer.write_record(row.cells())?;
            }
            writer.flush()?;
        }

        let committed_len = log.committed_len;
        let file = match log.file.take() {
            Some(file) => file,
            None => self.open_log()?,
        };
        let file = log.file.insert(file);

        if let Err(e) = file.write_all(&buf).and_then(|_| file.sync_data()) {
            if let Err(rollback) = file.set_len(committed_len) {
                tracing::error!(
                    device_id = %self.device_id,
                    path = %self.path.display(),
                    error = %rollback,
                    "Failed to roll back partial batch"
                );
            }
            return Err(e.into());
        }

        log.committed_len += buf.len() as u64;
        self.rows.fetch_add(samples.len() as u64, Ordering::SeqCst);

        tracing::trace!(
            device_id = %self.device_id,
            rows = samples.len(),
            "Appended batch"
        );

        Ok(samples.len())
    }

    /// Close the stream for writing
    ///
    /// Waits for an in-flight append to finish, syncs and closes the file.
    /// Later appends fail with [`StorageError::StreamRetired`].
    pub fn seal(&self) -> SealedStream {
        let mut log = self.lock();
        log.sealed = true;

        if let Some(file) = log.file.take()
            && let Err(e) = file.sync_all()
        {
            tracing::warn!(
                device_id = %self.device_id,
                error = %e,
                "Failed to sync device log while sealing"
            );
        }

        SealedStream {
            device_id: self.device_id.clone(),
            path: self.path.clone(),
            row_count: self.row_count(),
        }
    }

    fn open_log(&self) -> StorageResult<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Session IDs are never reused, so an existing file means a collision
        let file = OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(&self.path)?;

        tracing::debug!(
            device_id = %self.device_id,
            path = %self.path.display(),
            "Opened device log"
        );

        Ok(file)
    }

    fn lock(&self) -> MutexGuard<'_, StreamLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StreamLog {
    fn set_schema(&mut self, schema: Vec<String>) {
        self.columns = schema.iter().cloned().collect();
        self.schema = schema;
    }

    /// Check that every sample only uses columns from the schema
    fn check_schema(&self, device_id: &str, samples: &[Sample]) -> StorageResult<()> {
        let mut unexpected: Vec<String> = samples
            .iter()
            .flat_map(|s| s.field_names())
            .filter(|name| !self.columns.contains(*name))
            .map(str::to_string)
            .collect();

        if unexpected.is_empty() {
            return Ok(());
        }

        unexpected.sort();
        unexpected.dedup();
        Err(StorageError::SchemaMismatch {
            device_id: device_id.to_string(),
            unexpected,
        })
    }
}

impl std::fmt::Debug for DeviceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStream")
            .field("device_id", &self.device_id)
            .field("path", &self.path)
            .field("version", &self.version)
            .field("rows", &self.row_count())
            .finish()
    }
}
