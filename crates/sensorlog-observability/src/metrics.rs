//! Metrics collection with Prometheus
//!
//! This module provides Prometheus metrics for sensorlog:
//! - Session lifecycle counters and a recording gauge
//! - Ingest batch counts by outcome
//! - Rows written per device
//! - Ingest latency and archive size histograms

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Outcome label for an ingest call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Stored,
    /// Well-formed batch received while no session was recording
    Dropped,
    SchemaMismatch,
    InvalidPayload,
    StorageError,
}

impl BatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchOutcome::Stored => "stored",
            BatchOutcome::Dropped => "dropped",
            BatchOutcome::SchemaMismatch => "schema_mismatch",
            BatchOutcome::InvalidPayload => "invalid_payload",
            BatchOutcome::StorageError => "storage_error",
        }
    }
}

/// Metrics collector for sensorlog
#[derive(Clone)]
pub struct Metrics {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Sessions started (idempotent starts are not counted)
    pub sessions_started: IntCounter,
    /// Sessions stopped and archived
    pub sessions_stopped: IntCounter,
    /// 1 while a session is recording
    pub recording: IntGauge,

    /// Ingest calls by outcome
    pub batches_total: IntCounterVec,
    /// Rows durably written across all devices
    ///
    /// Not labelled by device: device IDs are client-chosen and unbounded.
    pub rows_written: IntCounter,
    /// Time spent in one ingest call
    pub ingest_duration_seconds: Histogram,

    /// Size of produced session archives
    pub archive_size_bytes: Histogram,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let sessions_started = IntCounter::with_opts(Opts::new(
            "sensorlog_sessions_started_total",
            "Total number of recording sessions started",
        ))?;

        let sessions_stopped = IntCounter::with_opts(Opts::new(
            "sensorlog_sessions_stopped_total",
            "Total number of recording sessions stopped and archived",
        ))?;

        let recording = IntGauge::with_opts(Opts::new(
            "sensorlog_recording",
            "Whether a recording session is active (0/1)",
        ))?;

        let batches_total = IntCounterVec::new(
            Opts::new("sensorlog_batches_total", "Ingest batches by outcome"),
            &["outcome"],
        )?;

        let rows_written = IntCounter::with_opts(Opts::new(
            "sensorlog_rows_written_total",
            "Rows written to device logs",
        ))?;

        let ingest_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "sensorlog_ingest_duration_seconds",
                "Ingest call duration in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25]),
        )?;

        let archive_size_bytes = Histogram::with_opts(
            HistogramOpts::new(
                "sensorlog_archive_size_bytes",
                "Size of session archives in bytes",
            )
            .buckets(prometheus::exponential_buckets(1024.0, 4.0, 10)?),
        )?;

        registry.register(Box::new(sessions_started.clone()))?;
        registry.register(Box::new(sessions_stopped.clone()))?;
        registry.register(Box::new(recording.clone()))?;
        registry.register(Box::new(batches_total.clone()))?;
        registry.register(Box::new(rows_written.clone()))?;
        registry.register(Box::new(ingest_duration_seconds.clone()))?;
        registry.register(Box::new(archive_size_bytes.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            sessions_started,
            sessions_stopped,
            recording,
            batches_total,
            rows_written,
            ingest_duration_seconds,
            archive_size_bytes,
        })
    }

    /// Get the Prometheus registry for exporting metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a session start; repeated starts of a running session are ignored
    pub fn record_session_started(&self, already_running: bool) {
        if !already_running {
            self.sessions_started.inc();
        }
        self.recording.set(1);
    }

    /// Record a session stop and the archive it produced
    pub fn record_session_stopped(&self, archive_bytes: usize) {
        self.sessions_stopped.inc();
        self.recording.set(0);
        self.archive_size_bytes.observe(archive_bytes as f64);
    }

    /// Record one ingest call
    pub fn record_batch(&self, outcome: BatchOutcome, rows: usize, duration_secs: f64) {
        self.batches_total
            .with_label_values(&[outcome.as_str()])
            .inc();
        self.rows_written.inc_by(rows as u64);
        self.ingest_duration_seconds.observe(duration_secs);
    }
}
