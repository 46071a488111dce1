//! Session archiving
//!
//! Bundles every device log of a finished session into one deflate ZIP,
//! then removes the loose logs so the archive is the only artifact left.

use crate::atomic_writer::AtomicWriter;
use crate::device_stream::{DeviceStream, SealedStream};
use crate::error::{StorageError, StorageResult};
use sensorlog_core::SessionId;
use std::fs;
use std::io::{Cursor, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Entry written when a session recorded no rows at all
pub const EMPTY_SESSION_ENTRY: &str = "EMPTY_SESSION.txt";

const MAX_NAME_ATTEMPTS: u32 = 100;

/// Finished archive for one session
#[derive(Debug, Clone)]
pub struct SessionArchive {
    pub session_id: SessionId,
    /// Download name, `<session_id>.zip`
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Devices included, in entry order
    pub devices: Vec<String>,
    pub total_rows: u64,
    /// Where the archive was persisted, if an archive directory is configured
    pub persisted_to: Option<PathBuf>,
}

/// Packages device streams into session archives
#[derive(Debug, Clone, Default)]
pub struct Archiver {
    archive_dir: Option<PathBuf>,
}

impl Archiver {
    /// Archiver that only returns the bytes
    pub fn new() -> Self {
        Self::default()
    }

    /// Archiver that also keeps a copy of every archive in `dir`
    pub fn with_archive_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: Some(dir.into()),
        }
    }

    /// Archive file name for a session
    pub fn file_name(session_id: &SessionId) -> String {
        format!("{}.zip", session_id)
    }

    /// Seal, bundle and clean up the streams of a finished session
    ///
    /// Streams that never wrote a row are left out. Unreadable logs and
    /// failed deletions are logged and skipped; only a failure to build the
    /// ZIP itself is an error.
    pub fn package(
        &self,
        session_id: &SessionId,
        session_dir: &Path,
        streams: &[Arc<DeviceStream>],
    ) -> StorageResult<SessionArchive> {
        let mut sealed: Vec<SealedStream> = streams.iter().map(|s| s.seal()).collect();
        sealed.sort_by(|a, b| a.device_id.cmp(&b.device_id));

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut devices = Vec::new();
        let mut total_rows = 0;

        for stream in sealed.iter().filter(|s| s.row_count > 0) {
            let contents = match fs::read(&stream.path) {
                Ok(contents) => contents,
                Err(e) => {
                    tracing::error!(
                        session_id = %session_id,
                        device_id = %stream.device_id,
                        path = %stream.path.display(),
                        error = %e,
                        "Failed to read device log, leaving it out of the archive"
                    );
                    continue;
                }
            };

            zip.start_file(format!("{}.csv", stream.device_id), options)?;
            zip.write_all(&contents)?;
            devices.push(stream.device_id.clone());
            total_rows += stream.row_count;
        }

        if devices.is_empty() {
            zip.start_file(EMPTY_SESSION_ENTRY, options)?;
            zip.write_all(empty_session_note(session_id).as_bytes())?;
        }

        let bytes = zip.finish()?.into_inner();

        let persisted_to = self.persist(session_id, &bytes);
        remove_session_files(session_id, session_dir, &sealed);

        tracing::info!(
            session_id = %session_id,
            devices = devices.len(),
            rows = total_rows,
            bytes = bytes.len(),
            "Packaged session archive"
        );

        Ok(SessionArchive {
            session_id: session_id.clone(),
            file_name: Self::file_name(session_id),
            bytes,
            devices,
            total_rows,
            persisted_to,
        })
    }

    /// Keep a copy in the archive directory without replacing older archives
    ///
    /// If `<session_id>.zip` is taken, for example after the wall clock
    /// stepped backwards across a restart, `<session_id>.1.zip`, `.2.zip` and
    /// so on are tried instead.
    fn persist(&self, session_id: &SessionId, bytes: &[u8]) -> Option<PathBuf> {
        let dir = self.archive_dir.as_ref()?;

        for attempt in 0..=MAX_NAME_ATTEMPTS {
            let name = match attempt {
                0 => Self::file_name(session_id),
                n => format!("{}.{}.zip", session_id, n),
            };
            let path = dir.join(name);

            match AtomicWriter::write_file(&path, bytes) {
                Ok(path) => return Some(path),
                Err(StorageError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::warn!(
                        session_id = %session_id,
                        path = %path.display(),
                        "Archive name already taken"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        session_id = %session_id,
                        path = %path.display(),
                        error = %e,
                        "Failed to persist session archive"
                    );
                    return None;
                }
            }
        }

        tracing::error!(
            session_id = %session_id,
            dir = %dir.display(),
            "No free archive name, archive not persisted"
        );
        None
    }
}

fn empty_session_note(session_id: &SessionId) -> String {
    format!(
        "Session {} recorded no samples: no device sent data while it was active.\n",
        session_id
    )
}

/// Delete the per-device logs and the session directory
fn remove_session_files(session_id: &SessionId, session_dir: &Path, streams: &[SealedStream]) {
    for stream in streams {
        match fs::remove_file(&stream.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                session_id = %session_id,
                path = %stream.path.display(),
                error = %e,
                "Failed to remove device log"
            ),
        }
    }

    match fs::remove_dir(session_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            session_id = %session_id,
            path = %session_dir.display(),
            error = %e,
            "Failed to remove session directory"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sensorlog_core::{Sample, SessionEpoch};
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        session_dir: PathBuf,
        session_id: SessionId,
        epoch: Arc<SessionEpoch>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path().to_path_buf();
            let session_id = SessionId::from_start_time(&Utc::now());
            let session_dir = root.join(session_id.as_str());
            let epoch = Arc::new(SessionEpoch::new());
            epoch.open(1);
            Self {
                _dir: dir,
                root,
                session_dir,
                session_id,
                epoch,
            }
        }

        fn stream(&self, device: &str, schema: &[&str]) -> Arc<DeviceStream> {
            Arc::new(DeviceStream::new(
                device,
                schema.iter().map(|s| s.to_string()).collect(),
                self.session_dir.join(format!("{}.csv", device)),
                1,
                self.epoch.clone(),
            ))
        }
    }

    fn read_entry(bytes: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entry = archive.by_name(name).unwrap();
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        contents
    }

    fn entry_names(bytes: &[u8]) -> Vec<String> {
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[test]
    fn test_package_bundles_each_device() {
        let fx = Fixture::new();
        let tof = fx.stream("tof_01", &["d", "s"]);
        let rtk = fx.stream("rtk_01", &["lat"]);

        tof.append(&[Sample::new().with("d", 1.2).with("s", 1i64)]).unwrap();
        tof.append(&[Sample::new().with("d", 1.3).with("s", 1i64)]).unwrap();
        rtk.append(&[Sample::new().with("lat", 52.1)]).unwrap();

        let archive = Archiver::new()
            .package(&fx.session_id, &fx.session_dir, &[tof, rtk])
            .unwrap();

        assert_eq!(archive.devices, vec!["rtk_01", "tof_01"]);
        assert_eq!(archive.total_rows, 3);
        assert_eq!(archive.file_name, format!("{}.zip", fx.session_id));
        assert_eq!(entry_names(&archive.bytes), vec!["rtk_01.csv", "tof_01.csv"]);

        let tof_csv = read_entry(&archive.bytes, "tof_01.csv");
        let lines: Vec<&str> = tof_csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "server_time_utc,device_id,d,s");
        assert!(lines[1].ends_with(",tof_01,1.2,1"));
        assert!(lines[2].ends_with(",tof_01,1.3,1"));
    }

    #[test]
    fn test_package_removes_session_files() {
        let fx = Fixture::new();
        let stream = fx.stream("a", &["x"]);
        stream.append(&[Sample::new().with("x", 1i64)]).unwrap();
        assert!(stream.path().exists());

        Archiver::new()
            .package(&fx.session_id, &fx.session_dir, &[stream.clone()])
            .unwrap();

        assert!(!stream.path().exists());
        assert!(!fx.session_dir.exists());
    }

    #[test]
    fn test_empty_session_gets_placeholder() {
        let fx = Fixture::new();

        let archive = Archiver::new()
            .package(&fx.session_id, &fx.session_dir, &[])
            .unwrap();

        assert!(archive.devices.is_empty());
        assert_eq!(entry_names(&archive.bytes), vec![EMPTY_SESSION_ENTRY]);
        assert!(read_entry(&archive.bytes, EMPTY_SESSION_ENTRY).contains(fx.session_id.as_str()));
    }

    #[test]
    fn test_streams_without_rows_are_left_out() {
        let fx = Fixture::new();
        let used = fx.stream("used", &["x"]);
        let unused = fx.stream("unused", &["x"]);
        used.append(&[Sample::new().with("x", 1i64)]).unwrap();

        let archive = Archiver::new()
            .package(&fx.session_id, &fx.session_dir, &[used, unused])
            .unwrap();

        assert_eq!(archive.devices, vec!["used"]);
        assert_eq!(entry_names(&archive.bytes), vec!["used.csv"]);
    }

    #[test]
    fn test_archive_dir_keeps_a_copy() {
        let fx = Fixture::new();
        let stream = fx.stream("a", &["x"]);
        stream.append(&[Sample::new().with("x", 1i64)]).unwrap();

        let archiver = Archiver::with_archive_dir(fx.root.join("archives"));
        let archive = archiver
            .package(&fx.session_id, &fx.session_dir, &[stream])
            .unwrap();

        let persisted = archive.persisted_to.clone().unwrap();
        assert_eq!(
            persisted,
            fx.root.join("archives").join(format!("{}.zip", fx.session_id))
        );
        assert_eq!(fs::read(&persisted).unwrap(), archive.bytes);
    }

    #[test]
    fn test_existing_archive_is_not_replaced() {
        let fx = Fixture::new();
        let archives = fx.root.join("archives");
        let taken = archives.join(format!("{}.zip", fx.session_id));
        fs::create_dir_all(&archives).unwrap();
        fs::write(&taken, b"older session").unwrap();

        let stream = fx.stream("a", &["x"]);
        stream.append(&[Sample::new().with("x", 1i64)]).unwrap();

        let archive = Archiver::with_archive_dir(&archives)
            .package(&fx.session_id, &fx.session_dir, &[stream])
            .unwrap();

        let persisted = archive.persisted_to.clone().unwrap();
        assert_eq!(persisted, archives.join(format!("{}.1.zip", fx.session_id)));
        assert_eq!(fs::read(&persisted).unwrap(), archive.bytes);
        assert_eq!(fs::read(&taken).unwrap(), b"older session");
    }

    #[test]
    fn test_missing_log_is_skipped() {
        let fx = Fixture::new();
        let kept = fx.stream("kept", &["x"]);
        let lost = fx.stream("lost", &["x"]);
        kept.append(&[Sample::new().with("x", 1i64)]).unwrap();
        lost.append(&[Sample::new().with("x", 1i64)]).unwrap();
        fs::remove_file(lost.path()).unwrap();

        let archive = Archiver::new()
            .package(&fx.session_id, &fx.session_dir, &[kept, lost])
            .unwrap();

        assert_eq!(archive.devices, vec!["kept"]);
    }

    #[test]
    fn test_sealed_streams_reject_late_appends() {
        let fx = Fixture::new();
        let stream = fx.stream("a", &["x"]);
        stream.append(&[Sample::new().with("x", 1i64)]).unwrap();

        Archiver::new()
            .package(&fx.session_id, &fx.session_dir, &[stream.clone()])
            .unwrap();

        assert!(stream.append(&[Sample::new().with("x", 2i64)]).is_err());
        assert!(!fx.session_dir.exists());
    }
}
