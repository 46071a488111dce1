//! End-to-end recording session tests
//!
//! These drive `SessionRecorder` the way the HTTP boundary does and check the
//! archive that comes out of `stop_session`.

use sensorlog_core::Error;
use sensorlog_session::{RecordingConfig, SessionRecorder};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use tempfile::TempDir;
use zip::ZipArchive;

fn recorder(dir: &TempDir) -> SessionRecorder {
    SessionRecorder::new(RecordingConfig::default().with_data_dir(dir.path().join("logs")))
}

fn unzip(bytes: &[u8]) -> BTreeMap<String, String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut files = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        files.insert(entry.name().to_string(), contents);
    }
    files
}

#[test]
fn test_two_batches_one_device() {
    let dir = TempDir::new().unwrap();
    let recorder = recorder(&dir);

    recorder.start_session();
    let first = recorder.ingest("tof_01", vec![json!({"d": 1.2, "s": 1})]).unwrap();
    let second = recorder.ingest("tof_01", vec![json!({"d": 1.3, "s": 1})]).unwrap();
    assert_eq!(first.written, 1);
    assert_eq!(second.written, 1);

    let stopped = recorder.stop_session().unwrap();
    let files = unzip(&stopped.archive.bytes);

    assert_eq!(files.keys().collect::<Vec<_>>(), vec!["tof_01.csv"]);
    let lines: Vec<&str> = files["tof_01.csv"].lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "server_time_utc,device_id,d,s");
    assert!(lines[1].ends_with(",tof_01,1.2,1"));
    assert!(lines[2].ends_with(",tof_01,1.3,1"));
}

#[test]
fn test_ingest_before_start_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let recorder = recorder(&dir);

    let outcome = recorder.ingest("tof_01", vec![json!({"d": 1.2})]).unwrap();

    assert_eq!(outcome.written, 0);
    assert!(!dir.path().join("logs").exists());
}

#[test]
fn test_schema_mismatch_keeps_first_row_only() {
    let dir = TempDir::new().unwrap();
    let recorder = recorder(&dir);

    recorder.start_session();
    recorder.ingest("a", vec![json!({"x": 1})]).unwrap();
    let err = recorder.ingest("a", vec![json!({"y": 2})]).unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch { .. }));

    let files = unzip(&recorder.stop_session().unwrap().archive.bytes);
    let lines: Vec<&str> = files["a.csv"].lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].ends_with(",a,1"));
}

#[test]
fn test_failed_first_write_does_not_pin_schema() {
    let dir = TempDir::new().unwrap();
    let recorder = recorder(&dir);

    let started = recorder.start_session();
    let session_dir = dir.path().join("logs").join(started.session_id.as_str());
    std::fs::create_dir_all(&session_dir).unwrap();
    std::fs::write(session_dir.join("a.csv"), "").unwrap();

    let err = recorder.ingest("a", vec![json!({"x": 1})]).unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    assert!(recorder.devices().is_empty());

    std::fs::remove_file(session_dir.join("a.csv")).unwrap();
    let outcome = recorder.ingest("a", vec![json!({"y": 2})]).unwrap();
    assert_eq!(outcome.written, 1);

    let devices = recorder.devices();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].columns, vec!["y"]);

    let files = unzip(&recorder.stop_session().unwrap().archive.bytes);
    let lines: Vec<&str> = files["a.csv"].lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "server_time_utc,device_id,y");
    assert!(lines[1].ends_with(",a,2"));
}

#[test]
fn test_partial_batch_mismatch_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let recorder = recorder(&dir);

    recorder.start_session();
    recorder.ingest("a", vec![json!({"a": 1, "b": 2})]).unwrap();
    let err = recorder
        .ingest("a", vec![json!({"a": 3}), json!({"a": 4, "c": 5})])
        .unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch { ref unexpected, .. } if unexpected == &["c"]));

    let files = unzip(&recorder.stop_session().unwrap().archive.bytes);
    assert_eq!(files["a.csv"].lines().count(), 2);
}

#[test]
fn test_missing_fields_render_empty() {
    let dir = TempDir::new().unwrap();
    let recorder = recorder(&dir);

    recorder.start_session();
    recorder
        .ingest("gnss", vec![json!({"lat": 52.5, "lon": 13.4, "fix": true})])
        .unwrap();
    recorder.ingest("gnss", vec![json!({"lat": 52.6})]).unwrap();

    let files = unzip(&recorder.stop_session().unwrap().archive.bytes);
    let lines: Vec<&str> = files["gnss.csv"].lines().collect();
    assert_eq!(lines[0], "server_time_utc,device_id,fix,lat,lon");
    assert!(lines[1].ends_with(",gnss,true,52.5,13.4"));
    assert!(lines[2].ends_with(",gnss,,52.6,"));
}

#[test]
fn test_archive_contains_exactly_devices_with_accepted_batches() {
    let dir = TempDir::new().unwrap();
    let recorder = recorder(&dir);

    // Data sent before the session never shows up
    recorder.ingest("early", vec![json!({"x": 1})]).unwrap();

    recorder.start_session();
    recorder.ingest("a", vec![json!({"x": 1})]).unwrap();
    recorder.ingest("b", vec![json!({"y": 1}), json!({"y": 2})]).unwrap();
    // Rejected first batch: never accepted, so no entry
    recorder.ingest("c", vec![json!({"z": [1]})]).unwrap_err();

    let stopped = recorder.stop_session().unwrap();
    assert_eq!(stopped.archive.devices, vec!["a", "b"]);
    assert_eq!(stopped.archive.total_rows, 3);

    let files = unzip(&stopped.archive.bytes);
    assert_eq!(
        files.keys().cloned().collect::<BTreeSet<_>>(),
        BTreeSet::from(["a.csv".to_string(), "b.csv".to_string()])
    );
}

#[test]
fn test_restart_does_not_reset_row_counts() {
    let dir = TempDir::new().unwrap();
    let recorder = recorder(&dir);

    recorder.start_session();
    recorder.ingest("a", vec![json!({"x": 1})]).unwrap();
    recorder.start_session();
    recorder.ingest("a", vec![json!({"x": 2})]).unwrap();

    assert_eq!(recorder.devices()[0].rows, 2);
}

#[test]
fn test_sessions_are_independent() {
    let dir = TempDir::new().unwrap();
    let recorder = recorder(&dir);

    let first = recorder.start_session();
    recorder.ingest("a", vec![json!({"x": 1})]).unwrap();
    let first_archive = recorder.stop_session().unwrap();

    let second = recorder.start_session();
    assert_ne!(first.session_id, second.session_id);
    // A new session gets a fresh schema for the same device
    recorder.ingest("a", vec![json!({"y": 1})]).unwrap();
    let second_archive = recorder.stop_session().unwrap();

    assert_eq!(first_archive.session_id, first.session_id);
    assert!(
        unzip(&first_archive.archive.bytes)["a.csv"].starts_with("server_time_utc,device_id,x\n")
    );
    assert!(
        unzip(&second_archive.archive.bytes)["a.csv"].starts_with("server_time_utc,device_id,y\n")
    );
}

#[test]
fn test_empty_session_archive_has_placeholder() {
    let dir = TempDir::new().unwrap();
    let recorder = recorder(&dir);

    recorder.start_session();
    let stopped = recorder.stop_session().unwrap();

    let files = unzip(&stopped.archive.bytes);
    assert_eq!(files.len(), 1);
    assert!(files.contains_key(sensorlog_storage::EMPTY_SESSION_ENTRY));
}

#[test]
fn test_stop_racing_with_ingest_never_tears_batches() {
    let dir = TempDir::new().unwrap();
    let recorder = Arc::new(recorder(&dir));
    recorder.start_session();

    let devices = 6;
    let barrier = Arc::new(Barrier::new(devices + 1));
    let running = Arc::new(AtomicBool::new(true));

    let workers: Vec<_> = (0..devices)
        .map(|d| {
            let recorder = Arc::clone(&recorder);
            let barrier = Arc::clone(&barrier);
            let running = Arc::clone(&running);
            std::thread::spawn(move || {
                let device = format!("dev_{}", d);
                let mut accepted = 0usize;
                barrier.wait();
                let mut seq = 0i64;
                while running.load(Ordering::SeqCst) {
                    let batch = vec![json!({"seq": seq}), json!({"seq": seq}), json!({"seq": seq})];
                    let outcome = recorder.ingest(&device, batch).unwrap();
                    if outcome.stored {
                        assert_eq!(outcome.written, 3);
                        accepted += 1;
                    }
                    seq += 1;
                    if seq > 200 {
                        break;
                    }
                }
                (device, accepted)
            })
        })
        .collect();

    barrier.wait();
    std::thread::sleep(std::time::Duration::from_millis(5));
    let stopped = recorder.stop_session().unwrap();
    running.store(false, Ordering::SeqCst);

    let accepted: BTreeMap<String, usize> =
        workers.into_iter().map(|w| w.join().unwrap()).collect();
    let files = unzip(&stopped.archive.bytes);

    for (device, batches) in accepted {
        let name = format!("{}.csv", device);
        if batches == 0 {
            assert!(!files.contains_key(&name));
            continue;
        }

        let rows: Vec<&str> = files[&name].lines().skip(1).collect();
        assert_eq!(rows.len(), batches * 3, "device {}", device);
        for chunk in rows.chunks(3) {
            let seqs: BTreeSet<&str> =
                chunk.iter().map(|r| r.rsplit(',').next().unwrap()).collect();
            assert_eq!(seqs.len(), 1, "torn batch for {}", device);
        }
    }
}
