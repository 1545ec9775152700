// tests/sorter_tests.rs

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;
use tiffpool::queue::{self, ConversionJob, PathEntry, ShutdownSignal};
use tiffpool::sorter::{resolve_path, Sorter};

fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    File::create(&path).expect("Failed to create file");
    path
}

fn drain(jobs: &queue::JobReceiver) -> Vec<PathBuf> {
    jobs.try_iter().map(|job: ConversionJob| job.path).collect()
}

#[test]
fn test_directory_expands_to_tiff_files_only() {
    let dir = tempdir().expect("Failed to create temp dir");
    let a = touch(dir.path(), "a.tif");
    let b = touch(dir.path(), "b.tiff");
    touch(dir.path(), "c_dark.tif");
    touch(dir.path(), "d.txt");
    // nested folders are not walked
    fs::create_dir(dir.path().join("nested")).unwrap();
    touch(&dir.path().join("nested"), "e.tif");

    assert_eq!(resolve_path(dir.path()), vec![a, b]);
}

#[cfg(unix)]
#[test]
fn test_symlinked_frames_in_directory_are_listed() {
    let store = tempdir().expect("Failed to create temp dir");
    let dir = tempdir().expect("Failed to create temp dir");
    let target = touch(store.path(), "real.tif");
    let link = dir.path().join("a.tif");
    std::os::unix::fs::symlink(&target, &link).expect("Failed to create symlink");
    // dangling links are not files
    std::os::unix::fs::symlink(store.path().join("gone.tif"), dir.path().join("b.tif")).unwrap();

    assert_eq!(resolve_path(&link), vec![link.clone()]);
    assert_eq!(resolve_path(dir.path()), vec![link]);
}

#[test]
fn test_sorter_forwards_folder_contents() {
    let dir = tempdir().expect("Failed to create temp dir");
    for name in ["f1.tif", "f2.tif", "f3.tif", "f0_dark.tif"] {
        touch(dir.path(), name);
    }

    let (ingest_tx, ingest_rx) = queue::ingestion_queue();
    let (job_tx, job_rx) = queue::conversion_queue();
    let stop = ShutdownSignal::new();
    let sorter = Sorter::new(ingest_rx, job_tx, stop.listener(), Duration::from_millis(10));

    ingest_tx.send(PathEntry::from(dir.path().to_path_buf())).unwrap();
    assert_eq!(sorter.poll_once(), 3);
    // one entry per cycle, nothing else pending
    assert_eq!(sorter.poll_once(), 0);

    let names: Vec<String> = drain(&job_rx)
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["f1.tif", "f2.tif", "f3.tif"]);
}

#[test]
fn test_batch_keeps_submission_order_and_filters() {
    let dir = tempdir().expect("Failed to create temp dir");
    let existing = touch(dir.path(), "z.tif");
    let future = dir.path().join("a_not_yet.tif");
    let notes = touch(dir.path(), "notes.txt");
    let dark = dir.path().join("dark_0001.tif");

    let (ingest_tx, ingest_rx) = queue::ingestion_queue();
    let (job_tx, job_rx) = queue::conversion_queue();
    let stop = ShutdownSignal::new();
    let sorter = Sorter::new(ingest_rx, job_tx, stop.listener(), Duration::from_millis(10));

    ingest_tx
        .send(PathEntry::from(vec![existing.clone(), notes, dark, future.clone()]))
        .unwrap();
    assert_eq!(sorter.poll_once(), 2);
    assert_eq!(drain(&job_rx), vec![existing, future]);
}

#[test]
fn test_sorter_thread_stops_on_signal() {
    let (_ingest_tx, ingest_rx) = queue::ingestion_queue();
    let (job_tx, _job_rx) = queue::conversion_queue();
    let mut stop = ShutdownSignal::new();
    let handle = Sorter::new(ingest_rx, job_tx, stop.listener(), Duration::from_millis(10))
        .spawn()
        .expect("Failed to spawn sorter");

    stop.trigger();
    handle.join().expect("sorter panicked");
}
