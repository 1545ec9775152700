//! Resolves raw ingestion entries into single-file conversion jobs.
//!
//! Directories are expanded one level deep. Files are forwarded when their
//! name carries a TIFF extension and does not mention "dark". Paths that do
//! not exist yet are forwarded on the same name test, since the detector
//! may still be writing them; the worker's stability check does the waiting.

use crate::queue::{ConversionJob, IngestReceiver, JobSender, PathEntry, ShutdownListener};
use crossbeam::channel::TryRecvError;
use log::{debug, info, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["tif", "tiff"];
const EXCLUDED_MARKER: &str = "dark";

/// True when the file name has an image extension and is not a dark frame
pub fn is_candidate(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let has_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        });
    has_extension && !name.to_ascii_lowercase().contains(EXCLUDED_MARKER)
}

/// Expand one ingested path into the files that should be converted
pub fn resolve_path(path: &Path) -> Vec<PathBuf> {
    if path.is_dir() {
        let mut files: Vec<PathBuf> = WalkDir::new(path)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            // is_file follows symlinks, so linked frames count as files
            .filter(|p| p.is_file() && is_candidate(p))
            .collect();
        files.sort();
        return files;
    }

    // Existing files and not-yet-written paths pass the same name test
    if is_candidate(path) && (path.is_file() || !path.exists()) {
        return vec![path.to_path_buf()];
    }

    Vec::new()
}

/// Expand a whole entry, keeping the order in which paths were submitted
pub fn resolve_entry(entry: PathEntry) -> Vec<PathBuf> {
    entry.into_paths().iter().flat_map(|p| resolve_path(p)).collect()
}

/// Background thread feeding the conversion queue
pub struct Sorter {
    ingest: IngestReceiver,
    jobs: JobSender,
    stop: ShutdownListener,
    delay: Duration,
}

impl Sorter {
    pub fn new(
        ingest: IngestReceiver,
        jobs: JobSender,
        stop: ShutdownListener,
        delay: Duration,
    ) -> Self {
        Self {
            ingest,
            jobs,
            stop,
            delay: delay.min(Duration::from_secs(1)),
        }
    }

    /// Take at most one entry off the ingestion queue and forward its files.
    /// Returns the number of jobs created.
    pub fn poll_once(&self) -> usize {
        let entry = match self.ingest.try_recv() {
            Ok(entry) => entry,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return 0,
        };

        let submitted = entry.len();
        let mut forwarded = 0;
        for path in resolve_entry(entry) {
            debug!("[sorter] queueing {}", path.display());
            if self.jobs.send(ConversionJob::new(path)).is_err() {
                warn!("[sorter] conversion queue closed, dropping remaining paths");
                break;
            }
            forwarded += 1;
        }
        if forwarded < submitted {
            debug!("[sorter] {} path(s) submitted, {} job(s) created", submitted, forwarded);
        }
        forwarded
    }

    pub fn run(self) {
        info!("[sorter] started, cycle delay {:?}", self.delay);
        loop {
            self.poll_once();
            if self.stop.should_stop() {
                break;
            }
            thread::sleep(self.delay);
            if self.stop.should_stop() {
                break;
            }
        }
        info!("[sorter] stopped");
    }

    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().name("sorter".into()).spawn(move || self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_names() {
        assert!(is_candidate(Path::new("/data/a.tif")));
        assert!(is_candidate(Path::new("/data/b.TIFF")));
        assert!(!is_candidate(Path::new("/data/c_dark.tif")));
        assert!(!is_candidate(Path::new("/data/DARK_c.tif")));
        assert!(!is_candidate(Path::new("/data/d.txt")));
        assert!(!is_candidate(Path::new("/data/tif")));
    }

    #[test]
    fn dark_in_directory_name_does_not_exclude() {
        assert!(is_candidate(Path::new("/darkroom/a.tif")));
    }

    #[test]
    fn missing_candidate_is_forwarded_speculatively() {
        let path = Path::new("/surely/not/here/future.tif");
        assert_eq!(resolve_path(path), vec![path.to_path_buf()]);
        assert!(resolve_path(Path::new("/surely/not/here/future.txt")).is_empty());
        assert!(resolve_path(Path::new("/surely/not/here/future_dark.tif")).is_empty());
    }
}
