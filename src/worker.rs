//! Conversion workers.
//!
//! Each worker holds at most one job. A held job is retried every cycle
//! until the file is stable, the per-file timeout expires, or conversion
//! finishes one way or another:
//!
//! ```text
//! Empty -> Held(waiting) -> { Converted | SkippedTimeout | DecodeFailed | WriteFailed } -> Empty
//! ```
//!
//! Only `Converted` touches [`SharedStats`].

use crate::codec::ImageCodec;
use crate::config::{ConverterConfig, PathRewrite};
use crate::error::{Error, Result};
use crate::grid::{PixelGrid, TransformOptions};
use crate::queue::{ConversionJob, JobReceiver, ShutdownListener};
use crate::stats::SharedStats;
use log::{debug, error, info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

/// Result of inspecting a file against the stability rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Missing,
    /// Exists but is too small or was modified too recently
    Unsettled { size: u64, age: Duration },
    Stable,
}

/// Size + modification-age test deciding a file has been fully written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityRule {
    pub min_size: u64,
    pub min_age: Duration,
}

impl StabilityRule {
    pub fn from_config(config: &ConverterConfig) -> Self {
        Self {
            min_size: config.stability_min_size_bytes,
            min_age: config.stability_min_age(),
        }
    }

    /// Both conditions must hold at the same instant
    pub fn check(&self, path: &Path) -> Readiness {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(_) => return Readiness::Missing,
        };
        let size = meta.len();
        // mtime in the future counts as "just modified"
        let age = meta
            .modified()
            .ok()
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
            .unwrap_or_default();

        if size >= self.min_size && age >= self.min_age {
            Readiness::Stable
        } else {
            Readiness::Unsettled { size, age }
        }
    }
}

/// What happened to the held job during one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Missing or unsettled; the job stays held
    Waiting,
    Converted(Duration),
    /// Timed out; a zero-filled placeholder was written instead
    SkippedTimeout,
    DecodeFailed,
    /// Destination directory or file could not be written
    WriteFailed,
}

impl JobOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobOutcome::Waiting)
    }
}

#[derive(Debug)]
struct HeldJob {
    job: ConversionJob,
    dequeued_at: Instant,
}

pub struct Worker {
    name: String,
    jobs: JobReceiver,
    stop: ShutdownListener,
    stats: Arc<SharedStats>,
    codec: Arc<dyn ImageCodec>,
    delay: Duration,
    timeout: Duration,
    rule: StabilityRule,
    transform: TransformOptions,
    rewrite: PathRewrite,
    placeholder_shape: [usize; 2],
    held: Option<HeldJob>,
}

impl Worker {
    pub fn new(
        id: usize,
        config: &ConverterConfig,
        jobs: JobReceiver,
        stop: ShutdownListener,
        stats: Arc<SharedStats>,
        codec: Arc<dyn ImageCodec>,
    ) -> Self {
        Self {
            name: format!("worker-{}", id),
            jobs,
            stop,
            stats,
            codec,
            delay: config.poll_delay(),
            timeout: config.file_timeout(),
            rule: StabilityRule::from_config(config),
            transform: TransformOptions::from_config(config),
            rewrite: config.path_rewrite.clone(),
            placeholder_shape: config.placeholder_shape,
            held: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the job currently held, if any
    pub fn held_path(&self) -> Option<&Path> {
        self.held.as_ref().map(|h| h.job.path.as_path())
    }

    /// One poll cycle without the trailing sleep.
    ///
    /// Returns `None` when no job was held and the queue was empty.
    pub fn cycle(&mut self) -> Option<JobOutcome> {
        if self.held.is_none() {
            let job = self.jobs.try_recv().ok()?;
            debug!("[{}] got {}", self.name, job.path.display());
            self.held = Some(HeldJob {
                job,
                dequeued_at: Instant::now(),
            });
        }

        let held = self.held.as_ref()?;
        let outcome = self.advance(&held.job.path, held.dequeued_at.elapsed());
        if outcome.is_terminal() {
            self.held = None;
        }
        Some(outcome)
    }

    fn advance(&self, path: &Path, waited: Duration) -> JobOutcome {
        if waited > self.timeout {
            error!(
                "[{}] timeout ({:?}) waiting for {}, writing placeholder",
                self.name,
                self.timeout,
                path.display()
            );
            return match self.write_placeholder(path) {
                Ok(()) => JobOutcome::SkippedTimeout,
                Err(e) => {
                    error!("[{}] {}", self.name, e);
                    JobOutcome::WriteFailed
                }
            };
        }

        match self.rule.check(path) {
            Readiness::Missing => {
                debug!("[{}] {} does not exist yet", self.name, path.display());
                JobOutcome::Waiting
            }
            Readiness::Unsettled { size, age } => {
                debug!(
                    "[{}] {} not settled (size {} / {}, age {:?} / {:?})",
                    self.name,
                    path.display(),
                    size,
                    self.rule.min_size,
                    age,
                    self.rule.min_age
                );
                JobOutcome::Waiting
            }
            Readiness::Stable => self.convert(path),
        }
    }

    fn convert(&self, path: &Path) -> JobOutcome {
        let started = Instant::now();

        let grid = match self.codec.decode(path) {
            Ok(grid) => grid,
            Err(e) => {
                error!("[{}] skipping unreadable file: {}", self.name, e);
                return JobOutcome::DecodeFailed;
            }
        };
        debug!(
            "[{}] decoded {} ({:?}, {:?})",
            self.name,
            path.display(),
            grid.dim(),
            grid.pixel_type()
        );

        let grid = grid.transform(&self.transform);
        if let Err(e) = self.write(&grid, path) {
            error!("[{}] {}", self.name, e);
            return JobOutcome::WriteFailed;
        }

        let elapsed = started.elapsed();
        self.stats.record_frame(elapsed);
        debug!("[{}] converted {} in {:?}", self.name, path.display(), elapsed);
        JobOutcome::Converted(elapsed)
    }

    fn write_placeholder(&self, source: &Path) -> Result<()> {
        let grid = PixelGrid::zeros(self.placeholder_shape, self.transform.target);
        self.write(&grid, source)
    }

    fn write(&self, grid: &PixelGrid, source: &Path) -> Result<()> {
        let destination = self.destination(source)?;
        if let Some(parent) = destination.parent() {
            create_dir_tolerant(parent).map_err(|e| Error::Encode {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        self.codec.encode(grid, &destination)
    }

    /// Rewritten output path; refuses to overwrite the source
    pub fn destination(&self, source: &Path) -> Result<PathBuf> {
        let destination = self.rewrite.apply(source);
        if destination == source {
            return Err(Error::Encode {
                path: destination,
                reason: format!(
                    "path does not contain '{}', refusing to overwrite the source",
                    self.rewrite.needle
                ),
            });
        }
        Ok(destination)
    }

    pub fn run(mut self) {
        info!(
            "[{}] started: delay {:?}, timeout {:?}, min size {} B, min age {:?}, transform {:?}",
            self.name, self.delay, self.timeout, self.rule.min_size, self.rule.min_age, self.transform
        );
        loop {
            self.cycle();
            if self.stop.should_stop() {
                break;
            }
            thread::sleep(self.delay);
        }
        if let Some(held) = self.held.take() {
            warn!("[{}] abandoning {} on shutdown", self.name, held.job.path.display());
        }
        info!("[{}] stopped", self.name);
    }

    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().name(self.name.clone()).spawn(move || self.run())
    }
}

/// `create_dir_all` that treats a sibling winning the race as success
fn create_dir_tolerant(dir: &Path) -> io::Result<()> {
    match fs::create_dir_all(dir) {
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn age_file(path: &Path, by: Duration) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[test]
    fn stability_needs_size_and_age() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frame.tif");
        let rule = StabilityRule {
            min_size: 10,
            min_age: Duration::from_secs(5),
        };

        assert_eq!(rule.check(&path), Readiness::Missing);

        fs::write(&path, [0u8; 4]).unwrap();
        age_file(&path, Duration::from_secs(60));
        assert!(matches!(rule.check(&path), Readiness::Unsettled { size: 4, .. }));

        fs::write(&path, [0u8; 32]).unwrap();
        assert!(matches!(rule.check(&path), Readiness::Unsettled { size: 32, .. }));

        age_file(&path, Duration::from_secs(60));
        assert_eq!(rule.check(&path), Readiness::Stable);
    }

    #[test]
    fn tolerant_dir_creation_is_idempotent() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        create_dir_tolerant(&nested).unwrap();
        create_dir_tolerant(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
