use crate::codec::ImageCodec;
use crate::config::{ConverterConfig, PixelType};
use crate::error::{Error, Result};
use crate::sorter;
use crate::supervisor::Supervisor;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Read-only view exposed to operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceReport {
    pub worker_count: usize,
    /// Paths accepted through the facade since start; a folder counts
    /// its frames
    pub submitted: u64,
    pub frames: u64,
    pub seconds: f64,
    pub average_seconds_per_frame: f64,
    pub rotation_degrees: i64,
    pub flip_axis: Option<usize>,
    pub target_pixel_type: PixelType,
}

/// Command surface of the conversion pool: ingest, reset, shutdown and
/// reporting.
pub struct ConverterService {
    supervisor: Supervisor,
    submitted: AtomicU64,
}

impl ConverterService {
    pub fn start(config: ConverterConfig) -> Result<Self> {
        Ok(Self::from_supervisor(Supervisor::start(config)?))
    }

    pub fn start_with_codec(config: ConverterConfig, codec: Arc<dyn ImageCodec>) -> Result<Self> {
        Ok(Self::from_supervisor(Supervisor::start_with_codec(config, codec)?))
    }

    fn from_supervisor(supervisor: Supervisor) -> Self {
        Self {
            supervisor,
            submitted: AtomicU64::new(0),
        }
    }

    pub fn ingest(&self, path: impl Into<PathBuf>) {
        let path: PathBuf = path.into();
        self.count_submitted(1);
        self.supervisor.ingest(path);
    }

    pub fn ingest_batch(&self, paths: Vec<PathBuf>) {
        if paths.is_empty() {
            debug!("empty batch ignored");
            return;
        }
        self.count_submitted(paths.len());
        self.supervisor.ingest(paths);
    }

    /// Like [`Self::ingest`], but the folder must already exist.
    ///
    /// Counts as one submission per frame the folder holds right now;
    /// the sorter lists it again when it picks the entry up.
    pub fn ingest_folder(&self, dir: &Path) -> Result<()> {
        if !dir.is_dir() {
            return Err(Error::NotADirectory(dir.to_path_buf()));
        }
        self.count_submitted(sorter::resolve_path(dir).len());
        self.supervisor.ingest(dir.to_path_buf());
        Ok(())
    }

    /// Entries offered after shutdown are dropped and not counted
    fn count_submitted(&self, paths: usize) {
        if !self.supervisor.is_stopped() {
            self.submitted.fetch_add(paths as u64, Ordering::Relaxed);
        }
    }

    pub fn reset_stats(&self) {
        self.supervisor.reset_stats();
    }

    /// Blocks until every worker has exited
    pub fn shutdown(&mut self) -> Result<()> {
        self.supervisor.shutdown()
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn report(&self) -> ServiceReport {
        let config = self.supervisor.config();
        let stats = self.supervisor.stats();
        ServiceReport {
            worker_count: self.supervisor.worker_count(),
            submitted: self.submitted.load(Ordering::Relaxed),
            frames: stats.frames,
            seconds: stats.seconds,
            average_seconds_per_frame: stats.average_seconds(),
            rotation_degrees: config.rotation_degrees,
            flip_axis: config.flip_axis,
            target_pixel_type: config.target_pixel_type,
        }
    }
}
