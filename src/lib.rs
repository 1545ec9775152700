//! # tiffpool - Polling TIFF Conversion Pool
//!
//! `tiffpool` converts detector frames that may still be in the middle of
//! being written. Paths (files, folders, or names that do not exist yet)
//! are ingested, resolved into single-file jobs, and handed to a fixed pool
//! of workers that wait for each file to settle before rotating, flipping
//! and re-typing it into a mirrored output tree.
//!
//! ## Features
//!
//! - Folder expansion with TIFF filtering and dark-frame exclusion
//! - Size + modification-age stability test with a per-file timeout
//! - Zero-filled placeholder output for files that never show up
//! - Lossless shared counters for frames converted and time spent
//! - Cooperative shutdown that waits for every worker
//!
//! ## Example
//!
//! ```no_run
//! use tiffpool::{ConverterConfig, ConverterService};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConverterConfig::default()
//!     .with_worker_count(4)
//!     .with_rotation(90)
//!     .with_flip_axis(Some(1));
//! let mut service = ConverterService::start(config)?;
//!
//! service.ingest("/data/raw/scan_0001/frame_00001.tif");
//! service.ingest_folder(std::path::Path::new("/data/raw/scan_0002"))?;
//!
//! let report = service.report();
//! println!("{} frames in {:.2}s", report.frames, report.seconds);
//!
//! service.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod grid;
pub mod queue;
pub mod service;
pub mod sorter;
pub mod stats;
pub mod supervisor;
pub mod worker;

pub use codec::{ImageCodec, TiffCodec};
pub use config::{ConverterConfig, PathRewrite, PixelType};
pub use error::{Error, Result};
pub use grid::{PixelGrid, TransformOptions};
pub use queue::{ConversionJob, PathEntry};
pub use service::{ConverterService, ServiceReport};
pub use stats::{SharedStats, StatsSnapshot};
pub use supervisor::{Supervisor, WorkerExit, WorkerHandle};
pub use worker::{JobOutcome, Readiness, StabilityRule, Worker};
