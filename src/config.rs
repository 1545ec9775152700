use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Numeric representation of an output pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelType {
    #[serde(rename = "uint8", alias = "u8")]
    U8,
    #[serde(rename = "uint16", alias = "u16")]
    U16,
    #[serde(rename = "uint32", alias = "u32")]
    U32,
    #[serde(rename = "int16", alias = "i16")]
    I16,
    #[serde(rename = "int32", alias = "i32")]
    I32,
    #[serde(rename = "float32", alias = "f32")]
    F32,
    #[serde(rename = "float64", alias = "f64")]
    F64,
}

impl PixelType {
    pub fn is_unsigned(self) -> bool {
        matches!(self, PixelType::U8 | PixelType::U16 | PixelType::U32)
    }

    /// True for representations that can hold values below zero
    pub fn is_signed_or_float(self) -> bool {
        !self.is_unsigned()
    }

    pub fn name(self) -> &'static str {
        match self {
            PixelType::U8 => "uint8",
            PixelType::U16 => "uint16",
            PixelType::U32 => "uint32",
            PixelType::I16 => "int16",
            PixelType::I32 => "int32",
            PixelType::F32 => "float32",
            PixelType::F64 => "float64",
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Substring substitution mapping a source path to its destination path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRewrite {
    pub needle: String,
    pub replacement: String,
}

impl PathRewrite {
    pub fn new(needle: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
            replacement: replacement.into(),
        }
    }

    /// Replaces every occurrence of the needle.
    pub fn apply(&self, source: &Path) -> std::path::PathBuf {
        let text = source.to_string_lossy();
        std::path::PathBuf::from(text.replace(&self.needle, &self.replacement))
    }
}

impl Default for PathRewrite {
    fn default() -> Self {
        Self::new("raw", "processed")
    }
}

fn default_worker_count() -> usize {
    3
}
fn default_poll_delay() -> f64 {
    1.0
}
fn default_file_timeout() -> f64 {
    15.0
}
fn default_min_size() -> u64 {
    16_777_000
}
fn default_min_age() -> f64 {
    3.0
}
fn default_pixel_type() -> PixelType {
    PixelType::I32
}
fn default_placeholder_shape() -> [usize; 2] {
    [2048, 2048]
}
fn default_shutdown_poll() -> f64 {
    1.0
}

/// Configuration of the conversion pool.
///
/// Built once (from defaults, a TOML file, or by hand) and handed to
/// [`crate::Supervisor::start`]; every worker receives its own clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Number of parallel workers
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Cycle sleep for the sorter and every worker
    #[serde(default = "default_poll_delay")]
    pub poll_delay_seconds: f64,
    /// Maximum wait for a job to become stable before a placeholder is written
    #[serde(default = "default_file_timeout")]
    pub per_file_timeout_seconds: f64,
    /// Minimum file size to consider a file completely written
    #[serde(default = "default_min_size")]
    pub stability_min_size_bytes: u64,
    /// Minimum time since last modification to consider a file settled
    #[serde(default = "default_min_age")]
    pub stability_min_age_seconds: f64,
    /// Counter-clockwise rotation; only multiples of 90 are applied
    pub rotation_degrees: i64,
    /// Axis to reverse after rotation (0 = rows, 1 = columns)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flip_axis: Option<usize>,
    #[serde(default = "default_pixel_type")]
    pub target_pixel_type: PixelType,
    /// `[rows, cols]` of the zero-filled placeholder written on timeout
    #[serde(default = "default_placeholder_shape")]
    pub placeholder_shape: [usize; 2],
    /// Interval between liveness checks while shutting down
    #[serde(default = "default_shutdown_poll")]
    pub shutdown_poll_seconds: f64,
    /// Upper bound for the shutdown wait; unbounded when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutdown_timeout_seconds: Option<f64>,
    pub path_rewrite: PathRewrite,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            poll_delay_seconds: default_poll_delay(),
            per_file_timeout_seconds: default_file_timeout(),
            stability_min_size_bytes: default_min_size(),
            stability_min_age_seconds: default_min_age(),
            rotation_degrees: 0,
            flip_axis: None,
            target_pixel_type: default_pixel_type(),
            placeholder_shape: default_placeholder_shape(),
            shutdown_poll_seconds: default_shutdown_poll(),
            shutdown_timeout_seconds: None,
            path_rewrite: PathRewrite::default(),
        }
    }
}

impl ConverterConfig {
    /// Load and validate a TOML configuration file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ConverterConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_poll_delay(mut self, seconds: f64) -> Self {
        self.poll_delay_seconds = seconds;
        self
    }

    pub fn with_file_timeout(mut self, seconds: f64) -> Self {
        self.per_file_timeout_seconds = seconds;
        self
    }

    pub fn with_stability(mut self, min_size_bytes: u64, min_age_seconds: f64) -> Self {
        self.stability_min_size_bytes = min_size_bytes;
        self.stability_min_age_seconds = min_age_seconds;
        self
    }

    pub fn with_rotation(mut self, degrees: i64) -> Self {
        self.rotation_degrees = degrees;
        self
    }

    pub fn with_flip_axis(mut self, axis: Option<usize>) -> Self {
        self.flip_axis = axis;
        self
    }

    pub fn with_target_pixel_type(mut self, pixel_type: PixelType) -> Self {
        self.target_pixel_type = pixel_type;
        self
    }

    pub fn with_path_rewrite(mut self, rewrite: PathRewrite) -> Self {
        self.path_rewrite = rewrite;
        self
    }

    pub fn with_placeholder_shape(mut self, rows: usize, cols: usize) -> Self {
        self.placeholder_shape = [rows, cols];
        self
    }

    pub fn with_shutdown_poll(mut self, seconds: f64) -> Self {
        self.shutdown_poll_seconds = seconds;
        self
    }

    pub fn with_shutdown_timeout(mut self, seconds: Option<f64>) -> Self {
        self.shutdown_timeout_seconds = seconds;
        self
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs_f64(self.poll_delay_seconds)
    }

    /// Sorter sleep: the poll delay capped at one second
    pub fn sorter_delay(&self) -> Duration {
        self.poll_delay().min(Duration::from_secs(1))
    }

    pub fn file_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.per_file_timeout_seconds)
    }

    pub fn stability_min_age(&self) -> Duration {
        Duration::from_secs_f64(self.stability_min_age_seconds)
    }

    pub fn shutdown_poll(&self) -> Duration {
        Duration::from_secs_f64(self.shutdown_poll_seconds)
    }

    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_seconds.map(Duration::from_secs_f64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::Config("worker_count must be at least 1".into()));
        }
        check_seconds("poll_delay_seconds", self.poll_delay_seconds)?;
        if self.poll_delay_seconds == 0.0 {
            return Err(Error::Config("poll_delay_seconds must be greater than 0".into()));
        }
        check_seconds("per_file_timeout_seconds", self.per_file_timeout_seconds)?;
        check_seconds("stability_min_age_seconds", self.stability_min_age_seconds)?;
        check_seconds("shutdown_poll_seconds", self.shutdown_poll_seconds)?;
        if self.shutdown_poll_seconds == 0.0 {
            return Err(Error::Config("shutdown_poll_seconds must be greater than 0".into()));
        }
        if let Some(limit) = self.shutdown_timeout_seconds {
            check_seconds("shutdown_timeout_seconds", limit)?;
        }
        if let Some(axis) = self.flip_axis {
            if axis > 1 {
                return Err(Error::Config(format!("flip_axis must be 0 or 1, got {}", axis)));
            }
        }
        if self.path_rewrite.needle.is_empty() {
            return Err(Error::Config("path_rewrite.needle cannot be empty".into()));
        }
        if self.placeholder_shape.iter().any(|&n| n == 0) {
            return Err(Error::Config("placeholder_shape dimensions must be non-zero".into()));
        }
        if self.rotation_degrees % 90 != 0 {
            log::warn!(
                "rotation_degrees={} is not a multiple of 90 and will be ignored",
                self.rotation_degrees
            );
        }
        Ok(())
    }
}

/// The value must convert to a `Duration` without overflow
fn check_seconds(field: &str, value: f64) -> Result<()> {
    Duration::try_from_secs_f64(value).map_err(|e| {
        Error::Config(format!(
            "{} must be a finite, non-negative number of seconds ({}): {}",
            field, value, e
        ))
    })?;
    Ok(())
}
