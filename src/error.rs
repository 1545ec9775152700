use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the conversion pool.
///
/// Per-job failures (`Decode`, `Encode`) are contained inside the
/// worker that hit them and only ever reach the log. `Spawn` and `Config`
/// are the ones a caller of [`crate::Supervisor::start`] sees.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot decode {}: {}", .path.display(), .reason)]
    Decode { path: PathBuf, reason: String },

    #[error("Cannot write {}: {}", .path.display(), .reason)]
    Encode { path: PathBuf, reason: String },

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("{0} worker(s) still running after the shutdown timeout")]
    ShutdownTimeout(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
