//! Channels connecting callers, the sorter and the workers.
//!
//! All three are unbounded crossbeam channels: ingestion (raw entries from
//! any number of callers), conversion (single resolved files, shared by all
//! workers) and the shutdown signals. Consumers only ever use `try_recv`.

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use std::path::PathBuf;

/// Raw submission from a caller: one path or an ordered batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathEntry {
    Single(PathBuf),
    Batch(Vec<PathBuf>),
}

impl PathEntry {
    /// Paths in submission order
    pub fn into_paths(self) -> Vec<PathBuf> {
        match self {
            PathEntry::Single(path) => vec![path],
            PathEntry::Batch(paths) => paths,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PathEntry::Single(_) => 1,
            PathEntry::Batch(paths) => paths.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<PathBuf> for PathEntry {
    fn from(path: PathBuf) -> Self {
        PathEntry::Single(path)
    }
}

impl From<&str> for PathEntry {
    fn from(path: &str) -> Self {
        PathEntry::Single(PathBuf::from(path))
    }
}

impl From<Vec<PathBuf>> for PathEntry {
    fn from(paths: Vec<PathBuf>) -> Self {
        PathEntry::Batch(paths)
    }
}

/// A single file waiting to be converted. Never a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub path: PathBuf,
}

impl ConversionJob {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

pub type IngestSender = Sender<PathEntry>;
pub type IngestReceiver = Receiver<PathEntry>;
pub type JobSender = Sender<ConversionJob>;
pub type JobReceiver = Receiver<ConversionJob>;

pub fn ingestion_queue() -> (IngestSender, IngestReceiver) {
    channel::unbounded()
}

pub fn conversion_queue() -> (JobSender, JobReceiver) {
    channel::unbounded()
}

/// Broadcast stop request for one class of consumers.
///
/// Triggering drops the only sender, so every [`ShutdownListener`] cloned
/// from it sees the channel disconnect on its next check. There is nothing
/// to count: one trigger reaches any number of listeners.
#[derive(Debug)]
pub struct ShutdownSignal {
    sender: Option<Sender<()>>,
    receiver: Receiver<()>,
}

/// Consumer side of a [`ShutdownSignal`]
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    receiver: Receiver<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, receiver) = channel::bounded(0);
        Self {
            sender: Some(sender),
            receiver,
        }
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.receiver.clone(),
        }
    }

    pub fn trigger(&mut self) {
        self.sender.take();
    }

    pub fn is_triggered(&self) -> bool {
        self.sender.is_none()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownListener {
    /// Non-blocking check
    pub fn should_stop(&self) -> bool {
        matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_reaches_every_listener() {
        let mut signal = ShutdownSignal::new();
        let listeners: Vec<_> = (0..4).map(|_| signal.listener()).collect();
        assert!(listeners.iter().all(|l| !l.should_stop()));

        signal.trigger();
        assert!(signal.is_triggered());
        assert!(listeners.iter().all(|l| l.should_stop()));
        // observing the stop does not consume it
        assert!(listeners[0].should_stop());
    }

    #[test]
    fn batch_keeps_order() {
        let entry = PathEntry::from(vec![PathBuf::from("b.tif"), PathBuf::from("a.tif")]);
        assert_eq!(entry.len(), 2);
        assert_eq!(entry.into_paths(), vec![PathBuf::from("b.tif"), PathBuf::from("a.tif")]);
    }
}
