use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Conversion counters shared by every worker.
///
/// Each field sits behind its own lock. Updates are atomic per field; a
/// reader may observe `frames` and `seconds` from slightly different
/// instants, which is acceptable for reporting.
#[derive(Debug, Default)]
pub struct SharedStats {
    frames: Mutex<u64>,
    seconds: Mutex<f64>,
}

/// Point-in-time copy of [`SharedStats`]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub frames: u64,
    pub seconds: f64,
}

impl StatsSnapshot {
    /// Average seconds per frame, 0 when nothing has been converted
    pub fn average_seconds(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.seconds / self.frames as f64
        }
    }
}

impl SharedStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, frames: u64, elapsed: Duration) {
        *self.frames.lock() += frames;
        *self.seconds.lock() += elapsed.as_secs_f64();
    }

    /// Record one successful conversion
    pub fn record_frame(&self, elapsed: Duration) {
        self.add(1, elapsed);
    }

    pub fn reset(&self) {
        *self.frames.lock() = 0;
        *self.seconds.lock() = 0.0;
    }

    pub fn frames(&self) -> u64 {
        *self.frames.lock()
    }

    pub fn seconds(&self) -> f64 {
        *self.seconds.lock()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames(),
            seconds: self.seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn concurrent_writers_lose_no_updates() {
        let stats = SharedStats::new();
        let writers: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_frame(Duration::from_millis(1));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        let snap = stats.snapshot();
        assert_eq!(snap.frames, 8 * 1000);
        assert!((snap.seconds - 8.0).abs() < 1e-6);
    }

    #[test]
    fn reset_zeroes_both_fields() {
        let stats = SharedStats::new();
        stats.add(5, Duration::from_secs(2));
        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot { frames: 0, seconds: 0.0 });
    }

    #[test]
    fn average_is_zero_without_frames() {
        assert_eq!(StatsSnapshot::default().average_seconds(), 0.0);
        let snap = StatsSnapshot { frames: 4, seconds: 2.0 };
        assert_eq!(snap.average_seconds(), 0.5);
    }
}
