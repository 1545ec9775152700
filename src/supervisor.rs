use crate::codec::{ImageCodec, TiffCodec};
use crate::config::ConverterConfig;
use crate::error::{Error, Result};
use crate::queue::{self, IngestSender, PathEntry, ShutdownSignal};
use crate::sorter::Sorter;
use crate::stats::{SharedStats, StatsSnapshot};
use crate::worker::Worker;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// How a worker thread ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Clean,
    Panicked,
}

/// Supervisor-side record of one spawned worker
#[derive(Debug)]
pub struct WorkerHandle {
    id: usize,
    name: String,
    thread: Option<JoinHandle<()>>,
    exit: Option<WorkerExit>,
}

impl WorkerHandle {
    fn new(id: usize, name: String, thread: JoinHandle<()>) -> Self {
        Self {
            id,
            name,
            thread: Some(thread),
            exit: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Non-blocking: joins the thread once it has finished and records how
    /// it ended. `None` while the worker is still running.
    pub fn poll_exit(&mut self) -> Option<WorkerExit> {
        if self.exit.is_some() {
            return self.exit;
        }
        if !self.thread.as_ref()?.is_finished() {
            return None;
        }
        let exit = match self.thread.take()?.join() {
            Ok(()) => WorkerExit::Clean,
            Err(_) => {
                error!("{} panicked", self.name);
                WorkerExit::Panicked
            }
        };
        self.exit = Some(exit);
        self.exit
    }
}

/// Owns the queues, the shared counters, the sorter thread and the worker
/// pool for their whole lifetime.
pub struct Supervisor {
    config: ConverterConfig,
    ingest: IngestSender,
    stats: Arc<SharedStats>,
    sorter_stop: ShutdownSignal,
    worker_stop: ShutdownSignal,
    sorter: Option<JoinHandle<()>>,
    workers: Vec<WorkerHandle>,
}

impl Supervisor {
    /// Start the pool with the TIFF codec
    pub fn start(config: ConverterConfig) -> Result<Self> {
        Self::start_with_codec(config, Arc::new(TiffCodec))
    }

    /// Spawn the sorter and `config.worker_count` workers.
    ///
    /// If any worker fails to spawn, everything already started is stopped
    /// and joined before the error is returned.
    pub fn start_with_codec(config: ConverterConfig, codec: Arc<dyn ImageCodec>) -> Result<Self> {
        config.validate()?;

        let (ingest_tx, ingest_rx) = queue::ingestion_queue();
        let (job_tx, job_rx) = queue::conversion_queue();
        let stats = SharedStats::new();
        let sorter_stop = ShutdownSignal::new();
        let worker_stop = ShutdownSignal::new();

        let sorter = Sorter::new(ingest_rx, job_tx, sorter_stop.listener(), config.sorter_delay())
            .spawn()
            .map_err(|source| Error::Spawn {
                name: "sorter".into(),
                source,
            })?;

        let mut supervisor = Self {
            config,
            ingest: ingest_tx,
            stats,
            sorter_stop,
            worker_stop,
            sorter: Some(sorter),
            workers: Vec::new(),
        };

        for id in 0..supervisor.config.worker_count {
            let worker = Worker::new(
                id,
                &supervisor.config,
                job_rx.clone(),
                supervisor.worker_stop.listener(),
                Arc::clone(&supervisor.stats),
                Arc::clone(&codec),
            );
            let name = worker.name().to_string();
            match worker.spawn() {
                Ok(thread) => supervisor.workers.push(WorkerHandle::new(id, name, thread)),
                Err(source) => {
                    error!("failed to spawn {}: {}, stopping the pool", name, source);
                    supervisor.abort_start();
                    return Err(Error::Spawn { name, source });
                }
            }
        }

        info!("started {} worker(s)", supervisor.workers.len());
        Ok(supervisor)
    }

    /// Queue a path or batch for the sorter. Never blocks.
    pub fn ingest(&self, entry: impl Into<PathEntry>) {
        let entry = entry.into();
        if self.is_stopped() {
            warn!("pool is shut down, ignoring {:?}", entry);
            return;
        }
        debug!("ingesting {:?}", entry);
        if self.ingest.send(entry).is_err() {
            warn!("ingestion queue closed");
        }
    }

    /// Zero both counters; each under its own lock
    pub fn reset_stats(&self) {
        debug!("resetting statistics");
        self.stats.reset();
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn shared_stats(&self) -> Arc<SharedStats> {
        Arc::clone(&self.stats)
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Configured pool size
    pub fn worker_count(&self) -> usize {
        self.config.worker_count
    }

    pub fn live_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.is_alive()).count()
    }

    pub fn is_stopped(&self) -> bool {
        self.worker_stop.is_triggered()
    }

    /// Stop the sorter and every worker, waiting for each to exit.
    ///
    /// Workers finish their current cycle before they notice the signal, so
    /// this blocks for at least one poll delay. The wait is unbounded unless
    /// `shutdown_timeout_seconds` is configured; past that limit the
    /// remaining threads are detached and `ShutdownTimeout` is returned.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.is_stopped() && self.workers.is_empty() && self.sorter.is_none() {
            return Ok(());
        }
        info!("shutting down {} worker(s)", self.workers.len());
        self.worker_stop.trigger();
        self.sorter_stop.trigger();

        let started = Instant::now();
        let poll = self.config.shutdown_poll();
        let limit = self.config.shutdown_timeout();
        loop {
            let running = self
                .workers
                .iter_mut()
                .map(|w| w.poll_exit())
                .filter(Option::is_none)
                .count();
            debug!("{} of {} worker(s) still running", running, self.workers.len());
            if running == 0 {
                break;
            }
            if limit.is_some_and(|limit| started.elapsed() >= limit) {
                for worker in self.workers.iter().filter(|w| w.exit.is_none()) {
                    error!("{} did not stop in time, detaching it", worker.name);
                }
                self.workers.clear();
                self.join_sorter();
                return Err(Error::ShutdownTimeout(running));
            }
            thread::sleep(poll);
        }

        let panicked = self
            .workers
            .iter()
            .filter(|w| w.exit == Some(WorkerExit::Panicked))
            .count();
        if panicked > 0 {
            warn!("{} worker(s) ended with a panic", panicked);
        }
        self.workers.clear();
        self.join_sorter();
        info!("shutdown complete");
        Ok(())
    }

    /// Stop a partially started pool; teardown failures are logged since
    /// the spawn error is what gets reported
    fn abort_start(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("tearing down partial pool failed: {}", e);
        }
    }

    fn join_sorter(&mut self) {
        if let Some(sorter) = self.sorter.take() {
            if sorter.join().is_err() {
                error!("sorter panicked");
            }
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if !self.workers.is_empty() || self.sorter.is_some() {
            if let Err(e) = self.shutdown() {
                error!("shutdown on drop failed: {}", e);
            }
        }
    }
}
