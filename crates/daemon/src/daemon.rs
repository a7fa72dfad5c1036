//! Dispatch loop for Transcode Watcher
//!
//! Polls the input directory, filters candidates by stability, and drains
//! the resulting queue into a bounded set of encoder jobs. All scheduling
//! state lives on [`Daemon`] and is only touched by the loop itself; jobs
//! report back through their task results.

use crate::config::{Config, ConfigError};
use crate::job_executor::{exit_label, JobError, JobExecutor, JobReport};
use crate::queue::JobQueue;
use crate::scan::{scan_input, CandidateFile};
use crate::slots::SlotPool;
use crate::stability::filter_stable;
use crate::startup::{run_startup_checks, StartupError};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tokio::time::sleep;

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),
}

/// Phase of the dispatch loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchState {
    /// Nothing queued and no job running; the next step polls the input root
    IdlePoll,
    /// Candidates found by the last poll, awaiting the stability check
    Stabilizing(Vec<CandidateFile>),
    /// Queued files are being admitted as slots free up
    Draining,
}

/// Counters kept by the dispatch loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Directory polls performed
    pub polls: u64,
    /// Jobs started
    pub admitted: u64,
    /// Jobs whose encoder ran to exit and whose source was cleaned up
    pub completed: u64,
    /// Completed jobs whose encoder exited non-zero
    pub failed_exits: u64,
    /// Jobs that ended in an error or a panic
    pub faulted: u64,
    /// Highest number of simultaneously running jobs
    pub peak_active: usize,
}

type JobOutcome = (CandidateFile, Result<JobReport, JobError>);

/// Scheduler context owning the queue, the slot pool and the running jobs
pub struct Daemon {
    /// Configuration, frozen for the lifetime of the daemon
    pub config: Arc<Config>,
    executor: JobExecutor,
    queue: JobQueue,
    slots: SlotPool,
    jobs: JoinSet<JobOutcome>,
    /// Sources whose encode ran but could not be cleaned up; never admitted again
    retired: HashSet<PathBuf>,
    state: DispatchState,
    stats: DispatchStats,
}

impl Daemon {
    /// Initialize the daemon with a loaded configuration
    ///
    /// Runs the startup checks (encoder arguments, encoder binary) first.
    pub fn new(config: Config) -> Result<Self, DaemonError> {
        run_startup_checks(&config)?;
        Ok(Self::new_without_checks(config))
    }

    /// Load configuration from `location` (or defaults) and initialize
    pub fn load(location: Option<&Path>) -> Result<Self, DaemonError> {
        let config = Config::load(location)?;
        Self::new(config)
    }

    /// Initialize the daemon without running startup checks
    ///
    /// Useful for testing when the encoder is not installed.
    pub fn new_without_checks(config: Config) -> Self {
        let config = Arc::new(config);
        Self {
            executor: JobExecutor::new(config.clone()),
            slots: SlotPool::new(config.concurrent as usize),
            queue: JobQueue::new(),
            jobs: JoinSet::new(),
            retired: HashSet::new(),
            state: DispatchState::IdlePoll,
            stats: DispatchStats::default(),
            config,
        }
    }

    pub fn state(&self) -> &DispatchState {
        &self.state
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Number of jobs holding a slot
    pub fn active_jobs(&self) -> usize {
        self.slots.active()
    }

    /// Number of files waiting for a slot
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// True when `path` will be ignored by later polls
    pub fn is_retired(&self, path: &Path) -> bool {
        self.retired.contains(path)
    }

    /// Advance the loop by one transition
    ///
    /// - Idle-Poll: scan; with nothing found wait `loop_timeout` and stay idle
    /// - Stabilizing: sample twice `change_timeout` apart and queue the stable
    ///   files; with none left wait `loop_timeout` and go back to idle
    /// - Draining: fill free slots from the queue, then wait for one job to
    ///   finish; once the queue is empty and every slot is free, go idle
    pub async fn step(&mut self) {
        let state = std::mem::replace(&mut self.state, DispatchState::IdlePoll);
        self.state = match state {
            DispatchState::IdlePoll => self.poll().await,
            DispatchState::Stabilizing(candidates) => self.stabilize(candidates).await,
            DispatchState::Draining => self.drain().await,
        };
    }

    /// Run until `shutdown` resolves, then stop every running job
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.step() => {}
            }
        }
        self.shutdown().await;
    }

    /// Abort running jobs; their encoders are killed with them
    ///
    /// Sources of aborted jobs are left untouched.
    pub async fn shutdown(&mut self) {
        if !self.jobs.is_empty() {
            tracing::warn!("Stopping {} running encode(s)", self.jobs.len());
        }
        self.jobs.shutdown().await;
        while !self.slots.is_idle() {
            self.slots.release();
        }
        self.queue = JobQueue::new();
        self.state = DispatchState::IdlePoll;
    }

    async fn poll(&mut self) -> DispatchState {
        self.stats.polls += 1;
        self.retired.retain(|path| path.exists());
        let mut candidates = scan_input(&self.config.input_path, &self.config.input_file);
        candidates.retain(|file| !self.retired.contains(&file.path));

        if candidates.is_empty() {
            tracing::info!("No change, waiting...");
            sleep(self.config.loop_interval()).await;
            return DispatchState::IdlePoll;
        }

        tracing::debug!(count = candidates.len(), "candidates found");
        DispatchState::Stabilizing(candidates)
    }

    async fn stabilize(&mut self, candidates: Vec<CandidateFile>) -> DispatchState {
        let stable = filter_stable(candidates, self.config.change_delay()).await;
        self.queue = JobQueue::from_stable(stable);

        if self.queue.is_empty() {
            tracing::info!("No stable file, waiting...");
            sleep(self.config.loop_interval()).await;
            return DispatchState::IdlePoll;
        }

        tracing::info!(
            "{} file(s) queued, {} slot(s)",
            self.queue.len(),
            self.slots.max_concurrent()
        );
        DispatchState::Draining
    }

    async fn drain(&mut self) -> DispatchState {
        self.admit_ready();

        if self.slots.is_idle() {
            return DispatchState::IdlePoll;
        }

        match self.jobs.join_next().await {
            Some(joined) => self.complete(joined),
            None => {
                // no task left to wait on
                while !self.slots.is_idle() {
                    self.slots.release();
                }
            }
        }

        if self.queue.is_empty() && self.slots.is_idle() {
            DispatchState::IdlePoll
        } else {
            DispatchState::Draining
        }
    }

    /// Admit queued files into every free slot
    fn admit_ready(&mut self) {
        while self.slots.has_capacity() {
            let Some(file) = self.queue.pop() else {
                break;
            };
            if self.slots.try_admit() {
                self.spawn_job(file);
            }
        }
    }

    fn spawn_job(&mut self, file: CandidateFile) {
        let executor = self.executor.clone();
        let job = executor.job_for(&file);

        self.stats.admitted += 1;
        self.stats.peak_active = self.slots.peak();
        tracing::debug!(
            file = %file.path.display(),
            active = self.slots.active(),
            "job admitted"
        );

        self.jobs.spawn(async move {
            let result = executor.execute(job).await;
            (file, result)
        });
    }

    /// Consume one job's result and free its slot
    fn complete(&mut self, joined: Result<JobOutcome, JoinError>) {
        self.slots.release();

        match joined {
            Ok((_, Ok(report))) => {
                self.stats.completed += 1;
                if !report.success() {
                    self.stats.failed_exits += 1;
                    tracing::warn!(
                        "{} exited with code {}; not retried",
                        report.basename,
                        exit_label(report.exit_code)
                    );
                }
            }
            Ok((file, Err(e))) => {
                self.stats.faulted += 1;
                tracing::error!("{} failed: {}", file.basename(), e);
                if e.encoder_ran() {
                    tracing::warn!(
                        "{} left in place, it will not be encoded again",
                        file.path.display()
                    );
                    self.retired.insert(file.path);
                }
            }
            Err(e) => {
                self.stats.faulted += 1;
                tracing::error!("Job task aborted: {}", e);
            }
        }
    }
}
