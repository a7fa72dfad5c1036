//! Transcode Watcher
//!
//! Background service that watches a directory for finished video files and
//! hands each one to a bounded pool of HandBrake encoder processes.

pub mod daemon;
pub mod encode;
pub mod job_executor;
pub mod logging;
pub mod queue;
pub mod scan;
pub mod slots;
pub mod stability;
pub mod startup;

pub use daemon::{Daemon, DaemonError, DispatchState, DispatchStats};
pub use encode::{build_handbrake_command, HandbrakeParams};
pub use job_executor::{exit_label, Job, JobError, JobExecutor, JobReport};
pub use logging::{init_tracing, LogFile};
pub use queue::JobQueue;
pub use scan::{scan_input, CandidateFile};
pub use slots::SlotPool;
pub use stability::{compare_footprints, filter_stable, Footprint, StabilityResult};
pub use startup::{
    check_encoder_available, check_transcoding_args, detect_reserved_flag, run_startup_checks,
    StartupError,
};
pub use transcode_watcher_config as config;
pub use transcode_watcher_config::{Config, ConfigError};
