//! Job executor module for Transcode Watcher
//!
//! Runs one encoder process for one queued file: streams its progress and
//! diagnostics to the configured files, then relocates or deletes the
//! source once the process exits.

use crate::config::Config;
use crate::encode::{build_handbrake_command, HandbrakeParams};
use crate::scan::CandidateFile;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

/// Size of the read buffer used for the encoder's output streams
const STREAM_CHUNK: usize = 8 * 1024;

/// Error type for job execution operations
#[derive(Debug, Error)]
pub enum JobError {
    /// Output directory could not be created
    #[error("Failed to create output directory {path}: {source}")]
    OutputDir { path: PathBuf, source: io::Error },

    /// Encoder process could not be started
    #[error("Failed to start encoder {program}: {source}")]
    Spawn { program: PathBuf, source: io::Error },

    /// Waiting on the encoder process failed
    #[error("Failed to wait for encoder: {0}")]
    Wait(io::Error),

    /// Moving, deleting or pruning after the encode failed
    #[error("Cleanup of {path} failed: {source}")]
    Cleanup { path: PathBuf, source: io::Error },
}

impl JobError {
    /// True when the encoder process was started before the failure,
    /// so running the same source again would repeat the encode
    pub fn encoder_ran(&self) -> bool {
        matches!(self, JobError::Wait(_) | JobError::Cleanup { .. })
    }
}

/// One admitted transcode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// File name shared by source, output and per-job log
    pub basename: String,
    /// Path to the source file
    pub source: PathBuf,
    /// Directory holding the source file
    pub directory: PathBuf,
    /// Path for the encoded output file
    pub output: PathBuf,
    /// Destination of the source after encoding, if archiving is enabled
    pub move_to: Option<PathBuf>,
    /// Per-job encoder log
    pub log_path: Option<PathBuf>,
    /// Progress file owned by this job
    pub progress_path: Option<PathBuf>,
}

impl Job {
    /// Derive every path of a job from a queued file and the configuration
    pub fn for_file(file: &CandidateFile, config: &Config) -> Self {
        let basename = file.basename();
        let progress_path = config.progress_output.as_ref().map(|path| {
            if config.concurrent > 1 {
                let mut per_job = OsString::from(path.as_os_str());
                per_job.push(".");
                per_job.push(&basename);
                PathBuf::from(per_job)
            } else {
                path.clone()
            }
        });

        Self {
            source: file.path.clone(),
            directory: file.directory().to_path_buf(),
            output: config.output_path.join(&basename),
            move_to: config.move_path.as_ref().map(|dir| dir.join(&basename)),
            log_path: config
                .handbrake_log
                .as_ref()
                .map(|dir| dir.join(format!("{}.log", basename))),
            progress_path,
            basename,
        }
    }
}

/// Terminal status of a job whose encoder ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub basename: String,
    pub source: PathBuf,
    pub output: PathBuf,
    /// Encoder exit code; `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl JobReport {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Human readable exit code for log lines
pub fn exit_label(code: Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

/// Job executor that runs encodes against the frozen configuration
///
/// Cloning is cheap; every spawned job task gets its own handle.
#[derive(Debug, Clone)]
pub struct JobExecutor {
    config: Arc<Config>,
}

impl JobExecutor {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Build the job for a queued file
    pub fn job_for(&self, file: &CandidateFile) -> Job {
        Job::for_file(file, &self.config)
    }

    /// Execute a job
    ///
    /// 1. Opens the per-job log (a failure only disables it)
    /// 2. Spawns the encoder with `--input`/`--output` and the configured arguments
    /// 3. Mirrors stdout chunks into the progress file (overwritten each time)
    ///    and appends stderr chunks to the per-job log
    /// 4. On exit, whatever the code: closes the log with a status line, removes
    ///    the progress file, moves or deletes the source and prunes its
    ///    subdirectory
    ///
    /// A non-zero exit code is reported in the `JobReport`, not as an error.
    pub async fn execute(&self, job: Job) -> Result<JobReport, JobError> {
        tracing::info!("Encoding: {} ...", job.basename);

        tokio::fs::create_dir_all(&self.config.output_path)
            .await
            .map_err(|source| JobError::OutputDir {
                path: self.config.output_path.clone(),
                source,
            })?;

        let mut log = match &job.log_path {
            Some(path) => match File::create(path).await {
                Ok(file) => Some(file),
                Err(e) => {
                    tracing::warn!("Cannot open encoder log {}: {}", path.display(), e);
                    None
                }
            },
            None => None,
        };

        let params = HandbrakeParams::new(
            self.config.handbrake_cli.clone(),
            job.source.clone(),
            job.output.clone(),
            self.config.transcoding.clone(),
        );
        let mut child = build_handbrake_command(&params)
            .spawn()
            .map_err(|source| JobError::Spawn {
                program: params.handbrake_cli.clone(),
                source,
            })?;

        let progress = pump_progress(
            child.stdout.take(),
            job.progress_path.as_deref(),
            &job.output,
        );
        let diagnostics = pump_log(child.stderr.take(), log.as_mut());
        let ((), (), status) = tokio::join!(progress, diagnostics, child.wait());
        let exit_code = status.map_err(JobError::Wait)?.code();

        if let Some(mut file) = log.take() {
            let line = format!("Finished with error code: {}\n", exit_label(exit_code));
            if let Err(e) = finish_log(&mut file, &line).await {
                tracing::warn!("Cannot close encoder log for {}: {}", job.basename, e);
            }
        }

        if let Some(path) = &job.progress_path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Cannot remove progress file {}: {}", path.display(), e),
            }
        }

        self.dispose_source(&job).await?;

        if exit_code == Some(0) {
            tracing::info!("{} Done. (code: 0)", job.basename);
        } else {
            tracing::warn!("{} Done. (code: {})", job.basename, exit_label(exit_code));
        }

        Ok(JobReport {
            basename: job.basename,
            source: job.source,
            output: job.output,
            exit_code,
        })
    }

    /// Move the source to the archive, or delete it when it sat directly in
    /// the input root. A source in a subdirectory takes the directory with it.
    async fn dispose_source(&self, job: &Job) -> Result<(), JobError> {
        let in_root = job.directory == self.config.input_path;

        if let Some(dest) = &job.move_to {
            relocate(&job.source, dest)
                .await
                .map_err(cleanup_error(&job.source))?;
        } else if in_root {
            tokio::fs::remove_file(&job.source)
                .await
                .map_err(cleanup_error(&job.source))?;
        }

        if !in_root {
            tokio::fs::remove_dir(&job.directory)
                .await
                .map_err(cleanup_error(&job.directory))?;
        }

        Ok(())
    }
}

/// Drain the encoder's stdout, rewriting the progress file with each chunk
///
/// The stream is always drained so the encoder never blocks on a full pipe.
async fn pump_progress<R: AsyncRead + Unpin>(
    stream: Option<R>,
    progress_path: Option<&Path>,
    output: &Path,
) {
    let Some(mut stream) = stream else {
        return;
    };
    let mut buf = vec![0u8; STREAM_CHUNK];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Encoder progress stream failed: {}", e);
                break;
            }
        };

        if let Some(path) = progress_path {
            let text = String::from_utf8_lossy(&buf[..n]).replace('\r', "");
            let contents = format!("File: {}\n{}", output.display(), text);
            if let Err(e) = tokio::fs::write(path, contents).await {
                tracing::debug!("Cannot write progress file {}: {}", path.display(), e);
            }
        }
    }
}

/// Drain the encoder's stderr into the per-job log, `\r` rewritten as newlines
async fn pump_log<R: AsyncRead + Unpin>(stream: Option<R>, mut log: Option<&mut File>) {
    let Some(mut stream) = stream else {
        return;
    };
    let mut buf = vec![0u8; STREAM_CHUNK];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Encoder log stream failed: {}", e);
                break;
            }
        };

        if let Some(file) = log.as_deref_mut() {
            let text = String::from_utf8_lossy(&buf[..n]).replace('\r', "\n");
            if let Err(e) = file.write_all(text.as_bytes()).await {
                tracing::warn!("Cannot write encoder log: {}", e);
                log = None;
            }
        }
    }
}

fn cleanup_error(path: &Path) -> impl FnOnce(io::Error) -> JobError {
    let path = path.to_path_buf();
    move |source| JobError::Cleanup { path, source }
}

async fn finish_log(file: &mut File, line: &str) -> io::Result<()> {
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

/// Rename, falling back to copy + remove when the rename fails
/// (e.g. when the archive lives on another filesystem)
async fn relocate(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(rename_err) => match tokio::fs::copy(from, to).await {
            Ok(_) => tokio::fs::remove_file(from).await,
            Err(_) => Err(rename_err),
        },
    }
}
