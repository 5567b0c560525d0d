//! Submitting and cancelling jobs through the Condor command line tools.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::generator::{EventGenerator, JobListener};
use super::job::{BatchJob, JobFiles};
use super::CondorError;
use crate::config::SchedulerConfig;
use crate::credential;
use crate::metrics;

/// Access to the external batch scheduler.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Submit `job` and start watching its log with `listener`.
    ///
    /// On success the assigned id is stored in `job.job_id` and returned.
    async fn submit(
        &self,
        job: &mut BatchJob,
        listener: Box<dyn JobListener>,
    ) -> Result<String, CondorError>;

    /// Ask the scheduler to remove a job. The job's log later records the abort.
    async fn cancel(&self, job_id: &str) -> Result<(), CondorError>;

    /// Resume watching a job submitted by an earlier process.
    fn watch(&self, files: &JobFiles, job_id: &str, listener: Box<dyn JobListener>);

    /// Stop all log watchers.
    fn shutdown(&self) {}
}

static JOB_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\* Proc (\d+)\.(\d+):").unwrap());

/// Parse the job id printed by `condor_submit -verbose`.
pub fn parse_submit_output(stdout: &str) -> Option<String> {
    JOB_ID
        .captures(stdout)
        .map(|caps| format!("{}.{}", &caps[1], &caps[2]))
}

/// Write the credential and submit description, clearing any stale log.
pub async fn prepare_job_directory(job: &BatchJob) -> Result<(), CondorError> {
    let files = job.files();
    tokio::fs::create_dir_all(files.dir()).await?;

    if let Some(data) = &job.credential {
        credential::write_private(&files.credential(), data).await?;
    }

    tokio::fs::write(files.submit_file(), job.render_descriptor()).await?;

    match tokio::fs::remove_file(files.log()).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// [`Scheduler`] backed by `condor_submit` and `condor_rm`.
pub struct Condor {
    config: SchedulerConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl Condor {
    pub fn new(config: SchedulerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            shutdown_tx,
        }
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    fn command(&self, program: &str) -> Command {
        let mut command = Command::new(program);
        if let Some(condor_config) = &self.config.condor_config {
            command.env("CONDOR_CONFIG", condor_config);
        }
        command
    }

    async fn run(&self, mut command: Command, program: &str) -> Result<Output, CondorError> {
        command
            .output()
            .await
            .map_err(|source| CondorError::CommandNotRun {
                command: program.to_string(),
                source,
            })
    }

    async fn submit_inner(&self, job: &mut BatchJob) -> Result<String, CondorError> {
        prepare_job_directory(job).await?;

        let files = job.files().clone();
        let program = &self.config.submit_command;
        let mut command = self.command(program);
        command
            .arg("-verbose")
            .arg(files.submit_file())
            .current_dir(files.dir());

        let output = self.run(command, program).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            return Err(CondorError::SubmitFailed {
                code: output.status.code(),
                stdout,
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let job_id =
            parse_submit_output(&stdout).ok_or(CondorError::UnparseableJobId { stdout })?;
        files.save_job_id(&job_id).await?;
        job.job_id = Some(job_id.clone());
        Ok(job_id)
    }
}

#[async_trait]
impl Scheduler for Condor {
    async fn submit(
        &self,
        job: &mut BatchJob,
        listener: Box<dyn JobListener>,
    ) -> Result<String, CondorError> {
        match self.submit_inner(job).await {
            Ok(job_id) => {
                metrics::JOBS_SUBMITTED.with_label_values(&["success"]).inc();
                info!("Submitted job {} from {}", job_id, job.files().dir().display());
                self.watch(job.files(), &job_id, listener);
                Ok(job_id)
            }
            Err(e) => {
                metrics::JOBS_SUBMITTED.with_label_values(&["failure"]).inc();
                Err(e)
            }
        }
    }

    async fn cancel(&self, job_id: &str) -> Result<(), CondorError> {
        let program = &self.config.cancel_command;
        let mut command = self.command(program);
        command.arg(job_id);

        let output = self.run(command, program).await?;
        if !output.status.success() {
            metrics::JOBS_CANCELLED.with_label_values(&["failure"]).inc();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            warn!("Cancel of job {} failed: {}", job_id, stderr.trim());
            return Err(CondorError::CancelFailed {
                job_id: job_id.to_string(),
                code: output.status.code(),
                stderr,
            });
        }

        metrics::JOBS_CANCELLED.with_label_values(&["success"]).inc();
        info!("Cancelled job {}", job_id);
        Ok(())
    }

    fn watch(&self, files: &JobFiles, job_id: &str, listener: Box<dyn JobListener>) {
        let mut generator = EventGenerator::new(
            files.clone(),
            job_id,
            self.poll_interval(),
            self.shutdown_tx.subscribe(),
        );
        generator.add_listener(listener);
        generator.spawn();
    }

    fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
