//! Adapters from batch job log events to site and glidein events.
//!
//! [`JobTracker`] does the bookkeeping common to every job: it terminates the
//! generator on the final record, cancels a held job once, and remembers the
//! hold reason so an abort can report it. A [`JobOutcome`] turns the result
//! into a domain event.

mod glidein;
mod site;

pub use glidein::GlideinOutcome;
pub use site::SiteJobOutcome;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::condor::{JobEvent, JobEventCode, JobListener, Scheduler, WatchedJob};
use crate::events::Failure;

/// What a job's lifecycle means for the entity that owns it.
#[async_trait]
pub trait JobOutcome: Send {
    /// The gateway accepted the job.
    fn queued(&mut self) {}

    /// The job started executing.
    fn running(&mut self) {}

    /// The job ran to completion; decide from its files whether it succeeded.
    async fn terminated(&mut self, job: &WatchedJob);

    fn failed(&mut self, failure: Failure);

    /// The job was removed from the queue. `reason` is the last hold message, if any.
    fn aborted(&mut self, reason: Option<String>);
}

/// A [`JobListener`] driving one [`JobOutcome`].
pub struct JobTracker<O> {
    outcome: O,
    scheduler: Arc<dyn Scheduler>,
    cancel_requested: bool,
    hold_reason: Option<String>,
}

impl<O: JobOutcome> JobTracker<O> {
    pub fn new(outcome: O, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            outcome,
            scheduler,
            cancel_requested: false,
            hold_reason: None,
        }
    }
}

#[async_trait]
impl<O: JobOutcome + 'static> JobListener for JobTracker<O> {
    async fn on_event(&mut self, event: &JobEvent, job: &mut WatchedJob) {
        match event.code {
            JobEventCode::GridSubmit | JobEventCode::GlobusSubmit => self.outcome.queued(),
            JobEventCode::Execute => self.outcome.running(),
            JobEventCode::JobTerminated => {
                job.terminate();
                self.outcome.terminated(job).await;
            }
            JobEventCode::Exception
            | JobEventCode::ShadowException
            | JobEventCode::RemoteError => {
                self.outcome
                    .failed(Failure::new(event.reason()).with_detail(event.details.clone()));
            }
            JobEventCode::JobHeld
            | JobEventCode::GlobusSubmitFailed
            | JobEventCode::GlobusResourceDown
            | JobEventCode::GridResourceDown => {
                self.hold_reason = Some(event.reason().to_string());
                if !self.cancel_requested {
                    // The job may already be gone when reattaching after a restart.
                    self.cancel_requested = true;
                    if let Err(e) = self.scheduler.cancel(job.job_id()).await {
                        warn!("Unable to abort held job {}: {}", job.job_id(), e);
                    }
                }
            }
            JobEventCode::JobAborted => {
                job.terminate();
                self.outcome.aborted(self.hold_reason.take());
            }
            other => debug!("Job {}: ignoring {:?}", job.job_id(), other),
        }
    }
}

/// Box a tracker for `outcome`, ready to hand to [`Scheduler::submit`].
pub fn track<O: JobOutcome + 'static>(
    outcome: O,
    scheduler: Arc<dyn Scheduler>,
) -> Box<dyn JobListener> {
    Box::new(JobTracker::new(outcome, scheduler))
}

/// Read a job output file, treating a missing file as `None`.
async fn read_optional(path: &std::path::Path) -> std::io::Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Remove a finished job's directory, logging instead of failing.
async fn clean_job_directory(job: &WatchedJob) {
    if let Err(e) = job.files().remove().await {
        warn!(
            "Unable to remove job directory {}: {}",
            job.files().dir().display(),
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condor::{BatchJob, CondorError, EventGenerator, JobFiles};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    #[derive(Default)]
    struct Calls {
        outcomes: Vec<String>,
        cancels: Vec<String>,
    }

    struct Recorder(Arc<Mutex<Calls>>);

    #[async_trait]
    impl JobOutcome for Recorder {
        fn queued(&mut self) {
            self.0.lock().unwrap().outcomes.push("queued".to_string());
        }

        fn running(&mut self) {
            self.0.lock().unwrap().outcomes.push("running".to_string());
        }

        async fn terminated(&mut self, _job: &WatchedJob) {
            self.0.lock().unwrap().outcomes.push("terminated".to_string());
        }

        fn failed(&mut self, failure: Failure) {
            self.0
                .lock()
                .unwrap()
                .outcomes
                .push(format!("failed: {}", failure.message));
        }

        fn aborted(&mut self, reason: Option<String>) {
            self.0
                .lock()
                .unwrap()
                .outcomes
                .push(format!("aborted: {}", reason.unwrap_or_default()));
        }
    }

    struct CancelRecorder(Arc<Mutex<Calls>>);

    #[async_trait]
    impl Scheduler for CancelRecorder {
        async fn submit(
            &self,
            _job: &mut BatchJob,
            _listener: Box<dyn JobListener>,
        ) -> Result<String, CondorError> {
            unreachable!()
        }

        async fn cancel(&self, job_id: &str) -> Result<(), CondorError> {
            self.0.lock().unwrap().cancels.push(job_id.to_string());
            Ok(())
        }

        fn watch(&self, _files: &JobFiles, _job_id: &str, _listener: Box<dyn JobListener>) {}
    }

    async fn run_log(log: &str) -> Calls {
        let dir = TempDir::new().unwrap();
        let files = JobFiles::new(dir.path());
        std::fs::write(files.log(), log).unwrap();

        let calls = Arc::new(Mutex::new(Calls::default()));
        let tracker = JobTracker::new(
            Recorder(calls.clone()),
            Arc::new(CancelRecorder(calls.clone())),
        );
        let (tx, _) = broadcast::channel(1);
        let mut generator =
            EventGenerator::new(files, "3.0", Duration::from_millis(10), tx.subscribe());
        generator.add_listener(Box::new(tracker));
        tokio::time::timeout(Duration::from_secs(5), generator.run())
            .await
            .unwrap();

        let taken = std::mem::take(&mut *calls.lock().unwrap());
        taken
    }

    #[tokio::test]
    async fn test_normal_lifecycle() {
        let calls = run_log(
            "000 (3.000.000) 10/18 10:00:00 Job submitted\n...\n\
             027 (3.000.000) 10/18 10:00:01 Job submitted to grid resource\n...\n\
             001 (3.000.000) 10/18 10:00:02 Job executing on host\n...\n\
             005 (3.000.000) 10/18 10:00:03 Job terminated.\n...\n",
        )
        .await;
        assert_eq!(calls.outcomes, vec!["queued", "running", "terminated"]);
        assert!(calls.cancels.is_empty());
    }

    #[tokio::test]
    async fn test_held_job_is_cancelled_once_and_abort_carries_reason() {
        let calls = run_log(
            "012 (3.000.000) 10/18 10:00:00 Job was held.\n\
             \tGlobus error 31: the job manager failed to cancel the job\n...\n\
             012 (3.000.000) 10/18 10:00:01 Job was held.\n\
             \tGlobus error 31: still held\n...\n\
             009 (3.000.000) 10/18 10:00:02 Job was aborted by the user.\n...\n",
        )
        .await;
        assert_eq!(calls.cancels, vec!["3.0"]);
        assert_eq!(calls.outcomes, vec!["aborted: Globus error 31: still held"]);
    }

    #[tokio::test]
    async fn test_exception_fails() {
        let calls = run_log(
            "021 (3.000.000) 10/18 10:00:00 Error from starter\n\
             \tDisk quota exceeded\n...\n\
             009 (3.000.000) 10/18 10:00:02 Job was aborted by the user.\n...\n",
        )
        .await;
        assert_eq!(
            calls.outcomes,
            vec!["failed: Disk quota exceeded", "aborted: "]
        );
    }

    #[tokio::test]
    async fn test_read_optional() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status");
        assert!(read_optional(&path).await.unwrap().is_none());
        std::fs::write(&path, "").unwrap();
        assert_eq!(read_optional(&path).await.unwrap().as_deref(), Some(""));
    }
}
