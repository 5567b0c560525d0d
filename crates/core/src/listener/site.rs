//! Install and uninstall job outcomes.

use async_trait::async_trait;
use tracing::info;

use super::{clean_job_directory, read_optional, JobOutcome};
use crate::condor::WatchedJob;
use crate::events::{EventQueue, Failure, SiteEvent, SiteEventCode};

/// Output file the installer writes its errors to; empty means success.
const STATUS_FILE: &str = "status";

/// Which site job is being watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SiteJob {
    Install,
    Uninstall,
}

impl SiteJob {
    fn name(self) -> &'static str {
        match self {
            SiteJob::Install => "Install",
            SiteJob::Uninstall => "Uninstall",
        }
    }

    fn success(self) -> SiteEventCode {
        match self {
            SiteJob::Install => SiteEventCode::InstallSuccess,
            SiteJob::Uninstall => SiteEventCode::UninstallSuccess,
        }
    }

    fn failure(self) -> SiteEventCode {
        match self {
            SiteJob::Install => SiteEventCode::InstallFailed,
            SiteJob::Uninstall => SiteEventCode::UninstallFailed,
        }
    }
}

/// Reports an install or uninstall job back to its site.
pub struct SiteJobOutcome {
    site_id: i64,
    job: SiteJob,
    queue: EventQueue,
}

impl SiteJobOutcome {
    fn fail(&self, failure: Failure) {
        self.queue
            .add(SiteEvent::new(self.site_id, self.job.failure()).with_failure(failure));
    }

    async fn check_status(&self, job: &WatchedJob) -> std::io::Result<Option<Failure>> {
        let status = tokio::fs::read_to_string(job.files().dir().join(STATUS_FILE)).await?;
        if status.trim().is_empty() {
            return Ok(None);
        }

        let stdout = read_optional(&job.files().output()).await?.unwrap_or_default();
        let stderr = read_optional(&job.files().error()).await?.unwrap_or_default();
        Ok(Some(
            Failure::new(format!("{} job failed", self.job.name())).with_detail(format!(
                "ERRORS:\n{}\n\nSTDOUT:\n{}\n\nSTDERR:\n{}",
                status, stdout, stderr
            )),
        ))
    }
}

#[async_trait]
impl JobOutcome for SiteJobOutcome {
    async fn terminated(&mut self, job: &WatchedJob) {
        match self.check_status(job).await {
            Ok(None) => {
                info!("Site {}: {} job succeeded", self.site_id, self.job.name());
                clean_job_directory(job).await;
                self.queue.add(SiteEvent::new(self.site_id, self.job.success()));
            }
            Ok(Some(failure)) => self.fail(failure),
            Err(e) => self.fail(
                Failure::new(format!(
                    "Unable to read {} job output file(s)",
                    self.job.name().to_lowercase()
                ))
                .with_detail(e.to_string()),
            ),
        }
    }

    fn failed(&mut self, failure: Failure) {
        self.fail(failure);
    }

    fn aborted(&mut self, reason: Option<String>) {
        let failure = match reason {
            Some(reason) => Failure::new(reason),
            None => Failure::new(format!("{} job aborted", self.job.name())),
        };
        self.fail(failure);
    }
}

impl SiteJobOutcome {
    /// Outcome of the install job of `site_id`.
    pub fn install(site_id: i64, queue: EventQueue) -> Self {
        Self {
            site_id,
            job: SiteJob::Install,
            queue,
        }
    }

    /// Outcome of the uninstall job of `site_id`.
    pub fn uninstall(site_id: i64, queue: EventQueue) -> Self {
        Self {
            site_id,
            job: SiteJob::Uninstall,
            queue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condor::{EventGenerator, JobFiles};
    use crate::events::Event;
    use crate::listener::JobTracker;
    use crate::testing::MockScheduler;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    const TERMINATED: &str = "005 (8.000.000) 10/18 10:00:03 Job terminated.\n...\n";

    async fn run(outcome: SiteJobOutcome, files: JobFiles) {
        let (tx, _) = broadcast::channel(1);
        let mut generator =
            EventGenerator::new(files, "8.0", Duration::from_millis(10), tx.subscribe());
        generator.add_listener(Box::new(JobTracker::new(
            outcome,
            Arc::new(MockScheduler::new()),
        )));
        tokio::time::timeout(Duration::from_secs(5), generator.run())
            .await
            .unwrap();
    }

    fn site_event(rx: &mut broadcast::Receiver<Event>) -> SiteEvent {
        match rx.try_recv().unwrap() {
            Event::Site(event) => event,
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_status_is_success_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let job_dir = dir.path().join("install");
        std::fs::create_dir_all(&job_dir).unwrap();
        let files = JobFiles::new(&job_dir);
        std::fs::write(files.log(), TERMINATED).unwrap();
        std::fs::write(job_dir.join(STATUS_FILE), "").unwrap();

        let (queue, _receivers) = EventQueue::new(1);
        let mut rx = queue.subscribe();
        run(SiteJobOutcome::install(4, queue), files).await;

        let event = site_event(&mut rx);
        assert_eq!(event.site_id, 4);
        assert_eq!(event.code, SiteEventCode::InstallSuccess);
        assert!(!job_dir.exists());
    }

    #[tokio::test]
    async fn test_status_errors_fail_with_output() {
        let dir = TempDir::new().unwrap();
        let files = JobFiles::new(dir.path());
        std::fs::write(files.log(), TERMINATED).unwrap();
        std::fs::write(dir.path().join(STATUS_FILE), "unable to fetch package").unwrap();
        std::fs::write(files.error(), "wget: 404").unwrap();

        let (queue, _receivers) = EventQueue::new(1);
        let mut rx = queue.subscribe();
        run(SiteJobOutcome::uninstall(4, queue), files).await;

        let event = site_event(&mut rx);
        assert_eq!(event.code, SiteEventCode::UninstallFailed);
        let failure = event.failure.unwrap();
        assert_eq!(failure.message, "Uninstall job failed");
        let detail = failure.detail.unwrap();
        assert!(detail.contains("unable to fetch package"));
        assert!(detail.contains("wget: 404"));
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_missing_status_fails() {
        let dir = TempDir::new().unwrap();
        let files = JobFiles::new(dir.path());
        std::fs::write(files.log(), TERMINATED).unwrap();

        let (queue, _receivers) = EventQueue::new(1);
        let mut rx = queue.subscribe();
        run(SiteJobOutcome::install(1, queue), files).await;

        let event = site_event(&mut rx);
        assert_eq!(event.code, SiteEventCode::InstallFailed);
        assert_eq!(
            event.failure.unwrap().message,
            "Unable to read install job output file(s)"
        );
    }

    #[tokio::test]
    async fn test_abort_is_install_failure() {
        let dir = TempDir::new().unwrap();
        let files = JobFiles::new(dir.path());
        std::fs::write(
            files.log(),
            "009 (8.000.000) 10/18 10:00:02 Job was aborted by the user.\n...\n",
        )
        .unwrap();

        let (queue, _receivers) = EventQueue::new(1);
        let mut rx = queue.subscribe();
        run(SiteJobOutcome::install(1, queue), files).await;

        let event = site_event(&mut rx);
        assert_eq!(event.code, SiteEventCode::InstallFailed);
        assert_eq!(event.failure.unwrap().message, "Install job aborted");
    }
}
