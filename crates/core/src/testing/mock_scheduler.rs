//! Mock batch scheduler for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;

use crate::condor::{
    prepare_job_directory, BatchJob, CondorError, EventGenerator, JobFiles, JobListener,
    Scheduler,
};

/// A recorded submission for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub job_id: String,
    /// Job directory the submit description was written to.
    pub dir: PathBuf,
    pub executable: String,
    pub arguments: Vec<String>,
}

/// Mock implementation of the [`Scheduler`] trait.
///
/// Submissions are written to disk exactly as Condor would see them, but
/// nothing runs: tests drive each job by appending records to its log, and
/// the real [`EventGenerator`] picks them up.
///
/// # Example
///
/// ```rust,ignore
/// let scheduler = MockScheduler::new();
/// // ... the engine submits an install job ...
/// let job_id = scheduler.submissions()[0].job_id.clone();
/// scheduler.complete_job(&job_id).await;
/// ```
#[derive(Debug)]
pub struct MockScheduler {
    /// Files of every known job, by id.
    jobs: Mutex<HashMap<String, JobFiles>>,
    submissions: Mutex<Vec<RecordedSubmission>>,
    cancelled: Mutex<Vec<String>>,
    /// If set, the next submit fails with this error.
    next_error: Mutex<Option<CondorError>>,
    /// When set, `cancel` leaves the abort record to [`MockScheduler::abort_job`].
    defer_aborts: AtomicBool,
    next_cluster: AtomicU32,
    poll_interval: Duration,
    shutdown_tx: broadcast::Sender<()>,
}

impl Default for MockScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            jobs: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            next_error: Mutex::new(None),
            defer_aborts: AtomicBool::new(false),
            next_cluster: AtomicU32::new(1),
            poll_interval: Duration::from_millis(10),
            shutdown_tx,
        }
    }

    /// Make the next submit fail.
    pub fn fail_next_submit(&self, error: CondorError) {
        *self.next_error.lock().unwrap() = Some(error);
    }

    /// Hold back the abort record of cancelled jobs until `abort_job` is called.
    pub fn defer_aborts(&self) {
        self.defer_aborts.store(true, Ordering::SeqCst);
    }

    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    /// Ids passed to `cancel`, in call order.
    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    /// Id of the most recent job submitted from a directory ending in `suffix`.
    pub fn last_job_in(&self, suffix: &str) -> Option<String> {
        self.submissions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.dir.ends_with(suffix))
            .map(|s| s.job_id.clone())
    }

    /// The job reached the remote gatekeeper.
    pub async fn queue_job(&self, job_id: &str) {
        self.append(
            job_id,
            27,
            "Job submitted to grid resource",
            &["GridResource: gt2 gk.example.org/jobmanager-pbs"],
        )
        .await;
    }

    pub async fn run_job(&self, job_id: &str) {
        self.append(job_id, 1, "Job executing on host: gt2 gk.example.org", &[])
            .await;
    }

    /// Terminate the job with empty status and error files.
    pub async fn complete_job(&self, job_id: &str) {
        if let Some(files) = self.files(job_id) {
            write_file(&files.dir().join("status"), "").await;
            write_file(&files.error(), "").await;
        }
        self.terminate(job_id).await;
    }

    /// Terminate the job, leaving `stderr` as its status and error output.
    pub async fn fail_job(&self, job_id: &str, stderr: &str) {
        if let Some(files) = self.files(job_id) {
            write_file(&files.dir().join("status"), stderr).await;
            write_file(&files.error(), stderr).await;
        }
        self.terminate(job_id).await;
    }

    pub async fn abort_job(&self, job_id: &str) {
        self.append(job_id, 9, "Job was aborted by the user.", &["via condor_rm"])
            .await;
    }

    pub async fn hold_job(&self, job_id: &str, reason: &str) {
        self.append(job_id, 12, "Job was held.", &[reason]).await;
    }

    async fn terminate(&self, job_id: &str) {
        self.append(
            job_id,
            5,
            "Job terminated.",
            &["(1) Normal termination (return value 0)"],
        )
        .await;
    }

    fn files(&self, job_id: &str) -> Option<JobFiles> {
        self.jobs.lock().unwrap().get(job_id).cloned()
    }

    /// Append one record to the job's log. Unknown jobs are ignored.
    async fn append(&self, job_id: &str, code: u32, message: &str, body: &[&str]) {
        let Some(files) = self.files(job_id) else {
            return;
        };
        let (cluster, proc_) = crate::condor::parse_job_id(job_id).unwrap_or((0, 0));

        let mut record = format!(
            "{:03} ({:03}.{:03}.000) {} {}\n",
            code,
            cluster,
            proc_,
            Utc::now().format("%m/%d %H:%M:%S"),
            message
        );
        for line in body {
            record.push('\t');
            record.push_str(line);
            record.push('\n');
        }
        record.push_str("...\n");

        let mut log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(files.log())
            .await
            .unwrap();
        log.write_all(record.as_bytes()).await.unwrap();
        log.flush().await.unwrap();
    }
}

async fn write_file(path: &Path, contents: &str) {
    tokio::fs::write(path, contents).await.unwrap();
}

#[async_trait]
impl Scheduler for MockScheduler {
    async fn submit(
        &self,
        job: &mut BatchJob,
        listener: Box<dyn JobListener>,
    ) -> Result<String, CondorError> {
        if let Some(error) = self.next_error.lock().unwrap().take() {
            return Err(error);
        }

        prepare_job_directory(job).await?;

        let job_id = format!("{}.0", self.next_cluster.fetch_add(1, Ordering::SeqCst));
        job.files().save_job_id(&job_id).await?;
        job.job_id = Some(job_id.clone());

        self.submissions.lock().unwrap().push(RecordedSubmission {
            job_id: job_id.clone(),
            dir: job.files().dir().to_path_buf(),
            executable: job.executable.clone(),
            arguments: job.arguments.clone(),
        });
        self.jobs
            .lock()
            .unwrap()
            .insert(job_id.clone(), job.files().clone());

        self.append(&job_id, 0, "Job submitted from host: <127.0.0.1:9618>", &[])
            .await;
        self.watch(job.files(), &job_id, listener);
        Ok(job_id)
    }

    async fn cancel(&self, job_id: &str) -> Result<(), CondorError> {
        self.cancelled.lock().unwrap().push(job_id.to_string());
        if !self.defer_aborts.load(Ordering::SeqCst) {
            self.abort_job(job_id).await;
        }
        Ok(())
    }

    fn watch(&self, files: &JobFiles, job_id: &str, listener: Box<dyn JobListener>) {
        self.jobs
            .lock()
            .unwrap()
            .insert(job_id.to_string(), files.clone());

        let mut generator = EventGenerator::new(
            files.clone(),
            job_id,
            self.poll_interval,
            self.shutdown_tx.subscribe(),
        );
        generator.add_listener(listener);
        generator.spawn();
    }

    fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condor::{GridType, JobEvent, JobEventCode, WatchedJob};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Recorder {
        seen: Arc<Mutex<Vec<JobEventCode>>>,
    }

    #[async_trait]
    impl JobListener for Recorder {
        async fn on_event(&mut self, event: &JobEvent, job: &mut WatchedJob) {
            self.seen.lock().unwrap().push(event.code);
            if matches!(
                event.code,
                JobEventCode::JobTerminated | JobEventCode::JobAborted
            ) {
                job.terminate();
            }
        }
    }

    fn job(dir: &Path) -> BatchJob {
        BatchJob::new(dir, GridType::Gt2, "gk.example.org/jobmanager-fork", "/bin/true")
    }

    async fn wait_for(seen: &Arc<Mutex<Vec<JobEventCode>>>, len: usize) {
        for _ in 0..500 {
            if seen.lock().unwrap().len() >= len {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("only saw {:?}", seen.lock().unwrap());
    }

    #[tokio::test]
    async fn test_submit_writes_job_and_delivers_log_records() {
        let dir = TempDir::new().unwrap();
        let scheduler = MockScheduler::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut batch_job = job(&dir.path().join("install"));
        batch_job.flag("-condorVersion", "7.2.0");
        let job_id = scheduler
            .submit(
                &mut batch_job,
                Box::new(Recorder {
                    seen: Arc::clone(&seen),
                }),
            )
            .await
            .unwrap();

        assert_eq!(job_id, "1.0");
        assert_eq!(batch_job.job_id.as_deref(), Some("1.0"));
        assert_eq!(batch_job.files().read_job_id().await.unwrap(), "1.0");
        assert!(batch_job.files().submit_file().exists());
        assert_eq!(scheduler.last_job_in("install"), Some("1.0".to_string()));
        assert_eq!(
            scheduler.submissions()[0].arguments,
            vec!["-condorVersion", "7.2.0"]
        );

        scheduler.run_job(&job_id).await;
        scheduler.complete_job(&job_id).await;
        wait_for(&seen, 3).await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                JobEventCode::Submit,
                JobEventCode::Execute,
                JobEventCode::JobTerminated
            ]
        );
    }

    #[tokio::test]
    async fn test_injected_failure_applies_once() {
        let dir = TempDir::new().unwrap();
        let scheduler = MockScheduler::new();
        scheduler.fail_next_submit(CondorError::log_parse("boom"));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut first = job(dir.path());
        assert!(scheduler
            .submit(&mut first, Box::new(Recorder { seen: Arc::clone(&seen) }))
            .await
            .is_err());
        assert_eq!(scheduler.submission_count(), 0);

        let mut second = job(dir.path());
        assert!(scheduler
            .submit(&mut second, Box::new(Recorder { seen }))
            .await
            .is_ok());
        assert_eq!(scheduler.submission_count(), 1);
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn test_cancel_records_id_and_aborts_job() {
        let dir = TempDir::new().unwrap();
        let scheduler = MockScheduler::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut batch_job = job(dir.path());
        let job_id = scheduler
            .submit(
                &mut batch_job,
                Box::new(Recorder {
                    seen: Arc::clone(&seen),
                }),
            )
            .await
            .unwrap();
        scheduler.cancel(&job_id).await.unwrap();
        scheduler.cancel("99.0").await.unwrap();

        wait_for(&seen, 2).await;
        assert_eq!(seen.lock().unwrap()[1], JobEventCode::JobAborted);
        assert_eq!(scheduler.cancelled(), vec![job_id, "99.0".to_string()]);
    }
}
