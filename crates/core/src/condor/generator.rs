//! Tails a job's user log and feeds parsed records to listeners.

use async_trait::async_trait;
use std::io::SeekFrom;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::event::{parse_record, JobEvent};
use super::job::JobFiles;
use super::CondorError;
use crate::metrics;

/// Receives every record read from a job's log, in order.
#[async_trait]
pub trait JobListener: Send {
    async fn on_event(&mut self, event: &JobEvent, job: &mut WatchedJob);
}

/// The job a generator is watching, as seen by its listeners.
#[derive(Debug)]
pub struct WatchedJob {
    files: JobFiles,
    job_id: String,
    terminated: bool,
}

impl WatchedJob {
    pub fn files(&self) -> &JobFiles {
        &self.files
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Stop the generator once the current record has reached every listener.
    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

/// Polls one job log until a listener terminates it.
pub struct EventGenerator {
    job: WatchedJob,
    listeners: Vec<Box<dyn JobListener>>,
    poll_interval: Duration,
    shutdown_rx: broadcast::Receiver<()>,
    position: u64,
    /// Bytes after the last newline, kept raw so split characters survive.
    pending: Vec<u8>,
    record: Vec<String>,
}

impl EventGenerator {
    pub fn new(
        files: JobFiles,
        job_id: impl Into<String>,
        poll_interval: Duration,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            job: WatchedJob {
                files,
                job_id: job_id.into(),
                terminated: false,
            },
            listeners: Vec::new(),
            poll_interval,
            shutdown_rx,
            position: 0,
            pending: Vec::new(),
            record: Vec::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn JobListener>) {
        self.listeners.push(listener);
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        metrics::ACTIVE_GENERATORS.inc();
        debug!("Watching log for job {}", self.job.job_id);

        loop {
            match self.read_records().await {
                Ok(records) => {
                    for record in records {
                        let event = match parse_record(&record, &self.job.job_id) {
                            Ok(Some(event)) => event,
                            Ok(None) => continue,
                            Err(e) => {
                                warn!("Job {}: {}", self.job.job_id, e);
                                JobEvent::exception(e.to_string())
                            }
                        };
                        self.deliver(&event).await;
                        if self.job.terminated {
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!("Unable to read log for job {}: {}", self.job.job_id, e);
                    let event = JobEvent::exception(format!("Unable to read job log: {}", e));
                    self.deliver(&event).await;
                    break;
                }
            }

            if self.job.terminated {
                break;
            }

            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    debug!("Generator for job {} shutting down", self.job.job_id);
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        metrics::ACTIVE_GENERATORS.dec();
        debug!("Stopped watching job {}", self.job.job_id);
    }

    async fn deliver(&mut self, event: &JobEvent) {
        debug!("Job {} event {:?}", self.job.job_id, event.code);
        for listener in self.listeners.iter_mut() {
            listener.on_event(event, &mut self.job).await;
        }
    }

    /// Read whatever was appended since the last poll and return complete records.
    async fn read_records(&mut self) -> Result<Vec<Vec<String>>, CondorError> {
        let log = self.job.files.log();
        let mut file = match tokio::fs::File::open(&log).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Condor creates the log lazily; only a vanished job directory is fatal.
                if self.job.files.dir().exists() {
                    return Ok(Vec::new());
                }
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata().await?.len();
        if len < self.position {
            warn!(
                "Log for job {} shrank, rereading from the start",
                self.job.job_id
            );
            self.position = 0;
            self.pending.clear();
            self.record.clear();
        }
        if len == self.position {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.position)).await?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await?;
        self.position += buf.len() as u64;
        self.pending.extend_from_slice(&buf);

        let mut records = Vec::new();
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.starts_with("...") {
                if !self.record.is_empty() {
                    records.push(std::mem::take(&mut self.record));
                }
            } else if !line.trim().is_empty() || !self.record.is_empty() {
                self.record.push(line.to_string());
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condor::JobEventCode;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Records codes and terminates on JOB_TERMINATED.
    struct Recorder {
        seen: Arc<Mutex<Vec<JobEventCode>>>,
    }

    #[async_trait]
    impl JobListener for Recorder {
        async fn on_event(&mut self, event: &JobEvent, job: &mut WatchedJob) {
            self.seen.lock().unwrap().push(event.code);
            if event.code == JobEventCode::JobTerminated {
                job.terminate();
            }
        }
    }

    fn setup() -> (TempDir, JobFiles, broadcast::Sender<()>) {
        let dir = TempDir::new().unwrap();
        let files = JobFiles::new(dir.path());
        let (tx, _) = broadcast::channel(1);
        (dir, files, tx)
    }

    fn generator(
        files: &JobFiles,
        tx: &broadcast::Sender<()>,
    ) -> (EventGenerator, Arc<Mutex<Vec<JobEventCode>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut generator =
            EventGenerator::new(files.clone(), "12.0", Duration::from_millis(10), tx.subscribe());
        generator.add_listener(Box::new(Recorder {
            seen: Arc::clone(&seen),
        }));
        (generator, seen)
    }

    #[tokio::test]
    async fn test_delivers_records_until_terminated() {
        let (_dir, files, tx) = setup();
        std::fs::write(
            files.log(),
            "000 (12.000.000) 10/18 10:00:00 Job submitted from host: <127.0.0.1>\n\
             ...\n\
             027 (12.000.000) 10/18 10:00:05 Job submitted to grid resource\n\
             \x20   GridResource: gt2 grid.example.org/jobmanager\n\
             ...\n\
             001 (12.000.000) 10/18 10:01:00 Job executing on host: gt2 grid.example.org\n\
             ...\n\
             005 (12.000.000) 10/18 10:05:00 Job terminated.\n\
             \t(1) Normal termination (return value 0)\n\
             ...\n\
             001 (12.000.000) 10/18 10:06:00 Never read\n\
             ...\n",
        )
        .unwrap();

        let (generator, seen) = generator(&files, &tx);
        tokio::time::timeout(Duration::from_secs(5), generator.run())
            .await
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                JobEventCode::Submit,
                JobEventCode::GridSubmit,
                JobEventCode::Execute,
                JobEventCode::JobTerminated,
            ]
        );
    }

    #[tokio::test]
    async fn test_follows_appended_records() {
        let (_dir, files, tx) = setup();
        let (generator, seen) = generator(&files, &tx);
        let handle = generator.spawn();

        tokio::time::sleep(Duration::from_millis(30)).await;
        std::fs::write(
            files.log(),
            "000 (12.000.000) 10/18 10:00:00 Job submitted\n...\n001 (12.000.000) 10/18",
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*seen.lock().unwrap(), vec![JobEventCode::Submit]);

        let mut log = std::fs::OpenOptions::new()
            .append(true)
            .open(files.log())
            .unwrap();
        std::io::Write::write_all(
            &mut log,
            b" 10:01:00 Job executing\n...\n005 (12.000.000) 10/18 10:02:00 Job terminated.\n...\n",
        )
        .unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                JobEventCode::Submit,
                JobEventCode::Execute,
                JobEventCode::JobTerminated
            ]
        );
    }

    /// Keeps hold reasons and terminates on JOB_TERMINATED.
    struct ReasonRecorder {
        reasons: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl JobListener for ReasonRecorder {
        async fn on_event(&mut self, event: &JobEvent, job: &mut WatchedJob) {
            match event.code {
                JobEventCode::JobHeld => {
                    self.reasons.lock().unwrap().push(event.reason().to_string());
                }
                JobEventCode::JobTerminated => job.terminate(),
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn test_character_split_between_polls_is_decoded_whole() {
        let (_dir, files, tx) = setup();
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let mut generator =
            EventGenerator::new(files.clone(), "12.0", Duration::from_millis(10), tx.subscribe());
        generator.add_listener(Box::new(ReasonRecorder {
            reasons: Arc::clone(&reasons),
        }));
        let handle = generator.spawn();

        let record = "012 (12.000.000) 10/18 10:00:00 Job was held.\n\tQuota dépassé\n...\n\
                      005 (12.000.000) 10/18 10:01:00 Job terminated.\n...\n"
            .as_bytes();
        let split = record.iter().position(|&b| b == 0xC3).unwrap() + 1;
        std::fs::write(files.log(), &record[..split]).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut log = std::fs::OpenOptions::new()
            .append(true)
            .open(files.log())
            .unwrap();
        std::io::Write::write_all(&mut log, &record[split..]).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*reasons.lock().unwrap(), vec!["Quota dépassé".to_string()]);
    }

    #[tokio::test]
    async fn test_bad_record_becomes_exception_and_tailing_continues() {
        let (_dir, files, tx) = setup();
        std::fs::write(
            files.log(),
            "this is not a header\n...\n005 (12.000.000) 10/18 10:05:00 Job terminated.\n...\n",
        )
        .unwrap();

        let (generator, seen) = generator(&files, &tx);
        tokio::time::timeout(Duration::from_secs(5), generator.run())
            .await
            .unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![JobEventCode::Exception, JobEventCode::JobTerminated]
        );
    }

    #[tokio::test]
    async fn test_missing_directory_stops_with_exception() {
        let (dir, files, tx) = setup();
        drop(dir);

        let (generator, seen) = generator(&files, &tx);
        tokio::time::timeout(Duration::from_secs(5), generator.run())
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![JobEventCode::Exception]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_generator() {
        let (_dir, files, tx) = setup();
        let (generator, seen) = generator(&files, &tx);
        let handle = generator.spawn();

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }
}
