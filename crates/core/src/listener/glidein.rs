//! Pilot job outcomes.

use async_trait::async_trait;
use tracing::info;

use super::{clean_job_directory, read_optional, JobOutcome};
use crate::condor::WatchedJob;
use crate::events::{EventQueue, Failure, GlideinEvent, GlideinEventCode};

/// Reports a pilot job back to its glidein.
pub struct GlideinOutcome {
    glidein_id: i64,
    queue: EventQueue,
}

impl GlideinOutcome {
    pub fn new(glidein_id: i64, queue: EventQueue) -> Self {
        Self { glidein_id, queue }
    }

    fn enqueue(&self, code: GlideinEventCode) {
        self.queue.add(GlideinEvent::new(self.glidein_id, code));
    }
}

#[async_trait]
impl JobOutcome for GlideinOutcome {
    fn queued(&mut self) {
        self.enqueue(GlideinEventCode::Queued);
    }

    fn running(&mut self) {
        self.enqueue(GlideinEventCode::Running);
    }

    async fn terminated(&mut self, job: &WatchedJob) {
        // The gateway can't be trusted with exit codes; a clean stderr is the success signal.
        match read_optional(&job.files().error()).await {
            Ok(Some(stderr)) if stderr.is_empty() => {
                info!("Glidein {}: job finished", self.glidein_id);
                clean_job_directory(job).await;
                self.enqueue(GlideinEventCode::JobSuccess);
            }
            Ok(Some(stderr)) => {
                self.failed(Failure::new(format!("Glidein failed: {}", stderr.trim())))
            }
            Ok(None) => self.failed(Failure::new("Glidein job produced no error file")),
            Err(e) => self.failed(Failure::new("Unable to read error file").with_detail(e.to_string())),
        }
    }

    fn failed(&mut self, failure: Failure) {
        self.queue.add(
            GlideinEvent::new(self.glidein_id, GlideinEventCode::JobFailure).with_failure(failure),
        );
    }

    fn aborted(&mut self, reason: Option<String>) {
        let mut event = GlideinEvent::new(self.glidein_id, GlideinEventCode::JobAborted);
        if let Some(reason) = reason {
            event = event.with_failure(Failure::new(reason));
        }
        self.queue.add(event);
    }
}
