//! Glidein lifecycle.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::job::{self, CONDOR_CONFIG_FILE, JOB_DIR};
use super::{Glidein, GlideinState};
use crate::condor::JobFiles;
use crate::context::Context;
use crate::credential;
use crate::error::{summarize, CorralError};
use crate::events::{EntityKind, Failure, GlideinEvent, GlideinEventCode, SiteEvent, SiteEventCode};
use crate::listener::{self, GlideinOutcome};
use crate::metrics;
use crate::site::{Site, SiteState};

/// What a glidein does with an event in its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GlideinAction {
    /// Submit now if the site is READY, otherwise wait for it.
    Submit,
    StartJob,
    MarkQueued,
    MarkRunning,
    /// The job finished cleanly; resubmit or finish.
    Complete,
    Cancel,
    CancelAndFail,
    Fail,
    Abort,
    Delete,
    ForceDelete,
    Ignore,
}

pub(crate) fn plan(state: GlideinState, code: GlideinEventCode) -> GlideinAction {
    use GlideinAction::*;
    use GlideinEventCode as Code;
    use GlideinState as State;

    if state == State::Deleted {
        return Ignore;
    }

    match code {
        Code::Submit => match state {
            State::New => Submit,
            _ => Ignore,
        },
        Code::SiteReady => match state {
            State::Waiting => StartJob,
            _ => Ignore,
        },
        Code::SiteFailed => match state {
            State::Submitted | State::Queued | State::Running => CancelAndFail,
            State::New | State::Waiting | State::Removing => Fail,
            State::Finished | State::Failed | State::Deleted => Ignore,
        },
        Code::Queued => match state {
            State::Submitted => MarkQueued,
            _ => Ignore,
        },
        Code::Running => match state {
            State::Submitted | State::Queued => MarkRunning,
            _ => Ignore,
        },
        Code::Remove => match state {
            State::Submitted | State::Queued | State::Running => Cancel,
            State::Removing => Ignore,
            _ => Delete,
        },
        Code::JobSuccess => match state {
            State::Running => Complete,
            State::Removing => Delete,
            _ => Ignore,
        },
        Code::JobFailure => match state {
            State::Submitted | State::Queued | State::Running => Fail,
            State::Removing => Delete,
            _ => Ignore,
        },
        Code::JobAborted => match state {
            State::Submitted | State::Queued | State::Running => Abort,
            State::Removing => Delete,
            _ => Ignore,
        },
        Code::Delete => ForceDelete,
    }
}

/// Owns one [`Glidein`] while it is cached in the registry.
pub struct GlideinMachine {
    glidein: Glidein,
}

impl GlideinMachine {
    pub fn new(glidein: Glidein) -> Self {
        Self { glidein }
    }

    pub fn glidein(&self) -> &Glidein {
        &self.glidein
    }

    pub fn id(&self) -> i64 {
        self.glidein.id
    }

    /// Apply one event. Errors turn the glidein FAILED; only a failure to
    /// persist that transition is returned.
    pub async fn handle_event(
        &mut self,
        ctx: &Context,
        event: GlideinEvent,
    ) -> Result<(), CorralError> {
        let state = self.glidein.state;
        let action = plan(state, event.code);
        debug!(
            "Glidein {}: {} in {} -> {:?}",
            self.glidein.id,
            event.code.as_str(),
            state,
            action
        );

        let time = event.time;
        let result = match action {
            GlideinAction::Ignore => {
                warn!(
                    "Glidein {}: ignoring {} in state {}",
                    self.glidein.id,
                    event.code.as_str(),
                    state
                );
                metrics::EVENTS_IGNORED
                    .with_label_values(&["glidein", event.code.as_str()])
                    .inc();
                Ok(())
            }
            GlideinAction::Submit => self.submit(ctx, time).await,
            GlideinAction::StartJob => self.start_job(ctx, time).await,
            GlideinAction::MarkQueued => {
                self.update_state(ctx, GlideinState::Queued, "Glidein job queued", None, time)
            }
            GlideinAction::MarkRunning => {
                self.update_state(ctx, GlideinState::Running, "Glidein job running", None, time)
            }
            GlideinAction::Complete => self.complete(ctx, time).await,
            GlideinAction::Cancel => self.cancel(ctx, time).await,
            GlideinAction::CancelAndFail => {
                self.cancel_job(ctx).await;
                return self.fail(ctx, Failure::new("Site failed"), time);
            }
            GlideinAction::Fail => {
                let failure = event.failure.unwrap_or_else(|| match event.code {
                    GlideinEventCode::SiteFailed => Failure::new("Site failed"),
                    _ => Failure::new("Glidein job failed"),
                });
                return self.fail(ctx, failure, time);
            }
            GlideinAction::Abort => {
                // Keep an earlier long message so the original cause survives.
                let long = event
                    .failure
                    .map(|f| f.detail.unwrap_or(f.message))
                    .or_else(|| self.glidein.long_message.clone());
                self.update_state(
                    ctx,
                    GlideinState::Failed,
                    "Glidein aborted",
                    long.as_deref(),
                    time,
                )
            }
            GlideinAction::Delete => self.delete(ctx, time).await,
            GlideinAction::ForceDelete => {
                if state.has_active_job() {
                    self.cancel_job(ctx).await;
                }
                self.delete(ctx, time).await
            }
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("Glidein {}: {}", self.glidein.id, e.detail());
                self.fail(ctx, Failure::new(e.summary()).with_detail(e.detail()), Utc::now())
            }
        }
    }

    pub(crate) fn update_state(
        &mut self,
        ctx: &Context,
        state: GlideinState,
        short_message: &str,
        long_message: Option<&str>,
        time: DateTime<Utc>,
    ) -> Result<(), CorralError> {
        ctx.store.update_glidein_state(
            self.glidein.id,
            state,
            short_message,
            long_message,
            time,
        )?;

        info!(
            "Glidein {}: {} -> {} ({})",
            self.glidein.id, self.glidein.state, state, short_message
        );
        self.glidein.state = state;
        self.glidein.short_message = short_message.to_string();
        self.glidein.long_message = long_message.map(String::from);
        self.glidein.last_update = time;

        ctx.history.record(EntityKind::Glidein, self.glidein.id, state);
        metrics::STATE_TRANSITIONS
            .with_label_values(&["glidein", state.as_str()])
            .inc();
        Ok(())
    }

    pub(crate) fn fail(
        &mut self,
        ctx: &Context,
        failure: Failure,
        time: DateTime<Utc>,
    ) -> Result<(), CorralError> {
        let short = summarize(&failure.message);
        let long = failure.detail.as_deref().unwrap_or(&failure.message);
        self.update_state(ctx, GlideinState::Failed, &short, Some(long), time)
            .inspect_err(|e| {
                error!("Glidein {}: unable to persist failure: {}", self.glidein.id, e)
            })
    }

    async fn submit(&mut self, ctx: &Context, time: DateTime<Utc>) -> Result<(), CorralError> {
        if self.load_site(ctx).await?.state == SiteState::Ready {
            self.start_job(ctx, time).await
        } else {
            self.update_state(
                ctx,
                GlideinState::Waiting,
                "Waiting for site to be READY",
                None,
                time,
            )
        }
    }

    async fn start_job(&mut self, ctx: &Context, time: DateTime<Utc>) -> Result<(), CorralError> {
        self.update_state(ctx, GlideinState::Submitted, "Local job submitted", None, time)?;
        self.submit_job(ctx).await
    }

    async fn complete(&mut self, ctx: &Context, time: DateTime<Utc>) -> Result<(), CorralError> {
        let resubmit = self
            .glidein
            .resubmit
            .should_resubmit(self.glidein.submits, Utc::now());
        if resubmit && self.load_site(ctx).await?.state == SiteState::Ready {
            info!(
                "Glidein {}: resubmitting after {} submits",
                self.glidein.id, self.glidein.submits
            );
            return self.start_job(ctx, time).await;
        }
        self.update_state(ctx, GlideinState::Finished, "Glidein finished", None, time)
    }

    async fn cancel(&mut self, ctx: &Context, time: DateTime<Utc>) -> Result<(), CorralError> {
        self.update_state(ctx, GlideinState::Removing, "Cancelling job", None, time)?;

        // The scheduler's abort record drives deletion from here.
        let job_id = self
            .job_files(ctx)
            .read_job_id()
            .await
            .map_err(|e| CorralError::submission("Unable to cancel glidein job", e))?;
        ctx.scheduler
            .cancel(&job_id)
            .await
            .map_err(|e| CorralError::submission("Unable to cancel glidein job", e))
    }

    pub(crate) async fn delete(&mut self, ctx: &Context, time: DateTime<Utc>) -> Result<(), CorralError> {
        if self.glidein.state != GlideinState::Deleted {
            self.update_state(ctx, GlideinState::Deleted, "Glidein deleted", None, time)?;
        }

        ctx.registry.remove_glidein(self.glidein.id);
        ctx.store.delete_glidein(self.glidein.id)?;
        ctx.queue
            .add(SiteEvent::new(self.glidein.site_id, SiteEventCode::GlideinDeleted));

        let dir = ctx.glidein_directory(self.glidein.id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Unable to remove {}: {}", dir.display(), e),
        }
        info!("Glidein {} deleted", self.glidein.id);
        Ok(())
    }

    /// Copy of the owning site, taken under its lock.
    async fn load_site(&self, ctx: &Context) -> Result<Site, CorralError> {
        let handle = ctx.registry.find_site(self.glidein.site_id)?;
        let site = handle.lock().await;
        Ok(site.site().clone())
    }

    async fn load_credential(&self, ctx: &Context) -> Result<Option<Vec<u8>>, CorralError> {
        let path = ctx.glidein_directory(self.glidein.id).join("credential");
        credential::read_stored(&path)
            .await
            .map_err(|e| CorralError::io("Unable to read glidein credential", e))
    }

    pub(crate) async fn has_credential(&self, ctx: &Context) -> Result<bool, CorralError> {
        Ok(self.load_credential(ctx).await?.is_some())
    }

    pub(crate) async fn submit_job(&mut self, ctx: &Context) -> Result<(), CorralError> {
        info!("Glidein {}: submitting glidein job", self.glidein.id);
        let site = self.load_site(ctx).await?;
        let credential =
            self.load_credential(ctx)
                .await?
                .ok_or(CorralError::MissingCredential {
                    kind: EntityKind::Glidein,
                    id: self.glidein.id,
                })?;

        let mut job = job::pilot_job(
            &ctx.config,
            &ctx.glidein_directory(self.glidein.id),
            &site,
            &self.glidein,
            credential,
        );

        if let Some(condor_config) = &self.glidein.condor_config {
            let dir = job.files().dir().to_path_buf();
            let write = async {
                tokio::fs::create_dir_all(&dir).await?;
                tokio::fs::write(dir.join(CONDOR_CONFIG_FILE), condor_config).await
            };
            write
                .await
                .map_err(|e| CorralError::io("Error writing glidein_condor_config", e))?;
        }

        let listener = listener::track(
            GlideinOutcome::new(self.glidein.id, ctx.queue.clone()),
            ctx.scheduler.clone(),
        );
        ctx.scheduler
            .submit(&mut job, listener)
            .await
            .map_err(|e| CorralError::submission("Unable to submit glidein job", e))?;

        self.glidein.submits = ctx.store.increment_submits(self.glidein.id)?;
        Ok(())
    }

    pub(crate) fn job_files(&self, ctx: &Context) -> JobFiles {
        JobFiles::new(ctx.glidein_directory(self.glidein.id).join(JOB_DIR))
    }

    /// Resume watching the pilot job after a restart.
    pub(crate) async fn reattach(&self, ctx: &Context) -> Result<(), CorralError> {
        let files = self.job_files(ctx);
        let job_id = files
            .read_job_id()
            .await
            .map_err(|e| CorralError::Recovery(format!("Unable to reattach glidein job: {}", e)))?;

        info!("Glidein {}: reattaching to job {}", self.glidein.id, job_id);
        let outcome = GlideinOutcome::new(self.glidein.id, ctx.queue.clone());
        ctx.scheduler
            .watch(&files, &job_id, listener::track(outcome, ctx.scheduler.clone()));
        Ok(())
    }

    /// Cancel the pilot job if its id is known. Failures are only logged.
    pub(crate) async fn cancel_job(&self, ctx: &Context) {
        let job_id = match self.job_files(ctx).read_job_id().await {
            Ok(job_id) => job_id,
            Err(e) => {
                warn!("Glidein {}: no job to cancel: {}", self.glidein.id, e);
                return;
            }
        };
        info!("Glidein {}: cancelling job {}", self.glidein.id, job_id);
        if let Err(e) = ctx.scheduler.cancel(&job_id).await {
            warn!("Glidein {}: unable to cancel job: {}", self.glidein.id, e);
        }
    }
}
