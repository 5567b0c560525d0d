//! Site lifecycle.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::jobs::{self, INSTALL_DIR, UNINSTALL_DIR};
use super::{Site, SiteState};
use crate::condor::JobFiles;
use crate::context::Context;
use crate::credential;
use crate::error::{summarize, CorralError};
use crate::events::{EntityKind, Failure, GlideinEvent, GlideinEventCode, SiteEvent, SiteEventCode};
use crate::listener::{self, SiteJobOutcome};
use crate::metrics;

/// What a site does with an event in its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SiteAction {
    Stage,
    MarkReady,
    Fail,
    BeginRemoval,
    FinishExiting,
    Delete,
    ForceDelete,
    Ignore,
}

pub(crate) fn plan(state: SiteState, code: SiteEventCode) -> SiteAction {
    use SiteAction::*;
    use SiteEventCode as Code;
    use SiteState as State;

    if state == State::Deleted {
        return Ignore;
    }

    match code {
        Code::Submit => match state {
            State::New => Stage,
            _ => Ignore,
        },
        Code::InstallSuccess => match state {
            State::Staging => MarkReady,
            _ => Ignore,
        },
        Code::InstallFailed => match state {
            State::Staging => Fail,
            _ => Ignore,
        },
        Code::Remove => match state {
            State::Removing => Ignore,
            _ => BeginRemoval,
        },
        Code::GlideinDeleted => match state {
            State::Exiting => FinishExiting,
            _ => Ignore,
        },
        Code::UninstallSuccess => match state {
            State::Removing => Delete,
            _ => Ignore,
        },
        Code::UninstallFailed => match state {
            State::Removing => Fail,
            _ => Ignore,
        },
        Code::Delete => ForceDelete,
    }
}

/// Owns one [`Site`] while it is cached in the registry.
pub struct SiteMachine {
    site: Site,
}

impl SiteMachine {
    pub fn new(site: Site) -> Self {
        Self { site }
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    #[cfg(test)]
    pub(crate) fn site_mut(&mut self) -> &mut Site {
        &mut self.site
    }

    pub fn id(&self) -> i64 {
        self.site.id
    }

    /// Apply one event. Errors turn the site FAILED; only a failure to
    /// persist that transition is returned.
    pub async fn handle_event(&mut self, ctx: &Context, event: SiteEvent) -> Result<(), CorralError> {
        let state = self.site.state;
        let action = plan(state, event.code);
        debug!(
            "Site {}: {} in {} -> {:?}",
            self.site.id,
            event.code.as_str(),
            state,
            action
        );

        let result = match action {
            SiteAction::Ignore => {
                warn!(
                    "Site {}: ignoring {} in state {}",
                    self.site.id,
                    event.code.as_str(),
                    state
                );
                metrics::EVENTS_IGNORED
                    .with_label_values(&["site", event.code.as_str()])
                    .inc();
                Ok(())
            }
            SiteAction::Stage => self.stage(ctx, event.time).await,
            SiteAction::MarkReady => self.mark_ready(ctx, event.time),
            SiteAction::Fail => {
                let failure = event
                    .failure
                    .unwrap_or_else(|| Failure::new(format!("{} received", event.code.as_str())));
                return self.fail(ctx, failure, event.time);
            }
            SiteAction::BeginRemoval => self.begin_removal(ctx, state, event.time).await,
            SiteAction::FinishExiting => self.finish_exiting(ctx, event.time).await,
            SiteAction::Delete => self.delete(ctx, event.time).await,
            SiteAction::ForceDelete => {
                self.cancel_running_job(ctx, state).await;
                self.delete(ctx, event.time).await
            }
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("Site {}: {}", self.site.id, e.detail());
                self.fail(ctx, Failure::new(e.summary()).with_detail(e.detail()), Utc::now())
            }
        }
    }

    pub(crate) fn update_state(
        &mut self,
        ctx: &Context,
        state: SiteState,
        short_message: &str,
        long_message: Option<&str>,
        time: DateTime<Utc>,
    ) -> Result<(), CorralError> {
        ctx.store
            .update_site_state(self.site.id, state, short_message, long_message, time)?;

        info!(
            "Site {}: {} -> {} ({})",
            self.site.id, self.site.state, state, short_message
        );
        self.site.state = state;
        self.site.short_message = short_message.to_string();
        self.site.long_message = long_message.map(String::from);
        self.site.last_update = time;

        ctx.history.record(EntityKind::Site, self.site.id, state);
        metrics::STATE_TRANSITIONS
            .with_label_values(&["site", state.as_str()])
            .inc();
        Ok(())
    }

    /// Mark the site FAILED and tell its glideins.
    pub(crate) fn fail(
        &mut self,
        ctx: &Context,
        failure: Failure,
        time: DateTime<Utc>,
    ) -> Result<(), CorralError> {
        let short = summarize(&failure.message);
        let long = failure.detail.as_deref().unwrap_or(&failure.message);
        if let Err(e) = self.update_state(ctx, SiteState::Failed, &short, Some(long), time) {
            error!("Site {}: unable to persist failure: {}", self.site.id, e);
            return Err(e);
        }
        self.notify_glideins(ctx, GlideinEventCode::SiteFailed);
        Ok(())
    }

    pub(crate) fn notify_glideins(&self, ctx: &Context, code: GlideinEventCode) {
        match ctx.store.glidein_ids(self.site.id) {
            Ok(ids) => {
                for id in ids {
                    ctx.queue.add(GlideinEvent::new(id, code));
                }
            }
            Err(e) => warn!(
                "Site {}: unable to notify glideins of {}: {}",
                self.site.id,
                code.as_str(),
                e
            ),
        }
    }

    async fn stage(&mut self, ctx: &Context, time: DateTime<Utc>) -> Result<(), CorralError> {
        self.update_state(ctx, SiteState::Staging, "Staging executables", None, time)?;
        self.submit_install(ctx).await
    }

    fn mark_ready(&mut self, ctx: &Context, time: DateTime<Utc>) -> Result<(), CorralError> {
        self.update_state(ctx, SiteState::Ready, "Installed", None, time)?;
        self.notify_glideins(ctx, GlideinEventCode::SiteReady);
        Ok(())
    }

    async fn begin_removal(
        &mut self,
        ctx: &Context,
        previous: SiteState,
        time: DateTime<Utc>,
    ) -> Result<(), CorralError> {
        if previous == SiteState::Staging {
            self.cancel_job(ctx, INSTALL_DIR).await;
        }

        let glideins = ctx.store.glidein_ids(self.site.id)?;
        if glideins.is_empty() {
            self.update_state(ctx, SiteState::Removing, "Removing site", None, time)?;
            return self.submit_uninstall(ctx).await;
        }

        self.update_state(ctx, SiteState::Exiting, "Waiting for glideins", None, time)?;
        for id in glideins {
            ctx.queue.add(GlideinEvent::new(id, GlideinEventCode::Remove));
        }
        Ok(())
    }

    async fn finish_exiting(&mut self, ctx: &Context, time: DateTime<Utc>) -> Result<(), CorralError> {
        if ctx.store.has_glideins(self.site.id)? {
            debug!("Site {}: glideins remain, still exiting", self.site.id);
            return Ok(());
        }
        self.update_state(ctx, SiteState::Removing, "Removing site", None, time)?;
        self.submit_uninstall(ctx).await
    }

    pub(crate) async fn delete(&mut self, ctx: &Context, time: DateTime<Utc>) -> Result<(), CorralError> {
        if self.site.state != SiteState::Deleted {
            self.update_state(ctx, SiteState::Deleted, "Site deleted", None, time)?;
        }

        // Glideins left behind by a forced delete go with the site.
        match ctx.store.glidein_ids(self.site.id) {
            Ok(ids) => {
                for id in ids {
                    ctx.queue.add(GlideinEvent::new(id, GlideinEventCode::Delete));
                }
            }
            Err(e) => warn!("Site {}: unable to list glideins: {}", self.site.id, e),
        }

        ctx.registry.remove_site(self.site.id);
        ctx.store.delete_site(self.site.id)?;

        let dir = ctx.site_directory(self.site.id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CorralError::io(
                    format!("Unable to remove {}", dir.display()),
                    e,
                ))
            }
        }
        info!("Site {} deleted", self.site.id);
        Ok(())
    }

    async fn load_credential(&self, ctx: &Context) -> Result<Option<Vec<u8>>, CorralError> {
        let path = ctx.site_directory(self.site.id).join("credential");
        credential::read_stored(&path)
            .await
            .map_err(|e| CorralError::io("Unable to read site credential", e))
    }

    pub(crate) async fn has_credential(&self, ctx: &Context) -> Result<bool, CorralError> {
        Ok(self.load_credential(ctx).await?.is_some())
    }

    pub(crate) async fn submit_install(&mut self, ctx: &Context) -> Result<(), CorralError> {
        info!("Site {}: submitting install job", self.site.id);
        let credential =
            self.load_credential(ctx)
                .await?
                .ok_or(CorralError::MissingCredential {
                    kind: EntityKind::Site,
                    id: self.site.id,
                })?;

        let mut job = jobs::install_job(
            &ctx.config,
            &ctx.site_directory(self.site.id),
            &self.site,
            credential,
        );
        let listener = listener::track(
            SiteJobOutcome::install(self.site.id, ctx.queue.clone()),
            ctx.scheduler.clone(),
        );
        ctx.scheduler
            .submit(&mut job, listener)
            .await
            .map_err(|e| CorralError::submission("Unable to submit install job", e))?;
        Ok(())
    }

    pub(crate) async fn submit_uninstall(&mut self, ctx: &Context) -> Result<(), CorralError> {
        info!("Site {}: submitting uninstall job", self.site.id);
        let credential = self.load_credential(ctx).await?;

        let mut job = jobs::uninstall_job(
            &ctx.config,
            &ctx.site_directory(self.site.id),
            &self.site,
            credential,
        );
        let listener = listener::track(
            SiteJobOutcome::uninstall(self.site.id, ctx.queue.clone()),
            ctx.scheduler.clone(),
        );
        ctx.scheduler
            .submit(&mut job, listener)
            .await
            .map_err(|e| CorralError::submission("Unable to submit uninstall job", e))?;
        Ok(())
    }

    pub(crate) fn job_files(&self, ctx: &Context, job: &str) -> JobFiles {
        JobFiles::new(ctx.site_directory(self.site.id).join(job))
    }

    /// Resume watching an install or uninstall job after a restart.
    pub(crate) async fn reattach(&self, ctx: &Context, job: &str) -> Result<(), CorralError> {
        let files = self.job_files(ctx, job);
        let job_id = files
            .read_job_id()
            .await
            .map_err(|e| CorralError::Recovery(format!("Unable to reattach {} job: {}", job, e)))?;

        let outcome = if job == INSTALL_DIR {
            SiteJobOutcome::install(self.site.id, ctx.queue.clone())
        } else {
            SiteJobOutcome::uninstall(self.site.id, ctx.queue.clone())
        };
        info!("Site {}: reattaching to {} job {}", self.site.id, job, job_id);
        ctx.scheduler
            .watch(&files, &job_id, listener::track(outcome, ctx.scheduler.clone()));
        Ok(())
    }

    async fn cancel_running_job(&self, ctx: &Context, state: SiteState) {
        match state {
            SiteState::Staging => self.cancel_job(ctx, INSTALL_DIR).await,
            SiteState::Removing => self.cancel_job(ctx, UNINSTALL_DIR).await,
            _ => {}
        }
    }

    /// Cancel a site job if its id is known. Failures are only logged.
    async fn cancel_job(&self, ctx: &Context, job: &str) {
        let files = self.job_files(ctx, job);
        let job_id = match files.read_job_id().await {
            Ok(job_id) => job_id,
            Err(e) => {
                warn!("Site {}: no {} job to cancel: {}", self.site.id, job, e);
                return;
            }
        };
        info!("Site {}: cancelling {} job {}", self.site.id, job, job_id);
        if let Err(e) = ctx.scheduler.cancel(&job_id).await {
            warn!("Site {}: unable to cancel {} job: {}", self.site.id, job, e);
        }
    }
}
