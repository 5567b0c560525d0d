//! Orchestrator implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::condor::Scheduler;
use crate::config::Config;
use crate::context::Context;
use crate::credential::{self, Credential};
use crate::error::CorralError;
use crate::events::{
    spawn_workers, EntityKind, Event, EventHandler, EventQueue, GlideinEvent, GlideinEventCode,
    QueueReceivers, SiteEvent, SiteEventCode,
};
use crate::glidein::{CreateGlideinRequest, Glidein, GlideinState};
use crate::history::{HistoryEntry, HistoryHandle, HistoryStore};
use crate::metrics;
use crate::recovery::{self, RecoveryReport};
use crate::site::{CreateSiteRequest, Site, SiteState};
use crate::store::{ResourceFilter, ResourceStore};

use super::types::{OrchestratorStatus, GLIDEIN_CREDENTIAL_MARGIN_SECS, SITE_MIN_CREDENTIAL_SECS};

/// How long [`Orchestrator::stop`] waits for workers to finish their event.
const WORKER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Routes queued events to the machine that owns the target entity.
struct Dispatcher {
    ctx: Arc<Context>,
}

#[async_trait]
impl EventHandler for Dispatcher {
    async fn handle(&self, event: Event) {
        match event {
            Event::Site(event) => {
                let id = event.site_id;
                let handle = match self.ctx.registry.find_site(id) {
                    Ok(handle) => handle,
                    Err(e) => {
                        warn!("Dropping {} for site {}: {}", event.code.as_str(), id, e);
                        return;
                    }
                };
                let mut machine = handle.lock().await;
                if let Err(e) = machine.handle_event(&self.ctx, event).await {
                    error!("Site {}: {}", id, e);
                }
            }
            Event::Glidein(event) => {
                let id = event.glidein_id;
                let handle = match self.ctx.registry.find_glidein(id) {
                    Ok(handle) => handle,
                    Err(e) => {
                        warn!("Dropping {} for glidein {}: {}", event.code.as_str(), id, e);
                        return;
                    }
                };
                let mut machine = handle.lock().await;
                if let Err(e) = machine.handle_event(&self.ctx, event).await {
                    error!("Glidein {}: {}", id, e);
                }
            }
        }
    }
}

/// The engine: accepts requests, runs recovery and owns the worker pool.
pub struct Orchestrator {
    ctx: Arc<Context>,
    history_store: Arc<dyn HistoryStore>,

    // Runtime state
    receivers: Mutex<Option<QueueReceivers>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    recovery: Mutex<Option<RecoveryReport>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ResourceStore>,
        scheduler: Arc<dyn Scheduler>,
        history: HistoryHandle,
        history_store: Arc<dyn HistoryStore>,
    ) -> Self {
        let (queue, receivers) = EventQueue::new(config.orchestrator.workers);
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            ctx: Arc::new(Context::new(config, store, scheduler, queue, history)),
            history_store,
            receivers: Mutex::new(Some(receivers)),
            workers: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            recovery: Mutex::new(None),
            shutdown_tx,
        }
    }

    /// Start the workers and recover persisted entities.
    ///
    /// Requests are accepted once this returns. An orchestrator can only be
    /// started once.
    pub async fn start(&self) -> Result<RecoveryReport, CorralError> {
        let receivers = self.receivers.lock().unwrap().take().ok_or_else(|| {
            CorralError::InvalidState("Orchestrator was already started".to_string())
        })?;

        info!("Starting orchestrator with {} workers", self.ctx.queue.width());
        let handler = Arc::new(Dispatcher {
            ctx: Arc::clone(&self.ctx),
        });
        *self.workers.lock().unwrap() = spawn_workers(receivers, handler, &self.shutdown_tx);

        let report = recovery::recover(&self.ctx).await?;
        *self.recovery.lock().unwrap() = Some(report);
        self.running.store(true, Ordering::SeqCst);

        info!("Orchestrator started");
        Ok(report)
    }

    /// Stop accepting requests, stop the workers and every log watcher.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Orchestrator not running");
            return;
        }

        info!("Stopping orchestrator");
        let _ = self.shutdown_tx.send(());
        self.ctx.scheduler.shutdown();

        let workers: Vec<_> = self.workers.lock().unwrap().drain(..).collect();
        if tokio::time::timeout(WORKER_SHUTDOWN_TIMEOUT, futures::future::join_all(workers))
            .await
            .is_err()
        {
            warn!("Event workers did not stop within {:?}", WORKER_SHUTDOWN_TIMEOUT);
        }
        info!("Orchestrator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            running: self.is_running(),
            workers: self.ctx.queue.width(),
            sites: self.ctx.store.list_site_ids().map(|ids| ids.len()).unwrap_or(0),
            glideins: self
                .ctx
                .store
                .list_glidein_ids()
                .map(|ids| ids.len())
                .unwrap_or(0),
            active_jobs: metrics::ACTIVE_GENERATORS.get(),
            recovery: *self.recovery.lock().unwrap(),
        }
    }

    /// Observe every event added to the queue.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.ctx.queue.subscribe()
    }

    fn ensure_running(&self) -> Result<(), CorralError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(CorralError::NotRunning)
        }
    }

    // =========================================================================
    // Sites
    // =========================================================================

    pub async fn create_site(&self, request: CreateSiteRequest) -> Result<Site, CorralError> {
        self.ensure_running()?;
        let id = self.ctx.registry.create_site(request)?;
        self.ctx.history.record(EntityKind::Site, id, SiteState::New);
        info!("Created site {}", id);
        self.get_site(id).await
    }

    /// Store the credential and start staging the site.
    pub async fn submit_site(&self, id: i64, credential: &Credential) -> Result<(), CorralError> {
        self.ensure_running()?;
        if credential.remaining_secs(Utc::now()) < SITE_MIN_CREDENTIAL_SECS {
            return Err(CorralError::validation(format!(
                "Credential must be valid for at least {} seconds",
                SITE_MIN_CREDENTIAL_SECS
            )));
        }
        self.ctx.registry.find_site(id)?;

        let path = self.ctx.site_directory(id).join("credential");
        credential::write_private(&path, credential.data())
            .await
            .map_err(|e| CorralError::io("Unable to store site credential", e))?;
        self.ctx.queue.add(SiteEvent::new(id, SiteEventCode::Submit));
        Ok(())
    }

    /// Remove a site, or delete it outright when `force` is set.
    ///
    /// A fresh credential replaces the stored one for the uninstall job.
    pub async fn remove_site(
        &self,
        id: i64,
        force: bool,
        credential: Option<&Credential>,
    ) -> Result<(), CorralError> {
        self.ensure_running()?;
        self.ctx.registry.find_site(id)?;

        if let Some(credential) = credential {
            let path = self.ctx.site_directory(id).join("credential");
            credential::write_private(&path, credential.data())
                .await
                .map_err(|e| CorralError::io("Unable to store site credential", e))?;
        }

        let code = if force {
            SiteEventCode::Delete
        } else {
            SiteEventCode::Remove
        };
        self.ctx.queue.add(SiteEvent::new(id, code));
        Ok(())
    }

    pub async fn get_site(&self, id: i64) -> Result<Site, CorralError> {
        let handle = self.ctx.registry.find_site(id)?;
        let machine = handle.lock().await;
        Ok(machine.site().clone())
    }

    pub fn list_sites(&self, filter: &ResourceFilter) -> Result<Vec<Site>, CorralError> {
        Ok(self.ctx.store.list_sites(filter)?)
    }

    pub fn site_history(&self, ids: &[i64]) -> Result<Vec<HistoryEntry>, CorralError> {
        Ok(self.history_store.history(EntityKind::Site, ids)?)
    }

    // =========================================================================
    // Glideins
    // =========================================================================

    pub async fn create_glidein(&self, request: CreateGlideinRequest) -> Result<Glidein, CorralError> {
        self.ensure_running()?;
        let id = self.ctx.registry.create_glidein(request).await?;
        self.ctx
            .history
            .record(EntityKind::Glidein, id, GlideinState::New);
        info!("Created glidein {}", id);
        self.get_glidein(id).await
    }

    /// Store the credential and submit the glidein.
    ///
    /// The credential must outlive the glidein's wall time.
    pub async fn submit_glidein(&self, id: i64, credential: &Credential) -> Result<(), CorralError> {
        self.ensure_running()?;
        let wall_time = self.get_glidein(id).await?.wall_time;
        let needed = i64::from(wall_time) * GLIDEIN_CREDENTIAL_MARGIN_SECS;
        if credential.remaining_secs(Utc::now()) < needed {
            return Err(CorralError::validation(format!(
                "Credential must be valid for at least {} seconds",
                needed
            )));
        }

        let path = self.ctx.glidein_directory(id).join("credential");
        credential::write_private(&path, credential.data())
            .await
            .map_err(|e| CorralError::io("Unable to store glidein credential", e))?;
        self.ctx
            .queue
            .add(GlideinEvent::new(id, GlideinEventCode::Submit));
        Ok(())
    }

    /// Remove a glidein, cancelling its job, or delete it outright when `force` is set.
    pub fn remove_glidein(&self, id: i64, force: bool) -> Result<(), CorralError> {
        self.ensure_running()?;
        self.ctx.registry.find_glidein(id)?;

        let code = if force {
            GlideinEventCode::Delete
        } else {
            GlideinEventCode::Remove
        };
        self.ctx.queue.add(GlideinEvent::new(id, code));
        Ok(())
    }

    pub async fn get_glidein(&self, id: i64) -> Result<Glidein, CorralError> {
        let handle = self.ctx.registry.find_glidein(id)?;
        let machine = handle.lock().await;
        Ok(machine.glidein().clone())
    }

    pub fn list_glideins(&self, filter: &ResourceFilter) -> Result<Vec<Glidein>, CorralError> {
        Ok(self.ctx.store.list_glideins(filter)?)
    }

    pub fn glidein_history(&self, ids: &[i64]) -> Result<Vec<HistoryEntry>, CorralError> {
        Ok(self.history_store.history(EntityKind::Glidein, ids)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MemoryStore, MockScheduler};

    fn orchestrator() -> Orchestrator {
        let store = Arc::new(MemoryStore::new());
        let (history, writer) = crate::history::create_history_system(store.clone(), 16);
        tokio::spawn(writer.run());
        Orchestrator::new(
            Arc::new(Config::default()),
            store.clone(),
            Arc::new(MockScheduler::new()),
            history,
            store,
        )
    }

    #[tokio::test]
    async fn test_requests_rejected_before_start() {
        let orchestrator = orchestrator();
        let err = orchestrator
            .create_site(fixtures::site_request("dev"))
            .await
            .unwrap_err();
        assert!(matches!(err, CorralError::NotRunning));
        assert!(!orchestrator.status().running);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let orchestrator = orchestrator();
        let report = orchestrator.start().await.unwrap();
        assert_eq!(report, RecoveryReport::default());
        assert!(orchestrator.start().await.is_err());

        orchestrator.stop().await;
        assert!(!orchestrator.is_running());
    }

    #[tokio::test]
    async fn test_short_lived_credential_rejected() {
        let orchestrator = orchestrator();
        orchestrator.start().await.unwrap();
        let site = orchestrator
            .create_site(fixtures::site_request("dev"))
            .await
            .unwrap();

        let credential = fixtures::credential_valid_for(60);
        let err = orchestrator.submit_site(site.id, &credential).await.unwrap_err();
        assert!(matches!(err, CorralError::Validation(_)));
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_entities_are_not_found() {
        let orchestrator = orchestrator();
        orchestrator.start().await.unwrap();

        assert!(matches!(
            orchestrator.remove_glidein(99, false),
            Err(CorralError::NotFound { .. })
        ));
        assert!(matches!(
            orchestrator.get_site(99).await,
            Err(CorralError::NotFound { .. })
        ));
        orchestrator.stop().await;
    }
}
