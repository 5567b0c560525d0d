//! Shared services handed to every state machine.

use std::path::PathBuf;
use std::sync::Arc;

use crate::condor::Scheduler;
use crate::config::Config;
use crate::events::EventQueue;
use crate::history::HistoryHandle;
use crate::registry::Registry;
use crate::store::ResourceStore;

/// Everything a site or glidein needs to handle an event.
pub struct Context {
    pub config: Arc<Config>,
    pub store: Arc<dyn ResourceStore>,
    pub scheduler: Arc<dyn Scheduler>,
    pub queue: EventQueue,
    pub registry: Registry,
    pub history: HistoryHandle,
}

impl Context {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ResourceStore>,
        scheduler: Arc<dyn Scheduler>,
        queue: EventQueue,
        history: HistoryHandle,
    ) -> Self {
        Self {
            registry: Registry::new(Arc::clone(&store)),
            config,
            store,
            scheduler,
            queue,
            history,
        }
    }

    /// `<work>/site-<id>`, holding the site credential and its job directories.
    pub fn site_directory(&self, site_id: i64) -> PathBuf {
        self.config
            .orchestrator
            .working_directory
            .join(format!("site-{}", site_id))
    }

    /// `<work>/glidein-<id>`, holding the glidein credential and its job directory.
    pub fn glidein_directory(&self, glidein_id: i64) -> PathBuf {
        self.config
            .orchestrator
            .working_directory
            .join(format!("glidein-{}", glidein_id))
    }
}
