//! In-memory cache of live state machines.
//!
//! Machines are loaded from the store on first use and stay cached until
//! their entity is deleted. The registry lock only guards membership; every
//! state change happens under the machine's own async mutex.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::error::CorralError;
use crate::glidein::{CreateGlideinRequest, GlideinMachine};
use crate::site::{CreateSiteRequest, SiteMachine};
use crate::store::ResourceStore;

pub type SiteHandle = Arc<AsyncMutex<SiteMachine>>;
pub type GlideinHandle = Arc<AsyncMutex<GlideinMachine>>;

pub struct Registry {
    store: Arc<dyn ResourceStore>,
    sites: Mutex<HashMap<i64, SiteHandle>>,
    glideins: Mutex<HashMap<i64, GlideinHandle>>,
}

impl Registry {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            sites: Mutex::new(HashMap::new()),
            glideins: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached site machine, loading it from the store if needed.
    pub fn find_site(&self, id: i64) -> Result<SiteHandle, CorralError> {
        let mut sites = self.sites.lock().unwrap();
        if let Some(handle) = sites.get(&id) {
            return Ok(Arc::clone(handle));
        }

        let site = self.store.load_site(id)?;
        debug!("Loaded site {} into registry", id);
        let handle = Arc::new(AsyncMutex::new(SiteMachine::new(site)));
        sites.insert(id, Arc::clone(&handle));
        Ok(handle)
    }

    /// Return the cached glidein machine, loading it from the store if needed.
    pub fn find_glidein(&self, id: i64) -> Result<GlideinHandle, CorralError> {
        let mut glideins = self.glideins.lock().unwrap();
        if let Some(handle) = glideins.get(&id) {
            return Ok(Arc::clone(handle));
        }

        let glidein = self.store.load_glidein(id)?;
        debug!("Loaded glidein {} into registry", id);
        let handle = Arc::new(AsyncMutex::new(GlideinMachine::new(glidein)));
        glideins.insert(id, Arc::clone(&handle));
        Ok(handle)
    }

    /// Validate and persist a new site in NEW, returning its id.
    pub fn create_site(&self, request: CreateSiteRequest) -> Result<i64, CorralError> {
        let mut site = request
            .into_site(Utc::now())
            .map_err(CorralError::Validation)?;
        site.id = self.store.create_site(&site)?;
        let id = site.id;

        self.sites
            .lock()
            .unwrap()
            .insert(id, Arc::new(AsyncMutex::new(SiteMachine::new(site))));
        Ok(id)
    }

    /// Validate and persist a new glidein in NEW, returning its id.
    ///
    /// The owning site is locked while the glidein is created so it cannot
    /// start removal in between.
    pub async fn create_glidein(&self, request: CreateGlideinRequest) -> Result<i64, CorralError> {
        let policy = request.validate().map_err(CorralError::Validation)?;

        let site_handle = self.find_site(request.site_id)?;
        let site = site_handle.lock().await;
        let site_state = site.site().state;
        if !site_state.accepts_glideins() {
            return Err(CorralError::InvalidState(format!(
                "Cannot create glidein on site {} in state {}",
                request.site_id, site_state
            )));
        }

        let mut glidein = request.into_glidein(site.site().name.clone(), policy, Utc::now());
        glidein.id = self.store.create_glidein(&glidein)?;
        let id = glidein.id;

        self.glideins
            .lock()
            .unwrap()
            .insert(id, Arc::new(AsyncMutex::new(GlideinMachine::new(glidein))));
        Ok(id)
    }

    /// Evict a site from the cache. The stored record is untouched.
    pub fn remove_site(&self, id: i64) {
        self.sites.lock().unwrap().remove(&id);
    }

    /// Evict a glidein from the cache. The stored record is untouched.
    pub fn remove_glidein(&self, id: i64) {
        self.glideins.lock().unwrap().remove(&id);
    }

    pub fn is_site_cached(&self, id: i64) -> bool {
        self.sites.lock().unwrap().contains_key(&id)
    }

    pub fn is_glidein_cached(&self, id: i64) -> bool {
        self.glideins.lock().unwrap().contains_key(&id)
    }
}
