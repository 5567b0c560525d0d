//! Persistence for sites and glideins.
//!
//! The store is authoritative only across restarts: while an entity is cached
//! in the registry its state machine owns it and writes every change through.

mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::events::EntityKind;
use crate::glidein::{Glidein, GlideinState};
use crate::site::{Site, SiteState};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: i64 },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Filter for listing sites or glideins.
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    /// Only entities owned by this local user.
    pub owner: Option<String>,
    /// Only glideins of this site. Ignored when listing sites.
    pub site_id: Option<i64>,
    /// Only entities in this state, e.g. `"READY"`.
    pub state: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl ResourceFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            offset: 0,
            ..Default::default()
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_site(mut self, site_id: i64) -> Self {
        self.site_id = Some(site_id);
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Storage for sites and glideins.
///
/// Calls are synchronous and short; they are made while holding the entity's
/// lock, never the registry's.
pub trait ResourceStore: Send + Sync {
    /// Insert a new site and return its assigned id. `site.id` is ignored.
    fn create_site(&self, site: &Site) -> Result<i64, StoreError>;

    fn load_site(&self, id: i64) -> Result<Site, StoreError>;

    /// Overwrite every mutable column of an existing site.
    fn store_site(&self, site: &Site) -> Result<(), StoreError>;

    fn update_site_state(
        &self,
        id: i64,
        state: SiteState,
        short_message: &str,
        long_message: Option<&str>,
        time: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    fn delete_site(&self, id: i64) -> Result<(), StoreError>;

    fn list_site_ids(&self) -> Result<Vec<i64>, StoreError>;

    fn list_sites(&self, filter: &ResourceFilter) -> Result<Vec<Site>, StoreError>;

    /// Whether any glidein record still references the site.
    fn has_glideins(&self, site_id: i64) -> Result<bool, StoreError>;

    fn glidein_ids(&self, site_id: i64) -> Result<Vec<i64>, StoreError>;

    /// Insert a new glidein and return its assigned id. `glidein.id` is ignored.
    fn create_glidein(&self, glidein: &Glidein) -> Result<i64, StoreError>;

    fn load_glidein(&self, id: i64) -> Result<Glidein, StoreError>;

    fn store_glidein(&self, glidein: &Glidein) -> Result<(), StoreError>;

    fn update_glidein_state(
        &self,
        id: i64,
        state: GlideinState,
        short_message: &str,
        long_message: Option<&str>,
        time: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    fn delete_glidein(&self, id: i64) -> Result<(), StoreError>;

    fn list_glidein_ids(&self) -> Result<Vec<i64>, StoreError>;

    fn list_glideins(&self, filter: &ResourceFilter) -> Result<Vec<Glidein>, StoreError>;

    /// Add one to the glidein's submit counter and return the new value.
    fn increment_submits(&self, id: i64) -> Result<u32, StoreError>;
}
