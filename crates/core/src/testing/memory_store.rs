//! In-memory resource and history store for testing.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::events::EntityKind;
use crate::glidein::{Glidein, GlideinState};
use crate::history::{HistoryEntry, HistoryStore};
use crate::site::{Site, SiteState};
use crate::store::{ResourceFilter, ResourceStore, StoreError};

#[derive(Default)]
struct Inner {
    sites: BTreeMap<i64, Site>,
    glideins: BTreeMap<i64, Glidein>,
    history: Vec<HistoryEntry>,
    next_site_id: i64,
    next_glidein_id: i64,
}

/// Mock implementation of [`ResourceStore`] and [`HistoryStore`].
///
/// Counts calls per operation and can be told to fail the next call of a
/// given operation:
///
/// ```rust,ignore
/// let store = MemoryStore::new();
/// store.fail_next("update_site_state", StoreError::Database("disk full".into()));
/// // ... drive a site ...
/// assert_eq!(store.calls("update_site_state"), 1);
/// ```
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashMap<&'static str, StoreError>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls made to `operation` so far.
    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    /// Make the next call to `operation` return `error`.
    pub fn fail_next(&self, operation: &'static str, error: StoreError) {
        self.failures.lock().unwrap().insert(operation, error);
    }

    /// All recorded history entries, in insertion order.
    pub fn history_entries(&self) -> Vec<HistoryEntry> {
        self.inner.lock().unwrap().history.clone()
    }

    fn enter(&self, operation: &'static str) -> Result<(), StoreError> {
        *self.calls.lock().unwrap().entry(operation).or_insert(0) += 1;
        match self.failures.lock().unwrap().remove(operation) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn page<T>(items: impl Iterator<Item = T>, filter: &ResourceFilter) -> Vec<T> {
    items
        .skip(filter.offset.max(0) as usize)
        .take(filter.limit.max(0) as usize)
        .collect()
}

impl ResourceStore for MemoryStore {
    fn create_site(&self, site: &Site) -> Result<i64, StoreError> {
        self.enter("create_site")?;
        let mut inner = self.inner.lock().unwrap();
        inner.next_site_id += 1;
        let id = inner.next_site_id;
        let mut site = site.clone();
        site.id = id;
        inner.sites.insert(id, site);
        Ok(id)
    }

    fn load_site(&self, id: i64) -> Result<Site, StoreError> {
        self.enter("load_site")?;
        self.inner
            .lock()
            .unwrap()
            .sites
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: EntityKind::Site,
                id,
            })
    }

    fn store_site(&self, site: &Site) -> Result<(), StoreError> {
        self.enter("store_site")?;
        let mut inner = self.inner.lock().unwrap();
        match inner.sites.get_mut(&site.id) {
            Some(stored) => {
                *stored = site.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: EntityKind::Site,
                id: site.id,
            }),
        }
    }

    fn update_site_state(
        &self,
        id: i64,
        state: SiteState,
        short_message: &str,
        long_message: Option<&str>,
        time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.enter("update_site_state")?;
        let mut inner = self.inner.lock().unwrap();
        let site = inner.sites.get_mut(&id).ok_or(StoreError::NotFound {
            kind: EntityKind::Site,
            id,
        })?;
        site.state = state;
        site.short_message = short_message.to_string();
        site.long_message = long_message.map(String::from);
        site.last_update = time;
        Ok(())
    }

    fn delete_site(&self, id: i64) -> Result<(), StoreError> {
        self.enter("delete_site")?;
        self.inner
            .lock()
            .unwrap()
            .sites
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound {
                kind: EntityKind::Site,
                id,
            })
    }

    fn list_site_ids(&self) -> Result<Vec<i64>, StoreError> {
        self.enter("list_site_ids")?;
        Ok(self.inner.lock().unwrap().sites.keys().copied().collect())
    }

    fn list_sites(&self, filter: &ResourceFilter) -> Result<Vec<Site>, StoreError> {
        self.enter("list_sites")?;
        let inner = self.inner.lock().unwrap();
        let matching = inner
            .sites
            .values()
            .filter(|s| {
                filter
                    .owner
                    .as_ref()
                    .is_none_or(|owner| &s.local_username == owner)
            })
            .filter(|s| {
                filter
                    .state
                    .as_ref()
                    .is_none_or(|state| s.state.as_str() == state)
            })
            .cloned();
        Ok(page(matching, filter))
    }

    fn has_glideins(&self, site_id: i64) -> Result<bool, StoreError> {
        self.enter("has_glideins")?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .glideins
            .values()
            .any(|g| g.site_id == site_id))
    }

    fn glidein_ids(&self, site_id: i64) -> Result<Vec<i64>, StoreError> {
        self.enter("glidein_ids")?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .glideins
            .values()
            .filter(|g| g.site_id == site_id)
            .map(|g| g.id)
            .collect())
    }

    fn create_glidein(&self, glidein: &Glidein) -> Result<i64, StoreError> {
        self.enter("create_glidein")?;
        let mut inner = self.inner.lock().unwrap();
        inner.next_glidein_id += 1;
        let id = inner.next_glidein_id;
        let mut glidein = glidein.clone();
        glidein.id = id;
        inner.glideins.insert(id, glidein);
        Ok(id)
    }

    fn load_glidein(&self, id: i64) -> Result<Glidein, StoreError> {
        self.enter("load_glidein")?;
        self.inner
            .lock()
            .unwrap()
            .glideins
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: EntityKind::Glidein,
                id,
            })
    }

    fn store_glidein(&self, glidein: &Glidein) -> Result<(), StoreError> {
        self.enter("store_glidein")?;
        let mut inner = self.inner.lock().unwrap();
        match inner.glideins.get_mut(&glidein.id) {
            Some(stored) => {
                *stored = glidein.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: EntityKind::Glidein,
                id: glidein.id,
            }),
        }
    }

    fn update_glidein_state(
        &self,
        id: i64,
        state: GlideinState,
        short_message: &str,
        long_message: Option<&str>,
        time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.enter("update_glidein_state")?;
        let mut inner = self.inner.lock().unwrap();
        let glidein = inner.glideins.get_mut(&id).ok_or(StoreError::NotFound {
            kind: EntityKind::Glidein,
            id,
        })?;
        glidein.state = state;
        glidein.short_message = short_message.to_string();
        glidein.long_message = long_message.map(String::from);
        glidein.last_update = time;
        Ok(())
    }

    fn delete_glidein(&self, id: i64) -> Result<(), StoreError> {
        self.enter("delete_glidein")?;
        self.inner
            .lock()
            .unwrap()
            .glideins
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound {
                kind: EntityKind::Glidein,
                id,
            })
    }

    fn list_glidein_ids(&self) -> Result<Vec<i64>, StoreError> {
        self.enter("list_glidein_ids")?;
        Ok(self.inner.lock().unwrap().glideins.keys().copied().collect())
    }

    fn list_glideins(&self, filter: &ResourceFilter) -> Result<Vec<Glidein>, StoreError> {
        self.enter("list_glideins")?;
        let inner = self.inner.lock().unwrap();
        let matching = inner
            .glideins
            .values()
            .filter(|g| {
                filter
                    .owner
                    .as_ref()
                    .is_none_or(|owner| &g.local_username == owner)
            })
            .filter(|g| filter.site_id.is_none_or(|site_id| g.site_id == site_id))
            .filter(|g| {
                filter
                    .state
                    .as_ref()
                    .is_none_or(|state| g.state.as_str() == state)
            })
            .cloned();
        Ok(page(matching, filter))
    }

    fn increment_submits(&self, id: i64) -> Result<u32, StoreError> {
        self.enter("increment_submits")?;
        let mut inner = self.inner.lock().unwrap();
        let glidein = inner.glideins.get_mut(&id).ok_or(StoreError::NotFound {
            kind: EntityKind::Glidein,
            id,
        })?;
        glidein.submits += 1;
        Ok(glidein.submits)
    }
}

impl HistoryStore for MemoryStore {
    fn insert(&self, entry: &HistoryEntry) -> Result<(), StoreError> {
        self.enter("insert_history")?;
        self.inner.lock().unwrap().history.push(entry.clone());
        Ok(())
    }

    fn history(&self, kind: EntityKind, ids: &[i64]) -> Result<Vec<HistoryEntry>, StoreError> {
        self.enter("history")?;
        let mut entries: Vec<_> = self
            .inner
            .lock()
            .unwrap()
            .history
            .iter()
            .filter(|e| e.kind == kind && ids.contains(&e.entity_id))
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.time);
        Ok(entries)
    }
}
