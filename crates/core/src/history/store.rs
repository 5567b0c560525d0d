use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::EntityKind;
use crate::store::StoreError;

/// One recorded state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: EntityKind,
    pub entity_id: i64,
    pub state: String,
    pub time: DateTime<Utc>,
}

/// Storage for state history.
pub trait HistoryStore: Send + Sync {
    fn insert(&self, entry: &HistoryEntry) -> Result<(), StoreError>;

    /// Entries for the given entities ordered by time, oldest first.
    fn history(&self, kind: EntityKind, ids: &[i64]) -> Result<Vec<HistoryEntry>, StoreError>;
}
