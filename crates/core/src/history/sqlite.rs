//! History tables of [`SqliteStore`].

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::{HistoryEntry, HistoryStore};
use crate::events::EntityKind;
use crate::store::{SqliteStore, StoreError};

fn table(kind: EntityKind) -> (&'static str, &'static str) {
    match kind {
        EntityKind::Site => ("site_history", "site_id"),
        EntityKind::Glidein => ("glidein_history", "glidein_id"),
    }
}

impl HistoryStore for SqliteStore {
    fn insert(&self, entry: &HistoryEntry) -> Result<(), StoreError> {
        let (table, column) = table(entry.kind);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!("INSERT INTO {} ({}, state, time) VALUES (?, ?, ?)", table, column),
            params![entry.entity_id, entry.state, entry.time.to_rfc3339()],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    fn history(&self, kind: EntityKind, ids: &[i64]) -> Result<Vec<HistoryEntry>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let (table, column) = table(kind);
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {col}, state, time FROM {table} WHERE {col} IN ({placeholders}) ORDER BY time ASC, id ASC",
            col = column,
            table = table,
            placeholders = placeholders,
        );

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
                let time: String = row.get(2)?;
                let time = DateTime::parse_from_rfc3339(&time)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            2,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;
                Ok(HistoryEntry {
                    kind,
                    entity_id: row.get(0)?,
                    state: row.get(1)?,
                    time,
                })
            })
            .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(kind: EntityKind, id: i64, state: &str, time: DateTime<Utc>) -> HistoryEntry {
        HistoryEntry {
            kind,
            entity_id: id,
            state: state.to_string(),
            time,
        }
    }

    #[test]
    fn test_history_ordered_by_time() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();

        store
            .insert(&entry(EntityKind::Glidein, 1, "SUBMITTED", now + Duration::seconds(1)))
            .unwrap();
        store.insert(&entry(EntityKind::Glidein, 1, "NEW", now)).unwrap();
        store
            .insert(&entry(EntityKind::Glidein, 2, "NEW", now + Duration::seconds(2)))
            .unwrap();
        store.insert(&entry(EntityKind::Site, 1, "NEW", now)).unwrap();

        let history = store.history(EntityKind::Glidein, &[1]).unwrap();
        let states: Vec<_> = history.iter().map(|e| e.state.as_str()).collect();
        assert_eq!(states, vec!["NEW", "SUBMITTED"]);

        let both = store.history(EntityKind::Glidein, &[1, 2]).unwrap();
        assert_eq!(both.len(), 3);
        assert_eq!(both[2].entity_id, 2);

        let sites = store.history(EntityKind::Site, &[1]).unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].kind, EntityKind::Site);
    }

    #[test]
    fn test_history_empty_ids() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.history(EntityKind::Site, &[]).unwrap().is_empty());
    }
}
