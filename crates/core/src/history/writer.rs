use std::sync::Arc;

use tokio::sync::mpsc;

use super::{HistoryEntry, HistoryHandle, HistoryStore};

/// Background task that writes recorded transitions to storage.
pub struct HistoryWriter {
    rx: mpsc::Receiver<HistoryEntry>,
    store: Arc<dyn HistoryStore>,
}

impl HistoryWriter {
    pub fn new(rx: mpsc::Receiver<HistoryEntry>, store: Arc<dyn HistoryStore>) -> Self {
        Self { rx, store }
    }

    /// Consume entries until every handle has been dropped.
    pub async fn run(mut self) {
        tracing::info!("History writer started");

        while let Some(entry) = self.rx.recv().await {
            if let Err(e) = self.store.insert(&entry) {
                tracing::error!(
                    "Failed to write history for {} {}: {}",
                    entry.kind,
                    entry.entity_id,
                    e
                );
            }
        }

        tracing::info!("History writer shutting down");
    }
}

/// Create the handle/writer pair.
///
/// Spawn the writer with `tokio::spawn(writer.run())`.
pub fn create_history_system(
    store: Arc<dyn HistoryStore>,
    buffer_size: usize,
) -> (HistoryHandle, HistoryWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (HistoryHandle::new(tx), HistoryWriter::new(rx, store))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::events::EntityKind;
    use crate::store::StoreError;

    struct MockStore {
        entries: Mutex<Vec<HistoryEntry>>,
        should_fail: bool,
    }

    impl MockStore {
        fn new(should_fail: bool) -> Self {
            Self {
                entries: Mutex::new(Vec::new()),
                should_fail,
            }
        }
    }

    impl HistoryStore for MockStore {
        fn insert(&self, entry: &HistoryEntry) -> Result<(), StoreError> {
            if self.should_fail {
                return Err(StoreError::Database("Mock failure".to_string()));
            }
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }

        fn history(
            &self,
            _kind: EntityKind,
            _ids: &[i64],
        ) -> Result<Vec<HistoryEntry>, StoreError> {
            Ok(self.entries.lock().unwrap().clone())
        }
    }

    #[tokio::test]
    async fn test_writer_stores_entries_in_order() {
        let store = Arc::new(MockStore::new(false));
        let (handle, writer) = create_history_system(store.clone(), 10);
        let writer_handle = tokio::spawn(writer.run());

        handle.record(EntityKind::Glidein, 1, "NEW");
        handle.record(EntityKind::Glidein, 1, "SUBMITTED");
        drop(handle);
        writer_handle.await.unwrap();

        let states: Vec<_> = store
            .entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.state.clone())
            .collect();
        assert_eq!(states, vec!["NEW", "SUBMITTED"]);
    }

    #[tokio::test]
    async fn test_writer_continues_on_insert_failure() {
        let store = Arc::new(MockStore::new(true));
        let (handle, writer) = create_history_system(store, 10);
        let writer_handle = tokio::spawn(writer.run());

        handle.record(EntityKind::Site, 1, "READY");
        drop(handle);

        tokio::time::timeout(std::time::Duration::from_secs(1), writer_handle)
            .await
            .expect("writer should exit once handles are dropped")
            .unwrap();
    }

    #[tokio::test]
    async fn test_writer_waits_for_all_handles() {
        let store = Arc::new(MockStore::new(false));
        let (handle, writer) = create_history_system(store.clone(), 10);
        let other = handle.clone();
        let writer_handle = tokio::spawn(writer.run());

        drop(handle);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!writer_handle.is_finished());

        other.record(EntityKind::Site, 2, "DELETED");
        drop(other);
        writer_handle.await.unwrap();
        assert_eq!(store.entries.lock().unwrap().len(), 1);
    }
}
