use chrono::Utc;
use tokio::sync::mpsc;

use super::HistoryEntry;
use crate::events::EntityKind;
use crate::metrics;

/// Handle for recording state transitions.
///
/// Cheaply cloneable. Entries are written by the [`HistoryWriter`](super::HistoryWriter).
///
/// Recording never blocks the event worker that changed state. When the
/// channel is full the entry is dropped, logged and counted in
/// `corral_history_dropped_total`, so a burst larger than
/// `database.history_buffer` can leave gaps in the recorded history. The
/// entity's current state in the store is unaffected.
#[derive(Clone)]
pub struct HistoryHandle {
    tx: mpsc::Sender<HistoryEntry>,
}

impl HistoryHandle {
    pub fn new(tx: mpsc::Sender<HistoryEntry>) -> Self {
        Self { tx }
    }

    /// Record that an entity entered `state` now.
    ///
    /// Returns false if the entry was dropped because the channel is full or closed.
    pub fn record(&self, kind: EntityKind, entity_id: i64, state: impl ToString) -> bool {
        let entry = HistoryEntry {
            kind,
            entity_id,
            state: state.to_string(),
            time: Utc::now(),
        };
        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(e) => {
                metrics::HISTORY_DROPPED.inc();
                tracing::error!("Failed to record history for {} {}: {}", kind, entity_id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::SiteState;

    #[test]
    fn test_record_sends_entry() {
        let (tx, mut rx) = mpsc::channel(10);
        let handle = HistoryHandle::new(tx);

        assert!(handle.record(EntityKind::Site, 3, SiteState::Staging));

        let entry = rx.try_recv().expect("Should receive entry");
        assert_eq!(entry.kind, EntityKind::Site);
        assert_eq!(entry.entity_id, 3);
        assert_eq!(entry.state, "STAGING");
    }

    #[test]
    fn test_record_full_channel_drops() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = HistoryHandle::new(tx);

        let dropped = metrics::HISTORY_DROPPED.get();
        assert!(handle.record(EntityKind::Glidein, 1, "NEW"));
        assert!(!handle.record(EntityKind::Glidein, 1, "SUBMITTED"));
        assert!(metrics::HISTORY_DROPPED.get() > dropped);
    }

    #[test]
    fn test_record_closed_channel() {
        let (tx, rx) = mpsc::channel(10);
        let handle = HistoryHandle::new(tx);
        drop(rx);

        assert!(!handle.record(EntityKind::Glidein, 1, "NEW"));
    }
}
