//! Types for the orchestrator.

use serde::{Deserialize, Serialize};

use crate::recovery::RecoveryReport;

/// A site credential must stay valid at least this long when submitted.
pub const SITE_MIN_CREDENTIAL_SECS: i64 = 300;

/// Seconds per minute of glidein wall time a credential must cover.
pub const GLIDEIN_CREDENTIAL_MARGIN_SECS: i64 = 60;

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Whether recovery has finished and requests are accepted.
    pub running: bool,
    /// Number of event queue workers.
    pub workers: usize,
    /// Persisted sites.
    pub sites: usize,
    /// Persisted glideins.
    pub glideins: usize,
    /// Job logs currently being tailed.
    pub active_jobs: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryReport>,
}
