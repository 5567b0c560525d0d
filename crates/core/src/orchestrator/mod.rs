//! The engine facade.
//!
//! [`Orchestrator`] owns the event queue, its workers and the registry of
//! live sites and glideins. Requests are validated here and turned into
//! events; all state changes happen on the workers.

mod runner;
mod types;

pub use runner::Orchestrator;
pub use types::{OrchestratorStatus, GLIDEIN_CREDENTIAL_MARGIN_SECS, SITE_MIN_CREDENTIAL_SECS};
