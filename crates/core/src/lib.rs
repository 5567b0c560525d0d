pub mod condor;
pub mod config;
pub mod context;
pub mod credential;
pub mod error;
pub mod events;
pub mod glidein;
pub mod history;
pub mod listener;
pub mod metrics;
pub mod orchestrator;
pub mod recovery;
pub mod registry;
pub mod site;
pub mod store;
pub mod testing;

pub use condor::{Condor, CondorError, GridType, Scheduler};
pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use credential::Credential;
pub use error::CorralError;
pub use events::EntityKind;
pub use glidein::{CreateGlideinRequest, Glidein, GlideinState};
pub use history::{create_history_system, HistoryEntry, HistoryHandle, HistoryStore};
pub use orchestrator::{Orchestrator, OrchestratorStatus};
pub use recovery::RecoveryReport;
pub use site::{CreateSiteRequest, ExecutionService, Site, SiteState};
pub use store::{ResourceFilter, ResourceStore, SqliteStore, StoreError};
