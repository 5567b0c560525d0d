//! Sites: a grid endpoint prepared to run pilot jobs.

mod jobs;
mod machine;
mod types;

pub use machine::SiteMachine;
pub use types::{CondorSelector, CreateSiteRequest, ExecutionService, Site, SiteState};

pub(crate) use jobs::{INSTALL_DIR, UNINSTALL_DIR};
