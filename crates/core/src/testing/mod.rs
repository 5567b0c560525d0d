//! Testing utilities and mock implementations.
//!
//! [`MemoryStore`] stands in for the SQLite store and [`MockScheduler`] for
//! Condor, so the whole engine can run inside a test without a batch system.
//!
//! # Example
//!
//! ```rust,ignore
//! use corral_core::testing::{fixtures, MemoryStore, MockScheduler};
//!
//! let store = Arc::new(MemoryStore::new());
//! let scheduler = Arc::new(MockScheduler::new());
//! let config = fixtures::config(temp_dir.path());
//! ```

mod memory_store;
mod mock_scheduler;

pub use memory_store::MemoryStore;
pub use mock_scheduler::{MockScheduler, RecordedSubmission};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{Duration, Utc};
    use std::path::Path;

    use crate::condor::GridType;
    use crate::config::Config;
    use crate::credential::Credential;
    use crate::glidein::{CreateGlideinRequest, Glidein, ResubmitPolicy};
    use crate::site::{CreateSiteRequest, ExecutionService, Site};

    /// A valid site request: GT2 services, Condor 7.2.0, owned by `user`.
    pub fn site_request(name: &str) -> CreateSiteRequest {
        CreateSiteRequest {
            name: name.to_string(),
            install_path: "/home/user/glidein".to_string(),
            local_path: "/tmp".to_string(),
            condor_version: Some("7.2.0".to_string()),
            condor_package: None,
            staging_service: Some(
                ExecutionService::new(GridType::Gt2, "gk.example.org/jobmanager-fork")
                    .with_project("TG-123"),
            ),
            glidein_service: Some(ExecutionService::new(
                GridType::Gt2,
                "gk.example.org/jobmanager-pbs",
            )),
            environment: Vec::new(),
            subject: None,
            local_username: "user".to_string(),
        }
    }

    /// A NEW site built from [`site_request`] with the given id.
    pub fn site(id: i64, name: &str) -> Site {
        let mut site = site_request(name)
            .into_site(Utc::now())
            .unwrap_or_else(|e| panic!("fixture site is invalid: {}", e));
        site.id = id;
        site
    }

    /// A valid single-node glidein request owned by `user`.
    pub fn glidein_request(site_id: i64, wall_time: u32) -> CreateGlideinRequest {
        let mut request = CreateGlideinRequest::new(site_id, "central.example.org", wall_time);
        request.local_username = "user".to_string();
        request
    }

    /// A NEW glidein on site `dev` that is never resubmitted.
    pub fn glidein(id: i64, site_id: i64, wall_time: u32) -> Glidein {
        let mut glidein = glidein_request(site_id, wall_time).into_glidein(
            "dev",
            ResubmitPolicy::Never,
            Utc::now(),
        );
        glidein.id = id;
        glidein
    }

    /// A credential expiring `secs` seconds from now.
    pub fn credential_valid_for(secs: i64) -> Credential {
        Credential::new(
            b"-----BEGIN CERTIFICATE-----\nproxy\n-----END CERTIFICATE-----\n".to_vec(),
            Utc::now() + Duration::seconds(secs),
        )
    }

    /// Default configuration with a private working directory and two workers.
    pub fn config(working_directory: &Path) -> Config {
        let mut config = Config::default();
        config.orchestrator.working_directory = working_directory.to_path_buf();
        config.orchestrator.workers = 2;
        config.scheduler.poll_interval_ms = 10;
        config
    }
}
