//! Site data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::condor::{EnvironmentVariable, GridType};

/// Lifecycle state of a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteState {
    New,
    Staging,
    Ready,
    Failed,
    Exiting,
    Removing,
    Deleted,
}

impl SiteState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteState::New => "NEW",
            SiteState::Staging => "STAGING",
            SiteState::Ready => "READY",
            SiteState::Failed => "FAILED",
            SiteState::Exiting => "EXITING",
            SiteState::Removing => "REMOVING",
            SiteState::Deleted => "DELETED",
        }
    }

    /// Whether new glideins may be created for a site in this state.
    pub fn accepts_glideins(&self) -> bool {
        matches!(self, SiteState::New | SiteState::Staging | SiteState::Ready)
    }
}

impl fmt::Display for SiteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SiteState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(SiteState::New),
            "STAGING" => Ok(SiteState::Staging),
            "READY" => Ok(SiteState::Ready),
            "FAILED" => Ok(SiteState::Failed),
            "EXITING" => Ok(SiteState::Exiting),
            "REMOVING" => Ok(SiteState::Removing),
            "DELETED" => Ok(SiteState::Deleted),
            other => Err(format!("unknown site state: {}", other)),
        }
    }
}

/// A grid gateway endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionService {
    /// Gateway contact string, e.g. `grid.example.org/jobmanager-pbs`.
    pub contact: String,
    pub service_type: GridType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
}

impl ExecutionService {
    pub fn new(service_type: GridType, contact: impl Into<String>) -> Self {
        Self {
            contact: contact.into(),
            service_type,
            project: None,
            queue: None,
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }
}

/// Which Condor build the installer stages on the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CondorSelector {
    /// A released version, resolved by the installer's package mapper.
    Version(String),
    /// An explicit package URL.
    Package(String),
}

/// A registered remote compute endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub name: String,
    pub state: SiteState,
    pub short_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_message: Option<String>,
    pub install_path: String,
    pub local_path: String,
    pub condor: CondorSelector,
    pub staging_service: ExecutionService,
    pub glidein_service: ExecutionService,
    #[serde(default)]
    pub environment: Vec<EnvironmentVariable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub local_username: String,
    pub created: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

/// Request to register a new site.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSiteRequest {
    pub name: String,
    pub install_path: String,
    pub local_path: String,
    #[serde(default)]
    pub condor_version: Option<String>,
    #[serde(default)]
    pub condor_package: Option<String>,
    #[serde(default)]
    pub staging_service: Option<ExecutionService>,
    #[serde(default)]
    pub glidein_service: Option<ExecutionService>,
    #[serde(default)]
    pub environment: Vec<EnvironmentVariable>,
    #[serde(default)]
    pub subject: Option<String>,
    pub local_username: String,
}

impl CreateSiteRequest {
    /// Check the request and build the site it describes, still unsaved (id 0).
    pub fn into_site(self, now: DateTime<Utc>) -> Result<Site, String> {
        if self.name.trim().is_empty() {
            return Err("Site must have name".to_string());
        }

        let staging_service = self
            .staging_service
            .ok_or("Must provide staging service")?;
        if staging_service.contact.trim().is_empty() {
            return Err("Invalid staging service: must specify service contact".to_string());
        }

        let glidein_service = self
            .glidein_service
            .ok_or("Must provide glidein service")?;
        if glidein_service.contact.trim().is_empty() {
            return Err("Invalid glidein service: must specify service contact".to_string());
        }

        let condor = match (self.condor_version, self.condor_package) {
            (Some(_), Some(_)) => {
                return Err("Must specify condor package OR condor version, not both".to_string())
            }
            (Some(version), None) => CondorSelector::Version(version),
            (None, Some(package)) => CondorSelector::Package(package),
            (None, None) => {
                return Err("Must specify condor package OR condor version".to_string())
            }
        };

        if self.install_path.trim().is_empty() {
            return Err("Must specify install path".to_string());
        }
        if self.local_path.trim().is_empty() {
            return Err("Must specify local path".to_string());
        }
        if self.local_username.trim().is_empty() {
            return Err("Must specify owner".to_string());
        }

        // The submit file joins variables with ';' on a single line.
        for var in &self.environment {
            if var.name.trim().is_empty() || var.name.contains(['=', ';', '\n', '\r']) {
                return Err(format!("Invalid environment variable name '{}'", var.name));
            }
            if var.value.contains([';', '\n', '\r']) {
                return Err(format!(
                    "Invalid value for environment variable {}: ';' and line breaks are not allowed",
                    var.name
                ));
            }
        }

        Ok(Site {
            id: 0,
            name: self.name,
            state: SiteState::New,
            short_message: "Created".to_string(),
            long_message: None,
            install_path: self.install_path,
            local_path: self.local_path,
            condor,
            staging_service,
            glidein_service,
            environment: self.environment,
            subject: self.subject,
            local_username: self.local_username,
            created: now,
            last_update: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateSiteRequest {
        CreateSiteRequest {
            name: "dev".to_string(),
            install_path: "/home/user/glidein".to_string(),
            local_path: "/tmp".to_string(),
            condor_version: Some("7.2.0".to_string()),
            staging_service: Some(ExecutionService::new(GridType::Gt2, "gk/jobmanager-fork")),
            glidein_service: Some(
                ExecutionService::new(GridType::Gt2, "gk/jobmanager-pbs").with_queue("normal"),
            ),
            local_username: "user".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_state_string_round_trip() {
        for state in [
            SiteState::New,
            SiteState::Staging,
            SiteState::Ready,
            SiteState::Failed,
            SiteState::Exiting,
            SiteState::Removing,
            SiteState::Deleted,
        ] {
            assert_eq!(state.as_str().parse::<SiteState>().unwrap(), state);
        }
        assert!("LOST".parse::<SiteState>().is_err());
    }

    #[test]
    fn test_state_serde_matches_as_str() {
        let json = serde_json::to_string(&SiteState::Removing).unwrap();
        assert_eq!(json, "\"REMOVING\"");
    }

    #[test]
    fn test_accepts_glideins() {
        assert!(SiteState::Staging.accepts_glideins());
        assert!(SiteState::Ready.accepts_glideins());
        assert!(!SiteState::Failed.accepts_glideins());
        assert!(!SiteState::Exiting.accepts_glideins());
        assert!(!SiteState::Removing.accepts_glideins());
        assert!(!SiteState::Deleted.accepts_glideins());
    }

    #[test]
    fn test_valid_request_builds_new_site() {
        let now = Utc::now();
        let site = request().into_site(now).unwrap();
        assert_eq!(site.state, SiteState::New);
        assert_eq!(site.condor, CondorSelector::Version("7.2.0".to_string()));
        assert_eq!(site.glidein_service.queue.as_deref(), Some("normal"));
        assert_eq!(site.created, now);
    }

    #[test]
    fn test_request_needs_exactly_one_condor_selector() {
        let mut req = request();
        req.condor_version = None;
        assert!(req.clone().into_site(Utc::now()).is_err());

        req.condor_package = Some("http://example.org/condor.tar.gz".to_string());
        let site = req.clone().into_site(Utc::now()).unwrap();
        assert!(matches!(site.condor, CondorSelector::Package(_)));

        req.condor_version = Some("7.2.0".to_string());
        assert!(req.into_site(Utc::now()).is_err());
    }

    #[test]
    fn test_request_missing_fields() {
        let mut req = request();
        req.name = String::new();
        assert_eq!(req.into_site(Utc::now()).unwrap_err(), "Site must have name");

        let mut req = request();
        req.staging_service = None;
        assert_eq!(
            req.into_site(Utc::now()).unwrap_err(),
            "Must provide staging service"
        );

        let mut req = request();
        req.install_path = " ".to_string();
        assert_eq!(
            req.into_site(Utc::now()).unwrap_err(),
            "Must specify install path"
        );
    }

    #[test]
    fn test_environment_must_fit_submit_file() {
        let mut req = request();
        req.environment = vec![EnvironmentVariable::new("GLOBUS_LOCATION", "/opt/globus")];
        assert!(req.clone().into_site(Utc::now()).is_ok());

        req.environment = vec![EnvironmentVariable::new("PATH", "/bin;rm -rf")];
        assert!(req.clone().into_site(Utc::now()).is_err());

        req.environment = vec![EnvironmentVariable::new("MOTD", "hello\nqueue 10")];
        assert!(req.clone().into_site(Utc::now()).is_err());

        req.environment = vec![EnvironmentVariable::new("A=B", "x")];
        assert!(req.into_site(Utc::now()).is_err());
    }
}
