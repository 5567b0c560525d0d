//! Glidein data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Minimum wall time in minutes. One minute is reserved for shutdown.
pub const MIN_WALL_TIME: u32 = 2;

/// Lifecycle state of a glidein.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GlideinState {
    New,
    Waiting,
    Submitted,
    Queued,
    Running,
    Removing,
    Finished,
    Failed,
    Deleted,
}

impl GlideinState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlideinState::New => "NEW",
            GlideinState::Waiting => "WAITING",
            GlideinState::Submitted => "SUBMITTED",
            GlideinState::Queued => "QUEUED",
            GlideinState::Running => "RUNNING",
            GlideinState::Removing => "REMOVING",
            GlideinState::Finished => "FINISHED",
            GlideinState::Failed => "FAILED",
            GlideinState::Deleted => "DELETED",
        }
    }

    /// States in which a pilot job may be in the scheduler's queue.
    pub fn has_active_job(&self) -> bool {
        matches!(
            self,
            GlideinState::Submitted | GlideinState::Queued | GlideinState::Running
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GlideinState::Finished | GlideinState::Failed | GlideinState::Deleted
        )
    }
}

impl fmt::Display for GlideinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GlideinState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(GlideinState::New),
            "WAITING" => Ok(GlideinState::Waiting),
            "SUBMITTED" => Ok(GlideinState::Submitted),
            "QUEUED" => Ok(GlideinState::Queued),
            "RUNNING" => Ok(GlideinState::Running),
            "REMOVING" => Ok(GlideinState::Removing),
            "FINISHED" => Ok(GlideinState::Finished),
            "FAILED" => Ok(GlideinState::Failed),
            "DELETED" => Ok(GlideinState::Deleted),
            other => Err(format!("unknown glidein state: {}", other)),
        }
    }
}

/// Whether a glidein that ran to completion is started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResubmitPolicy {
    /// Run once.
    #[default]
    Never,
    /// Resubmit while the number of submissions so far is at most `max`.
    Count { max: u32 },
    /// Resubmit until the given time.
    Until { until: DateTime<Utc> },
    /// Resubmit every time.
    Always,
}

impl ResubmitPolicy {
    /// Decide after a successful run, given how many times the glidein was submitted.
    pub fn should_resubmit(&self, submits: u32, now: DateTime<Utc>) -> bool {
        match self {
            ResubmitPolicy::Never => false,
            ResubmitPolicy::Count { max } => submits <= *max,
            ResubmitPolicy::Until { until } => now < *until,
            ResubmitPolicy::Always => true,
        }
    }
}

/// A pilot job bound to a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Glidein {
    pub id: i64,
    pub site_id: i64,
    pub site_name: String,
    pub state: GlideinState,
    pub short_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_message: Option<String>,
    /// Central manager the glidein's startd reports to.
    pub condor_host: String,
    pub count: u32,
    pub host_count: u32,
    /// Requested wall time in minutes.
    pub wall_time: u32,
    pub num_cpus: u32,
    /// Minutes the glidein may sit idle before exiting; 0 disables.
    pub idle_time: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condor_debug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condor_config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcb_broker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ccb_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lowport: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highport: Option<u16>,
    /// Raw gateway attributes, placed ahead of the generated ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsl: Option<String>,
    pub resubmit: ResubmitPolicy,
    pub submits: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub local_username: String,
    pub created: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

/// Request to create a glidein on an existing site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGlideinRequest {
    pub site_id: i64,
    pub condor_host: String,
    #[serde(default = "default_one")]
    pub count: u32,
    #[serde(default = "default_one")]
    pub host_count: u32,
    pub wall_time: u32,
    #[serde(default = "default_one")]
    pub num_cpus: u32,
    #[serde(default)]
    pub idle_time: u32,
    #[serde(default)]
    pub condor_debug: Option<String>,
    #[serde(default)]
    pub condor_config: Option<String>,
    #[serde(default)]
    pub gcb_broker: Option<String>,
    #[serde(default)]
    pub ccb_address: Option<String>,
    #[serde(default)]
    pub lowport: Option<u16>,
    #[serde(default)]
    pub highport: Option<u16>,
    #[serde(default)]
    pub rsl: Option<String>,
    #[serde(default)]
    pub resubmit: bool,
    /// Maximum number of resubmissions.
    #[serde(default)]
    pub resubmits: Option<u32>,
    /// Resubmit until this time.
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub subject: Option<String>,
    pub local_username: String,
}

fn default_one() -> u32 {
    1
}

impl CreateGlideinRequest {
    pub fn new(site_id: i64, condor_host: impl Into<String>, wall_time: u32) -> Self {
        Self {
            site_id,
            condor_host: condor_host.into(),
            count: 1,
            host_count: 1,
            wall_time,
            num_cpus: 1,
            idle_time: 0,
            condor_debug: None,
            condor_config: None,
            gcb_broker: None,
            ccb_address: None,
            lowport: None,
            highport: None,
            rsl: None,
            resubmit: false,
            resubmits: None,
            until: None,
            subject: None,
            local_username: String::new(),
        }
    }

    /// Check everything that doesn't need the store.
    pub fn validate(&self) -> Result<ResubmitPolicy, String> {
        if self.wall_time < MIN_WALL_TIME {
            return Err(format!("Wall time must be >= {} minutes", MIN_WALL_TIME));
        }
        if self.condor_host.trim().is_empty() {
            return Err("Must specify condor host".to_string());
        }
        if self.count == 0 || self.host_count == 0 || self.num_cpus == 0 {
            return Err("count, host count and cpus must be at least 1".to_string());
        }
        if let (Some(low), Some(high)) = (self.lowport, self.highport) {
            if low > high {
                return Err("lowport must not exceed highport".to_string());
            }
        }
        if self.local_username.trim().is_empty() {
            return Err("Must specify owner".to_string());
        }

        match (self.resubmit, self.resubmits, self.until) {
            (false, None, None) => Ok(ResubmitPolicy::Never),
            (false, _, _) => Err("resubmits and until require resubmit".to_string()),
            (true, Some(_), Some(_)) => {
                Err("Specify either resubmits or until, not both".to_string())
            }
            (true, Some(max), None) => Ok(ResubmitPolicy::Count { max }),
            (true, None, Some(until)) => Ok(ResubmitPolicy::Until { until }),
            (true, None, None) => Ok(ResubmitPolicy::Always),
        }
    }

    /// Build the unsaved glidein (id 0) for a site.
    pub fn into_glidein(
        self,
        site_name: impl Into<String>,
        resubmit: ResubmitPolicy,
        now: DateTime<Utc>,
    ) -> Glidein {
        Glidein {
            id: 0,
            site_id: self.site_id,
            site_name: site_name.into(),
            state: GlideinState::New,
            short_message: "Created".to_string(),
            long_message: None,
            condor_host: self.condor_host,
            count: self.count,
            host_count: self.host_count,
            wall_time: self.wall_time,
            num_cpus: self.num_cpus,
            idle_time: self.idle_time,
            condor_debug: self.condor_debug,
            condor_config: self.condor_config,
            gcb_broker: self.gcb_broker,
            ccb_address: self.ccb_address,
            lowport: self.lowport,
            highport: self.highport,
            rsl: self.rsl,
            resubmit,
            submits: 0,
            subject: self.subject,
            local_username: self.local_username,
            created: now,
            last_update: now,
        }
    }
}
