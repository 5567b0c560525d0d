//! Event payloads exchanged through the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two kinds of entity the engine manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Site,
    Glidein,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Site => "site",
            EntityKind::Glidein => "glidein",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job or an operation failed, as carried by failure events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteEventCode {
    Submit,
    InstallSuccess,
    InstallFailed,
    Remove,
    GlideinDeleted,
    UninstallSuccess,
    UninstallFailed,
    Delete,
}

impl SiteEventCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteEventCode::Submit => "SUBMIT",
            SiteEventCode::InstallSuccess => "INSTALL_SUCCESS",
            SiteEventCode::InstallFailed => "INSTALL_FAILED",
            SiteEventCode::Remove => "REMOVE",
            SiteEventCode::GlideinDeleted => "GLIDEIN_DELETED",
            SiteEventCode::UninstallSuccess => "UNINSTALL_SUCCESS",
            SiteEventCode::UninstallFailed => "UNINSTALL_FAILED",
            SiteEventCode::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GlideinEventCode {
    Submit,
    SiteReady,
    SiteFailed,
    Queued,
    Running,
    Remove,
    JobSuccess,
    JobAborted,
    JobFailure,
    Delete,
}

impl GlideinEventCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlideinEventCode::Submit => "SUBMIT",
            GlideinEventCode::SiteReady => "SITE_READY",
            GlideinEventCode::SiteFailed => "SITE_FAILED",
            GlideinEventCode::Queued => "QUEUED",
            GlideinEventCode::Running => "RUNNING",
            GlideinEventCode::Remove => "REMOVE",
            GlideinEventCode::JobSuccess => "JOB_SUCCESS",
            GlideinEventCode::JobAborted => "JOB_ABORTED",
            GlideinEventCode::JobFailure => "JOB_FAILURE",
            GlideinEventCode::Delete => "DELETE",
        }
    }
}

/// An event addressed to one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteEvent {
    pub site_id: i64,
    pub code: SiteEventCode,
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

impl SiteEvent {
    pub fn new(site_id: i64, code: SiteEventCode) -> Self {
        Self {
            site_id,
            code,
            time: Utc::now(),
            failure: None,
        }
    }

    pub fn with_failure(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }
}

/// An event addressed to one glidein.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlideinEvent {
    pub glidein_id: i64,
    pub code: GlideinEventCode,
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

impl GlideinEvent {
    pub fn new(glidein_id: i64, code: GlideinEventCode) -> Self {
        Self {
            glidein_id,
            code,
            time: Utc::now(),
            failure: None,
        }
    }

    pub fn with_failure(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }
}

/// A unit of work for the event queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Site(SiteEvent),
    Glidein(GlideinEvent),
}

impl Event {
    pub fn kind(&self) -> EntityKind {
        match self {
            Event::Site(_) => EntityKind::Site,
            Event::Glidein(_) => EntityKind::Glidein,
        }
    }

    pub fn entity_id(&self) -> i64 {
        match self {
            Event::Site(e) => e.site_id,
            Event::Glidein(e) => e.glidein_id,
        }
    }

    pub fn code_str(&self) -> &'static str {
        match self {
            Event::Site(e) => e.code.as_str(),
            Event::Glidein(e) => e.code.as_str(),
        }
    }
}

impl From<SiteEvent> for Event {
    fn from(event: SiteEvent) -> Self {
        Event::Site(event)
    }
}

impl From<GlideinEvent> for Event {
    fn from(event: GlideinEvent) -> Self {
        Event::Glidein(event)
    }
}
