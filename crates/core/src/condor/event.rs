//! Typed records from a Condor user log.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use super::CondorError;

/// Event codes written to a Condor user log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventCode {
    Submit,
    Execute,
    ExecutableError,
    Checkpointed,
    JobEvicted,
    JobTerminated,
    ImageSize,
    ShadowException,
    Generic,
    JobAborted,
    JobSuspended,
    JobUnsuspended,
    JobHeld,
    JobReleased,
    NodeExecute,
    NodeTerminated,
    PostScriptTerminated,
    GlobusSubmit,
    GlobusSubmitFailed,
    GlobusResourceUp,
    GlobusResourceDown,
    RemoteError,
    JobDisconnected,
    JobReconnected,
    JobReconnectFailed,
    GridResourceUp,
    GridResourceDown,
    GridSubmit,
    JobAdInformation,
    /// Not written by Condor; raised when the log cannot be read or parsed.
    Exception,
}

impl JobEventCode {
    pub fn from_code(code: u32) -> Option<Self> {
        let event = match code {
            0 => Self::Submit,
            1 => Self::Execute,
            2 => Self::ExecutableError,
            3 => Self::Checkpointed,
            4 => Self::JobEvicted,
            5 => Self::JobTerminated,
            6 => Self::ImageSize,
            7 => Self::ShadowException,
            8 => Self::Generic,
            9 => Self::JobAborted,
            10 => Self::JobSuspended,
            11 => Self::JobUnsuspended,
            12 => Self::JobHeld,
            13 => Self::JobReleased,
            14 => Self::NodeExecute,
            15 => Self::NodeTerminated,
            16 => Self::PostScriptTerminated,
            17 => Self::GlobusSubmit,
            18 => Self::GlobusSubmitFailed,
            19 => Self::GlobusResourceUp,
            20 => Self::GlobusResourceDown,
            21 => Self::RemoteError,
            22 => Self::JobDisconnected,
            23 => Self::JobReconnected,
            24 => Self::JobReconnectFailed,
            25 => Self::GridResourceUp,
            26 => Self::GridResourceDown,
            27 => Self::GridSubmit,
            28 => Self::JobAdInformation,
            999 => Self::Exception,
            _ => return None,
        };
        Some(event)
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::Submit => 0,
            Self::Execute => 1,
            Self::ExecutableError => 2,
            Self::Checkpointed => 3,
            Self::JobEvicted => 4,
            Self::JobTerminated => 5,
            Self::ImageSize => 6,
            Self::ShadowException => 7,
            Self::Generic => 8,
            Self::JobAborted => 9,
            Self::JobSuspended => 10,
            Self::JobUnsuspended => 11,
            Self::JobHeld => 12,
            Self::JobReleased => 13,
            Self::NodeExecute => 14,
            Self::NodeTerminated => 15,
            Self::PostScriptTerminated => 16,
            Self::GlobusSubmit => 17,
            Self::GlobusSubmitFailed => 18,
            Self::GlobusResourceUp => 19,
            Self::GlobusResourceDown => 20,
            Self::RemoteError => 21,
            Self::JobDisconnected => 22,
            Self::JobReconnected => 23,
            Self::JobReconnectFailed => 24,
            Self::GridResourceUp => 25,
            Self::GridResourceDown => 26,
            Self::GridSubmit => 27,
            Self::JobAdInformation => 28,
            Self::Exception => 999,
        }
    }
}

/// One record read from a job log, or a synthesized [`JobEventCode::Exception`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    pub code: JobEventCode,
    pub time: DateTime<Utc>,
    /// Text following the timestamp on the header line.
    pub message: String,
    /// The whole record, header included.
    pub details: String,
}

impl JobEvent {
    pub fn exception(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code: JobEventCode::Exception,
            time: Utc::now(),
            details: message.clone(),
            message,
        }
    }

    /// First indented body line, which is where Condor puts hold and abort reasons.
    pub fn reason(&self) -> &str {
        self.details
            .lines()
            .skip(1)
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or(self.message.as_str())
    }
}

static HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{3}) \((\d+)\.(\d+)\.(\d+)\) (\d{2}/\d{2}|\d{4}-\d{2}-\d{2}) (\d{2}:\d{2}:\d{2})\s?(.*)$",
    )
    .unwrap()
});

/// Parse a `cluster.proc` job id.
pub fn parse_job_id(job_id: &str) -> Option<(u64, u64)> {
    let (cluster, proc_) = job_id.trim().split_once('.')?;
    Some((cluster.parse().ok()?, proc_.parse().ok()?))
}

/// Parse one log record (without its `...` terminator).
///
/// Returns `Ok(None)` when the record belongs to a different job.
pub fn parse_record(lines: &[String], job_id: &str) -> Result<Option<JobEvent>, CondorError> {
    let header = lines
        .first()
        .ok_or_else(|| CondorError::log_parse("empty record"))?;

    let caps = HEADER
        .captures(header)
        .ok_or_else(|| CondorError::log_parse(format!("bad header: {}", header)))?;

    let number: u32 = caps[1]
        .parse()
        .map_err(|_| CondorError::log_parse(format!("bad event code: {}", &caps[1])))?;
    let code = JobEventCode::from_code(number)
        .ok_or_else(|| CondorError::log_parse(format!("unknown event code: {}", number)))?;

    let expected = parse_job_id(job_id)
        .ok_or_else(|| CondorError::log_parse(format!("bad job id: {}", job_id)))?;
    let cluster: u64 = caps[2].parse().unwrap_or(u64::MAX);
    let proc_: u64 = caps[3].parse().unwrap_or(u64::MAX);
    if (cluster, proc_) != expected {
        return Ok(None);
    }

    let time = parse_timestamp(&caps[5], &caps[6])?;

    Ok(Some(JobEvent {
        code,
        time,
        message: caps[7].trim().to_string(),
        details: lines.join("\n"),
    }))
}

fn parse_timestamp(date: &str, time: &str) -> Result<DateTime<Utc>, CondorError> {
    let time = NaiveTime::parse_from_str(time, "%H:%M:%S")
        .map_err(|e| CondorError::log_parse(format!("bad time {}: {}", time, e)))?;

    // Older logs omit the year.
    let date = if date.contains('/') {
        let year = Utc::now().year();
        NaiveDate::parse_from_str(&format!("{}/{}", year, date), "%Y/%m/%d")
    } else {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
    }
    .map_err(|e| CondorError::log_parse(format!("bad date {}: {}", date, e)))?;

    Ok(Utc.from_utc_datetime(&NaiveDateTime::new(date, time)))
}
