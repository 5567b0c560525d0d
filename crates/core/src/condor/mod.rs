//! Condor-G batch jobs.
//!
//! Builds submit descriptions, runs the submit and cancel commands and tails
//! per-job user logs into typed [`JobEvent`]s.

mod error;
mod event;
mod generator;
mod job;
mod submitter;
mod types;

pub use error::CondorError;
pub use event::{parse_job_id, parse_record, JobEvent, JobEventCode};
pub use generator::{EventGenerator, JobListener, WatchedJob};
pub use job::{BatchJob, JobFiles, SubmitDescription};
pub use submitter::{parse_submit_output, prepare_job_directory, Condor, Scheduler};
pub use types::{EnvironmentVariable, GatewayOverride, GridType};
