//! Glideins: pilot jobs that join a site's nodes to a Condor pool.

mod job;
mod machine;
mod types;

pub use machine::GlideinMachine;
pub use types::{
    CreateGlideinRequest, Glidein, GlideinState, ResubmitPolicy, MIN_WALL_TIME,
};
