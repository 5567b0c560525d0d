//! Event dispatch.
//!
//! Every state change of a site or glidein is driven by an [`Event`] added to
//! the [`EventQueue`] and executed by a worker through an [`EventHandler`].

mod queue;
mod types;

pub use queue::{spawn_workers, EventHandler, EventQueue, QueueReceivers};
pub use types::{
    EntityKind, Event, Failure, GlideinEvent, GlideinEventCode, SiteEvent, SiteEventCode,
};
