//! State history.
//!
//! Every transition a state machine makes is recorded through a
//! [`HistoryHandle`]. Recording never blocks event handling: entries go through
//! a bounded channel to a [`HistoryWriter`] task that owns the store calls.

mod handle;
mod sqlite;
mod store;
mod writer;

pub use handle::*;
pub use store::*;
pub use writer::*;
