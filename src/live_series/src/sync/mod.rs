//! Drives one live chart: history load, live feed, merges, reconnects and teardown.

mod driver;
mod handle;
pub mod status;

pub use handle::{Synchronizer, SynchronizerHandle};
pub use status::{SessionStatus, SyncCounters};
