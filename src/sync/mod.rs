//! Local feed editing kept consistent with the feed's owner.

pub mod debounce;
pub mod synchronizer;

pub use debounce::Debouncer;
pub use synchronizer::{ConfigSynchronizer, ReceiveOutcome, SyncSettings, SyncState};
