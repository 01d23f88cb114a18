//! Periodic preview of the feed under edit.

pub mod preview;
pub mod scheduler;

pub use preview::{CycleResult, PreviewSnapshot};
pub use scheduler::RefreshScheduler;
