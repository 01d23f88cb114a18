//! Core business logic abstractions

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod feed;
pub mod log;
pub mod price;
pub mod registry;

// Re-export main types for cleaner imports
pub use feed::{FeedConfiguration, FeedPatch, SourceBinding, Strategy};
pub use price::{PriceSource, Quote, QuoteResponse, QuoteService, Sample, SampleStatus};
pub use registry::{SourceDescriptor, SourceRegistry};
