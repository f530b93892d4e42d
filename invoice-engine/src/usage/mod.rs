//! Usage collaborators: raw record store, read-window optimizer and the
//! per-subscription aggregator.

pub mod aggregator;
pub mod optimizer;
pub mod store;

pub use aggregator::{
    ContiguousUsageAggregator, UsageAggregation, UsageAggregationRequest, UsageAggregator,
};
pub use optimizer::RawUsageOptimizer;
pub use store::{InMemoryUsageStore, UsageRecordStore};
