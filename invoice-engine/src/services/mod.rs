//! Services module for invoice-engine.

pub mod clock;
pub mod metrics;

pub use clock::{Clock, FixedClock, SystemClock};
pub use metrics::{
    get_metrics, init_metrics, record_error, record_generation_run, record_item_generated,
    record_pruned_items, record_usage_read_duration,
};
