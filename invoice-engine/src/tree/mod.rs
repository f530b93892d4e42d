//! Reconciliation of proposed items against invoice history.

pub mod account_tree;
pub mod interval;
pub mod subscription_tree;

pub use account_tree::AccountItemTree;
pub use interval::{DateInterval, IntervalSet};
pub use subscription_tree::SubscriptionItemTree;
