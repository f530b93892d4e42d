//! Invoice engine - turns billing events and invoice history into the
//! missing invoice items for an account.

pub mod config;
pub mod error;
pub mod generator;
pub mod models;
pub mod pruner;
pub mod request;
pub mod services;
pub mod tree;
pub mod usage;
