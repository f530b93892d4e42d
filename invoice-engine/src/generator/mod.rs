//! Invoice generation: period arithmetic, item generators and the
//! orchestrator tying them to reconciliation.

pub mod billing_interval;
pub mod fixed_and_recurring;
pub mod invoice_generator;
pub mod metadata;
pub mod money;
pub mod proration;
pub mod usage;

pub use billing_interval::BillingIntervalDetail;
pub use fixed_and_recurring::{
    generate_recurring_item_data, FixedAndRecurringInvoiceItemGenerator, GeneratedItems,
    RecurringItemData, RecurringItemSchedule,
};
pub use invoice_generator::DefaultInvoiceGenerator;
pub use metadata::InvoiceWithMetadata;
pub use usage::{GeneratedUsageItems, UsageInvoiceItemGenerator};
