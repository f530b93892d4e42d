//! Domain models for the invoice engine.

pub mod billing_event;
pub mod invoice;
pub mod invoice_item;
pub mod notification;
pub mod usage;

pub use billing_event::{
    BillingEvent, BillingEventSet, BillingMode, BillingPeriod, PeriodDuration, PhaseType,
    SubscriptionTransition, TimeUnit,
};
pub use invoice::{AccountInvoices, DryRunInfo, DryRunType, Invoice, InvoiceStatus};
pub use invoice_item::{InvoiceItem, InvoiceItemType};
pub use notification::{
    merge_notification_dates, NotificationDates, SubscriptionFutureNotificationDates,
};
pub use usage::{
    RawUsageRecord, TierBlockPolicy, TieredBlock, TrackingRecordId, UsageDefinition, UsageLimit,
    UsageTier, UsageType,
};
