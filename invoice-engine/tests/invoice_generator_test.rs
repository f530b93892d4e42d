//! Invoice generator orchestration integration tests.

mod common;

use std::io::Write;

use common::{date, generator, generator_with, in_advance, recurring_item, EventBuilder};
use invoice_engine::config::InvoiceConfig;
use invoice_engine::error::InvoiceError;
use invoice_engine::models::{
    AccountInvoices, BillingEventSet, DryRunInfo, DryRunType, Invoice, InvoiceItemType,
    InvoiceStatus,
};
use invoice_engine::request::GenerationRequest;
use invoice_engine::services::{get_metrics, init_metrics};
use invoice_engine::usage::InMemoryUsageStore;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

fn monthly_events(sub: Uuid) -> BillingEventSet {
    in_advance(vec![EventBuilder::new(sub, date(2011, 9, 1))
        .recurring(dec!(10))
        .build()])
}

/// Committed September invoice for `sub`.
fn september_invoice(account_id: Uuid, sub: Uuid) -> Invoice {
    let mut invoice = Invoice::new(
        account_id,
        date(2011, 9, 1),
        date(2011, 9, 1),
        "USD",
        InvoiceStatus::Committed,
    );
    let item = recurring_item(
        invoice.id,
        account_id,
        sub,
        date(2011, 9, 1),
        date(2011, 10, 1),
        dec!(10),
        dec!(10),
    );
    invoice.add_items([item]);
    invoice
}

#[test]
fn no_events_means_no_invoice() {
    let result = generator(date(2011, 9, 1))
        .generate_invoice(
            Uuid::new_v4(),
            &BillingEventSet::default(),
            &AccountInvoices::default(),
            None,
            date(2030, 1, 1),
            "USD",
            None,
        )
        .unwrap();

    assert!(!result.has_invoice());
    assert!(result.notification_dates.is_empty());
    assert!(result.tracking_ids.is_empty());
}

#[test]
fn account_with_auto_invoice_off_gets_nothing() {
    let mut events = monthly_events(Uuid::new_v4());
    events.account_auto_invoice_off = true;

    let result = generator(date(2011, 9, 1))
        .generate_invoice(
            Uuid::new_v4(),
            &events,
            &AccountInvoices::default(),
            None,
            date(2011, 9, 1),
            "USD",
            None,
        )
        .unwrap();
    assert!(!result.has_invoice());
}

#[test]
fn missing_target_invoice_is_an_error() {
    let result = generator(date(2011, 9, 1)).generate_invoice(
        Uuid::new_v4(),
        &monthly_events(Uuid::new_v4()),
        &AccountInvoices::default(),
        Some(Uuid::new_v4()),
        date(2011, 9, 1),
        "USD",
        None,
    );
    assert!(matches!(result, Err(InvoiceError::TargetInvoiceNotFound(_))));
}

#[test]
fn target_invoice_is_reopened_with_its_items() {
    let account_id = Uuid::new_v4();
    let sub = Uuid::new_v4();
    let september = september_invoice(account_id, sub);
    let target_id = september.id;
    let existing_item_id = september.items[0].id;

    let result = generator(date(2011, 10, 1))
        .generate_invoice(
            account_id,
            &monthly_events(sub),
            &AccountInvoices::new(vec![september]),
            Some(target_id),
            date(2011, 10, 1),
            "USD",
            None,
        )
        .unwrap();

    let invoice = result.invoice.unwrap();
    assert_eq!(invoice.id, target_id);
    assert_eq!(invoice.status, InvoiceStatus::Draft);
    assert_eq!(invoice.invoice_date, date(2011, 9, 1));
    assert_eq!(invoice.target_date, date(2011, 10, 1));
    assert_eq!(invoice.items.len(), 2);
    assert!(invoice.items.iter().any(|i| i.id == existing_item_id));
    assert!(invoice.items.iter().all(|i| i.invoice_id == target_id));
    assert_eq!(invoice.balance(), dec!(20));
    assert!(result.charged_through_dates.is_empty());
}

#[test]
fn draft_invoices_do_not_move_charged_through_dates() {
    let config = InvoiceConfig {
        draft_invoices: true,
        ..InvoiceConfig::default()
    };
    let result = generator_with(date(2011, 9, 1), config, InMemoryUsageStore::default())
        .generate_invoice(
            Uuid::new_v4(),
            &monthly_events(Uuid::new_v4()),
            &AccountInvoices::default(),
            None,
            date(2011, 9, 1),
            "USD",
            None,
        )
        .unwrap();

    let invoice = result.invoice.unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Draft);
    assert_eq!(invoice.invoice_date, date(2011, 9, 1));
    assert!(result.charged_through_dates.is_empty());
}

#[test]
fn charged_through_dates_group_subscriptions() {
    let monthly = Uuid::new_v4();
    let one_off = Uuid::new_v4();
    let events = in_advance(vec![
        EventBuilder::new(monthly, date(2011, 9, 1))
            .recurring(dec!(10))
            .build(),
        EventBuilder::new(one_off, date(2011, 9, 5))
            .fixed(dec!(99))
            .build(),
    ]);

    let result = generator(date(2011, 10, 3))
        .generate_invoice(
            Uuid::new_v4(),
            &events,
            &AccountInvoices::default(),
            None,
            date(2011, 10, 3),
            "USD",
            None,
        )
        .unwrap();

    let invoice = result.invoice.as_ref().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Committed);
    assert_eq!(result.charged_through_dates.len(), 2);
    assert_eq!(result.charged_through_dates[&date(2011, 11, 1)], vec![monthly]);
    assert_eq!(result.charged_through_dates[&date(2011, 9, 5)], vec![one_off]);
}

#[test]
fn dry_run_matches_real_run() {
    let account_id = Uuid::new_v4();
    let sub = Uuid::new_v4();
    let events = monthly_events(sub);
    let generator = generator(date(2011, 10, 3));
    let dry_run = DryRunInfo {
        dry_run_type: DryRunType::TargetDate,
        target_date: Some(date(2011, 10, 3)),
    };

    let real = generator
        .generate_invoice(
            account_id,
            &events,
            &AccountInvoices::default(),
            None,
            date(2011, 10, 3),
            "USD",
            None,
        )
        .unwrap();
    let dry = generator
        .generate_invoice(
            account_id,
            &events,
            &AccountInvoices::default(),
            None,
            date(2011, 10, 3),
            "USD",
            Some(&dry_run),
        )
        .unwrap();

    let (real, dry) = (real.invoice.unwrap(), dry.invoice.unwrap());
    assert_eq!(real.items.len(), dry.items.len());
    for (a, b) in real.items.iter().zip(dry.items.iter()) {
        assert!(a.matches(b));
    }
}

#[test]
fn generation_runs_show_up_in_metrics_text() {
    init_metrics();
    let sub = Uuid::new_v4();
    let result = generator(date(2011, 10, 3))
        .generate_invoice(
            Uuid::new_v4(),
            &monthly_events(sub),
            &AccountInvoices::default(),
            None,
            date(2011, 10, 3),
            "USD",
            None,
        )
        .unwrap();
    assert!(result.has_invoice());

    let text = get_metrics();
    assert!(text.contains("invoice_generation_runs_total{outcome=\"invoice\"}"));
    assert!(text.contains("invoice_items_generated_total"));
    assert!(text.contains("invoice_generation_duration_seconds"));
}

#[test]
fn request_file_generates_invoice() {
    common::init_tracing();
    let account_id = Uuid::new_v4();
    let sub = Uuid::new_v4();
    let event = |effective: &str, transition: &str, ordering: i64, period: &str, price: Option<&str>| {
        json!({
            "subscription_id": sub,
            "bundle_id": Uuid::nil(),
            "effective_date": effective,
            "total_ordering": ordering,
            "transition": transition,
            "plan_name": "pistol-monthly",
            "phase_name": "pistol-monthly-evergreen",
            "phase_type": "evergreen",
            "billing_period": period,
            "recurring_price": price,
            "bcd": 1
        })
    };
    // Events out of order on purpose.
    let request = json!({
        "account_id": account_id,
        "currency": "USD",
        "target_date": "2011-10-03",
        "dry_run_info": { "dry_run_type": "target_date" },
        "events": {
            "events": [
                event("2011-10-03T00:00:00Z", "cancel", 1, "no_billing_period", None),
                event("2011-09-01T00:00:00Z", "create", 0, "monthly", Some("10")),
            ]
        }
    });

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(request.to_string().as_bytes()).unwrap();
    let json = std::fs::read_to_string(file.path()).unwrap();

    let request = GenerationRequest::from_json(&json).unwrap();
    assert!(request.existing.invoices.is_empty());
    assert_eq!(request.events.events()[0].effective_local_date(), date(2011, 9, 1));

    let generator = generator_with(date(2011, 10, 3), InvoiceConfig::default(), request.usage_store());
    let result = request.generate(&generator).unwrap();

    let invoice = result.invoice.unwrap();
    assert_eq!(invoice.account_id, account_id);
    assert!(invoice
        .items
        .iter()
        .all(|i| i.item_type == InvoiceItemType::Recurring));
    assert_eq!(invoice.balance(), dec!(10.65));
}

#[test]
fn malformed_request_is_rejected() {
    assert!(GenerationRequest::from_json("{\"account_id\": 42}").is_err());
}
