//! FIXED and RECURRING generation integration tests.

mod common;

use common::{cancel, date, generator, in_advance, of_type, total, EventBuilder, PHASE};
use invoice_engine::error::InvoiceError;
use invoice_engine::models::{
    AccountInvoices, BillingEventSet, BillingMode, Invoice, InvoiceItemType, PeriodDuration,
    PhaseType, TimeUnit,
};
use rust_decimal_macros::dec;
use uuid::Uuid;

#[test]
fn cancel_mid_period_prorates_last_period() {
    let account_id = Uuid::new_v4();
    let sub = Uuid::new_v4();
    let events = in_advance(vec![
        EventBuilder::new(sub, date(2011, 9, 1))
            .recurring(dec!(10))
            .bcd(1)
            .build(),
        cancel(sub, date(2011, 10, 3)),
    ]);

    let result = generator(date(2011, 10, 3))
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

    let invoice = result.invoice.expect("invoice");
    let recurring = of_type(&invoice.items, InvoiceItemType::Recurring);
    assert_eq!(recurring.len(), 2);
    assert_eq!(recurring[0].start_date, date(2011, 9, 1));
    assert_eq!(recurring[0].end_date, Some(date(2011, 10, 1)));
    assert_eq!(recurring[0].amount, Some(dec!(10)));
    assert_eq!(recurring[1].start_date, date(2011, 10, 1));
    assert_eq!(recurring[1].end_date, Some(date(2011, 10, 3)));
    assert_eq!(recurring[1].amount, Some(dec!(0.65)));
    assert_eq!(recurring[1].rate, Some(dec!(10)));
    assert_eq!(total(&invoice.items), dec!(10.65));
    assert_eq!(
        result.notification_dates[&sub].next_recurring_date,
        Some(date(2011, 10, 3))
    );
}

#[test]
fn evergreen_bills_through_next_cycle() {
    let sub = Uuid::new_v4();
    let events = in_advance(vec![EventBuilder::new(sub, date(2011, 9, 1))
        .recurring(dec!(10))
        .build()]);

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

    let invoice = result.invoice.unwrap();
    assert_eq!(invoice.items.len(), 2);
    assert_eq!(total(&invoice.items), dec!(20));
    assert_eq!(invoice.target_date, date(2011, 10, 3));
    assert_eq!(
        result.notification_dates[&sub].next_recurring_date,
        Some(date(2011, 11, 1))
    );
}

#[test]
fn rerun_with_generated_invoice_is_empty() {
    let account_id = Uuid::new_v4();
    let sub = Uuid::new_v4();
    let events = in_advance(vec![EventBuilder::new(sub, date(2011, 9, 1))
        .recurring(dec!(10))
        .build()]);
    let generator = generator(date(2011, 9, 1));

    let first = generator
        .generate_invoice(
            account_id,
            &events,
            &AccountInvoices::default(),
            None,
            date(2011, 9, 1),
            "USD",
            None,
        )
        .unwrap();
    let invoice = first.invoice.unwrap();
    assert_eq!(total(&invoice.items), dec!(10));

    let existing = AccountInvoices::new(vec![invoice]);
    let second = generator
        .generate_invoice(
            account_id,
            &events,
            &existing,
            None,
            date(2011, 9, 1),
            "USD",
            None,
        )
        .unwrap();
    assert!(!second.has_invoice());
    // Nothing new was billed, so no recurring notification is scheduled.
    assert_eq!(second.notification_dates[&sub].next_recurring_date, None);

    let next_month = generator
        .generate_invoice(
            account_id,
            &events,
            &existing,
            None,
            date(2011, 10, 1),
            "USD",
            None,
        )
        .unwrap()
        .invoice
        .unwrap();
    assert_eq!(next_month.items.len(), 1);
    assert_eq!(next_month.items[0].start_date, date(2011, 10, 1));
    assert_eq!(next_month.items[0].end_date, Some(date(2011, 11, 1)));
    assert_eq!(next_month.items[0].amount, Some(dec!(10)));
}

#[test]
fn fixed_term_phase_stops_at_phase_end() {
    let sub = Uuid::new_v4();
    let events = in_advance(vec![EventBuilder::new(sub, date(2020, 1, 1))
        .phase("pistol-monthly-fixedterm", PhaseType::FixedTerm)
        .duration(PeriodDuration::new(TimeUnit::Years, 1))
        .recurring(dec!(10))
        .build()]);

    let invoice = generator(date(2021, 12, 15))
        .generate_invoice(
            Uuid::new_v4(),
            &events,
            &AccountInvoices::default(),
            None,
            date(2022, 1, 1),
            "USD",
            None,
        )
        .unwrap()
        .invoice
        .unwrap();

    assert_eq!(invoice.items.len(), 12);
    assert_eq!(total(&invoice.items), dec!(120));
    assert!(invoice
        .items
        .iter()
        .all(|item| item.end_date.is_some_and(|end| end <= date(2021, 1, 1))));
}

#[test]
fn target_date_too_far_in_future_is_rejected() {
    let events = in_advance(vec![EventBuilder::new(Uuid::new_v4(), date(2011, 1, 1))
        .recurring(dec!(10))
        .build()]);

    let result = generator(date(2011, 1, 1)).generate_invoice(
        Uuid::new_v4(),
        &events,
        &AccountInvoices::default(),
        None,
        date(2014, 2, 1),
        "USD",
        None,
    );
    assert!(matches!(
        result,
        Err(InvoiceError::TargetDateTooFarInFuture { max_months: 36, .. })
    ));
}

#[test]
fn target_date_is_raised_to_existing_invoice_target() {
    let account_id = Uuid::new_v4();
    let sub = Uuid::new_v4();
    let events = in_advance(vec![EventBuilder::new(sub, date(2011, 9, 1))
        .recurring(dec!(10))
        .build()]);

    let mut previous = Invoice::new(
        account_id,
        date(2011, 10, 15),
        date(2011, 10, 15),
        "USD",
        invoice_engine::models::InvoiceStatus::Committed,
    );
    previous.add_items([common::recurring_item(
        previous.id,
        account_id,
        sub,
        date(2011, 9, 1),
        date(2011, 10, 1),
        dec!(10),
        dec!(10),
    )]);

    let invoice = generator(date(2011, 10, 15))
        .generate_invoice(
            account_id,
            &events,
            &AccountInvoices::new(vec![previous]),
            None,
            date(2011, 9, 20),
            "USD",
            None,
        )
        .unwrap()
        .invoice
        .unwrap();

    assert_eq!(invoice.target_date, date(2011, 10, 15));
    assert_eq!(invoice.items.len(), 1);
    assert_eq!(invoice.items[0].start_date, date(2011, 10, 1));
    assert_eq!(invoice.items[0].end_date, Some(date(2011, 11, 1)));
}

#[test]
fn event_without_prices_bills_nothing() {
    let events = in_advance(vec![EventBuilder::new(Uuid::new_v4(), date(2011, 9, 1)).build()]);

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
fn subscription_with_invoicing_off_is_skipped() {
    let billed = Uuid::new_v4();
    let skipped = Uuid::new_v4();
    let mut events = in_advance(vec![
        EventBuilder::new(billed, date(2011, 9, 1))
            .recurring(dec!(10))
            .build(),
        EventBuilder::new(skipped, date(2011, 9, 1))
            .recurring(dec!(30))
            .fixed(dec!(5))
            .build(),
    ]);
    events.subscription_ids_with_auto_invoice_off.insert(skipped);

    let invoice = generator(date(2011, 9, 1))
        .generate_invoice(
            Uuid::new_v4(),
            &events,
            &AccountInvoices::default(),
            None,
            date(2011, 9, 1),
            "USD",
            None,
        )
        .unwrap()
        .invoice
        .unwrap();

    assert!(invoice
        .items
        .iter()
        .all(|item| item.subscription_id == Some(billed)));
    assert_eq!(total(&invoice.items), dec!(10));
}

#[test]
fn in_arrear_bills_after_period_completes() {
    let sub = Uuid::new_v4();
    let events = BillingEventSet::new(
        vec![EventBuilder::new(sub, date(2012, 1, 1))
            .recurring(dec!(10))
            .build()],
        BillingMode::InArrear,
    );
    let generator = generator(date(2012, 2, 1));

    let mid_period = generator
        .generate_invoice(
            Uuid::new_v4(),
            &events,
            &AccountInvoices::default(),
            None,
            date(2012, 1, 15),
            "USD",
            None,
        )
        .unwrap();
    assert!(!mid_period.has_invoice());
    assert_eq!(
        mid_period.notification_dates[&sub].next_recurring_date,
        Some(date(2012, 2, 1))
    );

    let period_done = generator
        .generate_invoice(
            Uuid::new_v4(),
            &events,
            &AccountInvoices::default(),
            None,
            date(2012, 2, 1),
            "USD",
            None,
        )
        .unwrap();
    let invoice = period_done.invoice.as_ref().unwrap();
    assert_eq!(invoice.items.len(), 1);
    assert_eq!(invoice.items[0].start_date, date(2012, 1, 1));
    assert_eq!(invoice.items[0].end_date, Some(date(2012, 2, 1)));
    assert_eq!(
        period_done.notification_dates[&sub].next_recurring_date,
        Some(date(2012, 3, 1))
    );
}

#[test]
fn cutoff_date_drops_items_before_it() {
    let sub = Uuid::new_v4();
    let events = in_advance(vec![EventBuilder::new(sub, date(2011, 9, 1))
        .recurring(dec!(10))
        .build()]);
    let existing = AccountInvoices::default().with_cutoff_date(date(2011, 10, 1));

    let invoice = generator(date(2011, 10, 3))
        .generate_invoice(
            Uuid::new_v4(),
            &events,
            &existing,
            None,
            date(2011, 10, 3),
            "USD",
            None,
        )
        .unwrap()
        .invoice
        .unwrap();

    assert_eq!(invoice.items.len(), 1);
    assert_eq!(invoice.items[0].start_date, date(2011, 10, 1));
}

#[test]
fn plan_change_splits_recurring_items() {
    let sub = Uuid::new_v4();
    let events = in_advance(vec![
        EventBuilder::new(sub, date(2011, 9, 1))
            .recurring(dec!(10))
            .build(),
        EventBuilder::new(sub, date(2011, 9, 16))
            .transition(invoice_engine::models::SubscriptionTransition::Change)
            .plan("shotgun-monthly")
            .phase("shotgun-monthly-evergreen", PhaseType::Evergreen)
            .recurring(dec!(30))
            .bcd(1)
            .build(),
    ]);

    let invoice = generator(date(2011, 9, 16))
        .generate_invoice(
            Uuid::new_v4(),
            &events,
            &AccountInvoices::default(),
            None,
            date(2011, 9, 16),
            "USD",
            None,
        )
        .unwrap()
        .invoice
        .unwrap();

    let recurring = of_type(&invoice.items, InvoiceItemType::Recurring);
    assert_eq!(recurring.len(), 2);
    assert_eq!(recurring[0].phase_name.as_deref(), Some(PHASE));
    assert_eq!(recurring[0].end_date, Some(date(2011, 9, 16)));
    // 15 of 30 days at 10, then 15 of 30 days at 30.
    assert_eq!(recurring[0].amount, Some(dec!(5)));
    assert_eq!(recurring[1].start_date, date(2011, 9, 16));
    assert_eq!(recurring[1].end_date, Some(date(2011, 10, 1)));
    assert_eq!(recurring[1].amount, Some(dec!(15)));
}
