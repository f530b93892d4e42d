//! FIXED item generation integration tests.

mod common;

use common::{date, generator, in_advance, of_type, EventBuilder};
use invoice_engine::models::{
    AccountInvoices, InvoiceItemType, PhaseType, SubscriptionTransition,
};
use rust_decimal_macros::dec;
use uuid::Uuid;

fn trial_event(sub: Uuid) -> EventBuilder {
    EventBuilder::new(sub, date(2011, 9, 1))
        .phase("pistol-monthly-trial", PhaseType::Trial)
        .fixed(dec!(5))
}

#[test]
fn fixed_price_produces_one_open_ended_item() {
    let sub = Uuid::new_v4();
    let events = in_advance(vec![trial_event(sub).build()]);

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

    let fixed = of_type(&invoice.items, InvoiceItemType::Fixed);
    assert_eq!(fixed.len(), 1);
    assert_eq!(fixed[0].start_date, date(2011, 9, 1));
    assert_eq!(fixed[0].end_date, None);
    assert_eq!(fixed[0].amount, Some(dec!(5)));
    assert_eq!(fixed[0].phase_name.as_deref(), Some("pistol-monthly-trial"));
}

#[test]
fn last_same_day_event_wins() {
    let sub = Uuid::new_v4();
    let events = in_advance(vec![
        trial_event(sub).build(),
        EventBuilder::new(sub, date(2011, 9, 1))
            .transition(SubscriptionTransition::Change)
            .ordering(1)
            .plan("shotgun-monthly")
            .phase("shotgun-monthly-trial", PhaseType::Trial)
            .fixed(dec!(7))
            .build(),
    ]);

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

    let fixed = of_type(&invoice.items, InvoiceItemType::Fixed);
    assert_eq!(fixed.len(), 1);
    assert_eq!(fixed[0].amount, Some(dec!(7)));
    assert_eq!(fixed[0].plan_name.as_deref(), Some("shotgun-monthly"));
}

#[test]
fn same_day_event_without_fixed_price_discards_previous() {
    let sub = Uuid::new_v4();
    let events = in_advance(vec![
        trial_event(sub).build(),
        EventBuilder::new(sub, date(2011, 9, 1))
            .transition(SubscriptionTransition::Change)
            .ordering(1)
            .recurring(dec!(10))
            .build(),
    ]);

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

    assert!(of_type(&invoice.items, InvoiceItemType::Fixed).is_empty());
    assert_eq!(of_type(&invoice.items, InvoiceItemType::Recurring).len(), 1);
}

#[test]
fn fixed_price_after_target_is_not_billed_yet() {
    let sub = Uuid::new_v4();
    let events = in_advance(vec![
        EventBuilder::new(sub, date(2011, 9, 1))
            .recurring(dec!(10))
            .build(),
        EventBuilder::new(sub, date(2011, 10, 1))
            .transition(SubscriptionTransition::Phase)
            .fixed(dec!(5))
            .recurring(dec!(10))
            .build(),
    ]);

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

    assert!(of_type(&invoice.items, InvoiceItemType::Fixed).is_empty());
}

#[test]
fn fixed_item_already_invoiced_is_not_repeated() {
    let account_id = Uuid::new_v4();
    let sub = Uuid::new_v4();
    let events = in_advance(vec![trial_event(sub).build()]);
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
        .unwrap()
        .invoice
        .unwrap();

    let second = generator
        .generate_invoice(
            account_id,
            &events,
            &AccountInvoices::new(vec![first]),
            None,
            date(2011, 9, 20),
            "USD",
            None,
        )
        .unwrap();
    assert!(!second.has_invoice());
}

#[test]
fn fixed_amount_is_rounded_to_currency() {
    let sub = Uuid::new_v4();
    let events = in_advance(vec![EventBuilder::new(sub, date(2011, 9, 1))
        .fixed(dec!(1234.5))
        .build()]);

    let invoice = generator(date(2011, 9, 1))
        .generate_invoice(
            Uuid::new_v4(),
            &events,
            &AccountInvoices::default(),
            None,
            date(2011, 9, 1),
            "JPY",
            None,
        )
        .unwrap()
        .invoice
        .unwrap();

    assert_eq!(invoice.items[0].amount, Some(dec!(1235)));
    assert_eq!(invoice.currency, "JPY");
}
