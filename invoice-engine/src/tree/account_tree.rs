//! Account-wide reconciliation: existing items are routed to one
//! [`SubscriptionItemTree`] per subscription and merged there.

use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use super::subscription_tree::SubscriptionItemTree;
use crate::error::InvoiceError;
use crate::models::{InvoiceItem, InvoiceItemType};

#[derive(Debug)]
pub struct AccountItemTree {
    account_id: Uuid,
    target_invoice_id: Uuid,
    subscription_trees: BTreeMap<Uuid, SubscriptionItemTree>,
    subscription_by_item: HashMap<Uuid, Uuid>,
    /// Repairs and adjustments resolved through their linked item at merge
    /// time, since the linked item may be added after them.
    pending_linked_items: Vec<InvoiceItem>,
}

impl AccountItemTree {
    pub fn new(account_id: Uuid, target_invoice_id: Uuid) -> Self {
        Self {
            account_id,
            target_invoice_id,
            subscription_trees: BTreeMap::new(),
            subscription_by_item: HashMap::new(),
            pending_linked_items: Vec::new(),
        }
    }

    fn tree_for(&mut self, subscription_id: Uuid) -> &mut SubscriptionItemTree {
        let target_invoice_id = self.target_invoice_id;
        self.subscription_trees
            .entry(subscription_id)
            .or_insert_with(|| SubscriptionItemTree::new(subscription_id, target_invoice_id))
    }

    /// Items without a subscription (credits, external charges) play no
    /// part in reconciliation and are ignored.
    pub fn add_existing_item(&mut self, item: &InvoiceItem) {
        match item.item_type {
            InvoiceItemType::Fixed | InvoiceItemType::Recurring => {
                if let Some(subscription_id) = item.subscription_id {
                    self.subscription_by_item.insert(item.id, subscription_id);
                    self.tree_for(subscription_id).add_existing_item(item.clone());
                }
            }
            InvoiceItemType::RepairAdjustment | InvoiceItemType::ItemAdjustment => {
                if item.subscription_id.is_some() || item.linked_item_id.is_some() {
                    self.pending_linked_items.push(item.clone());
                }
            }
            InvoiceItemType::Usage
            | InvoiceItemType::Credit
            | InvoiceItemType::CreditBalanceAdjustment
            | InvoiceItemType::ExternalCharge => {}
        }
    }

    /// Reconcile the proposed items for every subscription and return the
    /// items to add, sorted.
    pub fn merge_with_proposed(
        mut self,
        proposed: Vec<InvoiceItem>,
    ) -> Result<Vec<InvoiceItem>, InvoiceError> {
        for item in std::mem::take(&mut self.pending_linked_items) {
            let subscription_id = item.subscription_id.or_else(|| {
                item.linked_item_id
                    .and_then(|linked| self.subscription_by_item.get(&linked).copied())
            });
            match subscription_id {
                Some(subscription_id) => self.tree_for(subscription_id).add_existing_item(item),
                None => tracing::debug!(
                    item_id = %item.id,
                    "Ignoring adjustment with no resolvable subscription"
                ),
            }
        }

        let mut proposed_by_subscription: BTreeMap<Uuid, Vec<InvoiceItem>> = BTreeMap::new();
        for item in proposed {
            let Some(subscription_id) = item.subscription_id else {
                return Err(InvoiceError::IllegalInvoicingState(format!(
                    "proposed {} item {} has no subscription",
                    item.item_type.as_str(),
                    item.id
                )));
            };
            proposed_by_subscription
                .entry(subscription_id)
                .or_default()
                .push(item);
        }
        for subscription_id in proposed_by_subscription.keys() {
            let target_invoice_id = self.target_invoice_id;
            self.subscription_trees
                .entry(*subscription_id)
                .or_insert_with(|| SubscriptionItemTree::new(*subscription_id, target_invoice_id));
        }

        let mut result = Vec::new();
        for (subscription_id, tree) in self.subscription_trees {
            let proposed = proposed_by_subscription
                .remove(&subscription_id)
                .unwrap_or_default();
            result.extend(tree.merge_with_proposed(proposed)?);
        }
        result.sort_by_key(InvoiceItem::sort_key);

        tracing::debug!(
            account_id = %self.account_id,
            items = result.len(),
            "Merged proposed items with invoice history"
        );
        Ok(result)
    }
}
