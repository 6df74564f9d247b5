//! # Transaction Registry (C2)
//!
//! Authoritative record of every order's identity and state. The book
//! (C1) holds handles only; this registry owns the `Order` values and is
//! the single source of truth readers and writers consult.

use crate::errors::{EngineError, EngineResult};
use crate::types::{Category, Order, OrderFilter, OrderId, OrderState, UserId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// In-memory owned collection of orders plus secondary indexes.
#[derive(Debug, Default)]
pub struct TransactionRegistry {
    orders: HashMap<OrderId, Order>,
    /// Newest-first index: reverse-chronological `createdAt` -> ids admitted at that instant.
    by_created_at: BTreeMap<DateTime<Utc>, Vec<OrderId>>,
    by_user: HashMap<UserId, Vec<OrderId>>,
    by_category_pending: HashMap<Category, Vec<OrderId>>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a new order. The caller assigns `id`/`created_at` inside the
    /// writer so admission order is deterministic.
    pub fn create(&mut self, order: Order) -> OrderId {
        let id = order.id;
        self.by_created_at.entry(order.created_at).or_default().push(id);
        self.by_user.entry(order.user_id.clone()).or_default().push(id);
        self.by_category_pending.entry(order.category).or_default().push(id);
        self.orders.insert(id, order);
        id
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    fn remove_from_pending_index(&mut self, category: Category, id: OrderId) {
        if let Some(ids) = self.by_category_pending.get_mut(&category) {
            ids.retain(|&x| x != id);
        }
    }

    /// Transition an order's state. Terminal states accept no further transitions.
    pub fn set_state(&mut self, id: OrderId, new_state: OrderState) -> EngineResult<()> {
        let order = self
            .orders
            .get_mut(&id)
            .ok_or(EngineError::OrderNotFound(id))?;
        if order.state.is_terminal() {
            return Err(EngineError::Conflict(format!(
                "order {id} is terminal ({:?}) and cannot transition to {new_state:?}",
                order.state
            )));
        }
        let category = order.category;
        order.state = new_state;
        order.updated_at = crate::utils::now();
        if new_state != OrderState::Pending {
            self.remove_from_pending_index(category, id);
        }
        Ok(())
    }

    /// Reinsert a reverted order (execute failure / cancellation of a
    /// matched counterparty) back into `pending`, preserving its original
    /// `createdAt` so book priority is unaffected.
    pub fn revert_to_pending(&mut self, id: OrderId) -> EngineResult<()> {
        let order = self
            .orders
            .get_mut(&id)
            .ok_or(EngineError::OrderNotFound(id))?;
        order.state = OrderState::Pending;
        order.matched_with = None;
        order.updated_at = crate::utils::now();
        let category = order.category;
        self.by_category_pending.entry(category).or_default().push(id);
        Ok(())
    }

    /// Record a successful match between two orders.
    pub fn record_match(&mut self, a: OrderId, b: OrderId) -> EngineResult<()> {
        self.set_state(a, OrderState::Matched)?;
        self.set_state(b, OrderState::Matched)?;
        if let Some(order) = self.orders.get_mut(&a) {
            order.matched_with = Some(b);
        }
        if let Some(order) = self.orders.get_mut(&b) {
            order.matched_with = Some(a);
        }
        Ok(())
    }

    /// Record completion after a contract executes successfully.
    pub fn record_completion(
        &mut self,
        id: OrderId,
        contract_id: crate::types::ContractId,
        latency: Duration,
    ) -> EngineResult<()> {
        self.set_state(id, OrderState::Completed)?;
        if let Some(order) = self.orders.get_mut(&id) {
            order.contract_id = Some(contract_id);
            order.execution_latency = Some(latency);
        }
        Ok(())
    }

    /// Pending order ids for a category (unordered; callers consult the book for priority).
    pub fn pending_by_category(&self, category: Category) -> Vec<OrderId> {
        self.by_category_pending
            .get(&category)
            .cloned()
            .unwrap_or_default()
    }

    /// List orders newest-first, optionally filtered by state/user, capped at `limit`.
    pub fn list(&self, filter: &OrderFilter) -> Vec<Order> {
        let limit = filter.limit.unwrap_or(200).min(200);
        let mut result = Vec::new();
        for ids in self.by_created_at.values().rev() {
            for &id in ids.iter() {
                let Some(order) = self.orders.get(&id) else { continue };
                if let Some(state) = filter.state {
                    if order.state != state {
                        continue;
                    }
                }
                if let Some(ref user_id) = filter.user_id {
                    if &order.user_id != user_id {
                        continue;
                    }
                }
                result.push(order.clone());
                if result.len() >= limit {
                    return result;
                }
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// All orders, for read-only analytics aggregation.
    pub fn all(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Evict completed/cancelled orders whose `updatedAt` is older than
    /// `horizon`. Pending and matched orders are never evicted.
    pub fn evict_before(&mut self, horizon: DateTime<Utc>) -> usize {
        let stale: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| o.state.is_terminal() && o.updated_at < horizon)
            .map(|o| o.id)
            .collect();
        for id in &stale {
            if let Some(order) = self.orders.remove(id) {
                if let Some(ids) = self.by_created_at.get_mut(&order.created_at) {
                    ids.retain(|&x| x != *id);
                }
                if let Some(ids) = self.by_user.get_mut(&order.user_id) {
                    ids.retain(|&x| x != *id);
                }
            }
        }
        stale.len()
    }
}
