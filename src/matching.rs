//! # Matching Engine (C3)
//!
//! Drives the whole-order continuous double auction: validates
//! submissions, walks the book for a crossing counterparty, stages a
//! match into a contract, then deploys and executes that contract. The
//! book, registry, and contract store share a single writer lock so the
//! invariants below never race against each other — but the lock is
//! released while the settlement side effect runs, so a slow execute
//! never blocks other submissions or cancellations.
//!
//! Whole-order only: a match either consumes both resting orders
//! completely or does not happen. Partial fills are not supported.

use crate::book::OrderBook;
use crate::contract::ContractRegistry;
use crate::errors::{EngineError, EngineResult};
use crate::events::EventSink;
use crate::registry::TransactionRegistry;
use crate::types::{
    Category, Contract, ContractId, ContractState, Event, Order, OrderBookSnapshot, OrderFilter,
    OrderId, OrderState, Side, SubmitResult, UserId,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Runs the settlement side effect behind a deployed contract. Returning
/// `Err` fails the contract; the real work happens outside the writer
/// lock so its duration never serializes against other submissions.
pub trait ExecuteHook: Send + Sync {
    fn run(&self) -> Result<(), String>;
}

/// Default hook: every execution succeeds immediately.
pub struct AlwaysSucceed;

impl ExecuteHook for AlwaysSucceed {
    fn run(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Everything a single matching pass needs exclusive access to.
struct WriterState {
    book: OrderBook,
    registry: TransactionRegistry,
    contracts: ContractRegistry,
    /// Contract linked to an order that is `matched` but not yet
    /// `completed`. Consulted by `cancel` to decide whether the contract
    /// has reached `active` yet; cleared once the contract finalizes.
    matched_contracts: HashMap<OrderId, ContractId>,
}

/// Owns the single-writer lock plus the event sink every mutation emits
/// through. Cloning an `Arc<MatchingEngine>` gives every caller the same
/// writer; there is exactly one lock for the whole instance.
pub struct MatchingEngine {
    state: Mutex<WriterState>,
    events: Arc<dyn EventSink>,
    execute_hook: Arc<dyn ExecuteHook>,
    /// Set once a `Conflict` error is raised. Submission entry points
    /// consult this first and refuse to admit further orders once poisoned
    /// rather than risk writing on top of a registry that disagreed with
    /// itself.
    poisoned: AtomicBool,
}

fn validate_submission(quantity: f64, limit_price: f64, user_id: &str) -> EngineResult<()> {
    if quantity <= 0.0 {
        return Err(EngineError::Validation("quantity must be greater than 0".into()));
    }
    if limit_price <= 0.0 {
        return Err(EngineError::Validation("limit_price must be greater than 0".into()));
    }
    if user_id.is_empty() {
        return Err(EngineError::Validation("user_id must not be empty".into()));
    }
    Ok(())
}

/// Outcome of the staging phase, run entirely under the writer lock.
enum Staged {
    Rested,
    Matched { contract_id: ContractId },
}

impl MatchingEngine {
    pub fn new(contracts: ContractRegistry, events: Arc<dyn EventSink>) -> Self {
        Self::with_execute_hook(contracts, events, Arc::new(AlwaysSucceed))
    }

    pub fn with_execute_hook(
        contracts: ContractRegistry,
        events: Arc<dyn EventSink>,
        execute_hook: Arc<dyn ExecuteHook>,
    ) -> Self {
        Self {
            state: Mutex::new(WriterState {
                book: OrderBook::new(),
                registry: TransactionRegistry::new(),
                contracts,
                matched_contracts: HashMap::new(),
            }),
            events,
            execute_hook,
            poisoned: AtomicBool::new(false),
        }
    }

    /// Whether a prior `Conflict` has poisoned the engine. Once true, new
    /// submissions are refused; existing state can still be queried.
    pub fn poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Record a fatal conflict: log it, latch `poisoned`, and return it
    /// unchanged so callers can still propagate it with `?`.
    fn poison(&self, err: EngineError) -> EngineError {
        if let EngineError::Conflict(ref reason) = err {
            log::error!("matching engine conflict, refusing further submissions: {reason}");
            self.poisoned.store(true, Ordering::Release);
        }
        err
    }

    /// Admit an order, stage a match pass against the opposite side, then
    /// (if matched) deploy and execute the resulting contract. `createdAt`
    /// is assigned here, at the writer boundary, not by the caller.
    pub async fn submit(
        &self,
        side: Side,
        category: Category,
        quantity: f64,
        limit_price: f64,
        user_id: UserId,
    ) -> EngineResult<SubmitResult> {
        if self.poisoned() {
            return Err(EngineError::Conflict("engine poisoned by a prior conflict".into()));
        }
        validate_submission(quantity, limit_price, &user_id)?;

        let order_id = OrderId::new_v4();
        let staged = {
            let mut state = self.state.lock().await;
            let created_at = Utc::now();
            let order = Order::new(order_id, side, category, quantity, limit_price, user_id, created_at);
            state.registry.create(order);
            self.events.emit(Event::OrderAdmitted { order_id });
            self.stage(&mut state, category, side, order_id).map_err(|e| self.poison(e))?
        };

        match staged {
            Staged::Rested => Ok(SubmitResult { order_id, matched: false }),
            Staged::Matched { contract_id } => {
                self.settle(contract_id).await.map_err(|e| self.poison(e))?;
                Ok(SubmitResult { order_id, matched: true })
            }
        }
    }

    /// Single matching attempt against the head of the opposite book: peek
    /// the best resting order, check price compatibility, and (only then)
    /// quantity equality. A deeper resting order is never consulted even
    /// if it would otherwise cross — one submission gets one attempt.
    fn stage(
        &self,
        state: &mut WriterState,
        category: Category,
        side: Side,
        incoming_id: OrderId,
    ) -> EngineResult<Staged> {
        let incoming = state
            .registry
            .get(incoming_id)
            .cloned()
            .ok_or(EngineError::OrderNotFound(incoming_id))?;
        let opposite = side.opposite();

        let rests = |state: &mut WriterState| -> EngineResult<Staged> {
            state.book.insert(category, side, incoming_id, incoming.limit_price, incoming.quantity, incoming.created_at)?;
            Ok(Staged::Rested)
        };

        let Some(best) = state.book.peek_best(category, opposite) else {
            return rests(state);
        };
        let crosses = match side {
            Side::Buy => incoming.limit_price >= best.price,
            Side::Sell => incoming.limit_price <= best.price,
        };
        if !crosses || best.quantity != incoming.quantity {
            return rests(state);
        }
        let counterpart_id = best.id;
        let counterpart = state
            .registry
            .get(counterpart_id)
            .cloned()
            .ok_or(EngineError::OrderNotFound(counterpart_id))?;

        // Execution price is the midpoint of the two limit prices, invariant
        // to which side arrived first.
        let execution_price = (incoming.limit_price + counterpart.limit_price) / 2.0;

        state.book.remove(category, opposite, counterpart_id);
        state.registry.record_match(incoming_id, counterpart_id)?;

        let (buyer, seller) = match side {
            Side::Buy => (&incoming, &counterpart),
            Side::Sell => (&counterpart, &incoming),
        };
        let contract_id = state.contracts.create(
            buyer.id,
            seller.id,
            buyer.user_id.clone(),
            seller.user_id.clone(),
            category,
            incoming.quantity,
            execution_price,
            Utc::now(),
        );
        state.matched_contracts.insert(incoming_id, contract_id);
        state.matched_contracts.insert(counterpart_id, contract_id);

        self.events.emit(Event::OrderMatched {
            buyer_order_id: buyer.id,
            seller_order_id: seller.id,
            contract_id,
            price: execution_price,
            quantity: incoming.quantity,
        });

        Ok(Staged::Matched { contract_id })
    }

    /// Deploy the staged contract, run its settlement side effect outside
    /// the writer lock, then finalize the two orders it was created from.
    async fn settle(&self, contract_id: ContractId) -> EngineResult<Contract> {
        let deployed = {
            let mut state = self.state.lock().await;
            let contract = state.contracts.deploy(contract_id)?.clone();
            contract
        };
        self.events.emit(Event::ContractDeployed {
            contract_id: deployed.id,
            tx_hash: deployed.tx_hash.clone(),
        });

        // Runs outside the writer lock: whatever this hook does (a real
        // settlement side effect in production) never serializes against
        // other submissions or cancellations.
        tokio::task::yield_now().await;
        let started = Utc::now();
        let outcome = self.execute_hook.run();
        let duration = (Utc::now() - started).to_std().unwrap_or(Duration::ZERO);

        let mut state = self.state.lock().await;
        let contract = state.contracts.finalize_execute(contract_id, duration, outcome)?.clone();
        let order_ids = [contract.buyer_order_id, contract.seller_order_id];

        match contract.state {
            ContractState::Completed => {
                for id in order_ids {
                    let _ = state.registry.record_completion(id, contract.id, duration);
                    state.matched_contracts.remove(&id);
                }
                self.events.emit(Event::ContractExecuted { contract_id: contract.id });
            }
            ContractState::Failed => {
                for id in order_ids {
                    state.matched_contracts.remove(&id);
                    if state.registry.revert_to_pending(id).is_ok() {
                        if let Some(order) = state.registry.get(id).cloned() {
                            let _ = state.book.insert(
                                order.category,
                                order.side,
                                order.id,
                                order.limit_price,
                                order.quantity,
                                order.created_at,
                            );
                        }
                    }
                }
                self.events.emit(Event::ContractFailed {
                    contract_id: contract.id,
                    reason: contract.failure_reason.clone().unwrap_or_default(),
                });
            }
            _ => {}
        }
        Ok(contract)
    }

    /// Cancel an order. `pending` orders are removed from the book
    /// directly. `matched` orders may only be cancelled while their
    /// contract has not yet reached `active`; cancelling one side reverts
    /// the other back to `pending` with its original `createdAt`.
    pub async fn cancel(&self, id: OrderId) -> EngineResult<()> {
        if self.poisoned() {
            return Err(EngineError::Conflict("engine poisoned by a prior conflict".into()));
        }
        let result = self.cancel_inner(id).await;
        result.map_err(|e| self.poison(e))
    }

    async fn cancel_inner(&self, id: OrderId) -> EngineResult<()> {
        let mut state = self.state.lock().await;
        let order = state.registry.get(id).cloned().ok_or(EngineError::OrderNotFound(id))?;
        match order.state {
            OrderState::Pending => {
                state.book.remove(order.category, order.side, id);
                state.registry.set_state(id, OrderState::Cancelled)?;
            }
            OrderState::Matched => {
                let contract_id = state.matched_contracts.get(&id).copied();
                let still_pending_deploy = match contract_id {
                    Some(cid) => state
                        .contracts
                        .get(cid)
                        .map(|c| c.state == ContractState::Pending)
                        .unwrap_or(false),
                    None => false,
                };
                if !still_pending_deploy {
                    // The match already crossed the writer boundary and its
                    // contract is past `pending` deploy — the cancellation
                    // lost the race.
                    return Err(EngineError::AlreadyMatched(id));
                }
                state.registry.set_state(id, OrderState::Cancelled)?;
                state.matched_contracts.remove(&id);
                if let Some(counterpart_id) = order.matched_with {
                    state.matched_contracts.remove(&counterpart_id);
                    state.registry.revert_to_pending(counterpart_id)?;
                    if let Some(counterpart) = state.registry.get(counterpart_id).cloned() {
                        state.book.insert(
                            counterpart.category,
                            counterpart.side,
                            counterpart.id,
                            counterpart.limit_price,
                            counterpart.quantity,
                            counterpart.created_at,
                        )?;
                    }
                }
            }
            OrderState::Cancelled => {
                return Err(EngineError::AlreadyCancelled(id));
            }
            OrderState::Completed => {
                return Err(EngineError::NotCancellable(id));
            }
        }
        self.events.emit(Event::OrderCancelled { order_id: id });
        Ok(())
    }

    pub async fn get_order(&self, id: OrderId) -> EngineResult<Order> {
        let state = self.state.lock().await;
        state.registry.get(id).cloned().ok_or(EngineError::OrderNotFound(id))
    }

    pub async fn list_orders(&self, filter: OrderFilter) -> Vec<Order> {
        let state = self.state.lock().await;
        state.registry.list(&filter)
    }

    /// Drop completed/cancelled orders whose last transition is older than
    /// `horizon`. Administrative housekeeping; pending and matched orders
    /// are never touched regardless of age.
    pub async fn evict_stale_orders(&self, horizon: chrono::DateTime<Utc>) -> usize {
        let mut state = self.state.lock().await;
        state.registry.evict_before(horizon)
    }

    pub async fn snapshot(&self, category: Category) -> OrderBookSnapshot {
        let state = self.state.lock().await;
        let buy_ids = state.book.snapshot_ids(category, Side::Buy);
        let sell_ids = state.book.snapshot_ids(category, Side::Sell);
        let buy: Vec<Order> = buy_ids.into_iter().filter_map(|id| state.registry.get(id).cloned()).collect();
        let sell: Vec<Order> = sell_ids.into_iter().filter_map(|id| state.registry.get(id).cloned()).collect();
        let (best_bid, best_ask) = state.book.best_bid_ask(category);
        let spread = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        };
        OrderBookSnapshot {
            category,
            total_buy_volume: state.book.total_volume(category, Side::Buy),
            total_sell_volume: state.book.total_volume(category, Side::Sell),
            buy,
            sell,
            best_bid,
            best_ask,
            spread,
        }
    }

    /// VWAP over the current resting orders on one side of the book —
    /// `None` when that side is empty.
    pub async fn book_vwap(&self, category: Category, side: Side) -> Option<f64> {
        let state = self.state.lock().await;
        state.book.vwap(category, side)
    }

    /// Administrative contract creation, bypassing the match path entirely
    /// (used by callers integrating directly against C4).
    #[allow(clippy::too_many_arguments)]
    pub async fn deploy_contract_direct(
        &self,
        buyer_order_id: OrderId,
        seller_order_id: OrderId,
        buyer_user_id: UserId,
        seller_user_id: UserId,
        category: Category,
        quantity: f64,
        price: f64,
    ) -> EngineResult<Contract> {
        let mut state = self.state.lock().await;
        let contract_id = state.contracts.create(
            buyer_order_id,
            seller_order_id,
            buyer_user_id,
            seller_user_id,
            category,
            quantity,
            price,
            Utc::now(),
        );
        let contract = state.contracts.deploy(contract_id)?.clone();
        drop(state);
        self.events.emit(Event::ContractDeployed { contract_id: contract.id, tx_hash: contract.tx_hash.clone() });
        Ok(contract)
    }

    /// Manually execute a contract that was deployed outside the match
    /// path (administrative / retry use).
    pub async fn execute_contract(&self, contract_id: ContractId) -> EngineResult<Contract> {
        let mut state = self.state.lock().await;
        let contract = state.contracts.execute(contract_id, || async { Ok(()) }).await?.clone();
        match contract.state {
            ContractState::Completed => self.events.emit(Event::ContractExecuted { contract_id: contract.id }),
            ContractState::Failed => self.events.emit(Event::ContractFailed {
                contract_id: contract.id,
                reason: contract.failure_reason.clone().unwrap_or_default(),
            }),
            _ => {}
        }
        Ok(contract)
    }

    pub async fn deploy_contract(&self, contract_id: ContractId) -> EngineResult<Contract> {
        let mut state = self.state.lock().await;
        let contract = state.contracts.deploy(contract_id)?.clone();
        self.events.emit(Event::ContractDeployed { contract_id: contract.id, tx_hash: contract.tx_hash.clone() });
        Ok(contract)
    }

    pub async fn verify_contract(&self, contract_id: ContractId, tx_hash: &str) -> EngineResult<bool> {
        let mut state = self.state.lock().await;
        let verified = state.contracts.verify(contract_id, tx_hash)?;
        self.events.emit(Event::ContractVerified { contract_id, verified });
        Ok(verified)
    }

    /// Verify a contract against the digest its own id authenticates to,
    /// rather than requiring the caller to already hold the right hash.
    pub async fn verify_contract_self(&self, contract_id: ContractId) -> EngineResult<bool> {
        let mut state = self.state.lock().await;
        let verified = state.contracts.verify_self(contract_id)?;
        self.events.emit(Event::ContractVerified { contract_id, verified });
        Ok(verified)
    }

    pub async fn batch_verify_contracts(&self, ids: &[ContractId]) -> Vec<(ContractId, EngineResult<bool>)> {
        let mut state = self.state.lock().await;
        state.contracts.batch_verify(ids)
    }

    pub async fn get_contract(&self, id: ContractId) -> EngineResult<Contract> {
        let state = self.state.lock().await;
        state.contracts.get(id).cloned()
    }

    pub async fn clear_verification_cache(&self) {
        let mut state = self.state.lock().await;
        state.contracts.clear_verification_cache();
    }

    pub async fn cache_stats(&self) -> (u64, u64) {
        let state = self.state.lock().await;
        state.contracts.cache_stats()
    }

    pub async fn mean_verify_latency_sec(&self) -> Option<f64> {
        let state = self.state.lock().await;
        state.contracts.mean_verify_latency_sec()
    }

    pub async fn verification_cache_len(&self) -> usize {
        let state = self.state.lock().await;
        state.contracts.cache_len()
    }

    /// Preview the deployment gas cost for a prospective trade.
    pub async fn estimate_gas(&self, quantity: f64, price: f64) -> f64 {
        let state = self.state.lock().await;
        state.contracts.estimate_gas(quantity, price)
    }

    /// The `(txHash, deployedAt)` pair recorded for an already-deployed
    /// contract, or `None` if it has not deployed yet.
    pub async fn contract_receipt(&self, id: ContractId) -> EngineResult<Option<(String, chrono::DateTime<Utc>)>> {
        let state = self.state.lock().await;
        state.contracts.receipt(id)
    }

    /// Snapshot every order and contract for analytics aggregation.
    pub async fn all_orders_and_contracts(&self) -> (Vec<Order>, Vec<Contract>) {
        let state = self.state.lock().await;
        (state.registry.all().cloned().collect(), state.contracts.all().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullEventSink;

    struct AlwaysFail;
    impl ExecuteHook for AlwaysFail {
        fn run(&self) -> Result<(), String> {
            Err("simulated settlement failure".to_string())
        }
    }

    fn engine() -> MatchingEngine {
        let contracts = ContractRegistry::new(100, Duration::from_secs(5), (0.001, 0.005));
        MatchingEngine::new(contracts, Arc::new(NullEventSink))
    }

    fn failing_engine() -> MatchingEngine {
        let contracts = ContractRegistry::new(100, Duration::from_secs(5), (0.001, 0.005));
        MatchingEngine::with_execute_hook(contracts, Arc::new(NullEventSink), Arc::new(AlwaysFail))
    }

    #[tokio::test]
    async fn crossing_orders_complete_at_midpoint() {
        let engine = engine();
        let sell = engine
            .submit(Side::Sell, Category::Solar, 100.0, 0.10, "u2".into())
            .await
            .unwrap();
        assert!(!sell.matched);
        let buy = engine
            .submit(Side::Buy, Category::Solar, 100.0, 0.12, "u1".into())
            .await
            .unwrap();
        assert!(buy.matched);

        let buy_order = engine.get_order(buy.order_id).await.unwrap();
        let sell_order = engine.get_order(sell.order_id).await.unwrap();
        assert_eq!(buy_order.state, OrderState::Completed);
        assert_eq!(sell_order.state, OrderState::Completed);
        assert_eq!(buy_order.matched_with, Some(sell.order_id));

        let snapshot = engine.snapshot(Category::Solar).await;
        assert!(snapshot.buy.is_empty() && snapshot.sell.is_empty());
    }

    #[tokio::test]
    async fn no_cross_rests_both_sides() {
        let engine = engine();
        engine.submit(Side::Buy, Category::Wind, 150.0, 0.09, "u1".into()).await.unwrap();
        let sell = engine.submit(Side::Sell, Category::Wind, 150.0, 0.10, "u2".into()).await.unwrap();
        assert!(!sell.matched);

        let snapshot = engine.snapshot(Category::Wind).await;
        assert_eq!(snapshot.best_bid, Some(0.09));
        assert_eq!(snapshot.best_ask, Some(0.10));
        assert!((snapshot.spread.unwrap() - 0.01).abs() < 1e-9);
    }

    #[tokio::test]
    async fn quantity_mismatch_does_not_cross() {
        let engine = engine();
        engine.submit(Side::Sell, Category::Hydro, 200.0, 0.08, "u2".into()).await.unwrap();
        let buy = engine.submit(Side::Buy, Category::Hydro, 100.0, 0.09, "u1".into()).await.unwrap();
        assert!(!buy.matched);
        let stats_contracts = engine.all_orders_and_contracts().await.1;
        assert!(stats_contracts.is_empty());
    }

    #[tokio::test]
    async fn price_time_priority_picks_earlier_order() {
        let engine = engine();
        let a = engine.submit(Side::Sell, Category::Biomass, 50.0, 0.15, "uA".into()).await.unwrap();
        let _b = engine.submit(Side::Sell, Category::Biomass, 50.0, 0.15, "uB".into()).await.unwrap();
        let c = engine.submit(Side::Buy, Category::Biomass, 50.0, 0.16, "uC".into()).await.unwrap();
        assert!(c.matched);

        let a_order = engine.get_order(a.order_id).await.unwrap();
        assert_eq!(a_order.state, OrderState::Completed);
        let snapshot = engine.snapshot(Category::Biomass).await;
        assert_eq!(snapshot.sell.len(), 1);
    }

    #[tokio::test]
    async fn cancel_pending_empties_book() {
        let engine = engine();
        let result = engine.submit(Side::Buy, Category::Solar, 100.0, 0.12, "u1".into()).await.unwrap();
        engine.cancel(result.order_id).await.unwrap();
        let order = engine.get_order(result.order_id).await.unwrap();
        assert_eq!(order.state, OrderState::Cancelled);
        let snapshot = engine.snapshot(Category::Solar).await;
        assert!(snapshot.buy.is_empty());
    }

    #[tokio::test]
    async fn execute_failure_reverts_both_orders_to_pending() {
        let engine = failing_engine();
        let sell = engine.submit(Side::Sell, Category::Solar, 10.0, 0.10, "u2".into()).await.unwrap();
        let buy = engine.submit(Side::Buy, Category::Solar, 10.0, 0.14, "u1".into()).await.unwrap();
        assert!(buy.matched);

        let buy_order = engine.get_order(buy.order_id).await.unwrap();
        let sell_order = engine.get_order(sell.order_id).await.unwrap();
        assert_eq!(buy_order.state, OrderState::Pending);
        assert_eq!(sell_order.state, OrderState::Pending);
        assert!(buy_order.matched_with.is_none() && sell_order.matched_with.is_none());

        let (_, contracts) = engine.all_orders_and_contracts().await;
        assert_eq!(contracts[0].state, ContractState::Failed);

        let snapshot = engine.snapshot(Category::Solar).await;
        assert_eq!(snapshot.buy.len(), 1);
        assert_eq!(snapshot.sell.len(), 1);
    }

    #[tokio::test]
    async fn cancel_terminal_order_is_rejected() {
        let engine = engine();
        let result = engine.submit(Side::Buy, Category::Wind, 5.0, 0.10, "buyer".into()).await.unwrap();
        engine.cancel(result.order_id).await.unwrap();
        assert!(matches!(engine.cancel(result.order_id).await, Err(EngineError::AlreadyCancelled(_))));
    }

    #[tokio::test]
    async fn cancel_a_completed_order_is_not_cancellable() {
        let engine = engine();
        let sell = engine.submit(Side::Sell, Category::Solar, 10.0, 0.10, "u2".into()).await.unwrap();
        let buy = engine.submit(Side::Buy, Category::Solar, 10.0, 0.12, "u1".into()).await.unwrap();
        assert!(buy.matched);
        assert!(matches!(engine.cancel(buy.order_id).await, Err(EngineError::NotCancellable(_))));
        assert!(matches!(engine.cancel(sell.order_id).await, Err(EngineError::NotCancellable(_))));
    }

    struct SlowSucceed;
    impl ExecuteHook for SlowSucceed {
        fn run(&self) -> Result<(), String> {
            std::thread::sleep(Duration::from_millis(50));
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_after_deploy_reports_already_matched() {
        // Once a match's contract has moved past `pending` deploy, a cancel
        // racing the in-flight settlement lost — it reports `AlreadyMatched`
        // rather than the generic `NotCancellable`.
        let contracts = ContractRegistry::new(100, Duration::from_secs(5), (0.001, 0.005));
        let engine =
            Arc::new(MatchingEngine::with_execute_hook(contracts, Arc::new(NullEventSink), Arc::new(SlowSucceed)));

        let sell = engine.submit(Side::Sell, Category::Solar, 10.0, 0.10, "u2".into()).await.unwrap();
        assert!(!sell.matched);

        let crossing = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.submit(Side::Buy, Category::Solar, 10.0, 0.12, "u1".into()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(matches!(engine.cancel(sell.order_id).await, Err(EngineError::AlreadyMatched(_))));

        let buy = crossing.await.unwrap().unwrap();
        assert!(buy.matched);
        let sell_order = engine.get_order(sell.order_id).await.unwrap();
        assert_eq!(sell_order.state, OrderState::Completed);
    }
}
