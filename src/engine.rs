//! # Engine
//!
//! The public entry point. Wraps the matching core and analytics
//! aggregator as long-lived singletons and exposes the in-process API
//! every caller goes through: submit, cancel, query, snapshot, the
//! contract lifecycle, and stats.

use crate::analytics::{Analytics, Stats};
use crate::config::EngineConfig;
use crate::contract::ContractRegistry;
use crate::errors::EngineResult;
use crate::events::{BroadcastEventSink, EventSink};
use crate::matching::{ExecuteHook, MatchingEngine};
use crate::types::{Category, Contract, ContractId, Order, OrderBookSnapshot, OrderFilter, OrderId, Side, SubmitResult, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Top-level handle to a running matching core. Cheap to clone: internally
/// it's an `Arc` around the single writer lock and the analytics cache.
#[derive(Clone)]
pub struct Engine {
    matching: Arc<MatchingEngine>,
    analytics: Arc<Analytics>,
    event_sink: Arc<BroadcastEventSink>,
    retention_days: Option<u32>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let event_sink = Arc::new(BroadcastEventSink::new(1024));
        let contracts = ContractRegistry::new(
            config.verify_cache_capacity,
            Duration::from_millis(config.execute_timeout_ms),
            config.gas_range_eth,
        );
        let matching = Arc::new(MatchingEngine::new(contracts, event_sink.clone() as Arc<dyn EventSink>));
        let analytics = Arc::new(Analytics::new(Duration::from_secs(5), config.target_verify_baseline_sec));
        Self { matching, analytics, event_sink, retention_days: config.retention_days }
    }

    pub fn with_default_config() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Build an engine with a settlement hook other than "always succeeds",
    /// used to exercise the failure path of the match-settle pipeline
    /// without depending on a real, flaky collaborator.
    pub fn with_execute_hook(config: EngineConfig, execute_hook: Arc<dyn ExecuteHook>) -> Self {
        let event_sink = Arc::new(BroadcastEventSink::new(1024));
        let contracts = ContractRegistry::new(
            config.verify_cache_capacity,
            Duration::from_millis(config.execute_timeout_ms),
            config.gas_range_eth,
        );
        let matching = Arc::new(MatchingEngine::with_execute_hook(
            contracts,
            event_sink.clone() as Arc<dyn EventSink>,
            execute_hook,
        ));
        let analytics = Arc::new(Analytics::new(Duration::from_secs(5), config.target_verify_baseline_sec));
        Self { matching, analytics, event_sink, retention_days: config.retention_days }
    }

    /// Subscribe to the event stream (order admitted/matched/cancelled,
    /// contract deployed/executed/verified/failed).
    pub fn subscribe(&self) -> broadcast::Receiver<crate::types::Event> {
        self.event_sink.subscribe()
    }

    pub async fn submit_order(
        &self,
        side: Side,
        category: Category,
        quantity: f64,
        limit_price: f64,
        user_id: UserId,
    ) -> EngineResult<SubmitResult> {
        self.matching.submit(side, category, quantity, limit_price, user_id).await
    }

    pub async fn cancel_order(&self, order_id: OrderId) -> EngineResult<()> {
        self.matching.cancel(order_id).await
    }

    pub async fn query_order(&self, order_id: OrderId) -> EngineResult<Order> {
        self.matching.get_order(order_id).await
    }

    pub async fn list_orders(&self, filter: OrderFilter) -> Vec<Order> {
        self.matching.list_orders(filter).await
    }

    pub async fn order_book_snapshot(&self, category: Category) -> OrderBookSnapshot {
        self.matching.snapshot(category).await
    }

    /// Administrative contract creation that bypasses matching entirely
    /// (used by external pathways; the engine's own matches deploy
    /// contracts internally as part of `submit_order`).
    #[allow(clippy::too_many_arguments)]
    pub async fn deploy_contract(
        &self,
        buyer_order_id: OrderId,
        seller_order_id: OrderId,
        buyer_user_id: UserId,
        seller_user_id: UserId,
        category: Category,
        quantity: f64,
        price: f64,
    ) -> EngineResult<Contract> {
        self.matching
            .deploy_contract_direct(buyer_order_id, seller_order_id, buyer_user_id, seller_user_id, category, quantity, price)
            .await
    }

    /// Re-deploy an already-created contract by id; idempotent if it is
    /// already active.
    pub async fn redeploy_contract(&self, contract_id: ContractId) -> EngineResult<Contract> {
        self.matching.deploy_contract(contract_id).await
    }

    /// Manually execute a contract deployed outside the match path.
    pub async fn execute_contract(&self, contract_id: ContractId) -> EngineResult<Contract> {
        self.matching.execute_contract(contract_id).await
    }

    /// Check `tx_hash` against the digest the contract's id authenticates
    /// to. Note this is independent of the contract's stored `txHash`
    /// (a content hash over the trade fields, fixed at creation) — the two
    /// serve different purposes, mirroring the original's split between a
    /// contract's own transaction hash and its blockchain verification check.
    pub async fn verify_contract(&self, contract_id: ContractId, tx_hash: &str) -> EngineResult<bool> {
        self.matching.verify_contract(contract_id, tx_hash).await
    }

    /// Verify a contract without needing to already hold the correct hash.
    pub async fn verify_contract_self(&self, contract_id: ContractId) -> EngineResult<bool> {
        self.matching.verify_contract_self(contract_id).await
    }

    pub async fn batch_verify_contracts(&self, contract_ids: &[ContractId]) -> Vec<(ContractId, EngineResult<bool>)> {
        self.matching.batch_verify_contracts(contract_ids).await
    }

    pub async fn get_contract(&self, contract_id: ContractId) -> EngineResult<Contract> {
        self.matching.get_contract(contract_id).await
    }

    pub async fn clear_verification_cache(&self) {
        self.matching.clear_verification_cache().await
    }

    /// Preview the deployment gas cost for a prospective trade, without
    /// committing to it.
    pub async fn estimate_gas(&self, quantity: f64, price: f64) -> f64 {
        self.matching.estimate_gas(quantity, price).await
    }

    /// The `(txHash, deployedAt)` pair recorded for an already-deployed
    /// contract; `None` if it has not deployed yet.
    pub async fn contract_receipt(&self, contract_id: ContractId) -> EngineResult<Option<(String, chrono::DateTime<chrono::Utc>)>> {
        self.matching.contract_receipt(contract_id).await
    }

    /// Whether a prior conflict has poisoned the engine; submissions are
    /// refused once this is true.
    pub fn poisoned(&self) -> bool {
        self.matching.poisoned()
    }

    pub async fn stats(&self) -> Stats {
        self.analytics.stats(&self.matching).await
    }

    /// Drop completed/cancelled orders older than the configured
    /// `retentionDays`. A no-op returning 0 when retention is unset
    /// (the default: retain forever). Administrative housekeeping, meant
    /// to be called periodically by an operator rather than automatically.
    pub async fn evict_stale_orders(&self) -> usize {
        let Some(days) = self.retention_days else {
            return 0;
        };
        let horizon = chrono::Utc::now() - chrono::Duration::days(days as i64);
        self.matching.evict_stale_orders(horizon).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_lifecycle_submit_match_settle_verify() {
        let engine = Engine::with_default_config();
        let mut events = engine.subscribe();

        engine
            .submit_order(Side::Sell, Category::Solar, 10.0, 0.10, "seller".into())
            .await
            .unwrap();
        let buy = engine
            .submit_order(Side::Buy, Category::Solar, 10.0, 0.14, "buyer".into())
            .await
            .unwrap();
        assert!(buy.matched);

        // A successful match deploys and executes its contract within the
        // same submission; no separate deploy/execute call is needed.
        let buy_order = engine.query_order(buy.order_id).await.unwrap();
        assert_eq!(buy_order.state, crate::types::OrderState::Completed);
        let contract_id = buy_order.contract_id.expect("completed order carries its contract id");
        let contract = engine.get_contract(contract_id).await.unwrap();
        assert_eq!(contract.state, crate::types::ContractState::Completed);

        let mut saw_matched = false;
        let mut saw_executed = false;
        while let Ok(event) = events.try_recv() {
            match event {
                crate::types::Event::OrderMatched { contract_id: id, .. } if id == contract_id => saw_matched = true,
                crate::types::Event::ContractExecuted { contract_id: id } if id == contract_id => saw_executed = true,
                _ => {}
            }
        }
        assert!(saw_matched && saw_executed);

        assert!(engine.verify_contract_self(contract_id).await.unwrap());
        // The stored txHash is a content hash over the trade fields, not
        // what verification checks against, so it does not authenticate.
        assert!(!engine.verify_contract(contract_id, &contract.tx_hash).await.unwrap());

        let stats = engine.stats().await;
        assert_eq!(stats.total_contracts, 1);
        assert_eq!(stats.completed_contracts, 1);
    }

    #[tokio::test]
    async fn estimate_gas_and_receipt_round_trip_a_deployed_contract() {
        let engine = Engine::with_default_config();
        let estimate = engine.estimate_gas(10.0, 0.2).await;
        assert!(estimate > 0.0);

        let sell = engine
            .submit_order(Side::Sell, Category::Solar, 10.0, 0.10, "seller".into())
            .await
            .unwrap();
        let buy = engine
            .submit_order(Side::Buy, Category::Solar, 10.0, 0.14, "buyer".into())
            .await
            .unwrap();
        assert!(buy.matched);
        let _ = sell;
        let contract_id = engine.query_order(buy.order_id).await.unwrap().contract_id.unwrap();

        let receipt = engine.contract_receipt(contract_id).await.unwrap();
        let (tx_hash, _deployed_at) = receipt.expect("a completed match has already deployed");
        let contract = engine.get_contract(contract_id).await.unwrap();
        assert_eq!(tx_hash, contract.tx_hash);
        assert!(!engine.poisoned());
    }

    #[tokio::test]
    async fn evict_stale_orders_is_a_noop_without_retention_configured() {
        let engine = Engine::with_default_config();
        engine.submit_order(Side::Buy, Category::Hydro, 3.0, 0.08, "buyer".into()).await.unwrap();
        engine.cancel_order(engine.list_orders(OrderFilter::default()).await[0].id).await.unwrap();
        assert_eq!(engine.evict_stale_orders().await, 0);
    }

    #[tokio::test]
    async fn evict_stale_orders_drops_cancelled_orders_past_retention() {
        let mut config = EngineConfig::default();
        config.retention_days = Some(30);
        let engine = Engine::new(config);
        let order = engine.submit_order(Side::Buy, Category::Hydro, 3.0, 0.08, "buyer".into()).await.unwrap();
        engine.cancel_order(order.order_id).await.unwrap();

        // Retention horizon is 30 days back; a just-cancelled order is
        // nowhere near stale yet.
        assert_eq!(engine.evict_stale_orders().await, 0);
        assert!(engine.query_order(order.order_id).await.is_ok());
    }

    #[tokio::test]
    async fn unmatched_order_rests_in_book() {
        let engine = Engine::with_default_config();
        engine
            .submit_order(Side::Buy, Category::Hydro, 3.0, 0.08, "buyer".into())
            .await
            .unwrap();
        let snapshot = engine.order_book_snapshot(Category::Hydro).await;
        assert_eq!(snapshot.buy.len(), 1);
        assert!(snapshot.sell.is_empty());
    }
}
