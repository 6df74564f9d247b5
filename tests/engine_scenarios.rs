use ptx_matching_core::{Category, Engine, EngineConfig, Event, OrderState, Side};
use std::sync::Arc;

#[tokio::test]
async fn s1_immediate_cross_completes_both_orders() {
    let engine = Engine::with_default_config();
    let sell = engine
        .submit_order(Side::Sell, Category::Solar, 100.0, 0.10, "u2".into())
        .await
        .unwrap();
    let buy = engine
        .submit_order(Side::Buy, Category::Solar, 100.0, 0.12, "u1".into())
        .await
        .unwrap();
    assert!(buy.matched);

    let buy_order = engine.query_order(buy.order_id).await.unwrap();
    let sell_order = engine.query_order(sell.order_id).await.unwrap();
    assert_eq!(buy_order.state, OrderState::Completed);
    assert_eq!(sell_order.state, OrderState::Completed);

    let contract_id = buy_order.contract_id.unwrap();
    let contract = engine.get_contract(contract_id).await.unwrap();
    assert!((contract.execution_price - 0.11).abs() < 1e-9);
    assert_eq!(contract.quantity, 100.0);
    assert!((contract.total_value - 11.00).abs() < 1e-9);

    let snapshot = engine.order_book_snapshot(Category::Solar).await;
    assert!(snapshot.buy.is_empty() && snapshot.sell.is_empty());
}

#[tokio::test]
async fn s2_no_cross_rests_with_spread() {
    let engine = Engine::with_default_config();
    engine
        .submit_order(Side::Buy, Category::Wind, 150.0, 0.09, "u1".into())
        .await
        .unwrap();
    let sell = engine
        .submit_order(Side::Sell, Category::Wind, 150.0, 0.10, "u2".into())
        .await
        .unwrap();
    assert!(!sell.matched);

    let snapshot = engine.order_book_snapshot(Category::Wind).await;
    assert_eq!(snapshot.best_bid, Some(0.09));
    assert_eq!(snapshot.best_ask, Some(0.10));
    assert!((snapshot.spread.unwrap() - 0.01).abs() < 1e-9);
}

#[tokio::test]
async fn s3_quantity_mismatch_does_not_cross() {
    let engine = Engine::with_default_config();
    engine
        .submit_order(Side::Sell, Category::Hydro, 200.0, 0.08, "u2".into())
        .await
        .unwrap();
    let buy = engine
        .submit_order(Side::Buy, Category::Hydro, 100.0, 0.09, "u1".into())
        .await
        .unwrap();
    assert!(!buy.matched);

    let snapshot = engine.order_book_snapshot(Category::Hydro).await;
    assert_eq!(snapshot.buy.len(), 1);
    assert_eq!(snapshot.sell.len(), 1);

    let stats = engine.stats().await;
    assert_eq!(stats.total_contracts, 0);
}

#[tokio::test]
async fn s4_price_time_priority_picks_earlier_order() {
    let engine = Engine::with_default_config();
    let a = engine
        .submit_order(Side::Sell, Category::Biomass, 50.0, 0.15, "uA".into())
        .await
        .unwrap();
    let b = engine
        .submit_order(Side::Sell, Category::Biomass, 50.0, 0.15, "uB".into())
        .await
        .unwrap();
    let c = engine
        .submit_order(Side::Buy, Category::Biomass, 50.0, 0.16, "uC".into())
        .await
        .unwrap();
    assert!(c.matched);

    let a_order = engine.query_order(a.order_id).await.unwrap();
    let b_order = engine.query_order(b.order_id).await.unwrap();
    assert_eq!(a_order.state, OrderState::Completed);
    assert_eq!(b_order.state, OrderState::Pending);

    let snapshot = engine.order_book_snapshot(Category::Biomass).await;
    assert_eq!(snapshot.sell.len(), 1);
    assert_eq!(snapshot.sell[0].id, b.order_id);
}

#[tokio::test]
async fn s5_cancel_pending_empties_book() {
    let engine = Engine::with_default_config();
    let result = engine
        .submit_order(Side::Buy, Category::Solar, 100.0, 0.12, "u1".into())
        .await
        .unwrap();
    engine.cancel_order(result.order_id).await.unwrap();

    let order = engine.query_order(result.order_id).await.unwrap();
    assert_eq!(order.state, OrderState::Cancelled);
    let snapshot = engine.order_book_snapshot(Category::Solar).await;
    assert!(snapshot.buy.is_empty());
}

struct AlwaysFail;
impl ptx_matching_core::matching::ExecuteHook for AlwaysFail {
    fn run(&self) -> Result<(), String> {
        Err("simulated settlement failure".to_string())
    }
}

#[tokio::test]
async fn s6_execute_failure_reverts_both_orders() {
    let engine = Engine::with_execute_hook(EngineConfig::default(), Arc::new(AlwaysFail));
    let mut events = engine.subscribe();

    let sell = engine
        .submit_order(Side::Sell, Category::Solar, 10.0, 0.10, "u2".into())
        .await
        .unwrap();
    let buy = engine
        .submit_order(Side::Buy, Category::Solar, 10.0, 0.14, "u1".into())
        .await
        .unwrap();
    assert!(buy.matched);

    let buy_order = engine.query_order(buy.order_id).await.unwrap();
    let sell_order = engine.query_order(sell.order_id).await.unwrap();
    assert_eq!(buy_order.state, OrderState::Pending);
    assert_eq!(sell_order.state, OrderState::Pending);
    assert!(buy_order.matched_with.is_none() && sell_order.matched_with.is_none());

    let snapshot = engine.order_book_snapshot(Category::Solar).await;
    assert_eq!(snapshot.buy.len(), 1);
    assert_eq!(snapshot.sell.len(), 1);

    let mut saw_failed = false;
    let mut saw_completed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            Event::ContractFailed { .. } => saw_failed = true,
            Event::ContractExecuted { .. } => saw_completed = true,
            _ => {}
        }
    }
    assert!(saw_failed);
    assert!(!saw_completed);
}

#[tokio::test]
async fn s7_verification_reduction_reflects_formula() {
    let engine = Engine::with_default_config();
    let sell = engine
        .submit_order(Side::Sell, Category::Wind, 10.0, 0.10, "u2".into())
        .await
        .unwrap();
    let buy = engine
        .submit_order(Side::Buy, Category::Wind, 10.0, 0.14, "u1".into())
        .await
        .unwrap();
    let buy_order = engine.query_order(buy.order_id).await.unwrap();
    let contract_id = buy_order.contract_id.unwrap();

    for _ in 0..100 {
        assert!(engine.verify_contract_self(contract_id).await.unwrap());
    }

    let _ = sell;
    let stats = engine.stats().await;
    let reduction = stats.verification_latency_reduction_pct.expect("verify calls recorded a latency sample");
    // Real in-process verify latency is microseconds, far under the 10s
    // baseline, so the reduction is close to 100% rather than the literal
    // 99% a 0.1s-mean external system would report.
    assert!(reduction > 90.0 && reduction <= 100.0);
}
