//! Property-based tests for order book priority and match-price invariants.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ptx_matching_core::book::OrderBook;
use ptx_matching_core::{Category, Engine, Side};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use uuid::Uuid;

fn price_strategy() -> impl Strategy<Value = f64> {
    (1i64..=1000i64).prop_map(|cents| cents as f64 / 100.0)
}

fn quantity_strategy() -> impl Strategy<Value = f64> {
    (1i64..=1000i64).prop_map(|units| units as f64)
}

fn side_strategy() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Buy), Just(Side::Sell)]
}

fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Resting orders on one side always come out of `snapshot_ids` in
    /// strict priority order: best price first, ties broken by earlier
    /// `createdAt`, ties on both broken by ascending id.
    #[test]
    fn book_priority_is_a_strict_total_order(
        entries in prop::collection::vec((side_strategy(), price_strategy(), quantity_strategy(), 0i64..500i64), 1..40)
    ) {
        let mut book = OrderBook::new();
        let mut ids_by_side: std::collections::HashMap<Side, Vec<(f64, DateTime<Utc>, Uuid)>> = std::collections::HashMap::new();

        for (side, price, quantity, offset_ms) in entries {
            let id = Uuid::new_v4();
            let created_at = base_time() + ChronoDuration::milliseconds(offset_ms);
            book.insert(Category::Solar, side, id, price, quantity, created_at).unwrap();
            ids_by_side.entry(side).or_default().push((price, created_at, id));
        }

        for side in [Side::Buy, Side::Sell] {
            let observed = book.snapshot_ids(Category::Solar, side);
            let mut expected = ids_by_side.remove(&side).unwrap_or_default();
            expected.sort_by(|a, b| {
                let price_cmp = match side {
                    Side::Buy => b.0.partial_cmp(&a.0).unwrap(),
                    Side::Sell => a.0.partial_cmp(&b.0).unwrap(),
                };
                price_cmp.then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2))
            });
            let expected_ids: Vec<Uuid> = expected.into_iter().map(|(_, _, id)| id).collect();
            prop_assert_eq!(observed, expected_ids);
        }
    }

    /// A completed match's execution price always lies between the two
    /// limit prices that produced it (inclusive), regardless of which
    /// side submitted first.
    #[test]
    fn execution_price_is_between_the_two_limits(
        resting_price in price_strategy(),
        incoming_price in price_strategy(),
        quantity in quantity_strategy(),
        resting_side in side_strategy(),
    ) {
        let incoming_side = resting_side.opposite();
        // Only exercise the crossing case; skip combinations that would rest.
        let crosses = match incoming_side {
            Side::Buy => incoming_price >= resting_price,
            Side::Sell => incoming_price <= resting_price,
        };
        prop_assume!(crosses);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let contract = runtime.block_on(async {
            let engine = Engine::with_default_config();
            engine.submit_order(resting_side, Category::Wind, quantity, resting_price, "resting".into()).await.unwrap();
            let result = engine.submit_order(incoming_side, Category::Wind, quantity, incoming_price, "incoming".into()).await.unwrap();
            prop_assert!(result.matched, "expected a cross");
            let order = engine.query_order(result.order_id).await.unwrap();
            let contract_id = order.contract_id.unwrap();
            Ok::<_, TestCaseError>(engine.get_contract(contract_id).await.unwrap())
        })?;

        let (lo, hi) = if resting_price <= incoming_price {
            (resting_price, incoming_price)
        } else {
            (incoming_price, resting_price)
        };
        prop_assert!(contract.execution_price >= lo - 1e-9 && contract.execution_price <= hi + 1e-9);
    }
}
