//! # Matching Core Demo Binary
//!
//! Exercises the engine end to end: submits a crossing pair of orders,
//! whose match deploys and executes a contract synchronously, then
//! verifies it and prints the resulting stats. Not a server; there is no
//! HTTP or persistence layer here, those live outside this crate.

use log::info;
use ptx_matching_core::{Category, Engine, Side};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    info!("starting ptx-matching-core v{}", env!("CARGO_PKG_VERSION"));

    let config = ptx_matching_core::EngineConfig::load().unwrap_or_default();
    let engine = Engine::new(config);

    let sell = engine
        .submit_order(Side::Sell, Category::Solar, 10.0, 0.10, "seller-1".to_string())
        .await?;
    info!("submitted sell order {} (matched: {})", sell.order_id, sell.matched);

    let buy = engine
        .submit_order(Side::Buy, Category::Solar, 10.0, 0.14, "buyer-1".to_string())
        .await?;
    info!("submitted buy order {} (matched: {})", buy.order_id, buy.matched);

    if buy.matched {
        let order = engine.query_order(buy.order_id).await?;
        if let Some(contract_id) = order.contract_id {
            let contract = engine.get_contract(contract_id).await?;
            info!(
                "matched at price {} for quantity {}, contract {} settled as {:?}",
                contract.execution_price, contract.quantity, contract.id, contract.state
            );
            let verified = engine.verify_contract_self(contract_id).await?;
            info!("contract {} verified: {verified}", contract.id);
        }
    }

    let stats = engine.stats().await;
    info!(
        "stats: {} orders, {} contracts, {:.1}% success rate",
        stats.total_orders, stats.total_contracts, stats.success_rate
    );

    let evicted = engine.evict_stale_orders().await;
    if evicted > 0 {
        info!("retention housekeeping evicted {evicted} stale orders");
    }

    Ok(())
}
