//! # Analytics Aggregator (C5)
//!
//! Derives summary statistics from the current order and contract
//! population. Every figure here is recomputed from the registry and
//! contract store; the aggregator holds no state of its own beyond a
//! short-lived cache of the last computed snapshot.

use crate::matching::MatchingEngine;
use crate::types::{Category, ContractState, OrderState};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

/// Aggregate statistics across every order and contract currently held
/// by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub total_orders: usize,
    pub pending_orders: usize,
    pub matched_orders: usize,
    pub completed_orders: usize,
    pub cancelled_orders: usize,
    pub total_contracts: usize,
    pub completed_contracts: usize,
    pub failed_contracts: usize,
    pub success_rate: f64,
    pub average_execution_latency_ms: Option<f64>,
    pub volume_by_category: Vec<(Category, f64)>,
    pub vwap_by_category: Vec<(Category, Option<f64>, Option<f64>)>,
    pub matches_last_hour: usize,
    pub verification_cache_hits: u64,
    pub verification_cache_misses: u64,
    pub verification_cache_len: usize,
    /// Percentage reduction in verification latency relative to the
    /// configured baseline: `(baseline - measured) / baseline * 100`.
    pub verification_latency_reduction_pct: Option<f64>,
}

/// `(baseline - measured) / baseline * 100`, floored at zero so a measured
/// latency above baseline reports no reduction rather than a negative one.
fn verification_reduction_pct(measured_sec: f64, baseline_sec: f64) -> f64 {
    ((baseline_sec - measured_sec) / baseline_sec * 100.0).max(0.0)
}

struct CachedStats {
    computed_at: DateTime<Utc>,
    stats: Stats,
}

/// Computes `Stats` on demand, caching the result briefly so a burst of
/// dashboard polls doesn't force a full recomputation on every call.
pub struct Analytics {
    cache_ttl: ChronoDuration,
    baseline_sec: f64,
    cached: Mutex<Option<CachedStats>>,
}

impl Analytics {
    pub fn new(cache_ttl: Duration, baseline_sec: f64) -> Self {
        Self {
            cache_ttl: ChronoDuration::from_std(cache_ttl).unwrap_or(ChronoDuration::seconds(5)),
            baseline_sec,
            cached: Mutex::new(None),
        }
    }

    pub async fn stats(&self, engine: &MatchingEngine) -> Stats {
        if let Some(cached) = self.cached.lock().unwrap().as_ref() {
            if Utc::now() - cached.computed_at < self.cache_ttl {
                return cached.stats.clone();
            }
        }

        let (orders, contracts) = engine.all_orders_and_contracts().await;
        let (cache_hits, cache_misses) = engine.cache_stats().await;
        let mean_verify_latency_sec = engine.mean_verify_latency_sec().await;
        let verification_cache_len = engine.verification_cache_len().await;

        let total_orders = orders.len();
        let pending_orders = orders.iter().filter(|o| o.state == OrderState::Pending).count();
        let matched_orders = orders.iter().filter(|o| o.state == OrderState::Matched).count();
        let completed_orders = orders.iter().filter(|o| o.state == OrderState::Completed).count();
        let cancelled_orders = orders.iter().filter(|o| o.state == OrderState::Cancelled).count();

        let total_contracts = contracts.len();
        let completed_contracts = contracts.iter().filter(|c| c.state == ContractState::Completed).count();
        let failed_contracts = contracts.iter().filter(|c| c.state == ContractState::Failed).count();
        // Orders cancelled after reaching `matched` (a matched counterpart
        // was cancelled before its contract deployed) never produce a
        // completed or failed contract, so they're folded into the
        // denominator directly rather than read off the contract store.
        let cancelled_after_match = orders
            .iter()
            .filter(|o| o.state == OrderState::Cancelled && o.matched_with.is_some())
            .count();
        let success_denominator = completed_contracts + failed_contracts + cancelled_after_match;
        let success_rate = if success_denominator == 0 {
            0.0
        } else {
            completed_contracts as f64 / success_denominator as f64 * 100.0
        };

        let latencies: Vec<f64> = orders
            .iter()
            .filter_map(|o| o.execution_latency)
            .map(|d| d.as_secs_f64() * 1000.0)
            .collect();
        let average_execution_latency_ms = if latencies.is_empty() {
            None
        } else {
            Some(latencies.iter().sum::<f64>() / latencies.len() as f64)
        };

        let volume_by_category: Vec<(Category, f64)> = Category::ALL
            .iter()
            .map(|&category| {
                let volume = orders
                    .iter()
                    .filter(|o| o.category == category && o.state != OrderState::Cancelled)
                    .map(|o| o.quantity)
                    .sum();
                (category, volume)
            })
            .collect();

        let mut vwap_by_category = Vec::with_capacity(Category::ALL.len());
        for &category in Category::ALL.iter() {
            let buy_vwap = engine.book_vwap(category, crate::types::Side::Buy).await;
            let sell_vwap = engine.book_vwap(category, crate::types::Side::Sell).await;
            vwap_by_category.push((category, buy_vwap, sell_vwap));
        }

        let one_hour_ago = Utc::now() - ChronoDuration::hours(1);
        let matches_last_hour = contracts.iter().filter(|c| c.created_at >= one_hour_ago).count();

        let verification_latency_reduction_pct =
            mean_verify_latency_sec.map(|measured_sec| verification_reduction_pct(measured_sec, self.baseline_sec));

        let stats = Stats {
            total_orders,
            pending_orders,
            matched_orders,
            completed_orders,
            cancelled_orders,
            total_contracts,
            completed_contracts,
            failed_contracts,
            success_rate,
            average_execution_latency_ms,
            volume_by_category,
            vwap_by_category,
            matches_last_hour,
            verification_cache_hits: cache_hits,
            verification_cache_misses: cache_misses,
            verification_cache_len,
            verification_latency_reduction_pct,
        };

        *self.cached.lock().unwrap() = Some(CachedStats { computed_at: Utc::now(), stats: stats.clone() });
        stats
    }
}
