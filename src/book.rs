//! # Order Book (C1)
//!
//! Per-category, per-side ordered structures holding resting orders with
//! price-time priority. The book stores stable handles to orders plus the
//! small set of fields that never change while an order rests (price,
//! quantity, admission time) — the registry remains the single owner of
//! the full `Order`, the same split the matching engine's `BTreeMap`
//! composite-key books use, generalized to a strict total order.

use crate::errors::{EngineError, EngineResult};
use crate::types::{Category, OrderId, Side};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Wraps a price for ordering purposes; buy-side ranks store the negated
/// price so ascending iteration yields the highest bid first.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PriceRank(f64);

impl Eq for PriceRank {}

impl Ord for PriceRank {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}

impl PartialOrd for PriceRank {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordering key: price rank, then admission time, then id — ties on both
/// price and time are broken by id ascending for determinism.
type OrderKey = (PriceRank, DateTime<Utc>, OrderId);

#[derive(Debug, Clone, Copy)]
pub struct BookEntry {
    pub id: OrderId,
    pub price: f64,
    pub quantity: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct BookSide {
    entries: BTreeMap<OrderKey, BookEntry>,
}

impl BookSide {
    fn key(entry: &BookEntry, rank_sign: f64) -> OrderKey {
        (PriceRank(entry.price * rank_sign), entry.created_at, entry.id)
    }

    fn insert(&mut self, entry: BookEntry, rank_sign: f64) {
        self.entries.insert(Self::key(&entry, rank_sign), entry);
    }

    fn remove(&mut self, id: OrderId) -> bool {
        let key = self.entries.iter().find(|(_, e)| e.id == id).map(|(k, _)| *k);
        match key {
            Some(k) => {
                self.entries.remove(&k);
                true
            }
            None => false,
        }
    }

    fn peek_best(&self) -> Option<BookEntry> {
        self.entries.values().next().copied()
    }

    fn total_volume(&self) -> f64 {
        self.entries.values().map(|e| e.quantity).sum()
    }

    fn ordered_ids(&self) -> Vec<OrderId> {
        self.entries.values().map(|e| e.id).collect()
    }
}

#[derive(Debug, Default)]
struct CategoryBook {
    buy: BookSide,
    sell: BookSide,
}

impl CategoryBook {
    fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        }
    }

    fn rank_sign(side: Side) -> f64 {
        match side {
            Side::Buy => -1.0,
            Side::Sell => 1.0,
        }
    }
}

/// Per-category, per-side order book. Holds handles only; the registry
/// (C2) is the single source of truth for order state.
#[derive(Debug, Default)]
pub struct OrderBook {
    categories: std::collections::HashMap<Category, CategoryBook>,
}

impl OrderBook {
    pub fn new() -> Self {
        let mut categories = std::collections::HashMap::new();
        for category in Category::ALL {
            categories.insert(category, CategoryBook::default());
        }
        Self { categories }
    }

    fn category_mut(&mut self, category: Category) -> EngineResult<&mut CategoryBook> {
        self.categories
            .get_mut(&category)
            .ok_or_else(|| EngineError::Validation(format!("invalid category: {category}")))
    }

    fn category(&self, category: Category) -> EngineResult<&CategoryBook> {
        self.categories
            .get(&category)
            .ok_or_else(|| EngineError::Validation(format!("invalid category: {category}")))
    }

    /// Insert a resting order. O(log n).
    pub fn insert(
        &mut self,
        category: Category,
        side: Side,
        id: OrderId,
        price: f64,
        quantity: f64,
        created_at: DateTime<Utc>,
    ) -> EngineResult<()> {
        let rank_sign = CategoryBook::rank_sign(side);
        let book = self.category_mut(category)?;
        book.side_mut(side).insert(
            BookEntry { id, price, quantity, created_at },
            rank_sign,
        );
        Ok(())
    }

    /// Remove a resting order by id. No-op returning `false` if absent. O(log n).
    pub fn remove(&mut self, category: Category, side: Side, id: OrderId) -> bool {
        match self.categories.get_mut(&category) {
            Some(book) => book.side_mut(side).remove(id),
            None => false,
        }
    }

    /// Best (highest-priority) resting order on one side, or `None` if empty. O(1).
    pub fn peek_best(&self, category: Category, side: Side) -> Option<BookEntry> {
        self.categories.get(&category)?.side(side).peek_best()
    }

    /// Best bid and best ask prices for a category.
    pub fn best_bid_ask(&self, category: Category) -> (Option<f64>, Option<f64>) {
        let Some(book) = self.categories.get(&category) else {
            return (None, None);
        };
        (
            book.buy.peek_best().map(|e| e.price),
            book.sell.peek_best().map(|e| e.price),
        )
    }

    /// Total resting volume on one side of a category.
    pub fn total_volume(&self, category: Category, side: Side) -> f64 {
        self.categories
            .get(&category)
            .map(|b| b.side(side).total_volume())
            .unwrap_or(0.0)
    }

    /// Copy-on-read snapshot of ids on one side, best-first.
    pub fn snapshot_ids(&self, category: Category, side: Side) -> Vec<OrderId> {
        self.categories
            .get(&category)
            .map(|b| b.side(side).ordered_ids())
            .unwrap_or_default()
    }

    /// Volume-weighted average price for one side of a category;
    /// `None` if the side is empty.
    pub fn vwap(&self, category: Category, side: Side) -> Option<f64> {
        let book = self.category(category).ok()?;
        let entries = &book.side(side).entries;
        if entries.is_empty() {
            return None;
        }
        let (numer, denom) = entries.values().fold((0.0, 0.0), |(n, d), e| {
            (n + e.price * e.quantity, d + e.quantity)
        });
        if denom == 0.0 {
            None
        } else {
            Some(numer / denom)
        }
    }
}
