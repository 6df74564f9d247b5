//! # Core Domain Types
//!
//! Order, Contract, and the small closed enumerations shared by every
//! component of the matching core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Opaque order identifier.
pub type OrderId = Uuid;

/// Opaque contract identifier.
pub type ContractId = Uuid;

/// Opaque user identifier. Strings are accepted verbatim from callers.
pub type UserId = String;

/// Energy category. Closed enumeration — adding a variant is a breaking change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Solar,
    Wind,
    Hydro,
    Biomass,
}

impl Category {
    pub const ALL: [Category; 4] = [Category::Solar, Category::Wind, Category::Hydro, Category::Biomass];
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::Solar => "solar",
            Category::Wind => "wind",
            Category::Hydro => "hydro",
            Category::Biomass => "biomass",
        };
        f.write_str(s)
    }
}

/// Order side. Closed enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order lifecycle state. Closed enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    Pending,
    Matched,
    Completed,
    Cancelled,
}

impl OrderState {
    /// A completed or cancelled order accepts no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderState::Completed | OrderState::Cancelled)
    }
}

/// A buy or sell order for one energy category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub side: Side,
    pub category: Category,
    pub quantity: f64,
    pub limit_price: f64,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: OrderState,
    pub matched_with: Option<OrderId>,
    pub contract_id: Option<ContractId>,
    pub execution_latency: Option<Duration>,
}

impl Order {
    pub(crate) fn new(
        id: OrderId,
        side: Side,
        category: Category,
        quantity: f64,
        limit_price: f64,
        user_id: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            side,
            category,
            quantity,
            limit_price,
            user_id,
            created_at,
            updated_at: created_at,
            state: OrderState::Pending,
            matched_with: None,
            contract_id: None,
            execution_latency: None,
        }
    }
}

/// Contract state. Monotone progression: pending -> active -> (completed | failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractState {
    Pending,
    Active,
    Completed,
    Failed,
}

/// Verification status of a contract's transaction hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationState {
    Unverified,
    Verified,
    Failed,
}

/// A contract produced by a successful match, advancing through
/// deploy (pending -> active) and execute (active -> completed | failed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub buyer_order_id: OrderId,
    pub seller_order_id: OrderId,
    pub buyer_user_id: UserId,
    pub seller_user_id: UserId,
    pub category: Category,
    pub quantity: f64,
    pub execution_price: f64,
    pub total_value: f64,
    pub tx_hash: String,
    pub state: ContractState,
    pub created_at: DateTime<Utc>,
    pub deployed_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub execution_duration: Option<Duration>,
    pub gas_used: Option<f64>,
    pub verification: VerificationState,
    pub failure_reason: Option<String>,
}

/// Result of a single submission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubmitResult {
    pub order_id: OrderId,
    pub matched: bool,
}

/// Per-category order book snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub category: Category,
    pub buy: Vec<Order>,
    pub sell: Vec<Order>,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub spread: Option<f64>,
    pub total_buy_volume: f64,
    pub total_sell_volume: f64,
}

/// Filter for `ListOrders`.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub state: Option<OrderState>,
    pub user_id: Option<UserId>,
    pub limit: Option<usize>,
}

/// Events emitted for every significant transition, consumable by an
/// external notification collaborator (out of scope for this core).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderAdmitted {
        order_id: OrderId,
    },
    OrderMatched {
        buyer_order_id: OrderId,
        seller_order_id: OrderId,
        contract_id: ContractId,
        price: f64,
        quantity: f64,
    },
    OrderCancelled {
        order_id: OrderId,
    },
    ContractDeployed {
        contract_id: ContractId,
        tx_hash: String,
    },
    ContractExecuted {
        contract_id: ContractId,
    },
    ContractVerified {
        contract_id: ContractId,
        verified: bool,
    },
    ContractFailed {
        contract_id: ContractId,
        reason: String,
    },
}
