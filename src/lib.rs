//! # P2P Energy Trading Matching Core
//!
//! A continuous double-auction matching engine for peer-to-peer energy
//! trading. Orders for solar, wind, hydro, and biomass energy are matched
//! whole (no partial fills) on price-time priority; a successful match
//! produces a content-addressed contract that is deployed, executed, and
//! verified through its own lifecycle.
//!
//! ## Usage
//!
//! ```rust
//! use ptx_matching_core::{Engine, Side, Category};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = Engine::with_default_config();
//!     let result = engine
//!         .submit_order(Side::Buy, Category::Solar, 10.0, 0.12, "buyer-1".to_string())
//!         .await
//!         .unwrap();
//!     println!("order {} matched: {}", result.order_id, result.matched);
//! }
//! ```

pub mod analytics;
pub mod book;
pub mod config;
pub mod contract;
pub mod engine;
pub mod errors;
pub mod events;
pub mod matching;
pub mod registry;
pub mod types;
pub mod utils;

pub use config::EngineConfig;
pub use engine::Engine;
pub use errors::{EngineError, EngineResult};
pub use types::{
    Category, Contract, ContractId, ContractState, Event, Order, OrderBookSnapshot, OrderFilter,
    OrderId, OrderState, Side, SubmitResult, UserId, VerificationState,
};
