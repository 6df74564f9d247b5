//! # Error Types
//!
//! `Conflict` is fatal: the engine refuses further submissions once
//! raised. Execute and verify failures have no variant of their own —
//! both report failure through their result payload (`state`/`success`,
//! `verified`) rather than as an `Err`.

use crate::types::{ContractId, OrderId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("contract not found: {0}")]
    ContractNotFound(ContractId),

    #[error("order {0} is not cancellable in its current state")]
    NotCancellable(OrderId),

    #[error("order {0} was already cancelled")]
    AlreadyCancelled(OrderId),

    #[error("order {0} was already matched")]
    AlreadyMatched(OrderId),

    #[error("contract {0} execution timed out")]
    Timeout(ContractId),

    #[error("internal invariant breach: {0}")]
    Conflict(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
