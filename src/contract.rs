//! # Contract Lifecycle (C4)
//!
//! A contract is produced by a successful match and advances through
//! deploy (pending -> active) and execute (active -> completed | failed).
//! Identity is content-addressed: `txHash` is the SHA-256 of the fields
//! that define the trade, so two independently computed hashes for the
//! same trade always agree.

use crate::errors::{EngineError, EngineResult};
use crate::types::{Category, Contract, ContractId, ContractState, UserId, VerificationState};
use crate::utils::hashing::sha256_hex;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use uuid::Uuid;

/// Bounded verification cache, keyed by `(contractId, txHash)`. Plain
/// LRU by insertion/access order; no crate in the dependency stack covers
/// this so the eviction queue is hand-rolled over a `HashMap` + `VecDeque`.
struct VerificationCache {
    capacity: usize,
    entries: HashMap<(ContractId, String), bool>,
    order: VecDeque<(ContractId, String)>,
    hits: u64,
    misses: u64,
}

impl VerificationCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    fn get(&mut self, key: &(ContractId, String)) -> Option<bool> {
        let found = self.entries.get(key).copied();
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    fn insert(&mut self, key: (ContractId, String), verified: bool) {
        if !self.entries.contains_key(&key) {
            if self.entries.len() >= self.capacity {
                if let Some(evict) = self.order.pop_front() {
                    self.entries.remove(&evict);
                }
            }
            self.order.push_back(key.clone());
        }
        self.entries.insert(key, verified);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Owns every contract plus the verification cache. Deploy and execute
/// mutate contract state directly; verification only ever reads it.
pub struct ContractRegistry {
    contracts: HashMap<ContractId, Contract>,
    cache: VerificationCache,
    execute_timeout: Duration,
    gas_range_eth: (f64, f64),
    /// Wall-clock time spent inside `verify`, accumulated across every
    /// call (cache hits included) so C5 can report the baseline reduction.
    verify_latency_total: Duration,
    verify_call_count: u64,
}

impl ContractRegistry {
    pub fn new(verify_cache_capacity: usize, execute_timeout: Duration, gas_range_eth: (f64, f64)) -> Self {
        Self {
            contracts: HashMap::new(),
            cache: VerificationCache::new(verify_cache_capacity),
            execute_timeout,
            gas_range_eth,
            verify_latency_total: Duration::ZERO,
            verify_call_count: 0,
        }
    }

    /// SHA-256 over the canonical field tuple, lowercase hex. Field order
    /// and separator are part of the contract's identity: changing either
    /// changes every hash downstream.
    fn compute_tx_hash(
        buyer: &UserId,
        seller: &UserId,
        category: Category,
        quantity: f64,
        execution_price: f64,
        created_at: DateTime<Utc>,
    ) -> String {
        let payload = format!(
            "{buyer}|{seller}|{category}|{quantity}|{execution_price}|{}",
            created_at.to_rfc3339()
        );
        sha256_hex(payload.as_bytes())
    }

    /// Create a contract for a freshly matched pair, at the midpoint execution price.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &mut self,
        buyer_order_id: crate::types::OrderId,
        seller_order_id: crate::types::OrderId,
        buyer_user_id: UserId,
        seller_user_id: UserId,
        category: Category,
        quantity: f64,
        execution_price: f64,
        created_at: DateTime<Utc>,
    ) -> ContractId {
        let id = Uuid::new_v4();
        let tx_hash = Self::compute_tx_hash(
            &buyer_user_id,
            &seller_user_id,
            category,
            quantity,
            execution_price,
            created_at,
        );
        let contract = Contract {
            id,
            buyer_order_id,
            seller_order_id,
            buyer_user_id,
            seller_user_id,
            category,
            quantity,
            execution_price,
            total_value: quantity * execution_price,
            tx_hash,
            state: ContractState::Pending,
            created_at,
            deployed_at: None,
            executed_at: None,
            execution_duration: None,
            gas_used: None,
            verification: VerificationState::Unverified,
            failure_reason: None,
        };
        self.contracts.insert(id, contract);
        id
    }

    pub fn get(&self, id: ContractId) -> EngineResult<&Contract> {
        self.contracts.get(&id).ok_or(EngineError::ContractNotFound(id))
    }

    /// Preview the deployment cost for a trade before committing to it.
    /// Base transaction cost plus a fixed deployment cost plus a complexity
    /// term proportional to notional value, converted from simulated gwei
    /// into ETH and clamped into the configured gas bound.
    pub fn estimate_gas(&self, quantity: f64, price: f64) -> f64 {
        const BASE_GAS: f64 = 21_000.0;
        const CONTRACT_GAS: f64 = 50_000.0;
        const GAS_PRICE_GWEI: f64 = 30.0;
        let complexity_factor = (quantity * price / 1000.0).floor();
        let total_gas = BASE_GAS + CONTRACT_GAS + complexity_factor;
        let cost_eth = total_gas * GAS_PRICE_GWEI / 1e9;
        cost_eth.clamp(self.gas_range_eth.0, self.gas_range_eth.1)
    }

    /// The recorded `(txHash, deployedAt)` pair for an already-deployed
    /// contract. Returns `None` while still `pending`; idempotent with
    /// `deploy` since neither field changes once set.
    pub fn receipt(&self, id: ContractId) -> EngineResult<Option<(String, DateTime<Utc>)>> {
        let contract = self.get(id)?;
        Ok(contract.deployed_at.map(|deployed_at| (contract.tx_hash.clone(), deployed_at)))
    }

    /// pending -> active. Assigns a simulated gas cost drawn from the
    /// configured range, standing in for the real deployment receipt.
    /// Idempotent: redeploying an already-`active` contract is a no-op
    /// returning the same record (the `txHash` never changes).
    pub fn deploy(&mut self, id: ContractId) -> EngineResult<&Contract> {
        let (lo, hi) = self.gas_range_eth;
        let gas_used = rand::rng().random_range(lo..=hi);
        let contract = self.contracts.get_mut(&id).ok_or(EngineError::ContractNotFound(id))?;
        if contract.state == ContractState::Active {
            return Ok(contract);
        }
        if contract.state != ContractState::Pending {
            return Err(EngineError::Conflict(format!(
                "contract {id} cannot deploy from state {:?}",
                contract.state
            )));
        }
        contract.state = ContractState::Active;
        contract.deployed_at = Some(Utc::now());
        contract.gas_used = Some(gas_used);
        Ok(contract)
    }

    /// active -> (completed | failed). `work` performs the actual settlement
    /// side effect and is bounded by the configured execute timeout so a
    /// stalled collaborator can never hang the writer indefinitely. Intended
    /// for standalone/administrative use where holding the registry lock for
    /// the duration of `work` is acceptable; the matching engine's own match
    /// path uses [`Self::execute_timeout`] and [`Self::finalize_execute`]
    /// instead so the simulated latency runs outside its writer lock.
    pub async fn execute<F, Fut>(&mut self, id: ContractId, work: F) -> EngineResult<&Contract>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(), String>>,
    {
        self.begin_execute(id)?;
        let started = Utc::now();
        let outcome = tokio::time::timeout(self.execute_timeout, work()).await;
        let duration = (Utc::now() - started).to_std().unwrap_or(Duration::ZERO);
        let outcome = match outcome {
            Ok(result) => result,
            Err(_) => Err("execution timed out".to_string()),
        };
        self.finalize_execute(id, duration, outcome)
    }

    /// Verifies `id` is `active` without mutating it. Call before running
    /// the settlement side effect outside the lock.
    pub fn begin_execute(&self, id: ContractId) -> EngineResult<()> {
        let contract = self.contracts.get(&id).ok_or(EngineError::ContractNotFound(id))?;
        if contract.state != ContractState::Active {
            return Err(EngineError::Conflict(format!(
                "contract {id} cannot execute from state {:?}",
                contract.state
            )));
        }
        Ok(())
    }

    pub fn execute_timeout(&self) -> Duration {
        self.execute_timeout
    }

    /// Record the outcome of a settlement side effect run outside the lock.
    pub fn finalize_execute(
        &mut self,
        id: ContractId,
        duration: Duration,
        outcome: Result<(), String>,
    ) -> EngineResult<&Contract> {
        let contract = self.contracts.get_mut(&id).ok_or(EngineError::ContractNotFound(id))?;
        contract.execution_duration = Some(duration);
        contract.executed_at = Some(Utc::now());
        match outcome {
            Ok(()) => {
                contract.state = ContractState::Completed;
            }
            Err(reason) => {
                contract.state = ContractState::Failed;
                contract.failure_reason = Some(reason);
            }
        }
        Ok(contract)
    }

    /// Recompute the expected digest from the contract's id alone and
    /// compare the first four hex characters against the caller-supplied
    /// `tx_hash`. A cache hit on `(id, tx_hash)` short-circuits the
    /// recomputation for a repeated check of the same pair.
    pub fn verify(&mut self, id: ContractId, tx_hash: &str) -> EngineResult<bool> {
        let started = std::time::Instant::now();
        let result = self.verify_inner(id, tx_hash);
        self.verify_latency_total += started.elapsed();
        self.verify_call_count += 1;
        result
    }

    fn verify_inner(&mut self, id: ContractId, tx_hash: &str) -> EngineResult<bool> {
        let _ = self.contracts.get(&id).ok_or(EngineError::ContractNotFound(id))?;
        let cache_key = (id, tx_hash.to_string());
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(cached);
        }

        let expected = sha256_hex(id.to_string().as_bytes());
        let verified = tx_hash.len() >= 4 && expected[..4] == tx_hash[..4];
        self.cache.insert(cache_key, verified);

        let contract = self.contracts.get_mut(&id).ok_or(EngineError::ContractNotFound(id))?;
        contract.verification = if verified {
            VerificationState::Verified
        } else {
            VerificationState::Failed
        };
        Ok(verified)
    }

    /// Mean wall-clock latency across every `verify` call so far, used by
    /// C5's verification reduction metric; `None` until at least one call.
    pub fn mean_verify_latency_sec(&self) -> Option<f64> {
        if self.verify_call_count == 0 {
            None
        } else {
            Some(self.verify_latency_total.as_secs_f64() / self.verify_call_count as f64)
        }
    }

    /// Verify a contract against the digest its id itself authenticates to —
    /// the hash a legitimate caller would supply — rather than its stored
    /// `txHash`, which is a separate content hash over the trade fields and
    /// is not what `verify` checks against.
    pub fn verify_self(&mut self, id: ContractId) -> EngineResult<bool> {
        self.contracts.get(&id).ok_or(EngineError::ContractNotFound(id))?;
        let expected = sha256_hex(id.to_string().as_bytes());
        self.verify(id, &expected)
    }

    pub fn batch_verify(&mut self, ids: &[ContractId]) -> Vec<(ContractId, EngineResult<bool>)> {
        ids.iter().map(|&id| (id, self.verify_self(id))).collect()
    }

    pub fn clear_verification_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> (u64, u64) {
        (self.cache.hits, self.cache.misses)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn all(&self) -> impl Iterator<Item = &Contract> {
        self.contracts.values()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}
