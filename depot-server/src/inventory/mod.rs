//! Stock pool contract and cascade deduction
//!
//! Deduction is planned against a read of the current levels and then applied
//! as a batch of signed per-pool deltas. The apply step is all-or-nothing,
//! so a failure between pools cannot leave a partial drain behind.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared::inventory::{Pool, PoolDelta, PoolHint, PoolLevels};
use shared::{EngineError, EngineResult};
use std::collections::HashMap;
use std::sync::Arc;

/// External stock-level store, one record per item code.
#[async_trait]
pub trait PoolStore: Send + Sync {
    async fn get_levels(&self, item_code: &str) -> EngineResult<PoolLevels>;

    /// Apply a batch of signed per-pool adjustments atomically. Either every
    /// delta lands or none does.
    async fn apply_deltas(&self, item_code: &str, deltas: &[PoolDelta]) -> EngineResult<()>;
}

/// Plan a deduction of `quantity` units against the given levels.
///
/// With `PoolHint::Auto` the quantity cascades across pools in priority
/// order (near-zone, then overflow, then reserve), draining each before
/// touching the next. A specific hint draws from that pool alone. Returns
/// `InsufficientStock` when the covering pools cannot supply the quantity;
/// no deltas are produced in that case.
pub fn plan_deduction(
    item_code: &str,
    levels: PoolLevels,
    quantity: u32,
    hint: PoolHint,
) -> EngineResult<Vec<PoolDelta>> {
    if quantity == 0 {
        return Ok(Vec::new());
    }

    match hint {
        PoolHint::Specific(pool) => {
            let available = levels.level(pool);
            if available < quantity {
                return Err(EngineError::InsufficientStock {
                    item_code: item_code.to_string(),
                    requested: quantity,
                    available,
                });
            }
            Ok(vec![PoolDelta {
                pool,
                delta: -i64::from(quantity),
            }])
        }
        PoolHint::Auto => {
            if levels.total() < quantity {
                return Err(EngineError::InsufficientStock {
                    item_code: item_code.to_string(),
                    requested: quantity,
                    available: levels.total(),
                });
            }
            let mut remaining = quantity;
            let mut deltas = Vec::new();
            for pool in Pool::CASCADE {
                if remaining == 0 {
                    break;
                }
                let take = levels.level(pool).min(remaining);
                if take > 0 {
                    deltas.push(PoolDelta {
                        pool,
                        delta: -i64::from(take),
                    });
                    remaining -= take;
                }
            }
            Ok(deltas)
        }
    }
}

/// Read levels, plan the cascade, and apply it in one call.
pub async fn deduct(
    store: &dyn PoolStore,
    item_code: &str,
    quantity: u32,
    hint: PoolHint,
) -> EngineResult<Vec<PoolDelta>> {
    let levels = store.get_levels(item_code).await?;
    let deltas = plan_deduction(item_code, levels, quantity, hint)?;
    if !deltas.is_empty() {
        store.apply_deltas(item_code, &deltas).await?;
    }
    Ok(deltas)
}

/// In-process pool store (tests and single-node deployments).
#[derive(Default, Clone)]
pub struct MemoryPoolStore {
    levels: Arc<RwLock<HashMap<String, PoolLevels>>>,
}

impl MemoryPoolStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_levels(&self, item_code: impl Into<String>, levels: PoolLevels) {
        self.levels.write().insert(item_code.into(), levels);
    }
}

#[async_trait]
impl PoolStore for MemoryPoolStore {
    async fn get_levels(&self, item_code: &str) -> EngineResult<PoolLevels> {
        Ok(self
            .levels
            .read()
            .get(item_code)
            .copied()
            .unwrap_or_default())
    }

    async fn apply_deltas(&self, item_code: &str, deltas: &[PoolDelta]) -> EngineResult<()> {
        let mut guard = self.levels.write();
        let current = guard.get(item_code).copied().unwrap_or_default();

        // Validate the whole batch against the current levels before
        // touching anything.
        let mut next = current;
        for delta in deltas {
            let level = next.level(delta.pool);
            let updated = i64::from(level) + delta.delta;
            if updated < 0 || updated > i64::from(u32::MAX) {
                return Err(EngineError::validation(format!(
                    "delta {} on {:?} for {item_code} out of range (level {level})",
                    delta.delta, delta.pool
                )));
            }
            let updated = updated as u32;
            match delta.pool {
                Pool::NearZone => next.p1 = updated,
                Pool::Overflow => next.p2 = updated,
                Pool::Reserve => next.p3 = updated,
            }
        }

        guard.insert(item_code.to_string(), next);
        Ok(())
    }
}
