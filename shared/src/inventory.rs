//! Inventory pool types
//!
//! Every item lives in up to three physical stock pools with a fixed drain
//! priority: near-zone first, then overflow, then reserve.

use serde::{Deserialize, Serialize};

/// One of the three ordered stock pools.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Pool {
    /// P1 - near-zone, drained first
    NearZone,
    /// P2 - overflow
    Overflow,
    /// P3 - reserve, drained last
    Reserve,
}

impl Pool {
    /// Pools in drain-priority order.
    pub const CASCADE: [Pool; 3] = [Pool::NearZone, Pool::Overflow, Pool::Reserve];
}

/// Where a scan asks the deduction to come from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolHint {
    /// Cascade across pools in priority order
    #[default]
    Auto,
    Specific(Pool),
}

/// Current stock levels for one item code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PoolLevels {
    pub p1: u32,
    pub p2: u32,
    pub p3: u32,
}

impl PoolLevels {
    pub fn new(p1: u32, p2: u32, p3: u32) -> Self {
        Self { p1, p2, p3 }
    }

    pub fn level(&self, pool: Pool) -> u32 {
        match pool {
            Pool::NearZone => self.p1,
            Pool::Overflow => self.p2,
            Pool::Reserve => self.p3,
        }
    }

    /// Combined stock across all pools, saturating at `u32::MAX`.
    pub fn total(&self) -> u32 {
        self.p1.saturating_add(self.p2).saturating_add(self.p3)
    }
}

/// One signed per-pool stock adjustment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolDelta {
    pub pool: Pool,
    pub delta: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascade_order() {
        assert_eq!(
            Pool::CASCADE,
            [Pool::NearZone, Pool::Overflow, Pool::Reserve]
        );
    }

    #[test]
    fn test_levels_by_pool() {
        let levels = PoolLevels::new(3, 2, 10);
        assert_eq!(levels.level(Pool::NearZone), 3);
        assert_eq!(levels.level(Pool::Overflow), 2);
        assert_eq!(levels.level(Pool::Reserve), 10);
        assert_eq!(levels.total(), 15);
    }

    #[test]
    fn test_total_saturates_instead_of_overflowing() {
        let levels = PoolLevels::new(u32::MAX, u32::MAX, 1);
        assert_eq!(levels.total(), u32::MAX);
    }
}
