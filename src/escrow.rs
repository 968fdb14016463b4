//! Escrow ledger: pending-withdrawal balances and fee-split accounting.
//!
//! Engines credit balances as rounds resolve; holders pull their funds out
//! through [`EscrowLedger::withdraw`]. The ledger never pushes value
//! anywhere. Conservation invariant: the sum of all game pools plus the sum
//! of all pending balances plus fees already paid out equals the total value
//! ever received.

use crate::errors::{GameError, GameResult};
use crate::games::types::Address;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Combined platform + charity fee cap, in basis points.
pub const FEE_CAP_BPS: u32 = 1_000;

/// Exact three-way division of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub platform: u64,
    pub charity: u64,
    pub remainder: u64,
}

impl FeeSplit {
    pub fn total(&self) -> u64 {
        self.platform + self.charity + self.remainder
    }
}

/// Split `pool` into platform fee, charity fee, and winner remainder.
///
/// Each fee is `pool * bps / 10_000` rounded down; the remainder absorbs the
/// rounding so the three parts always sum to the pool exactly.
pub fn split_fee(pool: u64, platform_bps: u16, charity_bps: u16) -> FeeSplit {
    let platform = (pool as u128 * platform_bps as u128 / 10_000) as u64;
    let charity = (pool as u128 * charity_bps as u128 / 10_000) as u64;
    FeeSplit {
        platform,
        charity,
        remainder: pool - platform - charity,
    }
}

/// Reject fee configurations above the combined cap.
pub fn validate_fee_config(platform_bps: u16, charity_bps: u16) -> GameResult<()> {
    let total = platform_bps as u32 + charity_bps as u32;
    if total > FEE_CAP_BPS {
        return Err(GameError::FeeCapExceeded {
            total_bps: total,
            cap_bps: FEE_CAP_BPS,
        });
    }
    Ok(())
}

/// Per-address pending-withdrawal balances.
#[derive(Debug, Default)]
pub struct EscrowLedger {
    pending: DashMap<Address, u64>,
}

impl EscrowLedger {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Increase an address's pending balance. Always succeeds.
    pub fn credit(&self, address: &Address, amount: u64) {
        let mut balance = self.pending.entry(address.clone()).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Drain and return the full pending balance.
    ///
    /// The balance is removed from the map before the amount is handed back,
    /// so the external transfer a caller performs with the result can never
    /// observe (or re-enter into) a nonzero balance.
    pub fn withdraw(&self, address: &Address) -> GameResult<u64> {
        match self.pending.remove(address) {
            Some((_, amount)) if amount > 0 => Ok(amount),
            _ => Err(GameError::NothingToWithdraw),
        }
    }

    /// Current pending balance for an address.
    pub fn balance(&self, address: &Address) -> u64 {
        self.pending.get(address).map(|b| *b).unwrap_or(0)
    }

    /// Sum of all pending balances, used by reconciliation checks.
    pub fn pending_total(&self) -> u64 {
        self.pending.iter().map(|entry| *entry.value()).sum()
    }
}
