//! Gas settlement.
//!
//! Turns the gas left by a call into the gas charged for it. The refund the
//! backend reports is capped at half of the pre-refund usage.

use serde::{Deserialize, Serialize};

/// How settled gas is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPolicy {
    /// Raise very small usage towards the gas limit.
    ///
    /// Only needed to reproduce certain reference conformance vectors. Off in
    /// normal operation.
    #[serde(default)]
    pub smoothing: bool,
}

impl GasPolicy {
    /// Policy with smoothing enabled.
    pub fn smoothed() -> Self {
        Self { smoothing: true }
    }

    /// Settle gas for a call that left `gas_left` of `gas_limit` and earned
    /// `refund`.
    pub fn settle(&self, gas_limit: u64, gas_left: u64, refund: u64) -> u64 {
        let mut used = gas_limit.saturating_sub(gas_left);
        if self.smoothing {
            used = smooth(gas_limit, used);
        }
        apply_refund(used, refund)
    }
}

fn smooth(limit: u64, used: u64) -> u64 {
    if used.saturating_mul(4) < limit {
        limit
    } else if used.saturating_mul(2) < limit {
        ((limit as u128 + used as u128) / 2) as u64
    } else {
        used
    }
}

/// Subtract `refund` from `used`, never going below half of `used`.
pub fn apply_refund(used: u64, refund: u64) -> u64 {
    let half = used / 2 + used % 2;
    if used < refund.saturating_add(half) {
        half
    } else {
        used - refund
    }
}
