//! Precompile address table.
//!
//! [`PrecompileSet`] answers "is there a native computation at this address,
//! and what does it return" for calls at any depth. Native extensions are
//! consulted first, then revm's standard set.

use crate::precompiles::{
    charge_and_run, NativeContract, PrecompileCall, VrfVerify, VRF_PRECOMPILE_ADDRESS,
};
use alloy_primitives::Address;
use parevm_metrics::execution::EXECUTION_PRECOMPILE_CALLS;
use revm::precompile::{PrecompileError, Precompiles};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Standard plus native precompiles.
#[derive(Clone)]
pub struct PrecompileSet {
    standard: &'static Precompiles,
    natives: BTreeMap<Address, Arc<dyn NativeContract>>,
}

impl PrecompileSet {
    /// The Istanbul standard set plus the VRF verification precompile.
    pub fn istanbul() -> Self {
        Self {
            standard: Precompiles::istanbul(),
            natives: BTreeMap::new(),
        }
        .with_native(VRF_PRECOMPILE_ADDRESS, Arc::new(VrfVerify))
    }

    /// Add a native contract at `address`, replacing any existing entry.
    pub fn with_native(mut self, address: Address, contract: Arc<dyn NativeContract>) -> Self {
        self.natives.insert(address, contract);
        self
    }

    /// Whether `address` has a precompile.
    pub fn contains(&self, address: &Address) -> bool {
        self.natives.contains_key(address) || self.standard.contains(address)
    }

    /// All precompile addresses, ascending.
    pub fn addresses(&self) -> Vec<Address> {
        let mut addrs: Vec<Address> = self
            .standard
            .addresses()
            .copied()
            .chain(self.natives.keys().copied())
            .collect();
        addrs.sort();
        addrs.dedup();
        addrs
    }

    /// Run the precompile at `address`, or return `None` if there is none.
    ///
    /// A standard precompile that rejects its input is charged its required
    /// gas. revm's error does not carry that cost, so it is recovered as the
    /// smallest gas limit at which the call stops running out of gas.
    pub fn call(&self, address: &Address, input: &[u8], gas_left: u64) -> Option<PrecompileCall> {
        if let Some(native) = self.natives.get(address) {
            record_call(address);
            return Some(charge_and_run(native.required_gas(input), gas_left, || {
                native.run(input)
            }));
        }

        let precompile = self.standard.get(address)?;
        record_call(address);
        let run = precompile.precompile();
        let call = match run(input, gas_left) {
            Ok(output) => PrecompileCall::returned(
                gas_left.saturating_sub(output.gas_used),
                &output.bytes,
            ),
            Err(PrecompileError::OutOfGas) => PrecompileCall::out_of_gas(),
            Err(e) => {
                let required = gas_charged_on_failure(gas_left, |limit| {
                    matches!(run(input, limit), Err(PrecompileError::OutOfGas))
                });
                tracing::debug!(%address, error = ?e, required, "standard precompile failed");
                PrecompileCall::failed(gas_left - required)
            }
        };
        Some(call)
    }
}

impl std::fmt::Debug for PrecompileSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrecompileSet")
            .field("natives", &self.natives.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Smallest limit in `0..=gas_left` for which `out_of_gas` is false.
fn gas_charged_on_failure(gas_left: u64, out_of_gas: impl Fn(u64) -> bool) -> u64 {
    let (mut low, mut high) = (0, gas_left);
    while low < high {
        let mid = low + (high - low) / 2;
        if out_of_gas(mid) {
            low = mid + 1;
        } else {
            high = mid;
        }
    }
    low
}

fn record_call(address: &Address) {
    let label = address.to_string();
    EXECUTION_PRECOMPILE_CALLS
        .with_label_values(&[label.as_str()])
        .inc();
}
