//! Precompiled contracts.
//!
//! The standard Istanbul set (0x01 to 0x09) comes from revm. Native
//! extensions implement [`NativeContract`]:
//! - VRF verification at address 0x2713

pub mod bounded;
pub mod provider;
pub mod vrf;

pub use bounded::{BoundedOutput, PrecompileBuffer, SMALL_BUF_SIZE};
pub use provider::PrecompileSet;
pub use vrf::{VrfVerify, VRF_PRECOMPILE_ADDRESS, VRF_VERIFY_GAS};

use crate::error::ExecutionError;
use alloy_primitives::Bytes;

/// A stateless native contract with a gas price known before it runs.
pub trait NativeContract: Send + Sync {
    /// Gas charged for `input`.
    fn required_gas(&self, input: &[u8]) -> u64;

    /// Compute the output for `input`.
    fn run(&self, input: &[u8]) -> Result<Bytes, ExecutionError>;
}

/// Outcome of dispatching a call to a precompile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecompileCall {
    /// Whether the contract returned output.
    pub success: bool,
    /// Whether the call faulted for lack of gas.
    pub out_of_gas: bool,
    /// Gas left after the call.
    pub gas_left: u64,
    /// Output, truncated to [`SMALL_BUF_SIZE`].
    pub output: PrecompileBuffer,
}

impl PrecompileCall {
    /// Fault for lack of gas: no output, no gas left.
    pub fn out_of_gas() -> Self {
        Self {
            success: false,
            out_of_gas: true,
            gas_left: 0,
            output: PrecompileBuffer::empty(),
        }
    }

    /// Failure after charging gas.
    pub fn failed(gas_left: u64) -> Self {
        Self {
            success: false,
            out_of_gas: false,
            gas_left,
            output: PrecompileBuffer::empty(),
        }
    }

    /// Success with `output`.
    pub fn returned(gas_left: u64, output: &[u8]) -> Self {
        Self {
            success: true,
            out_of_gas: false,
            gas_left,
            output: PrecompileBuffer::truncating(output),
        }
    }
}

/// Charge `required` gas, then run `f`.
///
/// Shared by every native contract and system contract dispatched as a
/// precompile.
pub fn charge_and_run<F>(required: u64, gas_left: u64, f: F) -> PrecompileCall
where
    F: FnOnce() -> Result<Bytes, ExecutionError>,
{
    if required > gas_left {
        return PrecompileCall::out_of_gas();
    }
    let gas_left = gas_left - required;
    match f() {
        Ok(output) => PrecompileCall::returned(gas_left, &output),
        Err(e) => {
            tracing::debug!(error = %e, "native contract failed");
            PrecompileCall::failed(gas_left)
        }
    }
}
