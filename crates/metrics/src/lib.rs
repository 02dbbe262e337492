//! parevm Prometheus metrics.
//!
//! Metric definitions for the execution core, grouped by stage: admission
//! (Prepare) and execution (Execute, ad-hoc calls, precompiles, staking).

pub mod admission;
pub mod execution;

use once_cell::sync::Lazy;
use prometheus::Registry;

/// Global Prometheus registry for all parevm metrics.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();

    admission::register_metrics(&registry);
    execution::register_metrics(&registry);

    registry
});

/// Initialize all metrics. Call once at startup.
pub fn init() {
    Lazy::force(&REGISTRY);
    tracing::info!("parevm metrics initialized");
}
