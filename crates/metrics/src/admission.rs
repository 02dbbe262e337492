//! Admission (Prepare) metrics.

use once_cell::sync::Lazy;
use prometheus::{Counter, CounterVec, Gauge, Histogram, Registry};

pub static ADMISSION_COLLECTED: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "parevm_admission_collected_total",
        "Total transactions handed to Prepare",
    )
    .expect("metric can be created")
});

pub static ADMISSION_ADMITTED: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "parevm_admission_admitted_total",
        "Total transactions appended to the standby queue",
    )
    .expect("metric can be created")
});

pub static ADMISSION_DISCARDS: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        prometheus::opts!(
            "parevm_admission_discarded_total",
            "Total transactions not admitted"
        ),
        &["reason"], // "gas_price_too_low", "stale_nonce", "unaffordable", ...
    )
    .expect("metric can be created")
});

pub static ADMISSION_STANDBY_QUEUE_LENGTH: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new(
        "parevm_admission_standby_queue_length",
        "Entries waiting in the standby queue",
    )
    .expect("metric can be created")
});

pub static ADMISSION_PREPARE_TIME: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(prometheus::histogram_opts!(
        "parevm_admission_prepare_time_seconds",
        "Time spent in Prepare",
        vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5]
    ))
    .expect("metric can be created")
});

/// Register all admission metrics with the given registry.
pub fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(ADMISSION_COLLECTED.clone()))
        .ok();
    registry
        .register(Box::new(ADMISSION_ADMITTED.clone()))
        .ok();
    registry
        .register(Box::new(ADMISSION_DISCARDS.clone()))
        .ok();
    registry
        .register(Box::new(ADMISSION_STANDBY_QUEUE_LENGTH.clone()))
        .ok();
    registry
        .register(Box::new(ADMISSION_PREPARE_TIME.clone()))
        .ok();
}
