//! # ChainLocks Metrics
//!
//! Prometheus metrics for chain-lock processing and enforcement.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! qc-09-chainlocks = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `chainlocks_messages_processed_total` - CLSIGs accepted (shares and aggregates)
//! - `chainlocks_messages_rejected_total` - CLSIGs rejected, by reason
//! - `chainlocks_aggregates_created_total` - Aggregates built from local shares
//! - `chainlocks_best_height` - Height of the best known chain lock
//! - `chainlocks_enforcements_total` - Enforcement calls into the chain manager

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_counter_vec, register_int_counter, register_int_gauge, CounterVec, IntCounter,
    IntGauge,
};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref MESSAGES_PROCESSED: IntCounter = register_int_counter!(
        "chainlocks_messages_processed_total",
        "Total number of CLSIGs accepted"
    )
    .expect("Failed to create MESSAGES_PROCESSED metric");

    /// Rejections labeled by reason
    pub static ref MESSAGES_REJECTED: CounterVec = register_counter_vec!(
        "chainlocks_messages_rejected_total",
        "Total number of CLSIGs rejected",
        &["reason"]
    )
    .expect("Failed to create MESSAGES_REJECTED metric");

    pub static ref AGGREGATES_CREATED: IntCounter = register_int_counter!(
        "chainlocks_aggregates_created_total",
        "Total number of aggregates built from shares"
    )
    .expect("Failed to create AGGREGATES_CREATED metric");

    pub static ref BEST_HEIGHT: IntGauge = register_int_gauge!(
        "chainlocks_best_height",
        "Height of the best known chain lock"
    )
    .expect("Failed to create BEST_HEIGHT metric");

    pub static ref ENFORCEMENTS: IntCounter = register_int_counter!(
        "chainlocks_enforcements_total",
        "Total number of enforcement calls"
    )
    .expect("Failed to create ENFORCEMENTS metric");
}

#[cfg(feature = "metrics")]
pub fn record_message_processed() {
    MESSAGES_PROCESSED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_message_rejected(reason: &str) {
    MESSAGES_REJECTED.with_label_values(&[reason]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_aggregate_created() {
    AGGREGATES_CREATED.inc();
}

#[cfg(feature = "metrics")]
pub fn set_best_height(height: i32) {
    BEST_HEIGHT.set(height as i64);
}

#[cfg(feature = "metrics")]
pub fn record_enforcement() {
    ENFORCEMENTS.inc();
}

// No-op implementations (metrics feature disabled)

#[cfg(not(feature = "metrics"))]
pub fn record_message_processed() {}

#[cfg(not(feature = "metrics"))]
pub fn record_message_rejected(_reason: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_aggregate_created() {}

#[cfg(not(feature = "metrics"))]
pub fn set_best_height(_height: i32) {}

#[cfg(not(feature = "metrics"))]
pub fn record_enforcement() {}
