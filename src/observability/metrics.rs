/// Prometheus metric definitions.
use std::sync::Arc;

use prometheus::{
    Gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, Registry,
    register_gauge_with_registry, register_histogram_vec_with_registry,
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry,
};

/// Metric collector for one worker process.
#[derive(Debug, Clone)]
pub struct Metrics {
    pub records_attempted: IntCounter,
    pub records_new: IntCounter,
    pub records_updated: IntCounter,
    pub records_unchanged: IntCounter,
    pub records_errored: IntCounter,
    pub records_cancelled: IntCounter,
    pub duplicates_skipped: IntCounter,
    pub purchases_submitted: IntCounter,
    pub purchases_skipped_budget: IntCounter,

    /// Labels: stage, status.
    pub stage_outcomes: IntCounterVec,
    /// Labels: stage.
    pub stage_duration: HistogramVec,
    pub completeness: Histogram,
    pub records_in_flight: Gauge,
}

impl Metrics {
    pub fn new(registry: &Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            records_attempted: register_int_counter_with_registry!(
                "caselaw_records_attempted_total",
                "Records that entered the pipeline",
                registry
            )?,
            records_new: register_int_counter_with_registry!(
                "caselaw_records_new_total",
                "Records inserted for the first time",
                registry
            )?,
            records_updated: register_int_counter_with_registry!(
                "caselaw_records_updated_total",
                "Records updated with changed content",
                registry
            )?,
            records_unchanged: register_int_counter_with_registry!(
                "caselaw_records_unchanged_total",
                "Records skipped because content was unchanged",
                registry
            )?,
            records_errored: register_int_counter_with_registry!(
                "caselaw_records_errored_total",
                "Records that failed persistence or input validation",
                registry
            )?,
            records_cancelled: register_int_counter_with_registry!(
                "caselaw_records_cancelled_total",
                "Records abandoned by cooperative cancellation",
                registry
            )?,
            duplicates_skipped: register_int_counter_with_registry!(
                "caselaw_duplicates_skipped_total",
                "In-run duplicate submissions skipped before any stage",
                registry
            )?,
            purchases_submitted: register_int_counter_with_registry!(
                "caselaw_purchases_submitted_total",
                "Paid-source purchase requests submitted",
                registry
            )?,
            purchases_skipped_budget: register_int_counter_with_registry!(
                "caselaw_purchases_skipped_budget_total",
                "Purchase attempts skipped after the budget was exhausted",
                registry
            )?,
            stage_outcomes: register_int_counter_vec_with_registry!(
                "caselaw_stage_outcomes_total",
                "Stage outcomes by stage and status",
                &["stage", "status"],
                registry
            )?,
            stage_duration: register_histogram_vec_with_registry!(
                "caselaw_stage_duration_seconds",
                "Stage execution duration by stage",
                &["stage"],
                registry
            )?,
            completeness: register_histogram_with_registry!(
                "caselaw_record_completeness",
                "Per-record completeness score",
                prometheus::linear_buckets(0.0, 10.0, 11)?,
                registry
            )?,
            records_in_flight: register_gauge_with_registry!(
                "caselaw_records_in_flight",
                "Records currently being processed",
                registry
            )?,
        })
    }
}
