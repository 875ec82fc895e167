//! Prometheus metrics instrumentation for shoal.
//!
//! This module provides Prometheus metrics for monitoring topology reactions
//! and job statistics. All metrics are conditionally compiled behind the
//! `metrics` feature flag.
//!
//! # Metrics
//!
//! ## Counters
//! - `shoal_topology_transitions_total` - Topology events handled, by kind
//! - `shoal_jobs_finished_total` - Jobs reaching a terminal outcome
//!
//! ## Gauges
//! - `shoal_jobs_queued` - Jobs currently waiting, per queue
//! - `shoal_jobs_active` - Jobs currently executing, per topic
//! - `shoal_owned_queues` - Queues the local instance currently runs
//!
//! ## Histograms
//! - `shoal_job_wait_seconds` - Time jobs spent queued before starting
//! - `shoal_job_duration_seconds` - Job execution duration in seconds
#![cfg(feature = "metrics")]

use prometheus::{
    exponential_buckets, CounterVec, Gauge, GaugeVec, HistogramVec, Opts, Registry,
};
use std::sync::LazyLock;

use crate::stats::StatisticsAggregator;

/// Label value used when a job has not been routed to a queue yet.
const UNASSIGNED_QUEUE: &str = "unassigned";

/// Global Prometheus registry for shoal metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Counter for topology events handled by the coordinator.
///
/// Labels:
/// - `event`: The event kind (init, changing, changed, properties_changed)
pub static TOPOLOGY_TRANSITIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "shoal_topology_transitions_total",
        "Total number of topology events handled",
    );
    CounterVec::new(opts, &["event"])
        .expect("shoal_topology_transitions_total metric creation failed")
});

/// Counter for jobs reaching a terminal outcome.
///
/// Labels:
/// - `topic`: The job topic
/// - `outcome`: The terminal outcome (succeeded, failed, cancelled)
pub static JOBS_FINISHED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "shoal_jobs_finished_total",
        "Total number of jobs that reached a terminal outcome",
    );
    CounterVec::new(opts, &["topic", "outcome"])
        .expect("shoal_jobs_finished_total metric creation failed")
});

/// Gauge for jobs currently waiting in queues.
///
/// Labels:
/// - `queue`: The queue name, or `unassigned` for unrouted jobs
pub static JOBS_QUEUED: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new("shoal_jobs_queued", "Jobs currently waiting in queues");
    GaugeVec::new(opts, &["queue"]).expect("shoal_jobs_queued metric creation failed")
});

/// Gauge for jobs currently executing.
///
/// Labels:
/// - `topic`: The job topic
pub static JOBS_ACTIVE: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new("shoal_jobs_active", "Jobs currently executing");
    GaugeVec::new(opts, &["topic"]).expect("shoal_jobs_active metric creation failed")
});

/// Gauge for the number of queues the local instance currently runs.
pub static OWNED_QUEUES: LazyLock<Gauge> = LazyLock::new(|| {
    Gauge::new(
        "shoal_owned_queues",
        "Queues the local instance currently runs",
    )
    .expect("shoal_owned_queues metric creation failed")
});

/// Histogram for time jobs spent queued before starting.
///
/// Labels:
/// - `topic`: The job topic
pub static JOB_WAIT_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let buckets = exponential_buckets(0.001, 2.0, 15).expect("bucket creation failed");
    let opts = prometheus::HistogramOpts::new(
        "shoal_job_wait_seconds",
        "Time jobs spent queued before starting, in seconds",
    )
    .buckets(buckets);
    HistogramVec::new(opts, &["topic"])
        .expect("shoal_job_wait_seconds metric creation failed")
});

/// Histogram for job execution duration in seconds.
///
/// Labels:
/// - `topic`: The job topic
/// - `outcome`: The terminal outcome (succeeded, failed, cancelled)
pub static JOB_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let buckets = exponential_buckets(0.001, 2.0, 15).expect("bucket creation failed");
    let opts = prometheus::HistogramOpts::new(
        "shoal_job_duration_seconds",
        "Job execution duration in seconds",
    )
    .buckets(buckets);
    HistogramVec::new(opts, &["topic", "outcome"])
        .expect("shoal_job_duration_seconds metric creation failed")
});

/// Initialize all metrics by registering them with the global registry.
///
/// This function is idempotent - calling it multiple times is safe.
pub fn init_metrics() -> anyhow::Result<()> {
    let registry = &*REGISTRY;

    for metric in [
        Box::new(TOPOLOGY_TRANSITIONS_TOTAL.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(JOBS_FINISHED_TOTAL.clone()),
        Box::new(JOBS_QUEUED.clone()),
        Box::new(JOBS_ACTIVE.clone()),
        Box::new(OWNED_QUEUES.clone()),
        Box::new(JOB_WAIT_SECONDS.clone()),
        Box::new(JOB_DURATION_SECONDS.clone()),
    ] {
        if let Err(e) = registry.register(metric) {
            let msg = e.to_string();
            if !msg.contains("Duplicate metrics collector registration attempted") {
                return Err(e.into());
            }
        }
    }

    Ok(())
}

/// Helper to count a handled topology event.
pub fn record_topology_transition(event: &str) {
    TOPOLOGY_TRANSITIONS_TOTAL.with_label_values(&[event]).inc();
}

/// Helper to record a job entering a queue.
pub fn record_job_queued(queue: Option<&str>) {
    JOBS_QUEUED
        .with_label_values(&[queue.unwrap_or(UNASSIGNED_QUEUE)])
        .inc();
}

/// Helper to record a job leaving a queue without starting.
pub fn record_job_dequeued(queue: Option<&str>) {
    JOBS_QUEUED
        .with_label_values(&[queue.unwrap_or(UNASSIGNED_QUEUE)])
        .dec();
}

/// Helper to record a job starting execution.
pub fn record_job_started(topic: &str, wait_secs: f64) {
    JOBS_ACTIVE.with_label_values(&[topic]).inc();
    JOB_WAIT_SECONDS.with_label_values(&[topic]).observe(wait_secs);
}

/// Helper to record a job reaching a terminal outcome.
pub fn record_job_ended(topic: &str, outcome: &str, duration_secs: f64) {
    JOBS_ACTIVE.with_label_values(&[topic]).dec();
    JOBS_FINISHED_TOTAL
        .with_label_values(&[topic, outcome])
        .inc();
    JOB_DURATION_SECONDS
        .with_label_values(&[topic, outcome])
        .observe(duration_secs);
}

/// Helper to update the owned-queues gauge.
pub fn set_owned_queues(count: f64) {
    OWNED_QUEUES.set(count);
}

/// Reconcile the queue and topic gauges with an aggregator's counters.
///
/// The event helpers keep the gauges current on their own; this overwrites
/// them from aggregator truth, which is useful on a scrape schedule or right
/// after [`StatisticsAggregator::reset`].
pub fn export_statistics(stats: &StatisticsAggregator) {
    for queue in stats.queue_names() {
        let snapshot = stats.queue_statistics(&queue).snapshot();
        JOBS_QUEUED
            .with_label_values(&[queue.as_str()])
            .set(snapshot.queued as f64);
    }
    for topic_stats in stats.topic_statistics() {
        let snapshot = topic_stats.statistics().snapshot();
        JOBS_ACTIVE
            .with_label_values(&[topic_stats.topic().as_str()])
            .set(snapshot.active as f64);
    }
}

/// Gather all registered metrics in Prometheus text format.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{QueueName, Topic};
    use crate::stats::JobOutcome;
    use std::time::Duration;

    #[test]
    fn test_metrics_initialization() {
        // Should not panic
        init_metrics().expect("metrics initialization should succeed");
    }

    #[test]
    fn test_record_topology_transition() {
        record_topology_transition("init");
        record_topology_transition("changed");
    }

    #[test]
    fn test_record_job_lifecycle() {
        record_job_queued(Some("media"));
        record_job_queued(None);
        record_job_dequeued(Some("media"));
        record_job_started("media/encode", 0.25);
        record_job_ended("media/encode", "succeeded", 1.5);
    }

    #[test]
    fn test_set_owned_queues() {
        set_owned_queues(4.0);
    }

    #[test]
    fn test_export_statistics() {
        let stats = StatisticsAggregator::new();
        let topic = Topic::from("media/encode");
        let queue = QueueName::from("media");
        stats.job_queued(&topic, Some(&queue));
        stats.job_started(&topic, Some(&queue), Duration::from_millis(10));
        stats.job_ended(
            &topic,
            Some(&queue),
            JobOutcome::Succeeded,
            Duration::from_millis(20),
        );

        export_statistics(&stats);
    }

    #[test]
    fn test_gather_metrics() {
        init_metrics().expect("metrics initialization should succeed");

        record_topology_transition("init");
        record_job_queued(Some("media"));

        let output = gather_metrics().expect("gather should succeed");
        assert!(output.contains("shoal_topology_transitions_total"));
        assert!(output.contains("shoal_jobs_queued"));
    }
}
