//! Tracing and telemetry instrumentation for shoal.
//!
//! This module provides helper functions for creating tracing spans and
//! recording metrics during topology transitions and job lifecycle events.
//! All functions work both with and without the `metrics` feature flag.
//!
//! # Features
//!
//! - Tracing spans for topology transitions and startup maintenance
//! - Structured log records for the job statistics lifecycle
//! - Integration with the `metrics` module for Prometheus metrics
//! - Helper functions that are no-ops when features are disabled
//!
//! # Example
//!
//! ```ignore
//! use shoal::telemetry::topology_event_span;
//!
//! let span = topology_event_span("changed");
//! let _enter = span.enter();
//! // ... transition handling
//! ```

use std::time::Duration;
use tracing::{info_span, Span};

use crate::stats::JobOutcome;

/// Create a tracing span for handling one topology event.
///
/// The span includes the event kind as a field for observability.
///
/// # Arguments
/// * `event` - The event kind (`init`, `changing`, `changed`,
///   `properties_changed`)
#[must_use]
pub fn topology_event_span(event: &str) -> Span {
    info_span!("shoal.topology_event", event = %event)
}

/// Create a tracing span for the one-time startup maintenance pass.
#[must_use]
pub fn maintenance_span() -> Span {
    info_span!("shoal.maintenance")
}

/// Record that a topology event reached the coordinator.
///
/// # Arguments
/// * `event` - The event kind
pub fn record_topology_event(event: &str) {
    tracing::debug!(event = %event, "topology event received");

    #[cfg(feature = "metrics")]
    crate::metrics::record_topology_transition(event);
}

/// Record that a new capability snapshot was published.
///
/// # Arguments
/// * `owned_queues` - Number of queues the local instance now runs
/// * `leader` - Whether the local instance is the cluster leader
pub fn record_capability_published(owned_queues: usize, leader: bool) {
    tracing::info!(
        owned_queues = owned_queues,
        leader = leader,
        "capability snapshot published"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::set_owned_queues(owned_queues as f64);
}

/// Record a job entering a queue.
///
/// # Arguments
/// * `topic` - The job topic
/// * `queue` - The target queue, when already routed
pub fn record_job_queued(topic: &str, queue: Option<&str>) {
    tracing::debug!(topic = %topic, queue = queue, "job queued");

    #[cfg(feature = "metrics")]
    crate::metrics::record_job_queued(queue);
}

/// Record a job leaving a queue without starting.
///
/// # Arguments
/// * `topic` - The job topic
/// * `queue` - The queue the job left, when it was routed
pub fn record_job_dequeued(topic: &str, queue: Option<&str>) {
    tracing::debug!(topic = %topic, queue = queue, "job dequeued");

    #[cfg(feature = "metrics")]
    crate::metrics::record_job_dequeued(queue);
}

/// Record a job starting execution.
///
/// # Arguments
/// * `topic` - The job topic
/// * `queue` - The queue the job came from, when it was routed
/// * `queue_wait` - Time the job spent queued before starting
pub fn record_job_started(topic: &str, queue: Option<&str>, queue_wait: Duration) {
    tracing::debug!(
        topic = %topic,
        queue = queue,
        wait_ms = queue_wait.as_millis() as u64,
        "job started"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_job_started(topic, queue_wait.as_secs_f64());
}

/// Record a job reaching a terminal outcome.
///
/// # Arguments
/// * `topic` - The job topic
/// * `queue` - The queue the job ran from, when it was routed
/// * `outcome` - The terminal outcome
/// * `processing_time` - Wall-clock execution time
pub fn record_job_ended(
    topic: &str,
    queue: Option<&str>,
    outcome: JobOutcome,
    processing_time: Duration,
) {
    tracing::info!(
        topic = %topic,
        queue = queue,
        outcome = %outcome,
        processing_ms = processing_time.as_millis() as u64,
        "job ended"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_job_ended(
        topic,
        outcome.as_str(),
        processing_time.as_secs_f64(),
    );
}
