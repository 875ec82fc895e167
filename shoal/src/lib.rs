//! Shoal - topology-driven queue ownership and job statistics for clustered
//! job processing.
//!
//! A foundational crate for job queue systems that span several cooperating
//! instances: it reacts to cluster membership changes by recomputing which
//! instance runs which queue, and it keeps lock-free counters over the job
//! lifecycle for reporting.
//!
//! # Core Concepts
//!
//! - **Topology**: The [`TopologyCoordinator`] consumes [`TopologyEvent`]s
//!   from a discovery service and drives all state transitions.
//!
//! - **Capabilities**: Each stable view is condensed into an immutable
//!   [`CapabilitySnapshot`] that answers "which queues does this instance
//!   run" deterministically on every member, without cluster consensus.
//!
//! - **Listeners**: Components register a [`CapabilityListener`] to learn
//!   when processing stops (`None`) or resumes under a new snapshot.
//!
//! - **Statistics**: The [`StatisticsAggregator`] fans job lifecycle counts
//!   out to global, per-topic, and per-queue [`Statistics`] blocks.
//!
//! - **Maintenance**: On the first view, a legacy-format migration and an
//!   unfinished-job scan run once through the narrow [`JobStore`] seam.
//!
//! - **Valve**: A [`TopicValve`] lets embedders veto topics the local
//!   instance should not consume.
//!
//! # Feature Flags
//!
//! - `metrics` - Prometheus metrics support
//!
//! # Example
//!
//! ```ignore
//! use shoal::*;
//! use std::sync::Arc;
//!
//! let config = QueueSetConfig::new(vec![
//!     QueueDefinition::new("media", ["media/*"]),
//! ]);
//! let coordinator = TopologyCoordinator::new(Arc::new(FixedConfig::new(config)));
//!
//! // Wire discovery events into the coordinator:
//! // coordinator.handle_topology_event(TopologyEvent::Init(view)).await;
//! // coordinator.capabilities() now answers ownership questions lock-free.
//! ```

/// Capability snapshots and topology views.
///
/// The `capability` module defines how a cluster view turns into a queue
/// ownership decision:
/// - [`InstanceId`] and [`InstanceInfo`] - cluster member identity
/// - [`TopologyView`] - membership as reported by discovery
/// - [`CapabilitySnapshot`] - immutable per-view ownership assignment
/// - [`QueueAssignment`] - who runs one configured queue
pub mod capability;

/// Queue set configuration.
///
/// The `config` module defines [`QueueDefinition`] and [`QueueSetConfig`]
/// plus the [`ConfigSource`] trait the coordinator re-reads configuration
/// through.
pub mod config;

/// Identity newtypes for topics, queues, and jobs.
///
/// The `identity` module defines:
/// - [`Topic`] - job type name
/// - [`QueueName`] - queue name
/// - [`QueueSelector`] - explicit any-or-specific queue wildcard
/// - [`JobId`] - persisted job identifier
pub mod identity;

/// One-time startup maintenance.
///
/// The `maintenance` module defines the [`JobStore`] persistence seam plus
/// the two passes run before the first snapshot is published:
/// [`UpgradeTask`] and [`UnfinishedJobScan`].
pub mod maintenance;

/// Prometheus metrics support (behind the `metrics` feature).
pub mod metrics;

/// Job statistics aggregation.
///
/// The `stats` module defines:
/// - [`StatisticsAggregator`] - global, per-topic, and per-queue registry
/// - [`Statistics`] and [`StatsSnapshot`] - one counter block and its copy
/// - [`TopicStatistics`] - counters tied to one topic
/// - [`JobOutcome`] - terminal job states
pub mod stats;

/// Tracing spans and telemetry record helpers.
pub mod telemetry;

/// The topology reaction state machine.
///
/// The `topology` module defines:
/// - [`TopologyCoordinator`] - serialized transition handling
/// - [`TopologyEvent`] - the discovery service contract
/// - [`CapabilityListener`] - synchronous snapshot observers
pub mod topology;

/// Topic consumption predicates.
///
/// The `valve` module defines the [`TopicValve`] trait for vetoing topics
/// the local instance should not consume.
pub mod valve;

pub use capability::*;
pub use config::*;
pub use identity::*;
pub use maintenance::*;
pub use stats::*;
pub use topology::*;
pub use valve::*;
