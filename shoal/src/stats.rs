use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::identity::{QueueName, Topic};
use crate::telemetry;

/// Terminal outcome of a job execution.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum JobOutcome {
    /// The job was dropped before or during processing.
    Cancelled,
    /// The job failed permanently.
    Failed,
    /// The job finished successfully.
    Succeeded,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Cancelled => "cancelled",
            JobOutcome::Failed => "failed",
            JobOutcome::Succeeded => "succeeded",
        }
    }
}

impl Display for JobOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One block of job counters, updated lock-free.
///
/// Instances handed out by [`StatisticsAggregator`] are live: reads observe
/// later updates. All counters are advisory; use [`Statistics::snapshot`] for
/// reporting.
#[derive(Debug)]
pub struct Statistics {
    /// Epoch millis when this block started counting (construction or reset).
    start_time: AtomicI64,
    queued: AtomicI64,
    active: AtomicI64,
    finished: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    /// Cumulative execution time of successful jobs, in millis.
    processing_time_ms: AtomicU64,
    /// Cumulative time jobs spent queued before starting, in millis.
    waiting_time_ms: AtomicU64,
    /// Epoch millis of the most recent job start, -1 when none yet.
    last_activated: AtomicI64,
    /// Epoch millis of the most recent job end, -1 when none yet.
    last_finished: AtomicI64,
}

/// Decrement that treats underflow as a lifecycle bug: unbalanced calls
/// panic in debug builds and are logged and clamped in release builds.
fn decrement_non_negative(counter: &AtomicI64, name: &'static str) {
    let prev = counter.fetch_sub(1, Ordering::Relaxed);
    if prev <= 0 {
        debug_assert!(false, "statistics counter `{name}` went negative");
        tracing::error!(
            counter = name,
            "statistics counter went negative, clamping to zero"
        );
        counter.fetch_max(0, Ordering::Relaxed);
    }
}

impl Statistics {
    pub(crate) fn new() -> Self {
        Self {
            start_time: AtomicI64::new(Utc::now().timestamp_millis()),
            queued: AtomicI64::new(0),
            active: AtomicI64::new(0),
            finished: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            processing_time_ms: AtomicU64::new(0),
            waiting_time_ms: AtomicU64::new(0),
            last_activated: AtomicI64::new(-1),
            last_finished: AtomicI64::new(-1),
        }
    }

    pub(crate) fn job_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_dequeued(&self) {
        decrement_non_negative(&self.queued, "queued");
    }

    pub(crate) fn job_started(&self, queue_wait: Duration) {
        self.last_activated
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.waiting_time_ms
            .fetch_add(queue_wait.as_millis() as u64, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_ended(&self, outcome: JobOutcome, processing_time: Duration) {
        self.last_finished
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        decrement_non_negative(&self.active, "active");
        match outcome {
            JobOutcome::Succeeded => {
                self.finished.fetch_add(1, Ordering::Relaxed);
                self.processing_time_ms
                    .fetch_add(processing_time.as_millis() as u64, Ordering::Relaxed);
            }
            JobOutcome::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            JobOutcome::Cancelled => {
                self.cancelled.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Zero every counter and restart the measurement window.
    pub(crate) fn reset(&self) {
        self.start_time
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.queued.store(0, Ordering::Relaxed);
        self.active.store(0, Ordering::Relaxed);
        self.finished.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.cancelled.store(0, Ordering::Relaxed);
        self.processing_time_ms.store(0, Ordering::Relaxed);
        self.waiting_time_ms.store(0, Ordering::Relaxed);
        self.last_activated.store(-1, Ordering::Relaxed);
        self.last_finished.store(-1, Ordering::Relaxed);
    }

    /// Number of jobs currently waiting in queues.
    pub fn queued(&self) -> i64 {
        self.queued.load(Ordering::Relaxed)
    }

    /// Number of jobs currently being processed.
    pub fn active(&self) -> i64 {
        self.active.load(Ordering::Relaxed)
    }

    /// Read all counters into a plain value.
    ///
    /// Fields are loaded one at a time, so a snapshot taken during concurrent
    /// updates can mix before and after states of a single job transition.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            start_time: self.start_time.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            processing_time_ms: self.processing_time_ms.load(Ordering::Relaxed),
            waiting_time_ms: self.waiting_time_ms.load(Ordering::Relaxed),
            last_activated: self.last_activated.load(Ordering::Relaxed),
            last_finished: self.last_finished.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of one [`Statistics`] block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub start_time: i64,
    pub queued: i64,
    pub active: i64,
    pub finished: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub processing_time_ms: u64,
    pub waiting_time_ms: u64,
    pub last_activated: i64,
    pub last_finished: i64,
}

impl StatsSnapshot {
    /// Total number of jobs that reached a terminal outcome.
    pub fn jobs_processed(&self) -> u64 {
        self.finished + self.failed + self.cancelled
    }

    /// Mean execution time of successful jobs, 0 when none finished yet.
    pub fn average_processing_time_ms(&self) -> u64 {
        if self.finished == 0 {
            0
        } else {
            self.processing_time_ms / self.finished
        }
    }

    /// Mean time jobs waited in a queue before starting, 0 when none started.
    ///
    /// Waiting time accumulates once per started job, so the divisor is the
    /// number of started jobs: those still active plus those that ended.
    pub fn average_waiting_time_ms(&self) -> u64 {
        let started = self.active.max(0) as u64 + self.jobs_processed();
        if started == 0 {
            0
        } else {
            self.waiting_time_ms / started
        }
    }
}

/// Counters for a single topic.
///
/// Topic-level statistics never count queued jobs; queue membership is not
/// known per topic until a job starts.
#[derive(Debug)]
pub struct TopicStatistics {
    topic: Topic,
    stats: Statistics,
}

impl TopicStatistics {
    fn new(topic: Topic) -> Self {
        Self {
            topic,
            stats: Statistics::new(),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }
}

/// Process-wide registry of job statistics.
///
/// Maintains one global counter block plus lazily created per-topic and
/// per-queue blocks. Every update fans out to the global block and to the
/// relevant topic and queue blocks; no update takes a lock or can fail.
pub struct StatisticsAggregator {
    global: Arc<Statistics>,
    topics: DashMap<Topic, Arc<TopicStatistics>>,
    queues: DashMap<QueueName, Arc<Statistics>>,
}

impl fmt::Debug for StatisticsAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatisticsAggregator")
            .field("topics", &self.topics.len())
            .field("queues", &self.queues.len())
            .field("global", &self.global.snapshot())
            .finish_non_exhaustive()
    }
}

impl StatisticsAggregator {
    pub fn new() -> Self {
        Self {
            global: Arc::new(Statistics::new()),
            topics: DashMap::new(),
            queues: DashMap::new(),
        }
    }

    fn topic_stats(&self, topic: &Topic) -> Arc<TopicStatistics> {
        if let Some(stats) = self.topics.get(topic) {
            return stats.clone();
        }
        self.topics
            .entry(topic.clone())
            .or_insert_with(|| Arc::new(TopicStatistics::new(topic.clone())))
            .clone()
    }

    fn queue_stats(&self, queue: &QueueName) -> Arc<Statistics> {
        if let Some(stats) = self.queues.get(queue) {
            return stats.clone();
        }
        self.queues
            .entry(queue.clone())
            .or_insert_with(|| Arc::new(Statistics::new()))
            .clone()
    }

    /// Record that a job entered a queue.
    ///
    /// Counts at the global level and, when the target queue is already
    /// known, at the queue level. Topic statistics are unaffected.
    pub fn job_queued(&self, topic: &Topic, queue: Option<&QueueName>) {
        self.global.job_queued();
        if let Some(queue) = queue {
            self.queue_stats(queue).job_queued();
        }
        telemetry::record_job_queued(topic.as_str(), queue.map(QueueName::as_str));
    }

    /// Record that a job left a queue without starting. Inverse of
    /// [`StatisticsAggregator::job_queued`].
    pub fn job_dequeued(&self, topic: &Topic, queue: Option<&QueueName>) {
        self.global.job_dequeued();
        if let Some(queue) = queue {
            self.queue_stats(queue).job_dequeued();
        }
        telemetry::record_job_dequeued(topic.as_str(), queue.map(QueueName::as_str));
    }

    /// Record that a job began executing after waiting `queue_wait` in a
    /// queue. Counts at the global, topic, and queue level.
    pub fn job_started(
        &self,
        topic: &Topic,
        queue: Option<&QueueName>,
        queue_wait: Duration,
    ) {
        self.global.job_started(queue_wait);
        self.topic_stats(topic).statistics().job_started(queue_wait);
        if let Some(queue) = queue {
            self.queue_stats(queue).job_started(queue_wait);
        }
        telemetry::record_job_started(
            topic.as_str(),
            queue.map(QueueName::as_str),
            queue_wait,
        );
    }

    /// Record the terminal outcome of a started job.
    ///
    /// `processing_time` contributes to the cumulative processing time only
    /// when the job succeeded.
    pub fn job_ended(
        &self,
        topic: &Topic,
        queue: Option<&QueueName>,
        outcome: JobOutcome,
        processing_time: Duration,
    ) {
        self.global.job_ended(outcome, processing_time);
        self.topic_stats(topic)
            .statistics()
            .job_ended(outcome, processing_time);
        if let Some(queue) = queue {
            self.queue_stats(queue).job_ended(outcome, processing_time);
        }
        telemetry::record_job_ended(
            topic.as_str(),
            queue.map(QueueName::as_str),
            outcome,
            processing_time,
        );
    }

    /// The process-wide counter block.
    pub fn global(&self) -> Arc<Statistics> {
        self.global.clone()
    }

    /// All per-topic blocks seen so far, ordered by topic name.
    pub fn topic_statistics(&self) -> Vec<Arc<TopicStatistics>> {
        let mut all: Vec<_> =
            self.topics.iter().map(|entry| entry.value().clone()).collect();
        all.sort_by(|a, b| a.topic().cmp(b.topic()));
        all
    }

    /// Statistics for one queue.
    ///
    /// An unknown queue yields a fresh zero-valued block that is not retained,
    /// so probing for queues never grows the registry.
    pub fn queue_statistics(&self, queue: &QueueName) -> Arc<Statistics> {
        match self.queues.get(queue) {
            Some(stats) => stats.clone(),
            None => Arc::new(Statistics::new()),
        }
    }

    /// Names of all queues with recorded statistics, sorted.
    pub fn queue_names(&self) -> Vec<QueueName> {
        let mut names: Vec<_> =
            self.queues.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Reset everything: the global block restarts, per-topic blocks are
    /// dropped, per-queue blocks are zeroed in place.
    ///
    /// Queue blocks are zeroed rather than removed because queue runners hold
    /// live references to them across a reset.
    pub fn reset(&self) {
        self.global.reset();
        self.topics.clear();
        for entry in self.queues.iter() {
            entry.value().reset();
        }
    }
}

impl Default for StatisticsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(name: &str) -> Topic {
        Topic::from(name)
    }

    fn queue(name: &str) -> QueueName {
        QueueName::from(name)
    }

    #[test]
    fn test_queued_counts_global_and_queue_only() {
        let stats = StatisticsAggregator::new();
        let t = topic("media/encode");
        let q = queue("main");

        stats.job_queued(&t, Some(&q));
        stats.job_queued(&t, None);

        assert_eq!(stats.global().queued(), 2);
        assert_eq!(stats.queue_statistics(&q).queued(), 1);
        assert!(
            stats.topic_statistics().is_empty(),
            "queued jobs must not create topic statistics"
        );

        stats.job_dequeued(&t, Some(&q));
        assert_eq!(stats.global().queued(), 1);
        assert_eq!(stats.queue_statistics(&q).queued(), 0);
    }

    #[test]
    fn test_started_and_ended_lifecycle() {
        let stats = StatisticsAggregator::new();
        let t = topic("media/encode");
        let q = queue("main");

        stats.job_queued(&t, Some(&q));
        stats.job_dequeued(&t, Some(&q));
        stats.job_started(&t, Some(&q), Duration::from_millis(40));

        assert_eq!(stats.global().active(), 1);
        assert_eq!(stats.queue_statistics(&q).active(), 1);
        let topics = stats.topic_statistics();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].topic(), &t);
        assert_eq!(topics[0].statistics().active(), 1);
        assert_eq!(topics[0].statistics().snapshot().waiting_time_ms, 40);

        stats.job_ended(
            &t,
            Some(&q),
            JobOutcome::Succeeded,
            Duration::from_millis(250),
        );

        let global = stats.global().snapshot();
        assert_eq!(global.active, 0);
        assert_eq!(global.finished, 1);
        assert_eq!(global.processing_time_ms, 250);
        assert_eq!(global.jobs_processed(), 1);
        assert!(global.last_activated > 0);
        assert!(global.last_finished >= global.last_activated);

        // Success counts land on the topic and queue blocks too.
        let topic_block = stats.topic_statistics()[0].statistics().snapshot();
        assert_eq!(topic_block.finished, 1);
        assert_eq!(topic_block.processing_time_ms, 250);
        let queue_block = stats.queue_statistics(&q).snapshot();
        assert_eq!(queue_block.finished, 1);
        assert_eq!(queue_block.processing_time_ms, 250);
    }

    #[test]
    fn test_processing_time_only_counts_for_success() {
        let stats = StatisticsAggregator::new();
        let t = topic("media/encode");

        stats.job_started(&t, None, Duration::ZERO);
        stats.job_ended(&t, None, JobOutcome::Failed, Duration::from_millis(300));
        stats.job_started(&t, None, Duration::ZERO);
        stats.job_ended(&t, None, JobOutcome::Cancelled, Duration::from_millis(300));

        let snapshot = stats.global().snapshot();
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.cancelled, 1);
        assert_eq!(snapshot.finished, 0);
        assert_eq!(snapshot.processing_time_ms, 0);
        assert_eq!(snapshot.average_processing_time_ms(), 0);
    }

    #[test]
    fn test_unknown_queue_reads_zero_and_is_not_retained() {
        let stats = StatisticsAggregator::new();
        let ghost = queue("ghost");

        let block = stats.queue_statistics(&ghost);
        assert_eq!(block.snapshot().queued, 0);
        assert!(stats.queue_names().is_empty());

        // Mutating through operations still creates the real entry.
        stats.job_queued(&topic("t"), Some(&ghost));
        assert_eq!(stats.queue_names(), vec![ghost.clone()]);
        // The earlier probe handle stays detached from the registry.
        assert_eq!(block.queued(), 0);
        assert_eq!(stats.queue_statistics(&ghost).queued(), 1);
    }

    #[test]
    fn test_reset_cascades() {
        let stats = StatisticsAggregator::new();
        let t = topic("media/encode");
        let q = queue("main");

        stats.job_queued(&t, Some(&q));
        stats.job_started(&t, Some(&q), Duration::from_millis(10));
        stats.job_ended(&t, Some(&q), JobOutcome::Succeeded, Duration::from_millis(10));

        let queue_handle = stats.queue_statistics(&q);
        stats.reset();

        assert_eq!(stats.global().snapshot().jobs_processed(), 0);
        assert!(stats.topic_statistics().is_empty());
        // Queue entries survive reset zeroed, and held handles stay live.
        assert_eq!(stats.queue_names(), vec![q]);
        assert_eq!(queue_handle.snapshot().finished, 0);
        assert_eq!(queue_handle.snapshot().queued, 0);
    }

    #[test]
    fn test_average_waiting_time() {
        let stats = StatisticsAggregator::new();
        let t = topic("media/encode");

        stats.job_started(&t, None, Duration::from_millis(100));
        stats.job_started(&t, None, Duration::from_millis(300));

        let snapshot = stats.global().snapshot();
        assert_eq!(snapshot.average_waiting_time_ms(), 200);

        stats.job_ended(&t, None, JobOutcome::Succeeded, Duration::from_millis(50));
        let snapshot = stats.global().snapshot();
        // One job still active, one processed: divisor stays two.
        assert_eq!(snapshot.average_waiting_time_ms(), 200);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "went negative")]
    fn test_unbalanced_end_panics_in_debug_builds() {
        let stats = StatisticsAggregator::new();
        stats.job_ended(
            &topic("media/encode"),
            None,
            JobOutcome::Succeeded,
            Duration::ZERO,
        );
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(JobOutcome::Succeeded.as_str(), "succeeded");
        assert_eq!(JobOutcome::Failed.to_string(), "failed");
        assert_eq!(JobOutcome::Cancelled.as_str(), "cancelled");
    }
}
