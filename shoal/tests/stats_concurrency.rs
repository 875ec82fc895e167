//! Statistics aggregator concurrency tests.
//!
//! Hammers the lifecycle operations from parallel tasks and checks that no
//! update is lost, that per-queue and per-topic blocks are created exactly
//! once under racing first touches, and that probing unknown queues during
//! load never pollutes the registry.

use std::sync::Arc;
use std::time::Duration;

use shoal::{JobOutcome, QueueName, StatisticsAggregator, Topic};

const WAIT: Duration = Duration::from_millis(3);
const RUN: Duration = Duration::from_millis(5);

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_lifecycle_loses_no_updates() {
    const TASKS: usize = 8;
    const JOBS_PER_TASK: usize = 300;

    let stats = Arc::new(StatisticsAggregator::new());
    let queue = QueueName::from("ingest");

    let mut handles = Vec::new();
    for worker in 0..TASKS {
        let stats = stats.clone();
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            let topic = Topic::from(format!("load/worker-{}", worker % 4));
            for job in 0..JOBS_PER_TASK {
                stats.job_queued(&topic, Some(&queue));
                stats.job_dequeued(&topic, Some(&queue));
                stats.job_started(&topic, Some(&queue), WAIT);
                let outcome = match job % 3 {
                    0 => JobOutcome::Succeeded,
                    1 => JobOutcome::Failed,
                    _ => JobOutcome::Cancelled,
                };
                stats.job_ended(&topic, Some(&queue), outcome, RUN);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let total = (TASKS * JOBS_PER_TASK) as u64;
    let per_outcome = total / 3;

    let global = stats.global().snapshot();
    assert_eq!(global.queued, 0, "every queued job was dequeued");
    assert_eq!(global.active, 0, "every started job ended");
    assert_eq!(global.jobs_processed(), total);
    assert_eq!(global.finished, per_outcome);
    assert_eq!(global.failed, per_outcome);
    assert_eq!(global.cancelled, per_outcome);
    assert_eq!(global.waiting_time_ms, total * WAIT.as_millis() as u64);
    assert_eq!(
        global.processing_time_ms,
        per_outcome * RUN.as_millis() as u64,
        "only successful jobs contribute processing time"
    );
    assert_eq!(global.average_waiting_time_ms(), WAIT.as_millis() as u64);
    assert_eq!(global.average_processing_time_ms(), RUN.as_millis() as u64);

    let queue_block = stats.queue_statistics(&queue).snapshot();
    assert_eq!(queue_block.queued, 0);
    assert_eq!(queue_block.active, 0);
    assert_eq!(queue_block.jobs_processed(), total);

    let topics = stats.topic_statistics();
    assert_eq!(topics.len(), 4);
    for topic in topics {
        let block = topic.statistics().snapshot();
        assert_eq!(block.active, 0);
        assert_eq!(
            block.jobs_processed(),
            total / 4,
            "workers split evenly across topic {}",
            topic.topic()
        );
        assert_eq!(block.queued, 0, "topic blocks never count queued jobs");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_racing_first_touches_create_each_block_once() {
    const TASKS: usize = 8;
    const ROUNDS: usize = 100;
    const SHARDS: usize = 4;

    let stats = Arc::new(StatisticsAggregator::new());

    // Every task hammers the same fresh queue names; the aggregator must
    // funnel all of them into one block per name.
    let mut handles = Vec::new();
    for _ in 0..TASKS {
        let stats = stats.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..ROUNDS {
                for shard in 0..SHARDS {
                    let topic = Topic::from(format!("ingest/shard-{shard}"));
                    let queue = QueueName::from(format!("shard-{shard}"));
                    stats.job_queued(&topic, Some(&queue));
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(stats.queue_names().len(), SHARDS);
    for shard in 0..SHARDS {
        let queue = QueueName::from(format!("shard-{shard}"));
        assert_eq!(
            stats.queue_statistics(&queue).queued(),
            (TASKS * ROUNDS) as i64,
            "queue shard-{shard} lost updates"
        );
    }
    assert_eq!(stats.global().queued(), (TASKS * ROUNDS * SHARDS) as i64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unknown_queue_probes_during_load_are_not_retained() {
    const JOBS: usize = 1_000;

    let stats = Arc::new(StatisticsAggregator::new());
    let real = QueueName::from("real");

    let writer = {
        let stats = stats.clone();
        let queue = real.clone();
        tokio::spawn(async move {
            let topic = Topic::from("load/probe");
            for _ in 0..JOBS {
                stats.job_queued(&topic, Some(&queue));
                stats.job_dequeued(&topic, Some(&queue));
                stats.job_started(&topic, Some(&queue), WAIT);
                stats.job_ended(&topic, Some(&queue), JobOutcome::Succeeded, RUN);
            }
        })
    };
    let reader = {
        let stats = stats.clone();
        tokio::spawn(async move {
            let ghost = QueueName::from("ghost");
            for _ in 0..JOBS {
                let block = stats.queue_statistics(&ghost).snapshot();
                assert_eq!(block.jobs_processed(), 0, "ghost block must be fresh");
                assert!(
                    stats.queue_names().len() <= 1,
                    "reads must never register a queue"
                );
            }
        })
    };
    writer.await.unwrap();
    reader.await.unwrap();

    assert_eq!(stats.queue_names(), vec![real.clone()]);
    let final_block = stats.queue_statistics(&real).snapshot();
    assert_eq!(final_block.jobs_processed(), JOBS as u64);
    assert_eq!(final_block.active, 0);
}
