use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::capability::InstanceId;
use crate::identity::{JobId, QueueName, Topic};

/// Minimal persisted form of a job, as seen by startup maintenance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredJob {
    pub id: JobId,
    pub topic: Topic,
    /// Target queue, when the job was already routed.
    pub queue: Option<QueueName>,
}

impl StoredJob {
    pub fn new(topic: impl Into<Topic>) -> Self {
        Self {
            id: JobId::new(),
            topic: topic.into(),
            queue: None,
        }
    }

    pub fn in_queue(mut self, queue: impl Into<QueueName>) -> Self {
        self.queue = Some(queue.into());
        self
    }
}

/// Narrow persistence seam used by startup maintenance.
///
/// Only the two one-time maintenance passes go through this trait; regular
/// queue traffic never does.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Jobs persisted by an older format version that need migration.
    async fn legacy_jobs(&self) -> anyhow::Result<Vec<StoredJob>>;

    /// Rewrite one legacy job in the current format.
    async fn migrate(&self, job: &StoredJob) -> anyhow::Result<()>;

    /// Jobs the given instance left active after an unclean stop.
    async fn unfinished_jobs(
        &self,
        instance: &InstanceId,
    ) -> anyhow::Result<Vec<StoredJob>>;

    /// Put an unfinished job back into its queue for a fresh attempt.
    async fn requeue(&self, job: &StoredJob) -> anyhow::Result<()>;
}

/// One-time migration of jobs persisted in an older format.
pub struct UpgradeTask {
    store: Arc<dyn JobStore>,
}

impl UpgradeTask {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Migrate every legacy job, returning how many were rewritten.
    ///
    /// A job that fails to migrate is logged and skipped; only a failing
    /// listing aborts the pass.
    pub async fn run(&self) -> anyhow::Result<usize> {
        let jobs = self.store.legacy_jobs().await?;
        let mut migrated = 0usize;
        for job in &jobs {
            match self.store.migrate(job).await {
                Ok(()) => migrated += 1,
                Err(error) => {
                    tracing::warn!(
                        job_id = %job.id,
                        topic = %job.topic,
                        error = %error,
                        "failed to migrate legacy job, skipping"
                    );
                }
            }
        }
        if migrated > 0 {
            tracing::info!(migrated, total = jobs.len(), "migrated legacy jobs");
        }
        Ok(migrated)
    }
}

/// Requeues jobs the local instance left behind during an unclean stop.
pub struct UnfinishedJobScan {
    store: Arc<dyn JobStore>,
    instance: InstanceId,
}

impl UnfinishedJobScan {
    pub fn new(store: Arc<dyn JobStore>, instance: InstanceId) -> Self {
        Self { store, instance }
    }

    /// Requeue every unfinished job, returning how many went back.
    pub async fn run(&self) -> anyhow::Result<usize> {
        let jobs = self.store.unfinished_jobs(&self.instance).await?;
        let mut requeued = 0usize;
        for job in &jobs {
            match self.store.requeue(job).await {
                Ok(()) => requeued += 1,
                Err(error) => {
                    tracing::warn!(
                        job_id = %job.id,
                        topic = %job.topic,
                        error = %error,
                        "failed to requeue unfinished job, skipping"
                    );
                }
            }
        }
        if requeued > 0 {
            tracing::info!(
                requeued,
                instance = %self.instance,
                "requeued unfinished jobs"
            );
        }
        Ok(requeued)
    }
}
