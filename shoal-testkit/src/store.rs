use async_trait::async_trait;
use parking_lot::Mutex;
use shoal::{InstanceId, JobId, JobStore, StoredJob};
use std::sync::Arc;

/// In-memory job store with scripted contents and failure injection.
///
/// Legacy and unfinished jobs are scripted up front; migrations and requeues
/// are recorded so tests can assert what maintenance touched.
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    inner: Arc<Mutex<StoreState>>,
}

#[derive(Default)]
struct StoreState {
    legacy: Vec<StoredJob>,
    unfinished: Vec<StoredJob>,
    fail_listing: bool,
    fail_migration_for: Vec<JobId>,
    fail_requeue_for: Vec<JobId>,
    migrated: Vec<JobId>,
    requeued: Vec<JobId>,
    unfinished_queries: Vec<InstanceId>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script jobs persisted in the legacy format.
    pub fn with_legacy_jobs(self, jobs: impl IntoIterator<Item = StoredJob>) -> Self {
        self.inner.lock().legacy.extend(jobs);
        self
    }

    /// Script jobs the local instance left unfinished.
    pub fn with_unfinished_jobs(
        self,
        jobs: impl IntoIterator<Item = StoredJob>,
    ) -> Self {
        self.inner.lock().unfinished.extend(jobs);
        self
    }

    /// Make every listing call fail.
    pub fn failing_listings(self) -> Self {
        self.inner.lock().fail_listing = true;
        self
    }

    /// Make migration of one job fail.
    pub fn failing_migration_of(self, id: JobId) -> Self {
        self.inner.lock().fail_migration_for.push(id);
        self
    }

    /// Make requeue of one job fail.
    pub fn failing_requeue_of(self, id: JobId) -> Self {
        self.inner.lock().fail_requeue_for.push(id);
        self
    }

    /// Ids of jobs migrated so far, in call order.
    pub fn migrated(&self) -> Vec<JobId> {
        self.inner.lock().migrated.clone()
    }

    /// Ids of jobs requeued so far, in call order.
    pub fn requeued(&self) -> Vec<JobId> {
        self.inner.lock().requeued.clone()
    }

    /// Instances whose unfinished jobs were queried, in call order.
    pub fn unfinished_queries(&self) -> Vec<InstanceId> {
        self.inner.lock().unfinished_queries.clone()
    }

    pub fn assert_migrated_count_eq(&self, expected: usize) {
        let actual = self.inner.lock().migrated.len();
        assert_eq!(
            actual, expected,
            "Expected {} migrated jobs, got {}",
            expected, actual
        );
    }

    pub fn assert_requeued_count_eq(&self, expected: usize) {
        let actual = self.inner.lock().requeued.len();
        assert_eq!(
            actual, expected,
            "Expected {} requeued jobs, got {}",
            expected, actual
        );
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn legacy_jobs(&self) -> anyhow::Result<Vec<StoredJob>> {
        let state = self.inner.lock();
        if state.fail_listing {
            anyhow::bail!("scripted listing failure");
        }
        Ok(state.legacy.clone())
    }

    async fn migrate(&self, job: &StoredJob) -> anyhow::Result<()> {
        let mut state = self.inner.lock();
        if state.fail_migration_for.contains(&job.id) {
            anyhow::bail!("scripted migration failure for {}", job.id);
        }
        state.migrated.push(job.id);
        Ok(())
    }

    async fn unfinished_jobs(
        &self,
        instance: &InstanceId,
    ) -> anyhow::Result<Vec<StoredJob>> {
        let mut state = self.inner.lock();
        state.unfinished_queries.push(instance.clone());
        if state.fail_listing {
            anyhow::bail!("scripted listing failure");
        }
        Ok(state.unfinished.clone())
    }

    async fn requeue(&self, job: &StoredJob) -> anyhow::Result<()> {
        let mut state = self.inner.lock();
        if state.fail_requeue_for.contains(&job.id) {
            anyhow::bail!("scripted requeue failure for {}", job.id);
        }
        state.requeued.push(job.id);
        Ok(())
    }
}
