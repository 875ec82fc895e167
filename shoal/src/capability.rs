use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::QueueSetConfig;
use crate::identity::{QueueName, Topic};

/// Identifier of one cluster instance.
#[derive(
    Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn random() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for InstanceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One cluster member as reported by the discovery service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub id: InstanceId,
    /// Whether discovery elected this instance cluster leader.
    #[serde(default)]
    pub leader: bool,
    /// Topics this instance is willing to consume.
    pub topics: Vec<Topic>,
    /// Cosmetic properties. Never affect ownership or equivalence.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl InstanceInfo {
    pub fn new(
        id: impl Into<InstanceId>,
        topics: impl IntoIterator<Item = impl Into<Topic>>,
    ) -> Self {
        Self {
            id: id.into(),
            leader: false,
            topics: topics.into_iter().map(Into::into).collect(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn as_leader(mut self) -> Self {
        self.leader = true;
        self
    }

    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Stable fingerprint of this instance's consumable topics.
    fn capability_fingerprint(&self) -> String {
        let mut topics: Vec<&str> =
            self.topics.iter().map(Topic::as_str).collect();
        topics.sort_unstable();
        topics.dedup();
        topics.join(",")
    }
}

/// Cluster membership as reported by the discovery service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopologyView {
    local: InstanceId,
    instances: BTreeMap<InstanceId, InstanceInfo>,
}

impl TopologyView {
    pub fn new(
        local: impl Into<InstanceId>,
        instances: impl IntoIterator<Item = InstanceInfo>,
    ) -> Self {
        Self {
            local: local.into(),
            instances: instances
                .into_iter()
                .map(|instance| (instance.id.clone(), instance))
                .collect(),
        }
    }

    pub fn local_id(&self) -> &InstanceId {
        &self.local
    }

    pub fn local_instance(&self) -> Option<&InstanceInfo> {
        self.instances.get(&self.local)
    }

    pub fn instance(&self, id: &InstanceId) -> Option<&InstanceInfo> {
        self.instances.get(id)
    }

    /// All members, ordered by instance id.
    pub fn instances(&self) -> impl Iterator<Item = &InstanceInfo> {
        self.instances.values()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn is_local_leader(&self) -> bool {
        self.local_instance().map(|i| i.leader).unwrap_or(false)
    }

    /// Capability fingerprints per instance.
    ///
    /// Two views with equal maps assign queues identically, whatever their
    /// cosmetic attributes say.
    pub fn capability_map(&self) -> BTreeMap<InstanceId, String> {
        self.instances
            .values()
            .map(|i| (i.id.clone(), i.capability_fingerprint()))
            .collect()
    }
}

/// Who runs a configured queue under the current view.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum QueueAssignment {
    /// Every capable instance runs this queue.
    Local,
    /// Exactly one instance owns this queue.
    Owned(InstanceId),
    /// No instance advertises a matching topic.
    Unassigned,
}

/// Stable across platforms and processes so that every instance elects the
/// same owner from the same view.
fn stable_index(name: &str, buckets: usize) -> usize {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0100_0000_01b3;
    let mut hash = FNV_OFFSET;
    for byte in name.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    (hash % buckets as u64) as usize
}

/// Immutable queue-ownership decision for one topology view.
///
/// A snapshot is computed locally and deterministically: every instance
/// derives the same assignment from the same view and configuration, so no
/// cluster-wide coordination is needed. The snapshot also anchors background
/// work spawned for its lifetime; [`CapabilitySnapshot::deactivate`] cancels
/// and drains that work before the snapshot is replaced.
pub struct CapabilitySnapshot {
    view: TopologyView,
    capability_map: BTreeMap<InstanceId, String>,
    assignments: BTreeMap<QueueName, QueueAssignment>,
    owned: Vec<QueueName>,
    active: AtomicBool,
    termination: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for CapabilitySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilitySnapshot")
            .field("local", &self.view.local)
            .field("leader", &self.is_leader())
            .field("instances", &self.view.len())
            .field("owned", &self.owned)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl CapabilitySnapshot {
    pub(crate) fn new(view: TopologyView, config: &QueueSetConfig) -> Self {
        let capability_map = view.capability_map();
        let mut assignments = BTreeMap::new();
        let mut owned = Vec::new();

        for queue in &config.queues {
            // BTreeMap iteration keeps the capable list sorted by id.
            let capable: Vec<&InstanceId> = view
                .instances()
                .filter(|instance| {
                    instance.topics.iter().any(|t| queue.matches_topic(t))
                })
                .map(|instance| &instance.id)
                .collect();

            let assignment = if capable.is_empty() {
                QueueAssignment::Unassigned
            } else if queue.local {
                QueueAssignment::Local
            } else {
                let index = stable_index(queue.name.as_str(), capable.len());
                QueueAssignment::Owned(capable[index].clone())
            };

            let locally_owned = match &assignment {
                QueueAssignment::Local => capable.contains(&&view.local),
                QueueAssignment::Owned(owner) => owner == &view.local,
                QueueAssignment::Unassigned => false,
            };
            if locally_owned {
                owned.push(queue.name.clone());
            }
            assignments.insert(queue.name.clone(), assignment);
        }
        owned.sort();

        Self {
            view,
            capability_map,
            assignments,
            owned,
            active: AtomicBool::new(true),
            termination: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn local_id(&self) -> &InstanceId {
        &self.view.local
    }

    pub fn is_leader(&self) -> bool {
        self.view.is_local_leader()
    }

    pub fn view(&self) -> &TopologyView {
        &self.view
    }

    /// Queues the local instance runs under this view, sorted by name.
    pub fn owned_queues(&self) -> &[QueueName] {
        &self.owned
    }

    pub fn owns(&self, queue: &QueueName) -> bool {
        self.owned.binary_search(queue).is_ok()
    }

    /// Assignment for every configured queue.
    pub fn assignments(&self) -> &BTreeMap<QueueName, QueueAssignment> {
        &self.assignments
    }

    pub fn assignment(&self, queue: &QueueName) -> Option<&QueueAssignment> {
        self.assignments.get(queue)
    }

    /// Whether the view behind `capability_map` would assign queues exactly
    /// as this snapshot does. Compares consumable topics per instance and
    /// nothing else.
    pub fn is_equivalent_to(
        &self,
        capability_map: &BTreeMap<InstanceId, String>,
    ) -> bool {
        self.capability_map == *capability_map
    }

    /// False once [`CapabilitySnapshot::deactivate`] has begun.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Token cancelled when this snapshot is deactivated. Background work
    /// tied to the snapshot's lifetime should watch it.
    pub fn termination_token(&self) -> CancellationToken {
        self.termination.child_token()
    }

    /// Register background work to be drained on deactivation.
    ///
    /// The task should exit when [`CapabilitySnapshot::termination_token`]
    /// fires; a task attached after deactivation observes the token already
    /// cancelled.
    pub fn attach_task(&self, handle: JoinHandle<()>) {
        self.tasks.lock().push(handle);
    }

    /// Mark the snapshot inactive, cancel its token, and wait for all
    /// attached tasks to finish. Safe to call more than once; later calls
    /// return once any remaining tasks are drained.
    pub async fn deactivate(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.termination.cancel();
        }
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    tracing::warn!(error = %err, "snapshot task panicked during teardown");
                }
            }
        }
    }
}
