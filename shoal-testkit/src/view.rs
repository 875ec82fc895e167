use shoal::{InstanceId, InstanceInfo, Topic, TopologyView};

/// Fluent builder for topology views in tests.
///
/// ```
/// use shoal_testkit::TestViewBuilder;
///
/// let view = TestViewBuilder::new("node-a")
///     .leader("node-a", ["media/encode"])
///     .instance("node-b", ["mail/send"])
///     .build();
/// assert_eq!(view.len(), 2);
/// ```
pub struct TestViewBuilder {
    local: InstanceId,
    instances: Vec<InstanceInfo>,
}

impl TestViewBuilder {
    pub fn new(local: impl Into<InstanceId>) -> Self {
        Self {
            local: local.into(),
            instances: Vec::new(),
        }
    }

    /// Add a non-leader member advertising the given topics.
    pub fn instance(
        mut self,
        id: impl Into<InstanceId>,
        topics: impl IntoIterator<Item = impl Into<Topic>>,
    ) -> Self {
        self.instances.push(InstanceInfo::new(id, topics));
        self
    }

    /// Add the leader member advertising the given topics.
    pub fn leader(
        mut self,
        id: impl Into<InstanceId>,
        topics: impl IntoIterator<Item = impl Into<Topic>>,
    ) -> Self {
        self.instances.push(InstanceInfo::new(id, topics).as_leader());
        self
    }

    /// Add a fully custom member.
    pub fn member(mut self, info: InstanceInfo) -> Self {
        self.instances.push(info);
        self
    }

    pub fn build(self) -> TopologyView {
        TopologyView::new(self.local, self.instances)
    }
}

/// A one-instance view where the local node leads and consumes `topics`.
pub fn single_node_view(
    id: impl Into<InstanceId> + Clone,
    topics: impl IntoIterator<Item = impl Into<Topic>>,
) -> TopologyView {
    TestViewBuilder::new(id.clone()).leader(id, topics).build()
}
