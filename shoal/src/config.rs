use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::identity::{QueueName, Topic};

/// Configuration for a single job queue.
///
/// Every topic consumed by the cluster is routed to at most one queue; the
/// first definition whose topic list matches wins.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueDefinition {
    /// Queue name, unique within a queue set.
    pub name: QueueName,
    /// Topics routed to this queue: exact names or trailing `*` patterns
    /// (`"media/*"` matches `media/encode`, `"*"` matches everything).
    pub topics: Vec<String>,
    /// Local queues run on every capable instance instead of a single
    /// elected owner.
    #[serde(default)]
    pub local: bool,
}

impl QueueDefinition {
    pub fn new(
        name: impl Into<QueueName>,
        topics: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            topics: topics.into_iter().map(Into::into).collect(),
            local: false,
        }
    }

    /// Mark this queue as local to every capable instance.
    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    /// Whether any of this queue's topic patterns matches `topic`.
    pub fn matches_topic(&self, topic: &Topic) -> bool {
        self.topics
            .iter()
            .any(|pattern| pattern_matches(pattern, topic))
    }
}

fn pattern_matches(pattern: &str, topic: &Topic) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => topic.as_str().starts_with(prefix),
        None => topic.as_str() == pattern,
    }
}

/// The full set of queue definitions in effect.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueueSetConfig {
    pub queues: Vec<QueueDefinition>,
}

impl QueueSetConfig {
    pub fn new(queues: Vec<QueueDefinition>) -> Self {
        Self { queues }
    }

    /// Look up a queue definition by name.
    pub fn definition(&self, name: &QueueName) -> Option<&QueueDefinition> {
        self.queues.iter().find(|queue| &queue.name == name)
    }

    /// The queue responsible for `topic`, if any. Definition order decides
    /// ties: the first matching queue wins.
    pub fn queue_for_topic(&self, topic: &Topic) -> Option<&QueueDefinition> {
        self.queues.iter().find(|queue| queue.matches_topic(topic))
    }
}

/// Source of the current queue configuration.
///
/// Ownership rebuilds re-read configuration through this trait, so changes
/// picked up by the source take effect on the next topology event or
/// configuration-change notification.
pub trait ConfigSource: Send + Sync {
    fn current(&self) -> Arc<QueueSetConfig>;
}

/// Configuration that never changes after construction.
#[derive(Clone, Debug)]
pub struct FixedConfig(Arc<QueueSetConfig>);

impl FixedConfig {
    pub fn new(config: QueueSetConfig) -> Self {
        Self(Arc::new(config))
    }
}

impl ConfigSource for FixedConfig {
    fn current(&self) -> Arc<QueueSetConfig> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_pattern_matching() {
        let queue = QueueDefinition::new("media", ["media/*", "thumbnails"]);

        assert!(queue.matches_topic(&Topic::from("media/encode")));
        assert!(queue.matches_topic(&Topic::from("media/probe/deep")));
        assert!(queue.matches_topic(&Topic::from("thumbnails")));
        assert!(!queue.matches_topic(&Topic::from("thumbnails/small")));
        assert!(!queue.matches_topic(&Topic::from("mail")));
    }

    #[test]
    fn test_match_all_pattern() {
        let queue = QueueDefinition::new("catch-all", ["*"]);
        assert!(queue.matches_topic(&Topic::from("anything")));
        assert!(queue.matches_topic(&Topic::from("at/any/depth")));
    }

    #[test]
    fn test_first_matching_queue_wins() {
        let config = QueueSetConfig::new(vec![
            QueueDefinition::new("media", ["media/*"]),
            QueueDefinition::new("catch-all", ["*"]),
        ]);

        let media = config.queue_for_topic(&Topic::from("media/encode"));
        assert_eq!(media.map(|q| q.name.as_str()), Some("media"));

        let other = config.queue_for_topic(&Topic::from("mail/send"));
        assert_eq!(other.map(|q| q.name.as_str()), Some("catch-all"));
    }

    #[test]
    fn test_local_flag_defaults_off_in_serde() {
        let json = r#"{"name":"main","topics":["*"]}"#;
        let queue: QueueDefinition = serde_json::from_str(json).unwrap();
        assert!(!queue.local);

        let local = QueueDefinition::new("maintenance", ["maintenance/*"]).local();
        assert!(local.local);
    }
}
