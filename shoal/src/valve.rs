use crate::identity::Topic;

/// Predicate deciding whether the local instance consumes jobs of a topic.
///
/// Implementations must be stateless and side-effect free: a valve is
/// consulted from multiple threads and may be asked about the same topic any
/// number of times. When several valves are registered, combining their
/// answers (an instance consumes a topic if any valve accepts it) is the
/// caller's concern, not the valve's.
pub trait TopicValve: Send + Sync {
    fn accept(&self, topic: &Topic) -> bool;
}

/// Plain closures work as valves.
impl<F> TopicValve for F
where
    F: Fn(&Topic) -> bool + Send + Sync,
{
    fn accept(&self, topic: &Topic) -> bool {
        self(topic)
    }
}
