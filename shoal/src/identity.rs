use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

/// Unique identifier of a persisted job.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a job topic.
///
/// Topics group jobs by the kind of work they carry; queue configuration and
/// capability announcements are expressed in terms of topics.
#[derive(
    Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct Topic(String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Topic {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Topic {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Name of a job queue.
#[derive(
    Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct QueueName(String);

impl QueueName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for QueueName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for QueueName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Selects which queues an operation applies to.
///
/// `Any` is an explicit wildcard. It matches every queue name through
/// [`QueueSelector::matches`] but compares equal only to itself, so equality
/// stays symmetric and selectors behave as ordinary values in collections and
/// assertions. Callers that want wildcard semantics go through `matches`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum QueueSelector {
    /// Matches every queue.
    Any,
    /// Matches exactly the named queue.
    Specific(QueueName),
}

impl QueueSelector {
    pub fn matches(&self, name: &QueueName) -> bool {
        match self {
            QueueSelector::Any => true,
            QueueSelector::Specific(selected) => selected == name,
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, QueueSelector::Any)
    }
}

impl From<QueueName> for QueueSelector {
    fn from(value: QueueName) -> Self {
        QueueSelector::Specific(value)
    }
}

impl Display for QueueSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueSelector::Any => write!(f, "<any>"),
            QueueSelector::Specific(name) => write!(f, "{}", name),
        }
    }
}
