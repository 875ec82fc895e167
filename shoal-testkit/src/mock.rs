use parking_lot::Mutex;
use shoal::{CapabilityListener, CapabilitySnapshot};
use std::sync::Arc;

/// Listener that records every capability notification it receives.
#[derive(Clone, Default)]
pub struct RecordingListener {
    notifications: Arc<Mutex<Vec<Option<Arc<CapabilitySnapshot>>>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications received so far, oldest first.
    pub fn notifications(&self) -> Vec<Option<Arc<CapabilitySnapshot>>> {
        self.notifications.lock().clone()
    }

    /// The shape of the notification sequence: `true` for a snapshot,
    /// `false` for a processing stop.
    pub fn presence(&self) -> Vec<bool> {
        self.notifications
            .lock()
            .iter()
            .map(|n| n.is_some())
            .collect()
    }

    pub fn last(&self) -> Option<Option<Arc<CapabilitySnapshot>>> {
        self.notifications.lock().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.notifications.lock().len()
    }

    pub fn clear(&self) {
        self.notifications.lock().clear();
    }

    pub fn assert_notification_count_eq(&self, expected: usize) {
        let actual = self.notifications.lock().len();
        assert_eq!(
            actual, expected,
            "Expected {} notifications, got {}",
            expected, actual
        );
    }

    pub fn assert_presence_eq(&self, expected: &[bool]) {
        assert_eq!(
            self.presence(),
            expected,
            "Notification sequence mismatch"
        );
    }
}

impl CapabilityListener for RecordingListener {
    fn on_capability_change(
        &self,
        capabilities: Option<Arc<CapabilitySnapshot>>,
    ) {
        self.notifications.lock().push(capabilities);
    }
}

/// Listener that panics on every notification, for isolation tests.
pub struct PanickingListener;

impl CapabilityListener for PanickingListener {
    fn on_capability_change(&self, _: Option<Arc<CapabilitySnapshot>>) {
        panic!("listener panic requested by test");
    }
}
