use parking_lot::Mutex;
use shoal::{ConfigSource, QueueSetConfig};
use std::sync::Arc;

/// Config source whose contents can be swapped between reads.
///
/// The coordinator re-reads configuration on every ownership rebuild, so
/// swapping here then calling `configuration_changed` exercises the
/// config-change path.
#[derive(Clone)]
pub struct SwitchableConfigSource {
    current: Arc<Mutex<Arc<QueueSetConfig>>>,
}

impl SwitchableConfigSource {
    pub fn new(config: QueueSetConfig) -> Self {
        Self {
            current: Arc::new(Mutex::new(Arc::new(config))),
        }
    }

    /// Replace the configuration returned by subsequent reads.
    pub fn replace(&self, config: QueueSetConfig) {
        *self.current.lock() = Arc::new(config);
    }
}

impl ConfigSource for SwitchableConfigSource {
    fn current(&self) -> Arc<QueueSetConfig> {
        self.current.lock().clone()
    }
}
