use arc_swap::ArcSwapOption;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::capability::{CapabilitySnapshot, InstanceId, TopologyView};
use crate::config::ConfigSource;
use crate::maintenance::{JobStore, UnfinishedJobScan, UpgradeTask};
use crate::telemetry;

/// Notification from the discovery service about cluster membership.
#[derive(Clone, Debug)]
pub enum TopologyEvent {
    /// First view delivered after startup.
    Init(TopologyView),
    /// The cluster is reorganizing: the previous view is void and no new
    /// view exists yet.
    Changing,
    /// A new stable view.
    Changed(TopologyView),
    /// Same membership, changed instance properties.
    PropertiesChanged(TopologyView),
}

impl TopologyEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TopologyEvent::Init(_) => "init",
            TopologyEvent::Changing => "changing",
            TopologyEvent::Changed(_) => "changed",
            TopologyEvent::PropertiesChanged(_) => "properties_changed",
        }
    }
}

/// Observer of capability snapshot replacements.
///
/// Callbacks run synchronously inside the coordinator's transition and must
/// return promptly. `None` announces that job processing is stopped until
/// the next snapshot arrives. Registering or removing listeners from inside
/// a callback deadlocks the coordinator.
pub trait CapabilityListener: Send + Sync {
    fn on_capability_change(&self, capabilities: Option<Arc<CapabilitySnapshot>>);
}

#[derive(Default)]
struct CoordinatorState {
    listeners: Vec<Arc<dyn CapabilityListener>>,
    current: Option<Arc<CapabilitySnapshot>>,
    /// Set once the first view-bearing event arrives. A `Changed` event that
    /// beats `Init` to the coordinator is handled as the init event.
    saw_first_view: bool,
    /// Startup maintenance runs at most once per process lifetime.
    maintenance_done: bool,
}

#[derive(Clone, Copy, Eq, PartialEq)]
enum StartMode {
    /// First view: run one-time maintenance before publishing.
    Init,
    /// Replacement view: publish and notify.
    Changed,
    /// Internal rebuild: publish without notifying.
    Silent,
}

/// Reacts to topology and configuration changes by replacing the capability
/// snapshot and telling listeners about it.
///
/// All transitions and the listener registry are serialized under one mutex;
/// transitions are rare and teardown must be synchronous, so a single coarse
/// lock keeps the state machine easy to reason about. Hot paths read the
/// current snapshot lock-free through [`TopologyCoordinator::capabilities`].
pub struct TopologyCoordinator {
    state: Mutex<CoordinatorState>,
    published: ArcSwapOption<CapabilitySnapshot>,
    config: Arc<dyn ConfigSource>,
    store: Option<Arc<dyn JobStore>>,
}

impl fmt::Debug for TopologyCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("TopologyCoordinator");
        debug.field("published", &self.published.load().is_some());
        match self.state.try_lock() {
            Ok(state) => {
                debug.field("listeners", &state.listeners.len());
                debug.field("maintenance_done", &state.maintenance_done);
            }
            Err(_) => {
                debug.field("state", &"<locked>");
            }
        }
        debug.finish_non_exhaustive()
    }
}

impl TopologyCoordinator {
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        Self {
            state: Mutex::new(CoordinatorState::default()),
            published: ArcSwapOption::empty(),
            config,
            store: None,
        }
    }

    /// Attach the persistence seam used by startup maintenance. Without a
    /// store, maintenance is a logged no-op.
    pub fn with_job_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Current capability snapshot, or `None` while job processing is
    /// stopped. Lock-free; safe to call from job hot paths.
    pub fn capabilities(&self) -> Option<Arc<CapabilitySnapshot>> {
        self.published.load_full()
    }

    /// Whether a capability snapshot is currently published.
    pub fn is_active(&self) -> bool {
        self.published.load().is_some()
    }

    /// Register a listener.
    ///
    /// The listener is immediately invoked once with the current state, so
    /// late registrants never miss the standing snapshot.
    pub async fn add_listener(&self, listener: Arc<dyn CapabilityListener>) {
        let mut state = self.state.lock().await;
        Self::notify_listeners(
            std::slice::from_ref(&listener),
            state.current.clone(),
        );
        state.listeners.push(listener);
    }

    /// Remove a previously registered listener, matched by identity.
    pub async fn remove_listener(&self, listener: &Arc<dyn CapabilityListener>) {
        let mut state = self.state.lock().await;
        state
            .listeners
            .retain(|existing| !Arc::ptr_eq(existing, listener));
    }

    /// React to a discovery event.
    pub async fn handle_topology_event(&self, event: TopologyEvent) {
        let span = telemetry::topology_event_span(event.kind());
        async move {
            telemetry::record_topology_event(event.kind());
            let mut state = self.state.lock().await;
            match event {
                TopologyEvent::Init(view) => {
                    state.saw_first_view = true;
                    self.stop_processing(&mut state, true).await;
                    self.start_processing(&mut state, view, StartMode::Init)
                        .await;
                }
                TopologyEvent::Changing => {
                    self.stop_processing(&mut state, true).await;
                }
                TopologyEvent::Changed(view) => {
                    let mode = if state.saw_first_view {
                        StartMode::Changed
                    } else {
                        StartMode::Init
                    };
                    state.saw_first_view = true;
                    self.stop_processing(&mut state, true).await;
                    self.start_processing(&mut state, view, mode).await;
                }
                TopologyEvent::PropertiesChanged(view) => {
                    state.saw_first_view = true;
                    if let Some(current) = &state.current {
                        if current.is_equivalent_to(&view.capability_map()) {
                            tracing::debug!(
                                "instance properties changed without capability \
                                 impact, ignoring"
                            );
                            return;
                        }
                    }
                    // Ownership must be re-derived, but listeners only hear
                    // about real topology changes.
                    self.stop_processing(&mut state, false).await;
                    self.start_processing(&mut state, view, StartMode::Silent)
                        .await;
                }
            }
        }
        .instrument(span)
        .await
    }

    /// React to a queue configuration change.
    ///
    /// Rebuilds queue ownership from the retained view and freshly re-read
    /// configuration. The replaced snapshot is not deactivated and listeners
    /// are not notified; with no standing snapshot this is a no-op.
    // TODO: a configuration change should stop and restart processing the way
    // a topology change does; until then, background work attached to the
    // replaced snapshot keeps running until the next topology event.
    pub async fn configuration_changed(&self) {
        let mut state = self.state.lock().await;
        let Some(current) = state.current.clone() else {
            tracing::debug!(
                "configuration changed before any topology view, ignoring"
            );
            return;
        };
        tracing::info!("queue configuration changed, rebuilding ownership");
        let view = current.view().clone();
        self.start_processing(&mut state, view, StartMode::Silent).await;
    }

    async fn stop_processing(&self, state: &mut CoordinatorState, notify: bool) {
        let Some(current) = state.current.take() else {
            return;
        };
        tracing::debug!("stopping job processing");
        current.deactivate().await;
        self.published.store(None);
        if notify {
            Self::notify_listeners(&state.listeners, None);
        }
    }

    async fn start_processing(
        &self,
        state: &mut CoordinatorState,
        view: TopologyView,
        mode: StartMode,
    ) {
        let config = self.config.current();
        let snapshot = Arc::new(CapabilitySnapshot::new(view, &config));

        if mode == StartMode::Init && !state.maintenance_done {
            state.maintenance_done = true;
            self.run_startup_maintenance(snapshot.local_id()).await;
        }

        tracing::info!(
            local = %snapshot.local_id(),
            leader = snapshot.is_leader(),
            owned = snapshot.owned_queues().len(),
            "starting job processing"
        );
        state.current = Some(snapshot.clone());
        self.published.store(Some(snapshot.clone()));
        telemetry::record_capability_published(
            snapshot.owned_queues().len(),
            snapshot.is_leader(),
        );

        if mode != StartMode::Silent {
            Self::notify_listeners(&state.listeners, Some(snapshot));
        }
    }

    /// Upgrade pass and unfinished-job scan, run before the first snapshot
    /// is published. Failures are logged; they never block publication.
    async fn run_startup_maintenance(&self, local: &InstanceId) {
        let Some(store) = &self.store else {
            tracing::debug!("no job store configured, skipping startup maintenance");
            return;
        };
        let span = telemetry::maintenance_span();
        async {
            if let Err(error) = UpgradeTask::new(store.clone()).run().await {
                tracing::error!(error = %error, "legacy job migration failed");
            }
            let scan = UnfinishedJobScan::new(store.clone(), local.clone());
            if let Err(error) = scan.run().await {
                tracing::error!(error = %error, "unfinished job scan failed");
            }
        }
        .instrument(span)
        .await
    }

    fn notify_listeners(
        listeners: &[Arc<dyn CapabilityListener>],
        capabilities: Option<Arc<CapabilitySnapshot>>,
    ) {
        for listener in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                listener.on_capability_change(capabilities.clone());
            }));
            if outcome.is_err() {
                tracing::error!(
                    "capability listener panicked, continuing with remaining \
                     listeners"
                );
            }
        }
    }
}
