//! # Connection Manager
//!
//! Keeps exactly one logical link to the simulator and feeds the snapshot
//! store from it.
//!
//! The manager is driven by three independent flows:
//!
//! 1. the connect loop, a tokio task that calls [`TelemetrySource::connect`]
//!    until the adapter confirms the link, waiting a fixed interval between
//!    attempts;
//! 2. the adapter's callback thread, which reports link changes and data
//!    deliveries through an [`EventSink`];
//! 3. readers of the [`SnapshotStore`].
//!
//! They share nothing but the connection state (a `watch` channel whose
//! updates are serialized) and the store. Whether a connect loop is running is
//! not a separate flag: it is the `Connecting` state of the transition table in
//! [`link_state`](crate::core::link_state). Each loop also carries the
//! generation it was started with and exits once a newer loop exists, so a
//! link that comes up and drops before the old loop runs leaves one loop.
//!
//! A blocking `connect` call is abandoned after `connect_timeout`; the call's
//! thread is left to finish on its own and the loop moves on.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::core::link_state::{ConnectionState, LinkEvent};
use crate::core::snapshot_store::SnapshotStore;
use crate::core::source::{
    DataDefinition, DataDelivery, Period, RequestFlag, RequestId, SimObject, SourceError,
    SubscriptionRequest, TelemetrySource,
};

/// Fixed delay between connection attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Longest a single `connect` call may block the loop.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables for the link. Defaults reproduce the bridge's fixed behaviour.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Name the bridge announces itself with when connecting.
    pub application_name: String,
    /// Wait between attempts; also how long a returned attempt may take to be
    /// confirmed by the adapter.
    pub retry_interval: Duration,
    pub connect_timeout: Duration,
    /// Correlation id of the standing subscription.
    pub request_id: RequestId,
    pub period: Period,
    pub flag: RequestFlag,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            application_name: "SimBridge".to_string(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_id: RequestId::PLANE_INFO,
            period: Period::Second,
            flag: RequestFlag::Default,
        }
    }
}

/// Point-in-time copy of the link counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub loops_started: u64,
    pub connect_attempts: u64,
    pub snapshots_stored: u64,
    pub deliveries_dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    loops_started: AtomicU64,
    connect_attempts: AtomicU64,
    snapshots_stored: AtomicU64,
    deliveries_dropped: AtomicU64,
}

struct Inner {
    source: Arc<dyn TelemetrySource>,
    store: SnapshotStore,
    settings: LinkSettings,
    state: watch::Sender<ConnectionState>,
    // Request id of the subscription whose deliveries are accepted.
    subscription: Mutex<Option<RequestId>>,
    // Generation of the newest connect loop. Only bumped under the state lock.
    generation: AtomicU64,
    runtime: Handle,
    counters: Counters,
}

/// # Connection Manager
///
/// Cheap to clone; every clone drives the same link.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Creates a manager in the `Disconnected` state. Connect loops are spawned
    /// on `runtime`, so callbacks may arrive on threads outside of it.
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        store: SnapshotStore,
        settings: LinkSettings,
        runtime: Handle,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                source,
                store,
                settings,
                state,
                subscription: Mutex::new(None),
                generation: AtomicU64::new(0),
                runtime,
                counters: Counters::default(),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.inner.settings
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.inner.store
    }

    pub fn stats(&self) -> LinkStats {
        let c = &self.inner.counters;
        LinkStats {
            loops_started: c.loops_started.load(Ordering::Relaxed),
            connect_attempts: c.connect_attempts.load(Ordering::Relaxed),
            snapshots_stored: c.snapshots_stored.load(Ordering::Relaxed),
            deliveries_dropped: c.deliveries_dropped.load(Ordering::Relaxed),
        }
    }

    /// Handle the adapter uses to call back into this manager. It does not keep
    /// the manager alive.
    pub fn event_sink(&self) -> EventSink {
        EventSink {
            manager: Arc::downgrade(&self.inner),
        }
    }

    /// Begins the connect loop unless one is already running or the link is
    /// up. Returns whether a new loop was started.
    pub fn start(&self) -> bool {
        let mut generation = None;
        self.inner.state.send_if_modified(|state| match state.on(LinkEvent::AttemptStarted) {
            Some(next) => {
                *state = next;
                generation = Some(self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1);
                true
            }
            None => false,
        });

        let Some(generation) = generation else {
            debug!(state = %self.state(), "Connect loop not started");
            return false;
        };

        self.inner.counters.loops_started.fetch_add(1, Ordering::Relaxed);
        info!(generation, "Starting simulator connect loop");
        self.inner.runtime.spawn(self.clone().connect_loop(generation));
        true
    }

    /// Link status notification from the adapter.
    pub fn on_connection_changed(&self, connected: bool) {
        if connected {
            let previous = self.apply(LinkEvent::LinkUp);
            info!(previous = ?previous, "Connected to the simulator");
            if let Err(e) = self.subscribe() {
                error!(error = %e, "Failed to register the telemetry subscription");
            }
        } else {
            self.apply(LinkEvent::LinkDown);
            *self.subscription() = None;
            info!("Disconnected from the simulator");
            // No-op while a loop is still trying.
            self.start();
        }
    }

    /// Data notification from the adapter. Only non-empty deliveries for the
    /// active subscription reach the store.
    pub fn on_snapshot_received(&self, delivery: DataDelivery) {
        let active = *self.subscription();
        if active != Some(delivery.request_id) {
            self.inner.counters.deliveries_dropped.fetch_add(1, Ordering::Relaxed);
            trace!(request_id = %delivery.request_id, active = ?active, "Ignoring delivery for another request");
            return;
        }

        let Some(snapshot) = delivery.data.into_iter().next() else {
            self.inner.counters.deliveries_dropped.fetch_add(1, Ordering::Relaxed);
            trace!(request_id = %delivery.request_id, "Ignoring empty delivery");
            return;
        };

        let sequence = self.inner.store.write(snapshot);
        self.inner.counters.snapshots_stored.fetch_add(1, Ordering::Relaxed);
        debug!(sequence, "Telemetry snapshot updated");
    }

    // Applies `event` to the state under the watch channel's lock. Returns the
    // state it was applied to, or `None` if the table rejected it.
    fn apply(&self, event: LinkEvent) -> Option<ConnectionState> {
        let mut previous = None;
        self.inner.state.send_if_modified(|state| match state.on(event) {
            Some(next) => {
                previous = Some(*state);
                let changed = next != *state;
                *state = next;
                changed
            }
            None => false,
        });

        if let Some(from) = previous {
            let to = self.state();
            if from != to {
                debug!(%from, %to, ?event, "Link state changed");
            }
        }
        previous
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }

    async fn connect_loop(self, generation: u64) {
        let mut state_rx = self.inner.state.subscribe();
        let retry_interval = self.inner.settings.retry_interval;
        let connect_timeout = self.inner.settings.connect_timeout;

        loop {
            // Checked under the read lock; `start` bumps the generation under
            // the write lock.
            let proceed = {
                let state = state_rx.borrow_and_update();
                state.is_attempting() && self.is_current(generation)
            };
            if !proceed {
                break;
            }

            let attempt = self.inner.counters.connect_attempts.fetch_add(1, Ordering::Relaxed) + 1;
            info!(attempt, application = %self.inner.settings.application_name, "Trying to connect to the simulator");

            let source = Arc::clone(&self.inner.source);
            let events = self.event_sink();
            let name = self.inner.settings.application_name.clone();
            let call = tokio::task::spawn_blocking(move || source.connect(&name, events));
            let returned = match timeout(connect_timeout, call).await {
                Ok(Ok(Ok(()))) => true,
                Ok(Ok(Err(e))) => {
                    warn!(attempt, error = %e, "Failed to connect to the simulator");
                    false
                }
                Ok(Err(e)) => {
                    error!(attempt, error = %e, "Connect attempt aborted");
                    false
                }
                Err(_) => {
                    warn!(attempt, timeout = ?connect_timeout, "Connect attempt timed out");
                    false
                }
            };

            // The wait doubles as the backoff; a late confirmation or a newer
            // loop ends it early.
            let ended = matches!(
                timeout(
                    retry_interval,
                    state_rx.wait_for(|s| !s.is_attempting() || !self.is_current(generation))
                )
                .await,
                Ok(Ok(_))
            );
            if ended {
                break;
            }

            if returned {
                warn!(attempt, "Simulator did not confirm the link, retrying");
            } else {
                debug!(attempt, retry_in = ?retry_interval, "Retrying connection");
            }
        }

        if self.is_current(generation) {
            info!(generation, state = %self.state(), "Connect loop finished");
        } else {
            debug!(generation, "Connect loop superseded by a newer one");
        }
    }

    fn subscribe(&self) -> Result<(), SourceError> {
        let settings = &self.inner.settings;
        let source = &self.inner.source;

        let definition = source.register_data_definition(&DataDefinition::telemetry_snapshot())?;
        let request = SubscriptionRequest {
            request_id: settings.request_id,
            definition,
            object: SimObject::User,
            period: settings.period,
            flag: settings.flag,
        };

        // Accept deliveries before asking for them; the first one may arrive
        // before the request call returns.
        *self.subscription() = Some(request.request_id);
        if let Err(e) = source.request_data_on_sim_object(&request) {
            *self.subscription() = None;
            return Err(e);
        }

        info!(request_id = %request.request_id, period = ?request.period, "Telemetry subscription registered");
        Ok(())
    }

    fn subscription(&self) -> MutexGuard<'_, Option<RequestId>> {
        self.inner.subscription.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("settings", &self.inner.settings)
            .field("stats", &self.stats())
            .finish()
    }
}

/// # Event Sink
///
/// The callback interface the core exposes to a [`TelemetrySource`]. Calls
/// made after the manager is dropped are ignored.
#[derive(Clone)]
pub struct EventSink {
    manager: Weak<Inner>,
}

impl EventSink {
    pub fn connection_changed(&self, connected: bool) {
        if let Some(inner) = self.manager.upgrade() {
            ConnectionManager { inner }.on_connection_changed(connected);
        }
    }

    pub fn data_received(&self, delivery: DataDelivery) {
        if let Some(inner) = self.manager.upgrade() {
            ConnectionManager { inner }.on_snapshot_received(delivery);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.manager.strong_count() > 0
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{TelemetrySnapshot, Title};
    use crate::core::snapshot_store::Latest;
    use crate::core::source::DefinitionId;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, Copy)]
    enum Outcome {
        Refuse,
        AcceptSilently,
        AcceptAndConfirm,
        // Blocks inside `connect` before accepting silently.
        Stall(Duration),
    }

    #[derive(Default)]
    struct ScriptedSource {
        outcomes: Mutex<VecDeque<Outcome>>,
        requests: Mutex<Vec<SubscriptionRequest>>,
    }

    impl ScriptedSource {
        fn with(outcomes: &[Outcome]) -> Arc<Self> {
            let source = Self::default();
            source.outcomes.lock().unwrap().extend(outcomes.iter().copied());
            Arc::new(source)
        }

        fn push(&self, outcome: Outcome) {
            self.outcomes.lock().unwrap().push_back(outcome);
        }
    }

    impl TelemetrySource for ScriptedSource {
        fn connect(&self, _application_name: &str, events: EventSink) -> Result<(), SourceError> {
            let next = self.outcomes.lock().unwrap().pop_front().unwrap_or(Outcome::Refuse);
            match next {
                Outcome::Refuse => Err(SourceError::Unreachable("scripted refusal".to_string())),
                Outcome::AcceptSilently => Ok(()),
                Outcome::Stall(hold) => {
                    std::thread::sleep(hold);
                    Ok(())
                }
                Outcome::AcceptAndConfirm => {
                    events.connection_changed(true);
                    Ok(())
                }
            }
        }

        fn register_data_definition(
            &self,
            _definition: &DataDefinition,
        ) -> Result<DefinitionId, SourceError> {
            Ok(DefinitionId(7))
        }

        fn request_data_on_sim_object(
            &self,
            request: &SubscriptionRequest,
        ) -> Result<(), SourceError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    fn settings() -> LinkSettings {
        LinkSettings {
            retry_interval: Duration::from_millis(25),
            ..LinkSettings::default()
        }
    }

    fn manager(source: Arc<ScriptedSource>) -> ConnectionManager {
        ConnectionManager::new(source, SnapshotStore::new(), settings(), Handle::current())
    }

    async fn wait_for_state(manager: &ConnectionManager, wanted: ConnectionState) {
        let mut rx = manager.watch_state();
        timeout(Duration::from_secs(2), rx.wait_for(|s| *s == wanted))
            .await
            .expect("state not reached in time")
            .expect("state channel closed");
    }

    fn delivery(request_id: RequestId, title: &str) -> DataDelivery {
        DataDelivery {
            request_id,
            data: vec![TelemetrySnapshot {
                title: Title::new(title),
                latitude_deg: 47.6,
                longitude_deg: -122.3,
                altitude_ft: 1200.0,
                heading_magnetic_deg: 90.0,
                airspeed_true_kts: 110.0,
                vertical_speed_fpm: 0.0,
            }],
        }
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let manager = manager(ScriptedSource::with(&[]));
        assert!(manager.start());
        assert!(!manager.start());
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(manager.stats().loops_started, 1);
    }

    #[tokio::test]
    async fn test_retries_until_connected_and_subscribes() {
        let source = ScriptedSource::with(&[
            Outcome::Refuse,
            Outcome::Refuse,
            Outcome::AcceptAndConfirm,
        ]);
        let manager = manager(Arc::clone(&source));
        manager.start();
        wait_for_state(&manager, ConnectionState::Connected).await;

        assert_eq!(manager.stats().connect_attempts, 3);
        let requests = source.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].request_id, RequestId::PLANE_INFO);
        assert_eq!(requests[0].definition, DefinitionId(7));
        assert_eq!(requests[0].object, SimObject::User);
        assert_eq!(requests[0].period, Period::Second);
        assert_eq!(requests[0].flag, RequestFlag::Default);
    }

    #[tokio::test]
    async fn test_unconfirmed_connect_is_retried() {
        let source = ScriptedSource::with(&[Outcome::AcceptSilently, Outcome::AcceptAndConfirm]);
        let manager = manager(source);
        manager.start();
        wait_for_state(&manager, ConnectionState::Connected).await;
        assert_eq!(manager.stats().connect_attempts, 2);
    }

    #[tokio::test]
    async fn test_late_confirmation_ends_the_loop() {
        let source = ScriptedSource::with(&[Outcome::AcceptSilently]);
        let manager = manager(source);
        manager.start();
        manager.event_sink().connection_changed(true);
        wait_for_state(&manager, ConnectionState::Connected).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(manager.stats().connect_attempts <= 1);
    }

    #[tokio::test]
    async fn test_link_down_starts_exactly_one_loop() {
        let source = ScriptedSource::with(&[Outcome::AcceptAndConfirm]);
        let manager = manager(Arc::clone(&source));
        manager.start();
        wait_for_state(&manager, ConnectionState::Connected).await;

        manager.on_connection_changed(false);
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(manager.stats().loops_started, 2);

        // Loop still active: a repeated notification must not start another.
        manager.on_connection_changed(false);
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(manager.stats().loops_started, 2);

        source.push(Outcome::AcceptAndConfirm);
        wait_for_state(&manager, ConnectionState::Connected).await;
        assert_eq!(source.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_link_down_while_disconnected_starts_loop() {
        let manager = manager(ScriptedSource::with(&[]));
        manager.on_connection_changed(false);
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(manager.stats().loops_started, 1);
    }

    #[tokio::test]
    async fn test_up_then_down_before_loop_runs_keeps_one_loop() {
        // Every attempt is refused, so the loops never end on their own.
        let manager = manager(ScriptedSource::with(&[]));

        // The first loop is spawned but not yet polled when the link flaps.
        manager.start();
        manager.on_connection_changed(true);
        manager.on_connection_changed(false);
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(manager.stats().loops_started, 2);

        tokio::time::sleep(Duration::from_millis(500)).await;

        // One loop at a 25 ms interval makes about 20 attempts in 500 ms.
        let attempts = manager.stats().connect_attempts;
        assert!(attempts >= 5, "connect loop stalled: {attempts} attempts");
        assert!(attempts <= 26, "more than one connect loop is running: {attempts} attempts");
    }

    #[tokio::test]
    async fn test_hung_connect_call_is_abandoned() {
        let source = ScriptedSource::with(&[Outcome::Stall(Duration::from_millis(400))]);
        let manager = ConnectionManager::new(
            source,
            SnapshotStore::new(),
            LinkSettings {
                retry_interval: Duration::from_millis(25),
                connect_timeout: Duration::from_millis(50),
                ..LinkSettings::default()
            },
            Handle::current(),
        );
        manager.start();

        timeout(Duration::from_millis(300), async {
            while manager.stats().connect_attempts < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("loop stuck behind a hung connect call");
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(manager.stats().loops_started, 1);
    }

    #[tokio::test]
    async fn test_matching_delivery_updates_store() {
        let manager = manager(ScriptedSource::with(&[]));
        manager.on_connection_changed(true);
        manager.on_snapshot_received(delivery(RequestId::PLANE_INFO, "Cessna 172"));

        let latest = manager.store().read_latest_or_empty();
        assert_eq!(latest.snapshot().unwrap().title.as_str(), "Cessna 172");
        assert_eq!(manager.stats().snapshots_stored, 1);
    }

    #[tokio::test]
    async fn test_foreign_and_empty_deliveries_are_ignored() {
        let manager = manager(ScriptedSource::with(&[]));
        manager.on_connection_changed(true);

        manager.on_snapshot_received(delivery(RequestId(42), "Intruder"));
        manager.on_snapshot_received(DataDelivery {
            request_id: RequestId::PLANE_INFO,
            data: Vec::new(),
        });

        assert_eq!(manager.store().read_latest_or_empty(), Latest::Empty);
        assert_eq!(manager.stats().deliveries_dropped, 2);
    }

    #[tokio::test]
    async fn test_deliveries_before_subscription_are_ignored() {
        let manager = manager(ScriptedSource::with(&[]));
        manager.on_snapshot_received(delivery(RequestId::PLANE_INFO, "Early"));
        assert!(manager.store().read_latest_or_empty().is_empty());
    }

    #[tokio::test]
    async fn test_sink_detaches_when_manager_dropped() {
        let manager = manager(ScriptedSource::with(&[]));
        let sink = manager.event_sink();
        assert!(sink.is_attached());
        drop(manager);
        assert!(!sink.is_attached());
        sink.connection_changed(true);
    }
}
