//! # Synthetic Simulation Engine
//!
//! An in-process [`TelemetrySource`] that behaves like a simulator SDK: it
//! can refuse connections, confirms accepted ones asynchronously, streams
//! readings for a standing request and can drop the link on its own.
//!
//! Each accepted connection gets one session thread. Every notification of
//! that session (link up, data, link down) is made from that thread, so they
//! reach the core serially, as a real SDK's message pump would deliver them.
//!
//! The aircraft flies a level-ish orbit around a fixed point.

use std::collections::HashSet;
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::core::model::{TelemetrySnapshot, Title};
use crate::core::source::{
    DataDefinition, DataDelivery, DefinitionId, EventSink, Period, RequestFlag, SourceError,
    SubscriptionRequest, TelemetrySource,
};

// How often an idle session checks whether it should end.
const IDLE_POLL: Duration = Duration::from_millis(100);

const SUPPORTED_VARIABLES: [&str; 7] = [
    "TITLE",
    "PLANE LATITUDE",
    "PLANE LONGITUDE",
    "PLANE ALTITUDE",
    "PLANE HEADING DEGREES MAGNETIC",
    "AIRSPEED TRUE",
    "VERTICAL SPEED",
];

/// # Synthetic Engine Configuration
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Aircraft title reported in every reading.
    pub title: String,
    /// Centre of the orbit.
    pub origin_lat_deg: f64,
    pub origin_lon_deg: f64,
    /// Mean altitude; the aircraft drifts 100 ft around it.
    pub altitude_ft: f64,
    pub airspeed_kts: f64,
    pub orbit_radius_nm: f64,
    /// Number of initial connection attempts to refuse.
    pub refuse_attempts: u32,
    /// Drop each link after it has been up this long.
    pub drop_after: Option<Duration>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            title: "Cessna Skyhawk G1000".to_string(),
            origin_lat_deg: 47.4502,
            origin_lon_deg: -122.3088,
            altitude_ft: 3000.0,
            airspeed_kts: 110.0,
            orbit_radius_nm: 3.0,
            refuse_attempts: 0,
            drop_after: None,
        }
    }
}

impl SyntheticConfig {
    /// Reading at `elapsed` seconds into the flight.
    pub fn reading_at(&self, elapsed: f64) -> TelemetrySnapshot {
        let radius_nm = self.orbit_radius_nm.max(0.1);
        // Angular speed in rad/s along the orbit.
        let omega = (self.airspeed_kts / 3600.0) / radius_nm;
        let theta = (omega * elapsed) % TAU;

        let lat = self.origin_lat_deg + radius_nm / 60.0 * theta.cos();
        let lon = self.origin_lon_deg
            + radius_nm / 60.0 * theta.sin() / self.origin_lat_deg.to_radians().cos();
        let heading = (theta.to_degrees() + 90.0).rem_euclid(360.0);

        TelemetrySnapshot {
            title: Title::new(self.title.clone()),
            latitude_deg: lat,
            longitude_deg: lon,
            altitude_ft: self.altitude_ft + 100.0 * theta.sin(),
            heading_magnetic_deg: heading,
            airspeed_true_kts: self.airspeed_kts,
            vertical_speed_fpm: 100.0 * theta.cos() * omega * 60.0,
        }
    }
}

struct Session {
    id: u64,
    requests: Sender<SubscriptionRequest>,
    alive: Arc<AtomicBool>,
}

#[derive(Default)]
struct EngineState {
    attempts: u32,
    sessions: u64,
    session: Option<Session>,
    definitions: HashSet<DefinitionId>,
    next_definition: u32,
}

/// # Synthetic Source
pub struct SyntheticSource {
    config: SyntheticConfig,
    started: Instant,
    state: Mutex<EngineState>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            started: Instant::now(),
            state: Mutex::new(EngineState::default()),
        }
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    /// Connection attempts seen so far, refused ones included.
    pub fn attempts(&self) -> u32 {
        self.lock().attempts
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn live_session<'a>(state: &'a EngineState) -> Result<&'a Session, SourceError> {
        state
            .session
            .as_ref()
            .filter(|s| s.alive.load(Ordering::Acquire))
            .ok_or(SourceError::NotConnected)
    }
}

impl TelemetrySource for SyntheticSource {
    fn connect(&self, application_name: &str, events: EventSink) -> Result<(), SourceError> {
        let mut state = self.lock();
        state.attempts += 1;
        if state.attempts <= self.config.refuse_attempts {
            return Err(SourceError::Unreachable(format!(
                "synthetic engine refused '{}' (attempt {} of {} refused)",
                application_name, state.attempts, self.config.refuse_attempts
            )));
        }

        if let Some(old) = state.session.take() {
            old.alive.store(false, Ordering::Release);
        }
        state.definitions.clear();
        state.sessions += 1;
        let id = state.sessions;

        let (tx, rx) = mpsc::channel();
        let alive = Arc::new(AtomicBool::new(true));
        let runner = SessionRunner {
            id,
            config: self.config.clone(),
            flight_start: self.started,
            events,
            requests: rx,
            alive: Arc::clone(&alive),
        };
        thread::Builder::new()
            .name(format!("synthetic-sim-{id}"))
            .spawn(move || runner.run())?;

        info!(session = id, application = application_name, "Synthetic engine accepted connection");
        state.session = Some(Session {
            id,
            requests: tx,
            alive,
        });
        Ok(())
    }

    fn register_data_definition(
        &self,
        definition: &DataDefinition,
    ) -> Result<DefinitionId, SourceError> {
        let mut state = self.lock();
        Self::live_session(&state)?;

        if let Some(unknown) = definition
            .fields
            .iter()
            .find(|f| !SUPPORTED_VARIABLES.contains(&f.name))
        {
            return Err(SourceError::Rejected {
                operation: "data definition",
                reason: format!("unknown simulation variable '{}'", unknown.name),
            });
        }

        state.next_definition += 1;
        let id = DefinitionId(state.next_definition);
        state.definitions.insert(id);
        Ok(id)
    }

    fn request_data_on_sim_object(&self, request: &SubscriptionRequest) -> Result<(), SourceError> {
        let state = self.lock();
        let session = Self::live_session(&state)?;

        if !state.definitions.contains(&request.definition) {
            return Err(SourceError::Rejected {
                operation: "data request",
                reason: format!("definition {:?} is not registered", request.definition),
            });
        }

        debug!(session = session.id, request_id = %request.request_id, "Synthetic engine queued data request");
        session
            .requests
            .send(request.clone())
            .map_err(|_| SourceError::NotConnected)
    }
}

struct SessionRunner {
    id: u64,
    config: SyntheticConfig,
    flight_start: Instant,
    events: EventSink,
    requests: Receiver<SubscriptionRequest>,
    alive: Arc<AtomicBool>,
}

impl SessionRunner {
    fn run(self) {
        let linked_at = Instant::now();
        self.events.connection_changed(true);

        let mut active: Option<SubscriptionRequest> = None;
        // Last reading sent, for `RequestFlag::Changed`.
        let mut last_sent: Option<TelemetrySnapshot> = None;
        loop {
            if !self.alive.load(Ordering::Acquire) {
                debug!(session = self.id, "Synthetic session superseded");
                return;
            }

            if let Some(limit) = self.config.drop_after {
                if linked_at.elapsed() >= limit {
                    self.alive.store(false, Ordering::Release);
                    warn!(session = self.id, "Synthetic engine dropping the link");
                    self.events.connection_changed(false);
                    return;
                }
            }

            let wait = active
                .as_ref()
                .and_then(|r| r.period.interval())
                .unwrap_or(IDLE_POLL);

            match self.requests.recv_timeout(wait) {
                Ok(request) => {
                    last_sent = None;
                    self.deliver(&request, &mut last_sent);
                    if request.period.interval().is_some() {
                        active = Some(request);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(request) = &active {
                        self.deliver(request, &mut last_sent);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    fn deliver(&self, request: &SubscriptionRequest, last_sent: &mut Option<TelemetrySnapshot>) {
        if request.period == Period::Never {
            return;
        }
        let elapsed = self.flight_start.elapsed().as_secs_f64();
        let reading = self.config.reading_at(elapsed);
        if request.flag == RequestFlag::Changed && last_sent.as_ref() == Some(&reading) {
            return;
        }
        *last_sent = Some(reading.clone());
        self.events.data_received(DataDelivery {
            request_id: request.request_id,
            data: vec![reading],
        });
    }
}
