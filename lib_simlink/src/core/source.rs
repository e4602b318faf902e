//! # Telemetry Source Contract
//!
//! What the core needs from a simulator SDK adapter. The adapter owns the
//! wire protocol and its own threads; the core only calls the three methods
//! of [`TelemetrySource`] and receives notifications through the
//! [`EventSink`] handed to `connect`.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::core::model::TelemetrySnapshot;

pub use crate::core::connection_manager::EventSink;

/// Correlation id tying deliveries to the subscription that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u32);

impl RequestId {
    /// The one standing request the bridge issues.
    pub const PLANE_INFO: RequestId = RequestId(0);
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle returned by data-definition registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefinitionId(pub u32);

/// Object whose variables are requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimObject {
    /// The aircraft flown by the user.
    User,
}

/// How often the simulator delivers data for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Never,
    Once,
    VisualFrame,
    SimFrame,
    Second,
}

impl Period {
    /// Delivery interval for repeating periods. Frame periods are approximated
    /// at 30 Hz.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Period::Never | Period::Once => None,
            Period::VisualFrame | Period::SimFrame => Some(Duration::from_millis(33)),
            Period::Second => Some(Duration::from_secs(1)),
        }
    }
}

/// Delivery filter for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestFlag {
    /// Deliver on every period.
    #[default]
    Default,
    /// Deliver only when a value changed since the last delivery.
    Changed,
}

/// Unit a simulation variable is reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Degrees,
    Feet,
    Knots,
    FeetPerMinute,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Degrees => "degrees",
            Unit::Feet => "feet",
            Unit::Knots => "knots",
            Unit::FeetPerMinute => "feet per minute",
        }
    }
}

/// Wire encoding of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Fixed-length, NUL-terminated text of the given size in bytes.
    FixedString(usize),
    Float64,
}

/// One simulation variable in a data definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimVarField {
    pub name: &'static str,
    pub unit: Option<Unit>,
    pub kind: FieldKind,
}

/// Shape of the record the simulator should fill for each delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDefinition {
    pub fields: Vec<SimVarField>,
}

impl DataDefinition {
    /// The layout of [`TelemetrySnapshot`], field for field.
    pub fn telemetry_snapshot() -> Self {
        let float = |name, unit| SimVarField {
            name,
            unit: Some(unit),
            kind: FieldKind::Float64,
        };
        Self {
            fields: vec![
                SimVarField {
                    name: "TITLE",
                    unit: None,
                    kind: FieldKind::FixedString(256),
                },
                float("PLANE LATITUDE", Unit::Degrees),
                float("PLANE LONGITUDE", Unit::Degrees),
                float("PLANE ALTITUDE", Unit::Feet),
                float("PLANE HEADING DEGREES MAGNETIC", Unit::Degrees),
                float("AIRSPEED TRUE", Unit::Knots),
                float("VERTICAL SPEED", Unit::FeetPerMinute),
            ],
        }
    }
}

/// A standing request for periodic data on a simulation object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub request_id: RequestId,
    pub definition: DefinitionId,
    pub object: SimObject,
    pub period: Period,
    pub flag: RequestFlag,
}

/// One data notification from the adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct DataDelivery {
    pub request_id: RequestId,
    /// Decoded records; the first one is the reading.
    pub data: Vec<TelemetrySnapshot>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Simulator unreachable: {0}")]
    Unreachable(String),

    #[error("No active simulator connection")]
    NotConnected,

    #[error("Simulator rejected {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },

    #[error("I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),
}

/// # Telemetry Source
///
/// Client side of a simulator SDK.
///
/// `connect` may block for as long as the SDK needs to open its pipe; the
/// connection manager calls it from a blocking-capable thread. Notifications
/// go through the supplied [`EventSink`] and must be delivered serially.
pub trait TelemetrySource: Send + Sync {
    /// Opens the link. An `Ok` return does not mean the link is up; only a
    /// `connection_changed(true)` notification does.
    fn connect(&self, application_name: &str, events: EventSink) -> Result<(), SourceError>;

    /// Declares the record layout and returns its handle.
    fn register_data_definition(
        &self,
        definition: &DataDefinition,
    ) -> Result<DefinitionId, SourceError>;

    /// Starts periodic delivery for `request`.
    fn request_data_on_sim_object(&self, request: &SubscriptionRequest) -> Result<(), SourceError>;
}
