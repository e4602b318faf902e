//! # Snapshot Query Responses
//!
//! Body of the snapshot endpoint. With a reading, the body carries the seven
//! telemetry fields under the simulator's variable names plus a `timestamp`.
//!
//! Without a reading, the legacy body uses different field names
//! (`Latitude`, `Heading`, ...) and omits `timestamp`. Existing clients depend
//! on that shape, so it stays the default; [`EmptyResponseShape::Uniform`]
//! serves the normal field names zeroed instead.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::model::TelemetrySnapshot;
use crate::core::snapshot_store::{Latest, SnapshotStore};

/// Second precision, UTC, no offset suffix.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Body served before the first snapshot arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyResponseShape {
    /// `Title`, `Latitude`, `Longitude`, `Altitude`, `Heading`, `Airspeed`,
    /// `VerticalSpeed`.
    #[default]
    Legacy,
    /// Same field names as a real snapshot, zeroed, without `timestamp`.
    Uniform,
}

impl FromStr for EmptyResponseShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "uniform" => Ok(Self::Uniform),
            other => Err(format!("unknown empty response shape '{other}' (expected legacy or uniform)")),
        }
    }
}

impl fmt::Display for EmptyResponseShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Uniform => write!(f, "uniform"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotBody {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "PlaneLatitude")]
    pub plane_latitude: f64,
    #[serde(rename = "PlaneLongitude")]
    pub plane_longitude: f64,
    #[serde(rename = "PlaneAltitude")]
    pub plane_altitude: f64,
    #[serde(rename = "PlaneHeadingDegreesMagnetic")]
    pub plane_heading_degrees_magnetic: f64,
    #[serde(rename = "AirspeedTrue")]
    pub airspeed_true: f64,
    #[serde(rename = "VerticalSpeed")]
    pub vertical_speed: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl SnapshotBody {
    fn from_snapshot(snapshot: &TelemetrySnapshot, now: DateTime<Utc>) -> Self {
        Self {
            title: snapshot.title.to_string(),
            plane_latitude: snapshot.latitude_deg,
            plane_longitude: snapshot.longitude_deg,
            plane_altitude: snapshot.altitude_ft,
            plane_heading_degrees_magnetic: snapshot.heading_magnetic_deg,
            airspeed_true: snapshot.airspeed_true_kts,
            vertical_speed: snapshot.vertical_speed_fpm,
            timestamp: Some(now.format(TIMESTAMP_FORMAT).to_string()),
        }
    }

    fn zeroed() -> Self {
        Self {
            title: String::new(),
            plane_latitude: 0.0,
            plane_longitude: 0.0,
            plane_altitude: 0.0,
            plane_heading_degrees_magnetic: 0.0,
            airspeed_true: 0.0,
            vertical_speed: 0.0,
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LegacyEmptyBody {
    pub title: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub heading: f64,
    pub airspeed: f64,
    pub vertical_speed: f64,
}

impl Default for LegacyEmptyBody {
    fn default() -> Self {
        Self {
            title: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            heading: 0.0,
            airspeed: 0.0,
            vertical_speed: 0.0,
        }
    }
}

/// # Query Response
///
/// What a `GET` on the bridge returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Snapshot(SnapshotBody),
    LegacyEmpty(LegacyEmptyBody),
}

impl QueryResponse {
    /// Builds the body for `latest`. `now` is stamped on real snapshots.
    pub fn render(latest: &Latest, shape: EmptyResponseShape, now: DateTime<Utc>) -> Self {
        match (latest.snapshot(), shape) {
            (Some(snapshot), _) => Self::Snapshot(SnapshotBody::from_snapshot(snapshot, now)),
            (None, EmptyResponseShape::Legacy) => Self::LegacyEmpty(LegacyEmptyBody::default()),
            (None, EmptyResponseShape::Uniform) => Self::Snapshot(SnapshotBody::zeroed()),
        }
    }

    /// Reads the store once and renders the result at the current time.
    pub fn from_store(store: &SnapshotStore, shape: EmptyResponseShape) -> Self {
        Self::render(&store.read_latest_or_empty(), shape, Utc::now())
    }

    pub fn has_snapshot(&self) -> bool {
        matches!(self, Self::Snapshot(body) if body.timestamp.is_some())
    }
}
