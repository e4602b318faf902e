//! # Telemetry Model
//!
//! One reading of the user's aircraft as reported by the simulator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Largest title, in bytes, the simulator's fixed 256-byte string can carry
/// once its terminator is accounted for.
pub const TITLE_MAX_BYTES: usize = 255;

/// # Aircraft Title
///
/// Display name of the simulated aircraft. Construction truncates the text
/// to [`TITLE_MAX_BYTES`] on a character boundary, so every `Title` fits the
/// SDK's fixed-length field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Title(String);

impl Title {
    pub fn new(text: impl Into<String>) -> Self {
        let mut text = text.into();
        if text.len() > TITLE_MAX_BYTES {
            let mut cut = TITLE_MAX_BYTES;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Title {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Title {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Title {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// # Telemetry Snapshot
///
/// An immutable reading taken at one point in time. A new snapshot replaces
/// the previous one as a whole; fields are never merged across readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Aircraft display name.
    pub title: Title,
    /// Latitude in degrees.
    pub latitude_deg: f64,
    /// Longitude in degrees.
    pub longitude_deg: f64,
    /// Altitude in feet.
    pub altitude_ft: f64,
    /// Magnetic heading in degrees.
    pub heading_magnetic_deg: f64,
    /// True airspeed in knots.
    pub airspeed_true_kts: f64,
    /// Vertical speed in feet per minute.
    pub vertical_speed_fpm: f64,
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {:.5},{:.5} {:.0}ft hdg {:.0} tas {:.0}kt vs {:.0}fpm",
            self.title,
            self.latitude_deg,
            self.longitude_deg,
            self.altitude_ft,
            self.heading_magnetic_deg,
            self.airspeed_true_kts,
            self.vertical_speed_fpm
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_keeps_short_text() {
        let title = Title::new("Cessna 172");
        assert_eq!(title.as_str(), "Cessna 172");
    }

    #[test]
    fn test_title_truncates_to_fixed_field() {
        let title = Title::new("x".repeat(400));
        assert_eq!(title.len(), TITLE_MAX_BYTES);
    }

    #[test]
    fn test_title_truncates_on_char_boundary() {
        // 'é' is two bytes; 128 of them straddle the limit.
        let title = Title::new("é".repeat(128));
        assert!(title.len() <= TITLE_MAX_BYTES);
        assert_eq!(title.chars().count(), 127);
    }

    #[test]
    fn test_title_serializes_as_plain_string() {
        let json = serde_json::to_string(&Title::new("A320")).unwrap();
        assert_eq!(json, "\"A320\"");
    }
}
