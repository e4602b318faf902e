//! # Telemetry Sources
//!
//! Concrete [`TelemetrySource`](crate::core::TelemetrySource) implementations
//! that live in-process. Vendor SDK adapters plug in through the same trait.

/// A simulator stand-in that flies a deterministic orbit.
pub mod synthetic;

pub use synthetic::{SyntheticConfig, SyntheticSource};
