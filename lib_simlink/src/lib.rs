//! # lib_simlink
//!
//! Shared library behind the SimBridge server. It bridges a push-based
//! simulator telemetry feed to pull-based readers.
//!
//! Modules are gated by folder-level features:
//!
//! - **`core`**: snapshot store, connection manager and response rendering.
//! - **`service`**: the axum router serving the latest snapshot.
//! - **`loggers`**: `tracing` subscriber setup (console + rolling JSON file).
//! - **`sources`**: in-process telemetry sources, such as the synthetic engine.

#![forbid(unsafe_code)]

#[cfg(feature = "core")]
pub mod core;
#[cfg(feature = "loggers")]
pub mod loggers;
#[cfg(feature = "service")]
pub mod service;
#[cfg(feature = "sources")]
pub mod sources;

// Re-export the types every consumer needs.
#[cfg(feature = "core")]
pub use crate::core::{
    ConnectionManager, ConnectionState, EmptyResponseShape, LinkSettings, SnapshotStore,
    TelemetrySnapshot, TelemetrySource,
};
