//! # Link Core
//!
//! The heart of SimBridge. These components move telemetry from a
//! simulator SDK (which pushes) to HTTP readers (which poll).
//!
//! ## Core Components:
//!
//! - **`model`**: the immutable `TelemetrySnapshot` and its bounded `Title`.
//!
//! - **`snapshot_store`**: a single-slot, mutex-guarded cell holding the most
//!   recent snapshot, or an explicit empty marker before the first one.
//!
//! - **`source`**: the contract a simulator SDK adapter implements, plus the
//!   `EventSink` handle through which it calls back into the core.
//!
//! - **`link_state`**: the `Disconnected -> Connecting -> Connected` transition
//!   table.
//!
//! - **`connection_manager`**: drives the transition table. It runs the
//!   connect loop with a fixed backoff, registers the standing subscription on
//!   link up and writes every matching delivery into the store.
//!
//! - **`query`**: renders the store's content into the JSON body served to
//!   HTTP clients.

/// Telemetry snapshot value types.
pub mod model;
/// Single-slot store for the latest snapshot.
pub mod snapshot_store;
/// Telemetry source contract and callback sink.
pub mod source;
/// Connection state transition table.
pub mod link_state;
/// Connect loop, subscription and delivery forwarding.
pub mod connection_manager;
/// Response bodies for the snapshot endpoint.
pub mod query;

// --- Public API Re-exports ---
pub use connection_manager::{ConnectionManager, LinkSettings, LinkStats};
pub use link_state::{ConnectionState, LinkEvent};
pub use model::{TelemetrySnapshot, Title};
pub use query::{EmptyResponseShape, QueryResponse};
pub use snapshot_store::{Latest, SnapshotStore, StoredSnapshot};
pub use source::{
    DataDefinition, DataDelivery, DefinitionId, EventSink, Period, RequestFlag, RequestId,
    SimObject, SourceError, SubscriptionRequest, TelemetrySource,
};
