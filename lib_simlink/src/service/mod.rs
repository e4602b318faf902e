//! # Query Service
//!
//! HTTP face of the bridge: one read-only endpoint that answers any `GET`
//! with the latest snapshot and any other method with `405`.

/// Router and handler for the snapshot endpoint.
pub mod router;

pub use router::{build_router, QueryState};
