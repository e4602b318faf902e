//! # Snapshot Store
//!
//! A single-slot cell shared by the connection manager (the only writer) and
//! the query service (the only reader).
//!
//! The slot holds an `Arc<TelemetrySnapshot>`. Writers build the `Arc` before
//! taking the lock and readers clone it under the lock, so the critical
//! section is a pointer swap or a reference-count bump. No I/O and no
//! `.await` ever happens while the lock is held, which keeps the store from
//! stalling the adapter's callback thread.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::core::model::TelemetrySnapshot;

/// A snapshot as it sits in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot {
    /// The reading itself; shared, never mutated.
    pub snapshot: Arc<TelemetrySnapshot>,
    /// When the store accepted the reading.
    pub received_at: DateTime<Utc>,
    /// 1-based position of this write in the store's history.
    pub sequence: u64,
}

/// Result of [`SnapshotStore::read_latest_or_empty`].
#[derive(Debug, Clone, PartialEq)]
pub enum Latest {
    /// Nothing has been written yet.
    Empty,
    /// The most recently written snapshot.
    Snapshot(StoredSnapshot),
}

impl Latest {
    pub fn is_empty(&self) -> bool {
        matches!(self, Latest::Empty)
    }

    pub fn snapshot(&self) -> Option<&TelemetrySnapshot> {
        match self {
            Latest::Empty => None,
            Latest::Snapshot(stored) => Some(&stored.snapshot),
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    latest: Option<StoredSnapshot>,
    writes: u64,
}

/// # Snapshot Store
///
/// Cheap to clone; all clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    slot: Arc<Mutex<Slot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored snapshot unconditionally and returns the write's
    /// sequence number.
    pub fn write(&self, snapshot: TelemetrySnapshot) -> u64 {
        let snapshot = Arc::new(snapshot);
        let received_at = Utc::now();

        let mut slot = self.lock();
        slot.writes += 1;
        let sequence = slot.writes;
        slot.latest = Some(StoredSnapshot {
            snapshot,
            received_at,
            sequence,
        });
        sequence
    }

    /// Returns the most recent snapshot, or [`Latest::Empty`] if nothing has
    /// been written yet.
    pub fn read_latest_or_empty(&self) -> Latest {
        match &self.lock().latest {
            Some(stored) => Latest::Snapshot(stored.clone()),
            None => Latest::Empty,
        }
    }

    // The slot is only ever assigned a fully built value, so a panic in
    // another holder cannot leave it half-written.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
