use crate::simbridge_logic::config::Settings;
use lib_simlink::core::{ConnectionManager, SnapshotStore, TelemetrySource};
use lib_simlink::service::QueryState;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Everything the tasks share. Built once at startup; clones share the same
/// store and connection manager.
#[derive(Clone, Debug)]
pub struct AppContext {
    pub store: SnapshotStore,
    pub link: ConnectionManager,
    pub query: QueryState,
}

impl AppContext {
    pub fn new(settings: &Settings, source: Arc<dyn TelemetrySource>, runtime: Handle) -> Self {
        let store = SnapshotStore::new();
        let link = ConnectionManager::new(source, store.clone(), settings.link.clone(), runtime);
        let query = QueryState::new(store.clone(), settings.empty_response);
        Self { store, link, query }
    }
}
