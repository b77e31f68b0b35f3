//! Implements a struct that holds the state of the REST server.

use std::time::Duration;

use axum::extract::FromRef;

use crate::{CategoryStore, DEFAULT_REQUEST_TIMEOUT, Database};

/// The state of the REST server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The connection pool.
    pub database: Database,

    /// The store for categories, sharing `database`'s pool.
    pub categories: CategoryStore,

    /// How long a request may take before it is abandoned.
    pub request_timeout: Duration,
}

impl AppState {
    /// Create a new [AppState] around an opened database.
    pub fn new(database: Database) -> Self {
        Self {
            categories: CategoryStore::new(database.clone()),
            database,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set how long a request may take.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

impl FromRef<AppState> for Database {
    fn from_ref(state: &AppState) -> Self {
        state.database.clone()
    }
}

impl FromRef<AppState> for CategoryStore {
    fn from_ref(state: &AppState) -> Self {
        state.categories.clone()
    }
}
