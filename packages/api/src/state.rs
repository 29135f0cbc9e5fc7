use std::sync::Arc;

use store::ChurchStore;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChurchStore>,
    /// Lifetime of a bearer token issued at login.
    pub session_ttl: chrono::Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn ChurchStore>, session_ttl: chrono::Duration) -> Self {
        Self { store, session_ttl }
    }
}
