//! maintdesk: campus maintenance request intake and admin notifier.
//!
//! Library crate shared by the `maintdesk` binary and the integration tests
//! in `tests/`.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod notification;
pub mod store;
pub mod telemetry;

/// Shared application state passed to handlers.
pub struct AppState {
    pub store: Arc<dyn store::RequestStore>,
}
