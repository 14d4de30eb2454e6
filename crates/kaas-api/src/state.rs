//! Application state.

use kaas_scheduler::BuildOrchestrator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BuildOrchestrator>,
    /// Cancelled when the server shuts down; every build runs under a child.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(orchestrator: Arc<BuildOrchestrator>, shutdown: CancellationToken) -> Self {
        Self {
            orchestrator,
            shutdown,
        }
    }
}
