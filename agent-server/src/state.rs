//! Shared application state for the server.

use std::sync::Arc;

use agent::orchestrator::Orchestrator;

use crate::sse::ChannelSink;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// The same sink the orchestrator emits into; handlers subscribe to it.
    pub sink: Arc<ChannelSink>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, sink: Arc<ChannelSink>) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            sink,
        }
    }
}
