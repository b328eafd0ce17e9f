use concierge::SupportAgent;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<SupportAgent>,
}

impl AppState {
    pub fn new(agent: SupportAgent) -> Self {
        Self {
            agent: Arc::new(agent),
        }
    }
}
