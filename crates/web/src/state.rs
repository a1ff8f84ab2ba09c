use std::sync::Arc;

use dronetrigger_core::{Rebuilder, WebConfig};

/// WebState is shared by all webhook requests. It is read-only.
#[derive(Clone)]
pub struct WebState {
    config: Arc<WebConfig>,
    drone: Arc<dyn Rebuilder>,
}

impl WebState {
    pub fn new(config: WebConfig, drone: Arc<dyn Rebuilder>) -> Self {
        Self {
            config: Arc::new(config),
            drone,
        }
    }

    pub fn token_for(&self, repo: &str) -> Option<&str> {
        self.config.token_for(repo)
    }

    pub fn drone(&self) -> &dyn Rebuilder {
        self.drone.as_ref()
    }

    // Address to bind the listener to.
    pub fn listen_address(&self) -> String {
        self.config.bind_address()
    }
}
