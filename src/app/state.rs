//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::SessionRegistry;
use crate::world::WorldGeometry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(config: Config, world: Arc<WorldGeometry>) -> Self {
        let config = Arc::new(config);

        // The registry owns every player; connections and the tick loop only
        // go through it
        let sessions = Arc::new(SessionRegistry::new(world));

        Self { config, sessions }
    }
}
