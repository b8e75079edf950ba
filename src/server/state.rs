use std::sync::Arc;
use std::time::Instant;

use crate::broadcast::Broadcaster;
use crate::config::Settings;
use crate::connection_manager::ConnectionManager;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub connection_manager: Arc<ConnectionManager>,
    pub broadcaster: Arc<Broadcaster>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let connection_manager = Arc::new(ConnectionManager::new());
        let broadcaster = Arc::new(Broadcaster::new(connection_manager.clone()));

        Self {
            settings: Arc::new(settings),
            connection_manager,
            broadcaster,
            start_time: Instant::now(),
        }
    }
}
