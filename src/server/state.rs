use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::connections::ConnectionSet;
use crate::registry::SessionRegistry;
use crate::relay::{Broadcaster, EventRouter};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub connections: Arc<ConnectionSet>,
    pub registry: Arc<SessionRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub router: Arc<EventRouter>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let connections = Arc::new(ConnectionSet::new());
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(connections.clone()));
        let router = Arc::new(EventRouter::new(registry.clone(), broadcaster.clone()));

        Self {
            settings: Arc::new(settings),
            connections,
            registry,
            broadcaster,
            router,
            started_at: Instant::now(),
        }
    }
}
