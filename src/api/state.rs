//! Application State
//!
//! Shared state accessible by all API and WebSocket handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::config::{Config, ServerConfig};
use crate::session::{CollabHub, HubConfig, MessageBus};
use crate::websocket::ConnectionRegistry;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Room authority shared by every connection
    pub hub: Arc<CollabHub>,
    /// Live WebSocket connections; also the hub's delivery bus
    pub registry: Arc<ConnectionRegistry>,
    /// Listener configuration
    pub config: Arc<ServerConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Wire a registry and a hub delivering through it
    pub fn new(server: ServerConfig, hub_config: HubConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(hub_config.max_connections));
        let bus: Arc<dyn MessageBus> = registry.clone();
        let hub = Arc::new(CollabHub::new(bus, hub_config));

        Self {
            hub,
            registry,
            config: Arc::new(server),
            start_time: Instant::now(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.server.clone(), config.hub.clone())
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get WebSocket connection count
    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ServerConfig::default(), HubConfig::default())
    }
}
