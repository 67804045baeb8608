//! Server configuration.

use std::time::Duration;

/// Configuration for the room server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of concurrently hosted rooms.
    pub max_rooms: usize,
    /// Maximum operations returned per sync response. Clients loop their
    /// state-vector exchange until they are caught up.
    pub max_sync_batch: usize,
    /// Presence records older than this are swept.
    pub presence_timeout: Duration,
    /// Interval at which the host should call the presence sweep.
    pub sweep_interval: Duration,
}

impl ServerConfig {
    /// Creates a configuration with the given room capacity.
    pub fn new(max_rooms: usize) -> Self {
        Self {
            max_rooms,
            max_sync_batch: 500,
            presence_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(10),
        }
    }

    /// Sets the sync batch cap.
    pub fn with_max_sync_batch(mut self, size: usize) -> Self {
        self.max_sync_batch = size;
        self
    }

    /// Sets the presence expiry timeout.
    pub fn with_presence_timeout(mut self, timeout: Duration) -> Self {
        self.presence_timeout = timeout;
        self
    }

    /// Sets the recommended sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(1024)
    }
}
