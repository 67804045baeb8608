//! Configuration for the session engine.

use coedit_protocol::PROTOCOL_VERSION;
use std::time::Duration;
use uuid::Uuid;

/// Configuration for a collaborative session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Document (room) to join.
    pub room_id: Uuid,
    /// Stable user identity.
    pub user_id: Uuid,
    /// Name shown to other participants.
    pub display_name: String,
    /// Protocol version to announce on join.
    pub protocol_version: u16,
    /// Retry configuration for connecting.
    pub retry: RetryConfig,
    /// Minimum interval between presence broadcasts for cursor movement.
    pub presence_debounce: Duration,
    /// Remote presence records older than this are swept.
    pub presence_timeout: Duration,
    /// Interval between presence heartbeats.
    pub heartbeat_interval: Duration,
}

impl SessionConfig {
    /// Creates a session configuration for a room.
    pub fn new(room_id: Uuid, user_id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            room_id,
            user_id,
            display_name: display_name.into(),
            protocol_version: PROTOCOL_VERSION,
            retry: RetryConfig::default(),
            presence_debounce: Duration::from_millis(200),
            presence_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(10),
        }
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the presence debounce interval.
    pub fn with_presence_debounce(mut self, interval: Duration) -> Self {
        self.presence_debounce = interval;
        self
    }

    /// Sets the presence expiry timeout.
    pub fn with_presence_timeout(mut self, timeout: Duration) -> Self {
        self.presence_timeout = timeout;
        self
    }

    /// Sets the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

/// Configuration for connect retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a retry configuration with the given attempt budget.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% jitter on top of the capped delay.
            let jitter = capped * 0.25 * pseudo_jitter();
            Duration::from_secs_f64(capped + jitter)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Cheap time-derived jitter; avoids pulling in an RNG for one call site.
fn pseudo_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}
