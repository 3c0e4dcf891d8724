//! Controller configuration

use std::time::Duration;

/// Bounded automatic reconnection policy.
///
/// Delays double per attempt from `initial_delay` up to `max_delay`. Once
/// `max_attempts` reconnection attempts have failed the controller settles
/// into a stable offline state and stops dialing on its own.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnection attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.initial_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }
}

/// Knobs for the session controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub reconnect: ReconnectPolicy,
    /// How long to wait for a terminal event after a message is sent
    /// before failing it locally. `None` waits forever (the original
    /// behavior, which could leave input locked indefinitely).
    pub response_timeout: Option<Duration>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            response_timeout: Some(Duration::from_secs(120)),
        }
    }
}
