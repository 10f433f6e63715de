// Bounded retry handshake with the broker.
//
// Purpose
// - Confirm the broker is reachable before a publisher or consumer starts work.
//
// Responsibilities
// - Probe up to `max_attempts` times, sleeping between attempts (not after the last).
// - End in `Ready` on the first successful probe, `Disabled` when the budget is spent.
//
// Testing guidance
// - Sleeps go through tokio's timer; run tests with paused time.

use crate::core::ports::BrokerConnector;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Disabled,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Disabled => "disabled",
        }
    }
}

pub trait Backoff: Send + Sync {
    /// Delay after failed attempt number `attempt` (1-based).
    fn delay(&self, attempt: u32) -> Duration;
}

#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff(pub Duration);

impl Backoff for FixedBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Arc<dyn Backoff>,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Arc::new(FixedBackoff(interval)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_INTERVAL)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeOutcome {
    pub state: ConnectionState,
    pub attempts: u32,
}

pub struct Handshake {
    name: String,
    policy: RetryPolicy,
}

impl Handshake {
    pub fn new(name: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
        }
    }

    pub async fn establish(&self, connector: &dyn BrokerConnector) -> HandshakeOutcome {
        let max = self.policy.max_attempts;
        for attempt in 1..=max {
            match connector.probe().await {
                Ok(()) => {
                    info!(component = %self.name, attempt, "connected to broker");
                    return HandshakeOutcome {
                        state: ConnectionState::Ready,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    warn!(
                        component = %self.name,
                        attempt,
                        max_attempts = max,
                        error = %e,
                        "broker not available yet"
                    );
                    if attempt < max {
                        tokio::time::sleep(self.policy.backoff.delay(attempt)).await;
                    }
                }
            }
        }

        error!(component = %self.name, max_attempts = max, "giving up on broker");
        HandshakeOutcome {
            state: ConnectionState::Disabled,
            attempts: max,
        }
    }
}
