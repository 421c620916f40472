//! Subscription session driver.
//!
//! A session is one SUBSCRIBE call and the event stream it opens. The
//! scheduler never retries on its own; the caller decides when to start the
//! next session, usually after a [`BackoffPolicy`] delay.

use std::sync::Arc;
use std::time::Duration;

use corral_proto::Call;
use rand::Rng;
use thiserror::Error;
use tracing::info;

use crate::client::{CallError, SchedulerClient};
use crate::dispatcher::{ConnectionState, Disconnect, Dispatcher};
use crate::engine::Engine;

// =============================================================================
// Errors
// =============================================================================

/// How a session ended. Every session ends in one of these.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("subscribe failed: {0}")]
    Subscribe(#[from] CallError),

    #[error("disconnected ({reason}), subscribed: {subscribed}")]
    Disconnected {
        reason: Disconnect,
        /// Whether SUBSCRIBED was received before the stream ended.
        subscribed: bool,
    },
}

impl SessionError {
    /// Whether the session got as far as SUBSCRIBED.
    pub fn was_subscribed(&self) -> bool {
        matches!(
            self,
            Self::Disconnected {
                subscribed: true,
                ..
            }
        )
    }
}

// =============================================================================
// Backoff Policy
// =============================================================================

/// Exponential backoff between sessions.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,

    /// Maximum delay.
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (starting at 0).
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base.as_millis() as f64 * 2.0_f64.powi(attempt.min(30) as i32);
        let delay = delay.min(self.max.as_millis() as f64);

        let jitter = rand_jitter(delay * self.jitter);
        let final_delay = (delay + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }
}

/// Uniform jitter in `[-range, range]`.
fn rand_jitter(range: f64) -> f64 {
    if !range.is_finite() || range <= 0.0 {
        return 0.0;
    }
    rand::rng().random_range(-range..=range)
}

// =============================================================================
// Scheduler
// =============================================================================

/// Runs subscription sessions against the scheduler endpoint.
pub struct Scheduler {
    engine: Arc<Engine>,
    client: Arc<SchedulerClient>,
    dispatcher: Dispatcher,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>, client: Arc<SchedulerClient>, dispatcher: Dispatcher) -> Self {
        Self {
            engine,
            client,
            dispatcher,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.dispatcher.state()
    }

    /// Subscribes and dispatches events until the stream is lost.
    ///
    /// A framework id kept from an earlier registration is sent along, so
    /// the resource manager treats this as a failover of the same framework.
    pub async fn run_session(&mut self) -> SessionError {
        let framework = self.engine.framework_info().await;
        info!(
            framework_id = framework.id.as_ref().map(|id| id.value()).unwrap_or(""),
            name = %framework.name,
            "Starting session"
        );

        self.dispatcher.begin_subscribe();
        let subscription = match self.client.subscribe(Call::subscribe(framework)).await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.dispatcher.abort_subscribe().await;
                return SessionError::Subscribe(e);
            }
        };

        let reason = self
            .dispatcher
            .run(subscription.stream_id, subscription.frames)
            .await;

        SessionError::Disconnected {
            reason,
            subscribed: self.dispatcher.session_subscribed(),
        }
    }
}
