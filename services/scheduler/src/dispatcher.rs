//! Event dispatcher.
//!
//! Consumes the frames of one subscription and drives the session state
//! machine:
//!
//! ```text
//! Disconnected --begin_subscribe--> Subscribing --SUBSCRIBED--> Subscribed
//!      ^                                 |                          |
//!      +---------- stream ends or fails -+--------------------------+
//! ```
//!
//! Events are handled one at a time, in arrival order. A status update is
//! written to disk before it is acknowledged.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use corral_proto::{Call, Event, Offers, Subscribed, TaskStatus, Update};
use futures_core::Stream;
use tracing::{debug, error, info, trace, warn};

use crate::client::CallSender;
use crate::engine::Engine;
use crate::offers::{OfferOutcome, OfferPolicy};
use crate::reconciler::Reconciler;
use crate::stream::{FrameReader, StreamError};

// =============================================================================
// State
// =============================================================================

/// Subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No stream open.
    Disconnected,
    /// SUBSCRIBE sent, waiting for SUBSCRIBED.
    Subscribing,
    /// Registered and receiving events.
    Subscribed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Subscribing => "subscribing",
            Self::Subscribed => "subscribed",
        };
        f.write_str(s)
    }
}

/// Why a subscription ended.
#[derive(Debug)]
pub enum Disconnect {
    /// The server closed the stream.
    EndOfStream,
    /// The stream failed.
    Stream(StreamError),
}

impl std::fmt::Display for Disconnect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EndOfStream => f.write_str("end of stream"),
            Self::Stream(e) => write!(f, "{e}"),
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Routes events to their handlers.
pub struct Dispatcher {
    engine: Arc<Engine>,
    sender: Arc<dyn CallSender>,
    reconciler: Reconciler,
    offers: OfferPolicy,
    state: ConnectionState,
    /// Session token of the subscription being established.
    pending_stream_id: Option<String>,
    /// Whether SUBSCRIBED arrived since the last `begin_subscribe`.
    session_subscribed: bool,
}

impl Dispatcher {
    pub fn new(engine: Arc<Engine>, sender: Arc<dyn CallSender>, offers: OfferPolicy) -> Self {
        let reconciler = Reconciler::new(engine.clone(), sender.clone());
        Self {
            engine,
            sender,
            reconciler,
            offers,
            state: ConnectionState::Disconnected,
            pending_stream_id: None,
            session_subscribed: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the current or last session reached `Subscribed`.
    pub fn session_subscribed(&self) -> bool {
        self.session_subscribed
    }

    /// Marks a SUBSCRIBE as in flight.
    pub fn begin_subscribe(&mut self) {
        if self.state != ConnectionState::Disconnected {
            warn!(state = %self.state, "Subscribing while not disconnected");
        }
        self.state = ConnectionState::Subscribing;
        self.pending_stream_id = None;
        self.session_subscribed = false;
    }

    /// Abandons a SUBSCRIBE that never produced a stream.
    pub async fn abort_subscribe(&mut self) {
        self.disconnect().await;
    }

    /// Consumes `frames` until the stream ends or fails.
    ///
    /// `stream_id` is the session token returned with the subscription. It
    /// becomes the engine's token once SUBSCRIBED arrives. The state is
    /// `Disconnected` when this returns.
    pub async fn run<S, E>(
        &mut self,
        stream_id: Option<String>,
        mut frames: FrameReader<S>,
    ) -> Disconnect
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        self.pending_stream_id = stream_id;

        let reason = loop {
            match frames.next_frame().await {
                Ok(Some(frame)) => self.handle_frame(&frame).await,
                Ok(None) => break Disconnect::EndOfStream,
                Err(e) => break Disconnect::Stream(e),
            }
        };

        warn!(reason = %reason, "Event stream closed");
        self.disconnect().await;
        reason
    }

    /// Decodes and handles one frame. Undecodable frames are skipped.
    pub async fn handle_frame(&mut self, frame: &[u8]) {
        match Event::from_slice(frame) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => {
                warn!(
                    error = %e,
                    frame = %String::from_utf8_lossy(frame),
                    "Ignoring undecodable event"
                );
            }
        }
    }

    /// Handles one event.
    pub async fn handle_event(&mut self, event: Event) {
        trace!(event = event.kind(), state = %self.state, "Event received");

        match (self.state, event) {
            (ConnectionState::Subscribing, Event::Subscribed(subscribed)) => {
                self.on_subscribed(subscribed).await
            }
            (ConnectionState::Subscribed, Event::Subscribed(subscribed)) => {
                warn!(
                    framework_id = %subscribed.framework_id,
                    "Ignoring SUBSCRIBED on an established session"
                );
            }
            (ConnectionState::Subscribed, Event::Heartbeat) => {
                trace!("Heartbeat");
            }
            (ConnectionState::Subscribed, Event::Offers(offers)) => self.on_offers(offers).await,
            (ConnectionState::Subscribed, Event::Update(update)) => self.on_update(update).await,
            (ConnectionState::Subscribed, Event::Rescind(rescind)) => {
                info!(offer_id = %rescind.offer_id, "Offer rescinded");
            }
            (ConnectionState::Subscribed, Event::Failure(failure)) => {
                warn!(
                    agent_id = failure.agent_id.as_ref().map(|id| id.value()).unwrap_or(""),
                    status = failure.status,
                    "Failure reported"
                );
            }
            (ConnectionState::Subscribed, Event::Error(err)) => {
                error!(message = %err.message, "Resource manager reported an error");
            }
            (state, event) => {
                warn!(event = event.kind(), state = %state, "Ignoring event before subscription");
            }
        }
    }

    async fn on_subscribed(&mut self, subscribed: Subscribed) {
        let info = self
            .engine
            .assign_framework_id(subscribed.framework_id.clone())
            .await;
        self.engine
            .set_stream_id(self.pending_stream_id.take())
            .await;

        if let Err(e) = self.engine.store().save_framework(&info) {
            error!(error = %e, "Failed to persist framework info");
        }

        let heartbeat_interval = subscribed
            .heartbeat_interval_seconds
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64);
        self.engine.set_heartbeat_interval(heartbeat_interval).await;
        self.state = ConnectionState::Subscribed;
        self.session_subscribed = true;

        info!(
            framework_id = %subscribed.framework_id,
            heartbeat_interval_secs = subscribed.heartbeat_interval_seconds,
            "Subscribed"
        );

        if let Err(e) = self.reconciler.reconcile().await {
            error!(error = %e, "Reconciliation request failed");
        }
    }

    async fn on_offers(&mut self, offers: Offers) {
        let count = offers.offers.len();
        match self
            .offers
            .handle(&offers.offers, &self.engine, self.sender.as_ref())
            .await
        {
            Ok(OfferOutcome::Empty) => debug!("Empty offer batch"),
            Ok(OfferOutcome::Declined { offers }) => {
                debug!(offers, "No pending command, declined offers")
            }
            Ok(OfferOutcome::Launched {
                task_id, declined, ..
            }) => debug!(task_id = %task_id, declined, "Offer batch handled"),
            Err(e) => error!(error = %e, offers = count, "Offer handling failed"),
        }
    }

    async fn on_update(&mut self, update: Update) {
        let status: TaskStatus = update.status;
        let task_id = status.task_id.clone();
        let state = status.state;
        let agent_id = status.agent_id.clone();
        let uuid = status.uuid.clone();

        info!(
            task_id = %task_id,
            state = %state,
            message = status.message.as_deref().unwrap_or(""),
            "Task status update"
        );

        let tasks = self.engine.record_status(status).await;
        if let Err(e) = self.engine.store().save_tasks(&tasks) {
            // Unacknowledged updates are redelivered.
            error!(error = %e, task_id = %task_id, "Failed to persist task table, not acknowledging");
            return;
        }

        let Some(uuid) = uuid else {
            debug!(task_id = %task_id, "Update carries no uuid, nothing to acknowledge");
            return;
        };
        let Some(agent_id) = agent_id else {
            warn!(task_id = %task_id, "Update carries a uuid but no agent id, cannot acknowledge");
            return;
        };

        if let Err(e) = self
            .sender
            .send(Call::acknowledge(agent_id, task_id.clone(), uuid))
            .await
        {
            error!(error = %e, task_id = %task_id, "Acknowledgement failed");
        }
    }

    async fn disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.pending_stream_id = None;
        self.engine.clear_stream_id().await;
        self.engine.set_heartbeat_interval(None).await;
    }
}
