//! Scheduler API client.
//!
//! Every call is a JSON POST to the scheduler endpoint. SUBSCRIBE is answered
//! with `200 OK` and a long-lived RecordIO body; every other call is answered
//! with `202 Accepted` and no body.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use corral_proto::{Call, CallType, ProtoError};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONNECTION, CONTENT_TYPE};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::engine::Engine;
use crate::stream::FrameReader;

/// Session token header set on the SUBSCRIBE response and echoed on every
/// subsequent call.
pub const STREAM_ID_HEADER: &str = "Mesos-Stream-Id";

const JSON: &str = "application/json";

// =============================================================================
// Errors
// =============================================================================

/// Errors from sending a call.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("failed to encode {call_type} call: {source}")]
    Encode {
        call_type: CallType,
        #[source]
        source: ProtoError,
    },

    #[error("{call_type} call failed: {source}")]
    Transport {
        call_type: CallType,
        #[source]
        source: reqwest::Error,
    },

    #[error("{call_type} call rejected with status {status}: {body}")]
    Rejected {
        call_type: CallType,
        status: u16,
        body: String,
    },
}

impl CallError {
    pub fn call_type(&self) -> CallType {
        match self {
            Self::Encode { call_type, .. }
            | Self::Transport { call_type, .. }
            | Self::Rejected { call_type, .. } => *call_type,
        }
    }
}

// =============================================================================
// Call Sender
// =============================================================================

/// Delivers calls to the resource manager.
#[async_trait]
pub trait CallSender: Send + Sync {
    /// Sends one call. Succeeds only when the call was accepted.
    async fn send(&self, call: Call) -> Result<(), CallError>;
}

/// Body of an established subscription.
pub type EventBody = BoxStream<'static, reqwest::Result<Bytes>>;

/// An established subscription.
pub struct Subscription {
    /// Session token from the response headers, if the server sent one.
    pub stream_id: Option<String>,

    /// Frames of the event stream.
    pub frames: FrameReader<EventBody>,
}

/// HTTP client for the scheduler endpoint.
pub struct SchedulerClient {
    http: reqwest::Client,
    endpoint: String,
    engine: Arc<Engine>,
}

impl SchedulerClient {
    /// Create a client posting to `endpoint`.
    ///
    /// No overall request timeout is set: the subscription body stays open
    /// for the lifetime of the session.
    pub fn new(endpoint: impl Into<String>, engine: Arc<Engine>) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            engine,
        })
    }

    /// Opens the event stream with a SUBSCRIBE call.
    pub async fn subscribe(&self, call: Call) -> Result<Subscription, CallError> {
        let call_type = call.call_type();
        let body = call
            .to_json()
            .map_err(|source| CallError::Encode { call_type, source })?;

        info!(endpoint = %self.endpoint, "Subscribing");

        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, JSON)
            .header(ACCEPT, JSON)
            .header(CONNECTION, "keep-alive")
            .body(body)
            .send()
            .await
            .map_err(|source| CallError::Transport { call_type, source })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Subscription rejected");
            return Err(CallError::Rejected {
                call_type,
                status: status.as_u16(),
                body,
            });
        }

        let stream_id = response
            .headers()
            .get(STREAM_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        debug!(stream_id = stream_id.as_deref().unwrap_or(""), "Subscription established");

        Ok(Subscription {
            stream_id,
            frames: FrameReader::new(response.bytes_stream().boxed()),
        })
    }
}

#[async_trait]
impl CallSender for SchedulerClient {
    async fn send(&self, call: Call) -> Result<(), CallError> {
        let call_type = call.call_type();

        // Copy shared state out before touching the network.
        let framework_id = self.engine.framework_id().await;
        let stream_id = self.engine.stream_id().await;

        let body = call
            .with_framework_id(framework_id)
            .to_json()
            .map_err(|source| CallError::Encode { call_type, source })?;

        debug!(call_type = %call_type, "Sending call");

        let mut request = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, JSON)
            .header(ACCEPT, JSON);
        if let Some(stream_id) = &stream_id {
            request = request.header(STREAM_ID_HEADER, stream_id);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|source| CallError::Transport { call_type, source })?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let body = response.text().await.unwrap_or_default();
            error!(call_type = %call_type, status = %status, body = %body, "Call rejected");
            return Err(CallError::Rejected {
                call_type,
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
