//! Events streamed from the resource manager to the scheduler.

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;
use crate::types::{AgentId, FrameworkId, Offer, OfferId, TaskStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscribed {
    pub framework_id: FrameworkId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Offers {
    #[serde(default)]
    pub offers: Vec<Offer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rescind {
    pub offer_id: OfferId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Failure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
}

/// An incoming scheduler event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireEvent", try_from = "WireEvent")]
pub enum Event {
    Subscribed(Subscribed),
    Heartbeat,
    Offers(Offers),
    Update(Update),
    Rescind(Rescind),
    Failure(Failure),
    Error(ErrorEvent),
}

impl Event {
    /// Decodes one frame payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self, ProtoError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// The wire name of this event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Subscribed(_) => "SUBSCRIBED",
            Self::Heartbeat => "HEARTBEAT",
            Self::Offers(_) => "OFFERS",
            Self::Update(_) => "UPDATE",
            Self::Rescind(_) => "RESCIND",
            Self::Failure(_) => "FAILURE",
            Self::Error(_) => "ERROR",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subscribed: Option<Subscribed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    offers: Option<Offers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    update: Option<Update>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rescind: Option<Rescind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<Failure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorEvent>,
}

impl From<Event> for WireEvent {
    fn from(event: Event) -> Self {
        let mut wire = WireEvent {
            event_type: event.kind().to_string(),
            subscribed: None,
            offers: None,
            update: None,
            rescind: None,
            failure: None,
            error: None,
        };

        match event {
            Event::Subscribed(p) => wire.subscribed = Some(p),
            Event::Heartbeat => {}
            Event::Offers(p) => wire.offers = Some(p),
            Event::Update(p) => wire.update = Some(p),
            Event::Rescind(p) => wire.rescind = Some(p),
            Event::Failure(p) => wire.failure = Some(p),
            Event::Error(p) => wire.error = Some(p),
        }

        wire
    }
}

fn required<T>(payload: Option<T>, value: &str, field: &'static str) -> Result<T, ProtoError> {
    payload.ok_or_else(|| ProtoError::MissingPayload {
        kind: "event",
        value: value.to_string(),
        field,
    })
}

impl TryFrom<WireEvent> for Event {
    type Error = ProtoError;

    fn try_from(wire: WireEvent) -> Result<Self, ProtoError> {
        let ty = wire.event_type.as_str();
        match ty {
            "SUBSCRIBED" => Ok(Event::Subscribed(required(wire.subscribed, ty, "subscribed")?)),
            "HEARTBEAT" => Ok(Event::Heartbeat),
            "OFFERS" => Ok(Event::Offers(required(wire.offers, ty, "offers")?)),
            "UPDATE" => Ok(Event::Update(required(wire.update, ty, "update")?)),
            "RESCIND" => Ok(Event::Rescind(required(wire.rescind, ty, "rescind")?)),
            "FAILURE" => Ok(Event::Failure(wire.failure.unwrap_or_default())),
            "ERROR" => Ok(Event::Error(required(wire.error, ty, "error")?)),
            other => Err(ProtoError::UnknownType {
                kind: "event",
                value: other.to_string(),
            }),
        }
    }
}
