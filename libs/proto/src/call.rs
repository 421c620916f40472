//! Calls sent by the scheduler to the resource manager.

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;
use crate::types::{AgentId, Filters, FrameworkId, FrameworkInfo, OfferId, TaskId, TaskInfo};

// =============================================================================
// Call Kinds
// =============================================================================

/// The kind of an outgoing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallType {
    Subscribe,
    Accept,
    Decline,
    Reconcile,
    Acknowledge,
    Kill,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "SUBSCRIBE",
            Self::Accept => "ACCEPT",
            Self::Decline => "DECLINE",
            Self::Reconcile => "RECONCILE",
            Self::Acknowledge => "ACKNOWLEDGE",
            Self::Kill => "KILL",
        }
    }
}

impl std::fmt::Display for CallType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscribe {
    pub framework_info: FrameworkInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accept {
    pub offer_ids: Vec<OfferId>,
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decline {
    pub offer_ids: Vec<OfferId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileTask {
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Reconcile {
    #[serde(default)]
    pub tasks: Vec<ReconcileTask>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledge {
    pub agent_id: AgentId,
    pub task_id: TaskId,
    pub uuid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kill {
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
}

/// Offer operation kind. Only task launches are issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Launch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Launch {
    pub task_infos: Vec<TaskInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch: Option<Launch>,
}

impl Operation {
    /// A LAUNCH operation for the given tasks.
    pub fn launch(task_infos: Vec<TaskInfo>) -> Self {
        Self {
            operation_type: OperationType::Launch,
            launch: Some(Launch { task_infos }),
        }
    }
}

/// Kind-specific payload of a call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallKind {
    Subscribe(Subscribe),
    Accept(Accept),
    Decline(Decline),
    Reconcile(Reconcile),
    Acknowledge(Acknowledge),
    Kill(Kill),
}

impl CallKind {
    pub fn call_type(&self) -> CallType {
        match self {
            Self::Subscribe(_) => CallType::Subscribe,
            Self::Accept(_) => CallType::Accept,
            Self::Decline(_) => CallType::Decline,
            Self::Reconcile(_) => CallType::Reconcile,
            Self::Acknowledge(_) => CallType::Acknowledge,
            Self::Kill(_) => CallType::Kill,
        }
    }
}

// =============================================================================
// Call
// =============================================================================

/// An outgoing scheduler call.
///
/// `framework_id` is stamped by the sender just before the call goes out;
/// constructors leave it unset except for SUBSCRIBE, which carries the id of
/// a previously registered framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireCall", try_from = "WireCall")]
pub struct Call {
    pub framework_id: Option<FrameworkId>,
    pub kind: CallKind,
}

impl Call {
    fn new(kind: CallKind) -> Self {
        Self {
            framework_id: None,
            kind,
        }
    }

    pub fn subscribe(framework_info: FrameworkInfo) -> Self {
        Self {
            framework_id: framework_info.id.clone(),
            kind: CallKind::Subscribe(Subscribe { framework_info }),
        }
    }

    pub fn accept(offer_ids: Vec<OfferId>, operations: Vec<Operation>) -> Self {
        Self::new(CallKind::Accept(Accept {
            offer_ids,
            operations,
            filters: None,
        }))
    }

    pub fn decline(offer_ids: Vec<OfferId>, filters: Option<Filters>) -> Self {
        Self::new(CallKind::Decline(Decline { offer_ids, filters }))
    }

    pub fn reconcile(tasks: Vec<ReconcileTask>) -> Self {
        Self::new(CallKind::Reconcile(Reconcile { tasks }))
    }

    pub fn acknowledge(agent_id: AgentId, task_id: TaskId, uuid: impl Into<String>) -> Self {
        Self::new(CallKind::Acknowledge(Acknowledge {
            agent_id,
            task_id,
            uuid: uuid.into(),
        }))
    }

    pub fn kill(task_id: TaskId, agent_id: Option<AgentId>) -> Self {
        Self::new(CallKind::Kill(Kill { task_id, agent_id }))
    }

    /// Returns the call with `framework_id` replaced.
    #[must_use]
    pub fn with_framework_id(mut self, framework_id: Option<FrameworkId>) -> Self {
        self.framework_id = framework_id;
        self
    }

    pub fn call_type(&self) -> CallType {
        self.kind.call_type()
    }

    /// Serializes the call to its JSON wire form.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        Ok(serde_json::to_string(self)?)
    }
}

// =============================================================================
// Wire Form
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct WireCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    framework_id: Option<FrameworkId>,
    #[serde(rename = "type")]
    call_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subscribe: Option<Subscribe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    accept: Option<Accept>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    decline: Option<Decline>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reconcile: Option<Reconcile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    acknowledge: Option<Acknowledge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kill: Option<Kill>,
}

impl From<Call> for WireCall {
    fn from(call: Call) -> Self {
        let mut wire = WireCall {
            framework_id: call.framework_id,
            call_type: call.kind.call_type().as_str().to_string(),
            subscribe: None,
            accept: None,
            decline: None,
            reconcile: None,
            acknowledge: None,
            kill: None,
        };

        match call.kind {
            CallKind::Subscribe(p) => wire.subscribe = Some(p),
            CallKind::Accept(p) => wire.accept = Some(p),
            CallKind::Decline(p) => wire.decline = Some(p),
            CallKind::Reconcile(p) => wire.reconcile = Some(p),
            CallKind::Acknowledge(p) => wire.acknowledge = Some(p),
            CallKind::Kill(p) => wire.kill = Some(p),
        }

        wire
    }
}

fn required<T>(payload: Option<T>, value: &str, field: &'static str) -> Result<T, ProtoError> {
    payload.ok_or_else(|| ProtoError::MissingPayload {
        kind: "call",
        value: value.to_string(),
        field,
    })
}

impl TryFrom<WireCall> for Call {
    type Error = ProtoError;

    fn try_from(wire: WireCall) -> Result<Self, Self::Error> {
        let ty = wire.call_type.as_str();
        let kind = match ty {
            "SUBSCRIBE" => CallKind::Subscribe(required(wire.subscribe, ty, "subscribe")?),
            "ACCEPT" => CallKind::Accept(required(wire.accept, ty, "accept")?),
            "DECLINE" => CallKind::Decline(required(wire.decline, ty, "decline")?),
            // An empty reconcile payload is meaningful (implicit reconciliation).
            "RECONCILE" => CallKind::Reconcile(wire.reconcile.unwrap_or_default()),
            "ACKNOWLEDGE" => CallKind::Acknowledge(required(wire.acknowledge, ty, "acknowledge")?),
            "KILL" => CallKind::Kill(required(wire.kill, ty, "kill")?),
            other => {
                return Err(ProtoError::UnknownType {
                    kind: "call",
                    value: other.to_string(),
                })
            }
        };

        Ok(Call {
            framework_id: wire.framework_id,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CommandInfo, Resource};
    use serde_json::json;

    #[test]
    fn test_accept_wire_shape() {
        let task = TaskInfo {
            name: "echo hi".to_string(),
            task_id: TaskId::new("1"),
            agent_id: AgentId::new("agent-1"),
            resources: vec![Resource::scalar("cpus", 0.1)],
            command: Some(CommandInfo::shell("echo hi")),
        };
        let call = Call::accept(vec![OfferId::new("o-1")], vec![Operation::launch(vec![task])])
            .with_framework_id(Some(FrameworkId::new("fw-1")));

        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value["type"], "ACCEPT");
        assert_eq!(value["framework_id"], json!({"value": "fw-1"}));
        assert_eq!(value["accept"]["offer_ids"], json!([{"value": "o-1"}]));
        assert_eq!(value["accept"]["operations"][0]["type"], "LAUNCH");

        let launched = &value["accept"]["operations"][0]["launch"]["task_infos"][0];
        assert_eq!(launched["task_id"], json!({"value": "1"}));
        assert_eq!(launched["command"], json!({"shell": true, "value": "echo hi"}));
        assert_eq!(launched["resources"][0]["type"], "SCALAR");
        assert!(value.get("decline").is_none());
    }

    #[test]
    fn test_subscribe_carries_existing_framework_id() {
        let info = FrameworkInfo {
            user: "root".to_string(),
            name: "simple_framework".to_string(),
            id: Some(FrameworkId::new("fw-7")),
            failover_timeout: None,
            checkpoint: None,
            hostname: None,
            webui_url: None,
        };

        let call = Call::subscribe(info);
        assert_eq!(call.framework_id, Some(FrameworkId::new("fw-7")));

        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value["type"], "SUBSCRIBE");
        assert_eq!(value["subscribe"]["framework_info"]["id"], json!({"value": "fw-7"}));
    }

    #[test]
    fn test_call_parses_back() {
        let call = Call::acknowledge(AgentId::new("a"), TaskId::new("5"), "dXVpZA==");
        let json = call.to_json().unwrap();
        let parsed: Call = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, call);
    }

    #[test]
    fn test_empty_reconcile_is_accepted() {
        let parsed: Call = serde_json::from_str(r#"{"type":"RECONCILE"}"#).unwrap();
        assert_eq!(parsed.kind, CallKind::Reconcile(Reconcile::default()));
    }

    #[test]
    fn test_unknown_call_type_is_rejected() {
        let err = serde_json::from_str::<Call>(r#"{"type":"TELEPORT"}"#).unwrap_err();
        assert!(err.to_string().contains("unknown call type: TELEPORT"));
    }
}
