//! Records shared by calls and events.

use serde::{Deserialize, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

define_value_id!(FrameworkId);
define_value_id!(AgentId);
define_value_id!(TaskId);
define_value_id!(OfferId);

// =============================================================================
// Framework
// =============================================================================

/// Framework registration info sent with SUBSCRIBE.
///
/// The `id` is empty until the resource manager assigns one; resubscribing
/// with the id set re-registers the same framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkInfo {
    pub user: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FrameworkId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover_timeout: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webui_url: Option<String>,
}

/// Offer filters attached to ACCEPT and DECLINE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Filters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refuse_seconds: Option<f64>,
}

// =============================================================================
// Resources
// =============================================================================

/// Resource value kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Scalar,
    Ranges,
    Set,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scalar {
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub begin: u64,
    pub end: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Ranges {
    #[serde(default)]
    pub range: Vec<Range>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Set {
    #[serde(default)]
    pub item: Vec<String>,
}

/// A named resource such as `cpus`, `mem` or `ports`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scalar: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranges: Option<Ranges>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<Set>,
}

impl Resource {
    /// Builds a scalar resource.
    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value_type: ValueType::Scalar,
            scalar: Some(Scalar { value }),
            ranges: None,
            set: None,
        }
    }
}

// =============================================================================
// Offers
// =============================================================================

/// A time-limited grant of resources on one agent.
///
/// Only `id` and `agent_id` are needed to accept or decline an offer, so the
/// other fields tolerate being absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<FrameworkId>,
    pub agent_id: AgentId,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

// =============================================================================
// Tasks
// =============================================================================

/// Command executed by the default executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl CommandInfo {
    /// A command run through `/bin/sh -c`.
    pub fn shell(value: impl Into<String>) -> Self {
        Self {
            shell: Some(true),
            value: Some(value.into()),
        }
    }
}

/// Description of a task to launch on an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub name: String,
    pub task_id: TaskId,
    pub agent_id: AgentId,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandInfo>,
}

/// Task lifecycle state as reported by the resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    TaskStaging,
    TaskStarting,
    TaskRunning,
    TaskKilling,
    TaskFinished,
    TaskFailed,
    TaskKilled,
    TaskError,
    TaskLost,
    TaskDropped,
    TaskUnreachable,
    TaskGone,
    TaskGoneByOperator,
    TaskUnknown,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskStaging => "TASK_STAGING",
            Self::TaskStarting => "TASK_STARTING",
            Self::TaskRunning => "TASK_RUNNING",
            Self::TaskKilling => "TASK_KILLING",
            Self::TaskFinished => "TASK_FINISHED",
            Self::TaskFailed => "TASK_FAILED",
            Self::TaskKilled => "TASK_KILLED",
            Self::TaskError => "TASK_ERROR",
            Self::TaskLost => "TASK_LOST",
            Self::TaskDropped => "TASK_DROPPED",
            Self::TaskUnreachable => "TASK_UNREACHABLE",
            Self::TaskGone => "TASK_GONE",
            Self::TaskGoneByOperator => "TASK_GONE_BY_OPERATOR",
            Self::TaskUnknown => "TASK_UNKNOWN",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last known status of a task.
///
/// `uuid` is the status update sequence token: an update that carries one
/// must be acknowledged with it, otherwise it is redelivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl TaskStatus {
    /// A locally recorded status for a task that was just launched.
    pub fn staging(task_id: TaskId, agent_id: AgentId) -> Self {
        Self {
            task_id,
            state: TaskState::TaskStaging,
            agent_id: Some(agent_id),
            uuid: None,
            message: None,
            source: None,
            reason: None,
            timestamp: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_id_wire_shape() {
        let id = TaskId::new("42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#"{"value":"42"}"#);

        let parsed: AgentId = serde_json::from_str(r#"{"value":"agent-1"}"#).unwrap();
        assert_eq!(parsed.value(), "agent-1");
    }

    #[test]
    fn test_task_state_names() {
        let json = serde_json::to_string(&TaskState::TaskGoneByOperator).unwrap();
        assert_eq!(json, "\"TASK_GONE_BY_OPERATOR\"");

        let state: TaskState = serde_json::from_str("\"TASK_RUNNING\"").unwrap();
        assert_eq!(state, TaskState::TaskRunning);
        assert_eq!(state.to_string(), "TASK_RUNNING");
    }

    #[test]
    fn test_offer_tolerates_unmodelled_fields() {
        let json = r#"{
            "id": {"value": "offer-1"},
            "framework_id": {"value": "fw-1"},
            "agent_id": {"value": "agent-1"},
            "hostname": "node-a",
            "url": {"scheme": "http"},
            "resources": [
                {"name": "cpus", "type": "SCALAR", "scalar": {"value": 4.0}, "role": "*"},
                {"name": "ports", "type": "RANGES", "ranges": {"range": [{"begin": 31000, "end": 32000}]}}
            ]
        }"#;

        let offer: Offer = serde_json::from_str(json).unwrap();
        assert_eq!(offer.id.value(), "offer-1");
        assert_eq!(offer.resources.len(), 2);
        assert_eq!(offer.resources[0].scalar, Some(Scalar { value: 4.0 }));
        assert_eq!(offer.resources[1].ranges.as_ref().unwrap().range[0].end, 32000);
    }

    #[test]
    fn test_offer_without_hostname_or_framework_id() {
        let json = r#"{"id": {"value": "offer-2"}, "agent_id": {"value": "agent-2"}}"#;

        let offer: Offer = serde_json::from_str(json).unwrap();
        assert_eq!(offer.id.value(), "offer-2");
        assert_eq!(offer.framework_id, None);
        assert!(offer.hostname.is_empty());
        assert!(offer.resources.is_empty());
    }

    #[test]
    fn test_framework_info_omits_unset_id() {
        let info = FrameworkInfo {
            user: "root".to_string(),
            name: "simple_framework".to_string(),
            id: None,
            failover_timeout: Some(3600.0),
            checkpoint: Some(true),
            hostname: None,
            webui_url: None,
        };

        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("\"id\""));
        assert!(json.contains("\"failover_timeout\":3600.0"));
    }
}
