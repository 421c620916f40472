//! Integration tests against a fake resource manager.
//!
//! wiremock plays the scheduler endpoint: SUBSCRIBE is answered with a
//! RecordIO body, every other call with `202 Accepted`.


use std::sync::Arc;

use corral_proto::{AgentId, Call, CallType, FrameworkId, TaskId, TaskState};
use corral_scheduler::client::{CallError, CallSender, SchedulerClient, STREAM_ID_HEADER};
use corral_scheduler::dispatcher::{ConnectionState, Disconnect, Dispatcher};
use corral_scheduler::engine::Engine;
use corral_scheduler::offers::{OfferPolicy, TaskResources};
use corral_scheduler::queue::command_queue;
use corral_scheduler::scheduler::{Scheduler, SessionError};
use corral_scheduler::state::StateStore;
use harness::{encode_events, engine_in, framework_defaults, heartbeat, subscribed, update};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SCHEDULER_PATH: &str = "/api/v1/scheduler";

fn endpoint(server: &MockServer) -> String {
    format!("{}{}", server.uri(), SCHEDULER_PATH)
}

async fn received_calls(server: &MockServer) -> Vec<(Value, Option<String>)> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|request| {
            let stream_id = request
                .headers
                .get(STREAM_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            (request.body_json::<Value>().unwrap(), stream_id)
        })
        .collect()
}

fn scheduler_for(server: &MockServer, engine: Arc<Engine>) -> Scheduler {
    let client = Arc::new(SchedulerClient::new(endpoint(server), Arc::clone(&engine)).unwrap());
    let sender: Arc<dyn CallSender> = client.clone();
    let (_commands, pending) = command_queue(4);
    let dispatcher = Dispatcher::new(
        Arc::clone(&engine),
        sender,
        OfferPolicy::new(pending, TaskResources::default()),
    );
    Scheduler::new(engine, client, dispatcher)
}

// =============================================================================
// Call sender
// =============================================================================

#[tokio::test]
async fn test_call_is_stamped_with_session_and_framework() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SCHEDULER_PATH))
        .and(header("content-type", "application/json"))
        .and(header(STREAM_ID_HEADER, "stream-1"))
        .and(body_partial_json(json!({
            "type": "ACKNOWLEDGE",
            "framework_id": {"value": "fw-1"}
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let engine = engine_in(dir.path());
    engine.assign_framework_id(FrameworkId::new("fw-1")).await;
    engine.set_stream_id(Some("stream-1".to_string())).await;
    let client = SchedulerClient::new(endpoint(&server), engine).unwrap();

    client
        .send(Call::acknowledge(
            AgentId::new("agent-1"),
            TaskId::new("1"),
            "dXVpZA==",
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_non_accepted_status_is_rejected_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SCHEDULER_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("Framework is not subscribed"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let client = SchedulerClient::new(endpoint(&server), engine_in(dir.path())).unwrap();

    let err = client
        .send(Call::kill(TaskId::new("1"), None))
        .await
        .unwrap_err();

    let CallError::Rejected {
        call_type,
        status,
        body,
    } = err
    else {
        panic!("expected Rejected, got {err:?}");
    };
    assert_eq!(call_type, CallType::Kill);
    assert_eq!(status, 400);
    assert_eq!(body, "Framework is not subscribed");
}

#[tokio::test]
async fn test_ok_is_not_accepted_for_plain_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let client = SchedulerClient::new(endpoint(&server), engine_in(dir.path())).unwrap();

    let err = client.send(Call::reconcile(vec![])).await.unwrap_err();
    assert!(matches!(err, CallError::Rejected { status: 200, .. }));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_a_transport_error() {
    let dir = TempDir::new().unwrap();
    let client =
        SchedulerClient::new("http://127.0.0.1:1/api/v1/scheduler", engine_in(dir.path())).unwrap();

    let err = client.send(Call::reconcile(vec![])).await.unwrap_err();
    assert!(matches!(err, CallError::Transport { call_type: CallType::Reconcile, .. }));
}

// =============================================================================
// Subscription
// =============================================================================

#[tokio::test]
async fn test_subscribe_returns_stream_id_and_frames() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"type": "SUBSCRIBE"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(STREAM_ID_HEADER, "stream-1")
                .set_body_bytes(encode_events(&[subscribed("fw-1"), heartbeat()])),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let client = SchedulerClient::new(endpoint(&server), engine_in(dir.path())).unwrap();

    let mut subscription = client
        .subscribe(Call::subscribe(framework_defaults()))
        .await
        .unwrap();

    assert_eq!(subscription.stream_id.as_deref(), Some("stream-1"));
    let first = subscription.frames.next_frame().await.unwrap().unwrap();
    let second = subscription.frames.next_frame().await.unwrap().unwrap();
    assert_eq!(serde_json::from_slice::<Value>(&first).unwrap(), subscribed("fw-1"));
    assert_eq!(serde_json::from_slice::<Value>(&second).unwrap(), heartbeat());
    assert!(subscription.frames.next_frame().await.unwrap().is_none());
}

#[tokio::test]
async fn test_full_session_against_fake_resource_manager() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"type": "SUBSCRIBE"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(STREAM_ID_HEADER, "stream-1")
                .set_body_bytes(encode_events(&[
                    subscribed("fw-1"),
                    heartbeat(),
                    update("1", "TASK_RUNNING", Some("dXVpZC0x")),
                ])),
        )
        .mount(&server)
        .await;
    for call_type in ["RECONCILE", "ACKNOWLEDGE"] {
        Mock::given(method("POST"))
            .and(header(STREAM_ID_HEADER, "stream-1"))
            .and(body_partial_json(json!({"type": call_type})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let engine = engine_in(dir.path());
    let mut scheduler = scheduler_for(&server, Arc::clone(&engine));

    let ended = scheduler.run_session().await;

    assert!(ended.was_subscribed());
    assert!(matches!(
        ended,
        SessionError::Disconnected {
            reason: Disconnect::EndOfStream,
            ..
        }
    ));
    assert_eq!(scheduler.state(), ConnectionState::Disconnected);
    assert_eq!(engine.stream_id().await, None);

    let calls = received_calls(&server).await;
    let types: Vec<&str> = calls
        .iter()
        .map(|(body, _)| body["type"].as_str().unwrap())
        .collect();
    assert_eq!(types, vec!["SUBSCRIBE", "RECONCILE", "ACKNOWLEDGE"]);

    // The first registration carries no framework id.
    assert!(calls[0].0.get("framework_id").is_none());
    assert!(calls[0].1.is_none());
    for (body, stream_id) in &calls[1..] {
        assert_eq!(body["framework_id"], json!({"value": "fw-1"}));
        assert_eq!(stream_id.as_deref(), Some("stream-1"));
    }
    assert_eq!(calls[2].0["acknowledge"]["uuid"], "dXVpZC0x");

    let store = StateStore::new(dir.path());
    assert_eq!(
        store.load_framework().unwrap().unwrap().id,
        Some(FrameworkId::new("fw-1"))
    );
    assert_eq!(store.load_tasks().unwrap()["1"].state, TaskState::TaskRunning);
}

#[tokio::test]
async fn test_restart_reregisters_with_persisted_framework_id() {
    let dir = TempDir::new().unwrap();
    let mut persisted = framework_defaults();
    persisted.id = Some(FrameworkId::new("fw-7"));
    StateStore::new(dir.path()).save_framework(&persisted).unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "type": "SUBSCRIBE",
            "framework_id": {"value": "fw-7"},
            "subscribe": {"framework_info": {"id": {"value": "fw-7"}}}
        })))
        .respond_with(ResponseTemplate::new(503).set_body_string("Master is not the leader"))
        .expect(2)
        .mount(&server)
        .await;

    let engine = engine_in(dir.path());
    let mut scheduler = scheduler_for(&server, engine);

    for _ in 0..2 {
        let ended = scheduler.run_session().await;
        assert!(!ended.was_subscribed());
        assert!(matches!(
            ended,
            SessionError::Subscribe(CallError::Rejected { status: 503, .. })
        ));
        assert_eq!(scheduler.state(), ConnectionState::Disconnected);
    }
}
