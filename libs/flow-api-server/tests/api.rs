use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use broker_memory::MemoryBroker;
use flow_api::{BrokerConsumer, BrokerProducer, BrokerSubscription, EnvInfo, MonitorEvent, OverflowPolicy};
use flow_api_server::AppState;
use flow_engine::{
    AdminGateway, BroadcastHub, MonitorConfig, OutputMonitor, ProducerGateway,
};

const TOPIC: &str = "acme-alice-intake-topic";

struct Harness {
    broker: Arc<MemoryBroker>,
    monitor: Arc<OutputMonitor>,
    hub: Arc<BroadcastHub>,
    state: AppState,
}

fn harness() -> Harness {
    let broker = Arc::new(MemoryBroker::default());
    let hub = Arc::new(BroadcastHub::new(1024, OverflowPolicy::Disconnect));
    let admin = AdminGateway::new(broker.clone());
    let monitor = Arc::new(OutputMonitor::new(
        admin.clone(),
        broker.clone(),
        hub.clone(),
        MonitorConfig {
            resubscribe_delay: Duration::from_millis(20),
            ..MonitorConfig::default()
        },
    ));
    let state = AppState::new(
        monitor.clone(),
        hub.clone(),
        ProducerGateway::new(broker.clone()),
        admin,
        EnvInfo { org_name: "acme".into(), user_name: "alice".into() },
    );
    Harness { broker, monitor, hub, state }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn wait_for_outputs(monitor: &OutputMonitor, n: usize) {
    for _ in 0..300 {
        if monitor.status().await.total_outputs >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {n} outputs");
}

#[tokio::test]
async fn list_topics_splits_flow_topics() {
    let h = harness();
    h.broker.create_topic(TOPIC).await;
    h.broker.create_topic("__consumer_offsets").await;
    let app = flow_api_server::router(h.state);

    let (status, body) = call(&app, "GET", "/api/kafka/topics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["topics"].as_array().unwrap().len(), 2);
    assert_eq!(body["flowTopics"], json!([TOPIC]));
}

#[tokio::test]
async fn send_requires_topic_and_message() {
    let h = harness();
    let app = flow_api_server::router(h.state);

    let (status, body) = call(&app, "POST", "/api/kafka/messages/send", Some(json!({"topic": TOPIC}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = call(&app, "POST", "/api/kafka/messages/send", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn send_publishes_and_reports_failure() {
    let h = harness();
    let mut sub = h.broker.subscribe(&[TOPIC.to_string()]).await.unwrap();
    let app = flow_api_server::router(h.state);

    let message = json!({"type": "workflow_execution", "workflowName": "intake"});
    let (status, body) = call(
        &app,
        "POST",
        "/api/kafka/messages/send",
        Some(json!({"topic": TOPIC, "message": message, "key": null})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let record = sub.recv().await.unwrap().unwrap();
    let sent: Value = serde_json::from_slice(record.payload.as_deref().unwrap()).unwrap();
    assert_eq!(sent, message);

    h.broker.set_fail_publish(true);
    let (status, body) = call(
        &app,
        "POST",
        "/api/kafka/messages/send",
        Some(json!({"topic": TOPIC, "message": "hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn monitoring_lifecycle_over_http() {
    let h = harness();
    let app = flow_api_server::router(h.state);

    let (status, body) = call(
        &app,
        "POST",
        "/api/kafka/monitoring/start",
        Some(json!({"orgUsrNode": "acme-alice-intake"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, body) = call(&app, "GET", "/api/kafka/monitoring/status", None).await;
    assert_eq!(body["active"], true);
    assert_eq!(body["subscribedTopics"], json!([TOPIC]));
    assert_eq!(body["totalOutputs"], 0);

    let (_, body) = call(&app, "POST", "/api/kafka/monitoring/stop", None).await;
    assert_eq!(body["success"], true);
    let (_, body) = call(&app, "GET", "/api/kafka/monitoring/status", None).await;
    assert_eq!(body["active"], false);

    // empty body → all flow topics
    let (status, _) = call(&app, "POST", "/api/kafka/monitoring/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(h.monitor.is_active().await);
}

#[tokio::test]
async fn outputs_filters_and_clear() {
    let h = harness();
    let app = flow_api_server::router(h.state);
    h.broker.create_topic("acme-alice-intake-topic").await;
    h.broker.create_topic("acme-bob-intake-topic").await;
    h.monitor.start(None).await.unwrap();

    h.broker.publish("acme-alice-intake-topic", None, b"{\"n\":1}").await.unwrap();
    h.broker.publish("acme-bob-intake-topic", None, b"{\"n\":2}").await.unwrap();
    h.broker.publish("acme-alice-intake-topic", None, b"{\"n\":3}").await.unwrap();
    wait_for_outputs(&h.monitor, 3).await;

    let (_, body) = call(&app, "GET", "/api/kafka/outputs?orgUsrNode=alice", None).await;
    let ns: Vec<i64> = body["outputs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["data"]["n"].as_i64().unwrap())
        .collect();
    assert_eq!(ns, vec![3, 1]);

    let (_, body) = call(&app, "GET", "/api/kafka/outputs?topic=acme-bob-intake-topic&limit=0", None).await;
    assert_eq!(body["outputs"].as_array().unwrap().len(), 1);

    let (_, body) = call(&app, "GET", "/api/kafka/outputs?limit=2", None).await;
    assert_eq!(body["outputs"].as_array().unwrap().len(), 2);
    assert_eq!(body["outputs"][0]["orgUsrNode"], "acme-alice-intake");

    let (_, body) = call(&app, "GET", "/api/kafka/statistics", None).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, body) = call(&app, "POST", "/api/kafka/outputs/clear", None).await;
    assert_eq!(body["success"], true);
    let (_, body) = call(&app, "GET", "/api/kafka/outputs", None).await;
    assert!(body["outputs"].as_array().unwrap().is_empty());
    let (_, body) = call(&app, "GET", "/api/kafka/monitoring/status", None).await;
    assert_eq!(body["active"], true);
    assert_eq!(body["topicCount"], 0);
}

#[tokio::test]
async fn malformed_limit_still_answers() {
    let h = harness();
    let app = flow_api_server::router(h.state);
    h.broker.create_topic(TOPIC).await;
    h.monitor.start(None).await.unwrap();
    h.broker.publish(TOPIC, None, b"{\"n\":1}").await.unwrap();
    wait_for_outputs(&h.monitor, 1).await;

    for uri in ["/api/kafka/outputs?limit=-1", "/api/kafka/outputs?limit=abc"] {
        let (status, body) = call(&app, "GET", uri, None).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body["success"], true, "{uri}");
        assert!(body["outputs"].as_array().unwrap().is_empty(), "{uri}");
    }

    let (status, body) = call(&app, "GET", "/api/kafka/outputs?limit=", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outputs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn cross_origin_requests_are_allowed() {
    let h = harness();
    let app = flow_api_server::router(h.state);

    let request = Request::builder()
        .method("GET")
        .uri("/api/env")
        .header("origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("access-control-allow-origin"));

    let preflight = Request::builder()
        .method("OPTIONS")
        .uri("/api/kafka/messages/send")
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(preflight).await.unwrap();
    assert!(response.status().is_success());
    assert!(response.headers().contains_key("access-control-allow-origin"));
    assert!(response.headers().contains_key("access-control-allow-methods"));
}

#[tokio::test]
async fn env_and_health() {
    let h = harness();
    let app = flow_api_server::router(h.state);

    let (_, body) = call(&app, "GET", "/api/env", None).await;
    assert_eq!(body, json!({"ORG_NAME": "acme", "USER_NAME": "alice"}));

    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["services"]["websocket"], "0 clients connected");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn websocket_receives_pushed_events() {
    let h = harness();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(flow_api_server::serve(listener, h.state.clone(), shutdown.clone()));

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();
    for _ in 0..300 {
        if h.hub.subscriber_count().await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.hub.subscriber_count().await, 1);

    h.monitor.start(Some("acme-alice-intake")).await.unwrap();
    h.broker
        .publish(TOPIC, None, br#"{"type":"workflow_execution","workflowName":"intake"}"#)
        .await
        .unwrap();

    let mut kinds = Vec::new();
    while kinds.len() < 2 {
        let msg = tokio::time::timeout(Duration::from_secs(3), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
            let event: MonitorEvent = serde_json::from_str(text.as_str()).unwrap();
            if let MonitorEvent::FlowOutput(out) = &event {
                assert_eq!(out.topic, TOPIC);
                assert_eq!(out.data.get("workflowName").and_then(|v| v.as_str()), Some("intake"));
            }
            kinds.push(event.kind());
        }
    }
    assert_eq!(kinds, vec!["monitoring-started", "flow-output"]);

    drop(ws);
    for _ in 0..300 {
        if h.hub.subscriber_count().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.hub.subscriber_count().await, 0);

    shutdown.cancel();
    let _ = server.await;
}
