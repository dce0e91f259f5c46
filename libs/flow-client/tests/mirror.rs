use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use broker_memory::MemoryBroker;
use flow_api::{EnvInfo, FlowData, OutputsQuery, OverflowPolicy};
use flow_api_server::AppState;
use flow_client::{ClientMirror, MirrorConfig, TransportState};
use flow_engine::{AdminGateway, BroadcastHub, MonitorConfig, OutputMonitor, ProducerGateway};

macro_rules! eventually {
    ($cond:expr) => {{
        let mut ok = false;
        for _ in 0..300 {
            if $cond {
                ok = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(ok, "condition not met: {}", stringify!($cond));
    }};
}

struct Bridge {
    base_url: String,
    hub: Arc<BroadcastHub>,
    monitor: Arc<OutputMonitor>,
    shutdown: CancellationToken,
}

async fn bridge() -> Bridge {
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
        ProducerGateway::new(broker),
        admin,
        EnvInfo { org_name: "acme".into(), user_name: "alice".into() },
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    tokio::spawn(flow_api_server::serve(listener, state, shutdown.clone()));

    Bridge { base_url: format!("http://{addr}"), hub, monitor, shutdown }
}

fn mirror_config(base_url: &str) -> MirrorConfig {
    MirrorConfig {
        reconnect_delay: Duration::from_millis(100),
        ..MirrorConfig::new(base_url)
    }
}

async fn wait_transport(mirror: &ClientMirror, want: TransportState) {
    let mut changes = mirror.transport_changes();
    tokio::time::timeout(Duration::from_secs(3), changes.wait_for(|s| *s == want))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn round_trip_through_bridge() {
    let bridge = bridge().await;
    let mirror = ClientMirror::connect(mirror_config(&bridge.base_url));
    wait_transport(&mirror, TransportState::Connected).await;
    eventually!(bridge.hub.subscriber_count().await == 1);

    assert!(mirror.start_monitoring(Some("acme-alice-intake")).await);
    eventually!(mirror.is_monitoring().await);

    let message = json!({"type": "workflow_execution", "workflowName": "intake"});
    assert!(mirror.send_to_flow_topic("acme-alice-intake", &message, None).await);
    eventually!(mirror.outputs_for_workflow("intake").await.len() == 1);

    let local = mirror.latest_outputs(10).await;
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].topic, "acme-alice-intake-topic");
    assert_eq!(local[0].data, FlowData::Structured(message.clone()));

    let remote = mirror
        .get_outputs(&OutputsQuery { org_usr_node: Some("alice".into()), ..OutputsQuery::default() })
        .await;
    assert_eq!(remote, local);

    let topics = mirror.fetch_topics().await.unwrap();
    assert_eq!(topics.flow_topics, vec!["acme-alice-intake-topic".to_string()]);

    let status = mirror.get_monitoring_status().await.unwrap();
    assert!(status.active);
    assert_eq!(status.total_outputs, 1);
    assert_eq!(mirror.get_topic_statistics().await[0].message_count, 1);

    assert!(mirror.clear_outputs().await);
    assert!(mirror.latest_outputs(10).await.is_empty());
    assert!(mirror.topic_stats().await.is_empty());
    assert!(mirror.is_monitoring().await);

    assert!(mirror.stop_monitoring().await);
    eventually!(!mirror.is_monitoring().await);
    assert!(!bridge.monitor.is_active().await);

    mirror.disconnect().await;
    bridge.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_send_is_not_acknowledged() {
    let bridge = bridge().await;
    let mirror = ClientMirror::connect(mirror_config(&bridge.base_url));

    assert!(!mirror.send_message("", &json!({"a": 1}), None).await);
    assert!(!mirror.send_message("acme-alice-intake-topic", &json!(""), None).await);

    mirror.disconnect().await;
    bridge.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconnects_after_channel_drop() {
    let bridge = bridge().await;
    let mirror = ClientMirror::connect(mirror_config(&bridge.base_url));
    wait_transport(&mirror, TransportState::Connected).await;
    eventually!(bridge.hub.subscriber_count().await == 1);

    // first subscriber id is 1; dropping it closes the socket server-side
    bridge.hub.unsubscribe(1).await;
    wait_transport(&mirror, TransportState::Disconnected).await;
    eventually!(mirror.reconnect_pending().await || mirror.is_connected());

    wait_transport(&mirror, TransportState::Connected).await;
    assert!(!mirror.reconnect_pending().await);
    assert!(mirror.connection_error().await.is_none());
    eventually!(bridge.hub.subscriber_count().await == 1);

    mirror.disconnect().await;
    assert_eq!(mirror.transport_state(), TransportState::Disconnected);
    eventually!(bridge.hub.subscriber_count().await == 0);
    bridge.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_bridge_keeps_one_timer() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mirror = ClientMirror::connect(MirrorConfig {
        reconnect_delay: Duration::from_secs(30),
        ..MirrorConfig::new(format!("http://{addr}"))
    });
    eventually!(mirror.connection_error().await.is_some());
    eventually!(mirror.reconnect_pending().await);
    assert!(!mirror.is_connected());

    assert!(mirror.fetch_topics().await.is_none());
    assert!(!mirror.stop_monitoring().await);

    mirror.disconnect().await;
    assert!(!mirror.reconnect_pending().await);
    assert_eq!(mirror.transport_state(), TransportState::Disconnected);
}
