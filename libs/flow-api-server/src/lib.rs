mod http;
mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use flow_api::EnvInfo;
use flow_engine::{AdminGateway, BroadcastHub, OutputMonitor, ProducerGateway};

/// Everything a request handler may touch. One instance per process.
#[derive(Clone)]
pub struct AppState {
    monitor: Arc<OutputMonitor>,
    hub: Arc<BroadcastHub>,
    producer: ProducerGateway,
    admin: AdminGateway,
    env: EnvInfo,
}

impl AppState {
    pub fn new(
        monitor: Arc<OutputMonitor>,
        hub: Arc<BroadcastHub>,
        producer: ProducerGateway,
        admin: AdminGateway,
        env: EnvInfo,
    ) -> Self {
        Self { monitor, hub, producer, admin, env }
    }
}

/// Command surface (`/api/kafka/...`), `/api/env`, `/health` and the `/ws` push channel.
/// Cross-origin calls are allowed from anywhere.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/kafka/topics", get(http::handle_list_topics))
        .route("/api/kafka/messages/send", post(http::handle_send_message))
        .route("/api/kafka/monitoring/start", post(http::handle_start_monitoring))
        .route("/api/kafka/monitoring/stop", post(http::handle_stop_monitoring))
        .route("/api/kafka/monitoring/status", get(http::handle_monitoring_status))
        .route("/api/kafka/statistics", get(http::handle_topic_statistics))
        .route("/api/kafka/outputs/clear", post(http::handle_clear_outputs))
        .route("/api/kafka/outputs", get(http::handle_get_outputs))
        .route("/api/env", get(http::handle_env))
        .route("/health", get(http::handle_health))
        .route("/ws", get(ws::handle_ws))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve on an already bound listener.
pub async fn serve(listener: TcpListener, state: AppState, shutdown: CancellationToken) -> Result<(), String> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| format!("axum serve: {e}"))
}
