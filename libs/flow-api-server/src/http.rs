use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;

use flow_api::util::rfc3339_from_ms;
use flow_api::{
    now_ms, CommandAck, OutputsQuery, OutputsResponse, SendMessageRequest,
    StartMonitoringRequest, TopicList, DEFAULT_OUTPUTS_LIMIT,
};

use super::AppState;

/// Optional JSON body: empty → `T::default()`, malformed → 400.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(CommandAck::failed(format!("invalid body: {e}"))),
        )
            .into_response()
    })
}

// ═══════════════════════════════════════════════════════════════
//  GET /api/kafka/topics
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_list_topics(State(state): State<AppState>) -> impl IntoResponse {
    let topics = state.admin.get_all_topics().await;
    let flow_topics = state.admin.get_flow_topics().await;
    Json(TopicList { success: true, topics, flow_topics })
}

// ═══════════════════════════════════════════════════════════════
//  POST /api/kafka/messages/send
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_send_message(State(state): State<AppState>, body: Bytes) -> Response {
    let req: SendMessageRequest = match parse_body(&body) {
        Ok(req) => req,
        Err(rejection) => return rejection,
    };
    let send = match req.validate() {
        Ok(send) => send,
        Err(msg) => {
            tracing::debug!(reason = msg, "send rejected");
            return (StatusCode::BAD_REQUEST, Json(CommandAck::failed(msg))).into_response();
        }
    };

    let success = state.producer.send(send.topic, send.message, send.key).await;
    let ack = CommandAck {
        success,
        message: Some(
            (if success { "Message sent successfully" } else { "Failed to send message" }).to_string(),
        ),
        error: None,
    };
    Json(ack).into_response()
}

// ═══════════════════════════════════════════════════════════════
//  Monitoring lifecycle
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_start_monitoring(State(state): State<AppState>, body: Bytes) -> Response {
    let req: StartMonitoringRequest = match parse_body(&body) {
        Ok(req) => req,
        Err(rejection) => return rejection,
    };
    match state.monitor.start(req.org_usr_node.as_deref()).await {
        Ok(()) => Json(CommandAck::ok("Monitoring started successfully")).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "start monitoring failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(CommandAck::failed(e.to_string()))).into_response()
        }
    }
}

pub(crate) async fn handle_stop_monitoring(State(state): State<AppState>) -> impl IntoResponse {
    state.monitor.stop().await;
    Json(CommandAck::ok("Monitoring stopped successfully"))
}

pub(crate) async fn handle_monitoring_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.status().await)
}

pub(crate) async fn handle_topic_statistics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.topic_statistics().await)
}

// ═══════════════════════════════════════════════════════════════
//  Outputs
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_clear_outputs(State(state): State<AppState>) -> impl IntoResponse {
    state.monitor.clear_outputs().await;
    Json(CommandAck::ok("Outputs cleared successfully"))
}

/// `?orgUsrNode=` wins over `?topic=`; `?limit=` only without a filter.
pub(crate) async fn handle_get_outputs(
    State(state): State<AppState>,
    Query(query): Query<OutputsQuery>,
) -> impl IntoResponse {
    let node = query.org_usr_node.filter(|s| !s.is_empty());
    let topic = query.topic.filter(|s| !s.is_empty());

    let outputs = match (node, topic) {
        (Some(node), _) => state.monitor.outputs_for_org_usr_node(&node).await,
        (None, Some(topic)) => state.monitor.outputs_from_topic(&topic).await,
        (None, None) => {
            let limit = query.limit.unwrap_or(DEFAULT_OUTPUTS_LIMIT);
            state.monitor.latest_outputs(limit).await
        }
    };
    Json(OutputsResponse { success: true, outputs })
}

// ═══════════════════════════════════════════════════════════════
//  GET /api/env, GET /health
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_env(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.env.clone())
}

/// `kafka` reports the process, not broker reachability.
pub(crate) async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let clients = state.hub.subscriber_count().await;
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": rfc3339_from_ms(now_ms()),
        "services": {
            "kafka": "connected",
            "websocket": format!("{clients} clients connected"),
        },
    }))
}
