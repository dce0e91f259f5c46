use serde::de::DeserializeOwned;
use serde::Serialize;

use flow_api::{
    CommandAck, FlowOutput, MonitoringStatus, OutputsQuery, OutputsResponse, SendMessageRequest,
    StartMonitoringRequest, TopicList, TopicStatistic,
};

use crate::error::ClientError;

/// Request/response channel to the bridge's `/api/kafka` surface.
#[derive(Debug, Clone)]
pub struct CommandClient {
    http: reqwest::Client,
    base_url: String,
}

impl CommandClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http: reqwest::Client::new(), base_url }
    }

    pub async fn fetch_topics(&self) -> Result<TopicList, ClientError> {
        self.get("/api/kafka/topics").await
    }

    pub async fn send_message(
        &self,
        topic: &str,
        message: &serde_json::Value,
        key: Option<&str>,
    ) -> Result<CommandAck, ClientError> {
        let body = SendMessageRequest {
            topic: Some(topic.to_string()),
            message: Some(message.clone()),
            key: key.map(str::to_string),
        };
        self.post("/api/kafka/messages/send", &body).await
    }

    pub async fn start_monitoring(&self, org_usr_node: Option<&str>) -> Result<CommandAck, ClientError> {
        let body = StartMonitoringRequest { org_usr_node: org_usr_node.map(str::to_string) };
        self.post("/api/kafka/monitoring/start", &body).await
    }

    pub async fn stop_monitoring(&self) -> Result<CommandAck, ClientError> {
        self.post("/api/kafka/monitoring/stop", &serde_json::json!({})).await
    }

    pub async fn monitoring_status(&self) -> Result<MonitoringStatus, ClientError> {
        self.get("/api/kafka/monitoring/status").await
    }

    pub async fn topic_statistics(&self) -> Result<Vec<TopicStatistic>, ClientError> {
        self.get("/api/kafka/statistics").await
    }

    pub async fn clear_outputs(&self) -> Result<CommandAck, ClientError> {
        self.post("/api/kafka/outputs/clear", &serde_json::json!({})).await
    }

    pub async fn outputs(&self, query: &OutputsQuery) -> Result<Vec<FlowOutput>, ClientError> {
        let url = format!("{}/api/kafka/outputs", self.base_url);
        let resp = self.http.get(&url).query(query).send().await?;
        let body: OutputsResponse = read_json(resp).await?;
        Ok(body.outputs)
    }

    // ═══════════════════════════════════════════════════════════════
    //  HTTP helpers
    // ═══════════════════════════════════════════════════════════════

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, ClientError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self.http.get(&url).send().await?;
        read_json(resp).await
    }

    async fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, ClientError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self.http.post(&url).json(body).send().await?;
        read_json(resp).await
    }
}

async fn read_json<R: DeserializeOwned>(resp: reqwest::Response) -> Result<R, ClientError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(ClientError::Status { status: status.as_u16(), body });
    }
    Ok(serde_json::from_str(&body)?)
}
