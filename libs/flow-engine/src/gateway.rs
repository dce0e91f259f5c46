use std::sync::Arc;

use flow_api::{flow_topic_for, is_flow_topic, BrokerAdmin, BrokerError, BrokerProducer};

// ═══════════════════════════════════════════════════════════════
//  ProducerGateway
// ═══════════════════════════════════════════════════════════════

/// Publish boundary: broker failures never escape, they become `false`.
#[derive(Clone)]
pub struct ProducerGateway {
    producer: Arc<dyn BrokerProducer>,
}

impl ProducerGateway {
    pub fn new(producer: Arc<dyn BrokerProducer>) -> Self {
        Self { producer }
    }

    /// `true` only once the broker has acknowledged the record.
    /// Strings go out verbatim, anything else as JSON text.
    pub async fn send(&self, topic: &str, message: &serde_json::Value, key: Option<&str>) -> bool {
        let payload = match message {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        match self.producer.publish(topic, key, payload.as_bytes()).await {
            Ok(()) => {
                tracing::debug!(topic, key = ?key, bytes = payload.len(), "message sent");
                true
            }
            Err(e) => {
                tracing::error!(topic, error = ?e, "send failed");
                false
            }
        }
    }

    pub async fn send_to_flow(&self, org_usr_node: &str, message: &serde_json::Value, key: Option<&str>) -> bool {
        self.send(&flow_topic_for(org_usr_node), message, key).await
    }
}

// ═══════════════════════════════════════════════════════════════
//  AdminGateway
// ═══════════════════════════════════════════════════════════════

/// Topic discovery.
#[derive(Clone)]
pub struct AdminGateway {
    admin: Arc<dyn BrokerAdmin>,
}

impl AdminGateway {
    pub fn new(admin: Arc<dyn BrokerAdmin>) -> Self {
        Self { admin }
    }

    /// Full catalogue, empty on failure.
    pub async fn get_all_topics(&self) -> Vec<String> {
        match self.admin.list_topics().await {
            Ok(topics) => topics,
            Err(e) => {
                tracing::error!(error = ?e, "list topics failed");
                Vec::new()
            }
        }
    }

    /// Flow topics only, sorted; empty on failure.
    pub async fn get_flow_topics(&self) -> Vec<String> {
        match self.try_flow_topics().await {
            Ok(topics) => topics,
            Err(e) => {
                tracing::error!(error = ?e, "list flow topics failed");
                Vec::new()
            }
        }
    }

    /// Like `get_flow_topics` but keeps the failure.
    pub async fn try_flow_topics(&self) -> Result<Vec<String>, BrokerError> {
        let mut topics: Vec<String> = self
            .admin
            .list_topics()
            .await?
            .into_iter()
            .filter(|t| is_flow_topic(t))
            .collect();
        topics.sort();
        topics.dedup();
        Ok(topics)
    }
}
