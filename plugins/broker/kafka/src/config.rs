use rdkafka::config::ClientConfig;
use serde::Deserialize;

/// `[kafka]` section of the server config.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct KafkaConfig {
    /// Comma-separated `host:port` list.
    pub brokers: String,
    pub client_id: String,
    /// Consumer group of the output monitor.
    pub group_id: String,
    /// `earliest` or `latest`.
    pub auto_offset_reset: String,
    pub request_timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".into(),
            client_id: "flow-bridge".into(),
            group_id: "flow-bridge-monitor".into(),
            auto_offset_reset: "latest".into(),
            request_timeout_ms: 30_000,
        }
    }
}

impl KafkaConfig {
    fn base(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("client.id", &self.client_id)
            .set("socket.timeout.ms", self.request_timeout_ms.to_string());
        config
    }

    pub(crate) fn producer_config(&self) -> ClientConfig {
        let mut config = self.base();
        config.set("message.timeout.ms", self.request_timeout_ms.to_string());
        config
    }

    pub(crate) fn consumer_config(&self) -> ClientConfig {
        let mut config = self.base();
        config
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", &self.auto_offset_reset);
        config
    }

    /// Metadata-only client: separate group, never commits.
    pub(crate) fn admin_config(&self) -> ClientConfig {
        let mut config = self.base();
        config
            .set("group.id", format!("{}-admin", self.group_id))
            .set("enable.auto.commit", "false");
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_section_keeps_defaults() {
        let cfg: KafkaConfig = toml::from_str(r#"brokers = "kafka-1:9092,kafka-2:9092""#).unwrap();
        assert_eq!(cfg.brokers, "kafka-1:9092,kafka-2:9092");
        assert_eq!(cfg.group_id, "flow-bridge-monitor");
        assert_eq!(cfg.request_timeout_ms, 30_000);
    }

    #[test]
    fn client_configs_carry_group_and_offsets() {
        let cfg = KafkaConfig {
            group_id: "ui".into(),
            auto_offset_reset: "earliest".into(),
            ..KafkaConfig::default()
        };

        let consumer = cfg.consumer_config();
        assert_eq!(consumer.get("bootstrap.servers"), Some("localhost:9092"));
        assert_eq!(consumer.get("group.id"), Some("ui"));
        assert_eq!(consumer.get("auto.offset.reset"), Some("earliest"));

        assert_eq!(cfg.admin_config().get("group.id"), Some("ui-admin"));
        assert_eq!(cfg.producer_config().get("message.timeout.ms"), Some("30000"));
        assert_eq!(cfg.producer_config().get("group.id"), None);
    }
}
