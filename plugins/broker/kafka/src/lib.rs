mod config;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rdkafka::consumer::{BaseConsumer, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};

use flow_api::{
    BrokerAdmin, BrokerConsumer, BrokerError, BrokerProducer, BrokerRecord, BrokerSubscription,
};

pub use config::KafkaConfig;

/// Connection-level failures are retryable; everything else is reported as is.
fn classify(context: &str, e: KafkaError) -> BrokerError {
    match e.rdkafka_error_code() {
        Some(RDKafkaErrorCode::BrokerTransportFailure | RDKafkaErrorCode::AllBrokersDown) => {
            BrokerError::transport(format!("{context}: {e}"))
        }
        _ => match e {
            KafkaError::ClientCreation(msg) => BrokerError::config(format!("{context}: {msg}")),
            KafkaError::Subscription(msg) => BrokerError::transport(format!("{context}: {msg}")),
            other => BrokerError::broker(format!("{context}: {other}")),
        },
    }
}

fn to_record(msg: &BorrowedMessage<'_>) -> BrokerRecord {
    BrokerRecord {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        timestamp_ms: msg.timestamp().to_millis(),
        key: msg.key().map(|k| String::from_utf8_lossy(k).into_owned()),
        payload: msg.payload().map(<[u8]>::to_vec),
    }
}

// ═══════════════════════════════════════════════════════════════
//  KafkaSubscription
// ═══════════════════════════════════════════════════════════════

/// Owns its consumer: dropping the subscription leaves the group.
pub struct KafkaSubscription {
    consumer: StreamConsumer,
}

impl BrokerSubscription for KafkaSubscription {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<BrokerRecord, BrokerError>>> + Send + '_>> {
        Box::pin(async move {
            let next = match self.consumer.recv().await {
                Ok(msg) => Ok(to_record(&msg)),
                Err(e) => Err(classify("consume", e)),
            };
            Some(next)
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  KafkaBroker
// ═══════════════════════════════════════════════════════════════

/// rdkafka-backed broker. One shared producer, one metadata client,
/// a fresh consumer per subscription.
pub struct KafkaBroker {
    config: KafkaConfig,
    producer: FutureProducer,
    metadata: Arc<BaseConsumer>,
}

impl KafkaBroker {
    /// Builds the clients; no connection is made until first use.
    pub fn new(config: KafkaConfig) -> Result<Self, BrokerError> {
        let producer: FutureProducer = config
            .producer_config()
            .create()
            .map_err(|e| classify("create producer", e))?;
        let metadata: BaseConsumer = config
            .admin_config()
            .create()
            .map_err(|e| classify("create metadata client", e))?;

        tracing::info!(brokers = %config.brokers, client_id = %config.client_id, "kafka clients created");
        Ok(Self { config, producer, metadata: Arc::new(metadata) })
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.request_timeout_ms)
    }
}

impl BrokerAdmin for KafkaBroker {
    fn list_topics(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>, BrokerError>> + Send + '_>> {
        Box::pin(async move {
            let client = self.metadata.clone();
            let timeout = self.timeout();
            // fetch_metadata blocks the calling thread
            let metadata = tokio::task::spawn_blocking(move || client.fetch_metadata(None, timeout))
                .await
                .map_err(|e| BrokerError::broker(format!("metadata task: {e}")))?
                .map_err(|e| classify("fetch metadata", e))?;

            let topics: Vec<String> = metadata.topics().iter().map(|t| t.name().to_string()).collect();
            tracing::debug!(count = topics.len(), "kafka topics listed");
            Ok(topics)
        })
    }
}

impl BrokerProducer for KafkaBroker {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        key: Option<&'a str>,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            let mut record: FutureRecord<'_, str, [u8]> = FutureRecord::to(topic).payload(payload);
            if let Some(key) = key {
                record = record.key(key);
            }
            match self.producer.send(record, self.timeout()).await {
                Ok(_) => Ok(()),
                Err((e, _)) => Err(classify(&format!("publish to '{topic}'"), e)),
            }
        })
    }
}

impl BrokerConsumer for KafkaBroker {
    fn subscribe<'a>(
        &'a self,
        topics: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn BrokerSubscription>, BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            if topics.is_empty() {
                return Err(BrokerError::config("subscribe: empty topic list"));
            }
            let consumer: StreamConsumer = self
                .config
                .consumer_config()
                .create()
                .map_err(|e| classify("create consumer", e))?;

            let names: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer.subscribe(&names).map_err(|e| classify("subscribe", e))?;

            tracing::info!(group = %self.config.group_id, topics = ?topics, "kafka consumer subscribed");
            Ok(Box::new(KafkaSubscription { consumer }) as Box<dyn BrokerSubscription>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_api::ErrorKind;

    #[test]
    fn transport_codes_are_retryable() {
        let e = classify("consume", KafkaError::MessageConsumption(RDKafkaErrorCode::AllBrokersDown));
        assert_eq!(e.kind(), ErrorKind::Transport);

        let e = classify("consume", KafkaError::MessageConsumption(RDKafkaErrorCode::BrokerTransportFailure));
        assert!(e.is_transport());
    }

    #[test]
    fn creation_failures_are_config_errors() {
        let e = classify("create consumer", KafkaError::ClientCreation("bad option".into()));
        assert_eq!(e.kind(), ErrorKind::Config);
        assert!(e.message().contains("bad option"));
    }

    #[test]
    fn other_failures_are_broker_errors() {
        let e = classify("publish", KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge));
        assert_eq!(e.kind(), ErrorKind::Broker);
    }

    #[test]
    fn clients_build_without_a_cluster() {
        assert!(KafkaBroker::new(KafkaConfig::default()).is_ok());
    }
}
