use std::future::Future;
use std::pin::Pin;

use crate::BrokerError;

// ════════════════════════════════════════════════════════════════
//  Broker Traits
// ════════════════════════════════════════════════════════════════

/// A record consumed from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Broker-reported timestamp (Unix ms), if any.
    pub timestamp_ms: Option<i64>,
    pub key: Option<String>,
    pub payload: Option<Vec<u8>>,
}

/// Topic catalogue of the broker cluster.
pub trait BrokerAdmin: Send + Sync {
    /// All topic names known to the cluster, broker-internal ones included.
    fn list_topics(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>, BrokerError>> + Send + '_>>;
}

/// Publishing side.
pub trait BrokerProducer: Send + Sync {
    /// Resolve only once the broker has acknowledged the record.
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        key: Option<&'a str>,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + 'a>>;
}

/// Active subscription on a set of topics.
///
/// Dropping the subscription unsubscribes.
pub trait BrokerSubscription: Send {
    /// Next record.
    ///
    /// - `Some(Ok(_))`: a record
    /// - `Some(Err(_))`: per-record or transport error; transport-kind
    ///   errors mean the subscription is dead and must be re-established
    /// - `None`: the stream ended (broker disconnect)
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<BrokerRecord, BrokerError>>> + Send + '_>>;
}

/// Consuming side: opens subscriptions.
pub trait BrokerConsumer: Send + Sync {
    #[allow(clippy::type_complexity)]
    fn subscribe<'a>(
        &'a self,
        topics: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn BrokerSubscription>, BrokerError>> + Send + 'a>>;
}
