use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{mpsc, RwLock};

use flow_api::{
    BrokerAdmin, BrokerConsumer, BrokerError, BrokerProducer, BrokerRecord,
    BrokerSubscription, now_ms,
};

type Delivery = Result<BrokerRecord, BrokerError>;

// ═══════════════════════════════════════════════════════════════
//  MemorySubscription
// ═══════════════════════════════════════════════════════════════

pub struct MemorySubscription {
    rx: mpsc::Receiver<Delivery>,
}

impl BrokerSubscription for MemorySubscription {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Delivery>> + Send + '_>> {
        Box::pin(async { self.rx.recv().await })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryBroker
// ═══════════════════════════════════════════════════════════════

struct Subscriber {
    topics: HashSet<String>,
    tx: mpsc::Sender<Delivery>,
}

/// In-process broker: single partition per topic, offsets from 0,
/// subscribers see only records published after they joined.
///
/// Used by tests and for running the bridge without a cluster.
pub struct MemoryBroker {
    /// topic → next offset.
    topics: RwLock<BTreeMap<String, i64>>,
    subscribers: RwLock<Vec<Subscriber>>,
    buffer: usize,
    fail_publish: AtomicBool,
    fail_list: AtomicBool,
    fail_subscribe: std::sync::Mutex<Option<BrokerError>>,
    subscribe_calls: AtomicUsize,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl MemoryBroker {
    pub fn new(buffer: usize) -> Self {
        Self {
            topics: RwLock::new(BTreeMap::new()),
            subscribers: RwLock::new(Vec::new()),
            buffer: buffer.max(1),
            fail_publish: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
            fail_subscribe: std::sync::Mutex::new(None),
            subscribe_calls: AtomicUsize::new(0),
        }
    }

    pub async fn create_topic(&self, name: &str) {
        self.topics.write().await.entry(name.to_string()).or_insert(0);
    }

    /// Make every subsequent publish fail (broker rejects).
    #[cfg(any(test, feature = "testing"))]
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Make topic listing fail.
    #[cfg(any(test, feature = "testing"))]
    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Make subscribe fail with `err` until cleared with `None`.
    #[cfg(any(test, feature = "testing"))]
    pub fn set_fail_subscribe(&self, err: Option<BrokerError>) {
        if let Ok(mut slot) = self.fail_subscribe.lock() {
            *slot = err;
        }
    }

    /// Simulate a broker outage: every open subscription stream ends.
    #[cfg(any(test, feature = "testing"))]
    pub async fn disconnect_all(&self) {
        let dropped = {
            let mut subs = self.subscribers.write().await;
            std::mem::take(&mut *subs).len()
        };
        tracing::debug!(dropped, "memory broker: disconnected all subscriptions");
    }

    /// Push an error into every subscription covering `topic`.
    #[cfg(any(test, feature = "testing"))]
    pub async fn inject_error(&self, topic: &str, err: BrokerError) {
        let targets = self.targets(topic).await;
        for tx in targets {
            let _ = tx.send(Err(err.clone())).await;
        }
    }

    /// Number of live subscriptions.
    #[cfg(any(test, feature = "testing"))]
    pub async fn active_subscriptions(&self) -> usize {
        let subs = self.subscribers.read().await;
        subs.iter().filter(|s| !s.tx.is_closed()).count()
    }

    /// Total successful `subscribe` calls since creation.
    #[cfg(any(test, feature = "testing"))]
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    async fn targets(&self, topic: &str) -> Vec<mpsc::Sender<Delivery>> {
        let mut subs = self.subscribers.write().await;
        subs.retain(|s| !s.tx.is_closed());
        subs.iter()
            .filter(|s| s.topics.contains(topic))
            .map(|s| s.tx.clone())
            .collect()
    }

    async fn append(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> BrokerRecord {
        let mut topics = self.topics.write().await;
        let next = topics.entry(topic.to_string()).or_insert(0);
        let offset = *next;
        *next += 1;
        BrokerRecord {
            topic: topic.to_string(),
            partition: 0,
            offset,
            timestamp_ms: Some(now_ms()),
            key: key.map(str::to_string),
            payload: Some(payload.to_vec()),
        }
    }
}

impl BrokerAdmin for MemoryBroker {
    fn list_topics(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>, BrokerError>> + Send + '_>> {
        Box::pin(async move {
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(BrokerError::broker("metadata request failed"));
            }
            Ok(self.topics.read().await.keys().cloned().collect())
        })
    }
}

impl BrokerProducer for MemoryBroker {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        key: Option<&'a str>,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            if self.fail_publish.load(Ordering::SeqCst) {
                return Err(BrokerError::broker(format!("publish to '{topic}' rejected")));
            }
            let record = self.append(topic, key, payload).await;
            for tx in self.targets(topic).await {
                if tx.send(Ok(record.clone())).await.is_err() {
                    tracing::debug!(topic, "memory broker: subscriber gone during publish");
                }
            }
            Ok(())
        })
    }
}

impl BrokerConsumer for MemoryBroker {
    fn subscribe<'a>(
        &'a self,
        topics: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn BrokerSubscription>, BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            let injected = self.fail_subscribe.lock().ok().and_then(|slot| slot.clone());
            if let Some(err) = injected {
                return Err(err);
            }
            if topics.is_empty() {
                return Err(BrokerError::config("subscribe: empty topic list"));
            }
            {
                let mut known = self.topics.write().await;
                for t in topics {
                    known.entry(t.clone()).or_insert(0);
                }
            }
            let (tx, rx) = mpsc::channel(self.buffer);
            self.subscribers.write().await.push(Subscriber {
                topics: topics.iter().cloned().collect(),
                tx,
            });
            self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MemorySubscription { rx }) as Box<dyn BrokerSubscription>)
        })
    }
}
