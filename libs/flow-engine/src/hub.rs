use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, RwLock};

use flow_api::{MonitorEvent, OverflowPolicy};

// ═══════════════════════════════════════════════════════════════
//  EventSink
// ═══════════════════════════════════════════════════════════════

/// Receiver of monitor events. The monitor never knows who listens.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: MonitorEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

// ═══════════════════════════════════════════════════════════════
//  HubSubscription
// ═══════════════════════════════════════════════════════════════

/// One subscriber's end of the hub: serialized envelopes, in order.
pub struct HubSubscription {
    id: u64,
    rx: mpsc::Receiver<Arc<str>>,
}

impl HubSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next envelope. None = pruned by the hub.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }

    /// Non-blocking variant for tests and draining.
    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.rx.try_recv().ok()
    }
}

// ═══════════════════════════════════════════════════════════════
//  BroadcastHub
// ═══════════════════════════════════════════════════════════════

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Arc<str>>,
}

/// Best-effort fan-out of monitor events to every live subscriber.
///
/// Each subscriber gets its own bounded channel and is only fed via
/// `try_send`, so a slow subscriber never stalls the others.
pub struct BroadcastHub {
    subscribers: RwLock<Vec<Subscriber>>,
    buffer: usize,
    overflow: OverflowPolicy,
    next_id: AtomicU64,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(1024, OverflowPolicy::Disconnect)
    }
}

impl BroadcastHub {
    pub fn new(buffer: usize, overflow: OverflowPolicy) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            buffer: buffer.max(1),
            overflow,
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber. No replay: only events published from now on.
    pub async fn subscribe(&self) -> HubSubscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().await.push(Subscriber { id, tx });
        tracing::debug!(subscriber = id, "hub: subscriber joined");
        HubSubscription { id, rx }
    }

    pub async fn unsubscribe(&self, id: u64) {
        let mut subs = self.subscribers.write().await;
        subs.retain(|s| s.id != id);
        tracing::debug!(subscriber = id, "hub: subscriber left");
    }

    pub async fn subscriber_count(&self) -> usize {
        let subs = self.subscribers.read().await;
        subs.iter().filter(|s| !s.tx.is_closed()).count()
    }

    /// Serialize once, deliver to everyone. Returns how many subscribers
    /// accepted the envelope.
    pub async fn publish(&self, event: &MonitorEvent) -> usize {
        let json: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!(event = event.kind(), error = %e, "hub: event serialization failed");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut subs = self.subscribers.write().await;
        subs.retain(|sub| match sub.tx.try_send(json.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(subscriber = sub.id, "hub: pruning closed subscriber");
                false
            }
            Err(mpsc::error::TrySendError::Full(_)) => match self.overflow {
                OverflowPolicy::Drop => {
                    tracing::warn!(subscriber = sub.id, event = event.kind(), "hub: subscriber channel full, dropping");
                    true
                }
                OverflowPolicy::Disconnect => {
                    tracing::warn!(subscriber = sub.id, "hub: subscriber unresponsive, disconnecting");
                    false
                }
            },
        });
        delivered
    }
}

impl EventSink for BroadcastHub {
    fn emit(&self, event: MonitorEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.publish(&event).await;
        })
    }
}
