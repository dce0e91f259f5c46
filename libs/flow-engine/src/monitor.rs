use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use flow_api::{
    flow_topic_for, now_ms, BrokerConsumer, BrokerRecord, BrokerSubscription, FlowOutput,
    MonitorEvent, MonitorScope, MonitoringStatus, TopicStatistic,
};

use crate::error::MonitorError;
use crate::gateway::AdminGateway;
use crate::hub::EventSink;
use crate::log::{OutputStore, LOG_CAPACITY};

/// Delay between resubscription / topic discovery attempts.
pub const DEFAULT_RESUBSCRIBE_DELAY: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub resubscribe_delay: Duration,
    pub capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            resubscribe_delay: DEFAULT_RESUBSCRIBE_DELAY,
            capacity: LOG_CAPACITY,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Shared state (ingestion ↔ commands)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct SessionView {
    active: bool,
    subscribed_topics: Vec<String>,
}

struct Shared {
    store: RwLock<OutputStore>,
    view: RwLock<SessionView>,
}

fn snapshot(view: &SessionView, store: &OutputStore) -> MonitoringStatus {
    MonitoringStatus {
        active: view.active,
        subscribed_topics: view.subscribed_topics.clone(),
        total_outputs: store.len(),
        topic_count: store.topic_count(),
    }
}

struct Running {
    scope: MonitorScope,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

// ═══════════════════════════════════════════════════════════════
//  OutputMonitor
// ═══════════════════════════════════════════════════════════════

/// Consumes flow topics into a bounded log and emits lifecycle/data events.
///
/// start/stop are serialized by `session`; the ingestion task never takes
/// that lock, it only touches `Shared` and the event sink.
pub struct OutputMonitor {
    admin: AdminGateway,
    consumer: Arc<dyn BrokerConsumer>,
    events: Arc<dyn EventSink>,
    shared: Arc<Shared>,
    session: Mutex<Option<Running>>,
    resubscribe_delay: Duration,
}

impl OutputMonitor {
    pub fn new(
        admin: AdminGateway,
        consumer: Arc<dyn BrokerConsumer>,
        events: Arc<dyn EventSink>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            admin,
            consumer,
            events,
            shared: Arc::new(Shared {
                store: RwLock::new(OutputStore::new(config.capacity)),
                view: RwLock::new(SessionView::default()),
            }),
            session: Mutex::new(None),
            resubscribe_delay: config.resubscribe_delay,
        }
    }

    /// Start monitoring `org_usr_node`'s topic, or every flow topic when `None`.
    ///
    /// Same scope while active → no-op. Different scope → stop, then start.
    pub async fn start(&self, org_usr_node: Option<&str>) -> Result<(), MonitorError> {
        let scope = MonitorScope::from_node(org_usr_node);
        let mut session = self.session.lock().await;

        if let Some(running) = session.as_ref() {
            if running.scope == scope {
                tracing::debug!(%scope, "monitoring already active for scope");
                return Ok(());
            }
            tracing::info!(from = %running.scope, to = %scope, "monitoring scope changed, restarting");
            self.stop_locked(&mut session).await;
        }

        let topics = resolve_topics(&self.admin, &scope).await;
        let first = if topics.is_empty() {
            tracing::warn!(%scope, "no flow topics discovered yet, will retry");
            None
        } else {
            match self.consumer.subscribe(&topics).await {
                Ok(sub) => Some(sub),
                Err(e) if e.is_transport() => {
                    tracing::warn!(%scope, error = ?e, "initial subscribe failed, will retry");
                    None
                }
                Err(e) => {
                    return Err(MonitorError::Subscribe { scope: scope.to_string(), source: e });
                }
            }
        };

        {
            let mut view = self.shared.view.write().await;
            view.active = true;
            view.subscribed_topics = if first.is_some() { topics.clone() } else { Vec::new() };
        }
        let status = self.status().await;
        self.events.emit(MonitorEvent::MonitoringStarted(status)).await;

        let token = CancellationToken::new();
        let worker = Ingestion {
            admin: self.admin.clone(),
            consumer: self.consumer.clone(),
            events: self.events.clone(),
            shared: self.shared.clone(),
            scope: scope.clone(),
            token: token.clone(),
            delay: self.resubscribe_delay,
        };
        let handle = tokio::spawn(worker.run(first));

        tracing::info!(%scope, topics = ?topics, "monitoring started");
        *session = Some(Running { scope, token, handle });
        Ok(())
    }

    /// Cancel the subscription and emit `monitoring-stopped`. No-op when inactive.
    pub async fn stop(&self) {
        let mut session = self.session.lock().await;
        self.stop_locked(&mut session).await;
    }

    async fn stop_locked(&self, session: &mut Option<Running>) {
        let Some(running) = session.take() else {
            return;
        };

        running.token.cancel();
        // After the task is gone no flow-output for this scope can follow.
        if let Err(e) = running.handle.await {
            if e.is_panic() {
                tracing::error!(scope = %running.scope, "ingestion task panicked");
            }
        }

        {
            let mut view = self.shared.view.write().await;
            view.active = false;
            view.subscribed_topics.clear();
        }
        let status = self.status().await;
        self.events.emit(MonitorEvent::MonitoringStopped(status)).await;
        tracing::info!(scope = %running.scope, "monitoring stopped");
    }

    pub async fn is_active(&self) -> bool {
        self.shared.view.read().await.active
    }

    pub async fn scope(&self) -> Option<MonitorScope> {
        self.session.lock().await.as_ref().map(|r| r.scope.clone())
    }

    pub async fn status(&self) -> MonitoringStatus {
        let view = self.shared.view.read().await;
        let store = self.shared.store.read().await;
        snapshot(&view, &store)
    }

    pub async fn topic_statistics(&self) -> Vec<TopicStatistic> {
        self.shared.store.read().await.statistics()
    }

    pub async fn latest_outputs(&self, limit: usize) -> Vec<FlowOutput> {
        self.shared.store.read().await.latest(limit)
    }

    pub async fn outputs_from_topic(&self, topic: &str) -> Vec<FlowOutput> {
        self.shared.store.read().await.from_topic(topic)
    }

    /// Substring match on orgUsrNode.
    pub async fn outputs_for_org_usr_node(&self, id: &str) -> Vec<FlowOutput> {
        self.shared.store.read().await.for_org_usr_node(id)
    }

    /// Empty the log and statistics, then push fresh stats to subscribers.
    /// Session and subscriptions are untouched.
    pub async fn clear_outputs(&self) {
        let view = self.shared.view.read().await;
        let mut store = self.shared.store.write().await;
        store.clear();
        let status = snapshot(&view, &store);
        drop(view);
        self.events.emit(MonitorEvent::MonitoringStats(status)).await;
        self.events.emit(MonitorEvent::TopicStats(Vec::new())).await;
        tracing::info!("outputs cleared");
    }

    /// Emit `monitoring-stats` and `topic-stats` snapshots.
    pub async fn publish_stats(&self) {
        let (status, stats) = {
            let view = self.shared.view.read().await;
            let store = self.shared.store.read().await;
            (snapshot(&view, &store), store.statistics())
        };
        self.events.emit(MonitorEvent::MonitoringStats(status)).await;
        self.events.emit(MonitorEvent::TopicStats(stats)).await;
    }
}

impl Drop for OutputMonitor {
    fn drop(&mut self) {
        if let Some(running) = self.session.get_mut().as_ref() {
            running.token.cancel();
        }
    }
}

async fn resolve_topics(admin: &AdminGateway, scope: &MonitorScope) -> Vec<String> {
    match scope {
        MonitorScope::OrgUsrNode(node) => vec![flow_topic_for(node)],
        MonitorScope::AllFlowTopics => match admin.try_flow_topics().await {
            Ok(topics) => topics,
            Err(e) => {
                tracing::warn!(error = ?e, "flow topic discovery failed");
                Vec::new()
            }
        },
    }
}

// ═══════════════════════════════════════════════════════════════
//  Ingestion task
// ═══════════════════════════════════════════════════════════════

struct Ingestion {
    admin: AdminGateway,
    consumer: Arc<dyn BrokerConsumer>,
    events: Arc<dyn EventSink>,
    shared: Arc<Shared>,
    scope: MonitorScope,
    token: CancellationToken,
    delay: Duration,
}

impl Ingestion {
    async fn run(self, mut pending: Option<Box<dyn BrokerSubscription>>) {
        loop {
            let mut subscription = match pending.take() {
                Some(sub) => sub,
                None => {
                    if !self.pause().await {
                        break;
                    }
                    let sub = tokio::select! {
                        biased;
                        _ = self.token.cancelled() => break,
                        sub = self.resubscribe() => sub,
                    };
                    match sub {
                        Some(sub) => sub,
                        None => continue,
                    }
                }
            };

            loop {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => return,
                    next = subscription.recv() => match next {
                        Some(Ok(record)) => self.ingest(record).await,
                        Some(Err(e)) if e.is_transport() => {
                            tracing::warn!(scope = %self.scope, error = ?e, "broker transport error, resubscribing");
                            break;
                        }
                        Some(Err(e)) => {
                            tracing::warn!(scope = %self.scope, error = ?e, "bad record, skipping");
                        }
                        None => {
                            tracing::warn!(scope = %self.scope, "subscription closed, resubscribing");
                            break;
                        }
                    },
                }
            }
        }
        tracing::debug!(scope = %self.scope, "ingestion finished");
    }

    /// Sleep for the retry delay. `false` if cancelled meanwhile.
    async fn pause(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(self.delay) => true,
        }
    }

    async fn resubscribe(&self) -> Option<Box<dyn BrokerSubscription>> {
        let topics = resolve_topics(&self.admin, &self.scope).await;
        if topics.is_empty() {
            tracing::debug!(scope = %self.scope, "still no flow topics");
            return None;
        }
        match self.consumer.subscribe(&topics).await {
            Ok(sub) => {
                tracing::info!(scope = %self.scope, topics = ?topics, "resubscribed");
                self.shared.view.write().await.subscribed_topics = topics;
                Some(sub)
            }
            Err(e) => {
                tracing::warn!(scope = %self.scope, error = ?e, "resubscribe failed");
                None
            }
        }
    }

    async fn ingest(&self, record: BrokerRecord) {
        let output = FlowOutput::from_record(record);
        tracing::trace!(topic = %output.topic, offset = output.offset, "ingested");
        // Emit under the store lock: clear_outputs can't slip in between.
        let mut store = self.shared.store.write().await;
        store.insert(output.clone(), now_ms());
        self.events.emit(MonitorEvent::FlowOutput(output)).await;
    }
}
