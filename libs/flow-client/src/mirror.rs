use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use flow_api::{
    flow_topic_for, CommandAck, FlowOutput, MonitorEvent, MonitoringStatus, OutputsQuery,
    TopicList, TopicStatistic,
};

use crate::commands::CommandClient;
use crate::error::ClientError;
use crate::reconnect::{ReconnectTimer, RECONNECT_DELAY};
use crate::state::{MirrorState, MIRROR_CAPACITY};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// State of the push channel. Says nothing about broker health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// `http://host:port` of the bridge; the push channel is derived from it.
    pub base_url: String,
    pub reconnect_delay: Duration,
    pub capacity: usize,
}

impl MirrorConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            reconnect_delay: RECONNECT_DELAY,
            capacity: MIRROR_CAPACITY,
        }
    }
}

fn ws_url(base_url: &str) -> String {
    let base = base_url
        .trim_end_matches('/')
        .replacen("http://", "ws://", 1)
        .replacen("https://", "wss://", 1);
    format!("{base}/ws")
}

// ═══════════════════════════════════════════════════════════════
//  Connection driver
// ═══════════════════════════════════════════════════════════════

struct Inner {
    ws_url: String,
    state: RwLock<MirrorState>,
    transport: watch::Sender<TransportState>,
    error: RwLock<Option<String>>,
    timer: Mutex<ReconnectTimer>,
    token: CancellationToken,
}

impl Inner {
    fn set_transport(&self, next: TransportState) {
        let prev = self.transport.send_replace(next);
        if prev != next {
            tracing::debug!(from = ?prev, to = ?next, "transport state");
        }
    }

    /// Connect, pump events until the socket ends, wait for the timer, repeat.
    async fn drive(self: Arc<Self>) {
        loop {
            self.set_transport(TransportState::Connecting);
            let attempt = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                attempt = tokio_tungstenite::connect_async(self.ws_url.as_str()) => attempt,
            };

            match attempt {
                Ok((socket, _)) => {
                    self.timer.lock().await.cancel();
                    *self.error.write().await = None;
                    self.set_transport(TransportState::Connected);
                    tracing::info!(url = %self.ws_url, "connected to event channel");

                    if let Some(e) = self.pump(socket).await {
                        tracing::warn!(error = %e, "event channel error");
                        *self.error.write().await = Some(e);
                    } else {
                        tracing::info!("event channel closed");
                    }
                }
                Err(e) => {
                    let e = ClientError::from(e);
                    tracing::warn!(url = %self.ws_url, error = %e, "connect failed");
                    *self.error.write().await = Some(e.to_string());
                }
            }

            self.set_transport(TransportState::Disconnected);
            if self.token.is_cancelled() {
                break;
            }

            let (fire, fired) = oneshot::channel();
            {
                let mut timer = self.timer.lock().await;
                timer.schedule(move || {
                    let _ = fire.send(());
                });
                tracing::info!(delay_ms = timer.delay().as_millis() as u64, "reconnect scheduled");
            }
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = fired => {}
            }
        }

        self.timer.lock().await.cancel();
        self.set_transport(TransportState::Disconnected);
        tracing::debug!("mirror driver finished");
    }

    /// `Some(error)` if the socket failed, `None` on a clean close or shutdown.
    async fn pump(&self, mut socket: Socket) -> Option<String> {
        loop {
            let msg = tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    let _ = socket.close(None).await;
                    return None;
                }
                msg = socket.next() => msg,
            };
            match msg {
                Some(Ok(Message::Text(text))) => self.dispatch(text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Some(ClientError::from(e).to_string()),
            }
        }
    }

    async fn dispatch(&self, text: &str) {
        match serde_json::from_str::<MonitorEvent>(text) {
            Ok(event) => {
                tracing::trace!(kind = event.kind(), "event");
                self.state.write().await.apply(event);
            }
            Err(e) => tracing::debug!(error = %e, "ignoring unrecognized event"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  ClientMirror
// ═══════════════════════════════════════════════════════════════

/// Local projection of the bridge: a reconnecting push channel feeding
/// [`MirrorState`] plus an HTTP command channel.
///
/// Commands never touch local state except a successful `clear_outputs`.
pub struct ClientMirror {
    inner: Arc<Inner>,
    commands: CommandClient,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ClientMirror {
    /// Spawns the connection driver. Must be called inside a tokio runtime.
    pub fn connect(config: MirrorConfig) -> Self {
        let (transport, _) = watch::channel(TransportState::Disconnected);
        let inner = Arc::new(Inner {
            ws_url: ws_url(&config.base_url),
            state: RwLock::new(MirrorState::new(config.capacity)),
            transport,
            error: RwLock::new(None),
            timer: Mutex::new(ReconnectTimer::new(config.reconnect_delay)),
            token: CancellationToken::new(),
        });
        let driver = tokio::spawn(inner.clone().drive());
        Self {
            inner,
            commands: CommandClient::new(config.base_url),
            driver: Mutex::new(Some(driver)),
        }
    }

    /// Close the channel, cancel any pending reconnect and stop reconnecting.
    pub async fn disconnect(&self) {
        self.inner.token.cancel();
        self.inner.timer.lock().await.cancel();
        if let Some(driver) = self.driver.lock().await.take() {
            if let Err(e) = driver.await {
                if e.is_panic() {
                    tracing::error!("mirror driver panicked");
                }
            }
        }
        self.inner.set_transport(TransportState::Disconnected);
    }

    pub fn commands(&self) -> &CommandClient {
        &self.commands
    }

    // ═══════════════════════════════════════════════════════════════
    //  Transport
    // ═══════════════════════════════════════════════════════════════

    pub fn transport_state(&self) -> TransportState {
        *self.inner.transport.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.transport_state() == TransportState::Connected
    }

    /// Watch transport transitions.
    pub fn transport_changes(&self) -> watch::Receiver<TransportState> {
        self.inner.transport.subscribe()
    }

    /// Last channel error; cleared on a successful connect.
    pub async fn connection_error(&self) -> Option<String> {
        self.inner.error.read().await.clone()
    }

    /// Whether a reconnect is currently scheduled.
    pub async fn reconnect_pending(&self) -> bool {
        self.inner.timer.lock().await.is_pending()
    }

    // ═══════════════════════════════════════════════════════════════
    //  Local projection
    // ═══════════════════════════════════════════════════════════════

    pub async fn is_monitoring(&self) -> bool {
        self.inner.state.read().await.is_monitoring()
    }

    pub async fn monitoring_stats(&self) -> Option<MonitoringStatus> {
        self.inner.state.read().await.monitoring_stats().cloned()
    }

    pub async fn topic_stats(&self) -> Vec<TopicStatistic> {
        self.inner.state.read().await.topic_statistics().to_vec()
    }

    pub async fn latest_outputs(&self, limit: usize) -> Vec<FlowOutput> {
        self.inner.state.read().await.latest_outputs(limit)
    }

    pub async fn outputs_for_workflow(&self, name: &str) -> Vec<FlowOutput> {
        self.inner.state.read().await.outputs_for_workflow(name)
    }

    // ═══════════════════════════════════════════════════════════════
    //  Commands
    // ═══════════════════════════════════════════════════════════════

    pub async fn fetch_topics(&self) -> Option<TopicList> {
        match self.commands.fetch_topics().await {
            Ok(list) => Some(list),
            Err(e) => {
                tracing::warn!(error = %e, "fetch topics failed");
                None
            }
        }
    }

    pub async fn send_message(&self, topic: &str, message: &serde_json::Value, key: Option<&str>) -> bool {
        acknowledged("send message", self.commands.send_message(topic, message, key).await)
    }

    pub async fn send_to_flow_topic(
        &self,
        org_usr_node: &str,
        message: &serde_json::Value,
        key: Option<&str>,
    ) -> bool {
        self.send_message(&flow_topic_for(org_usr_node), message, key).await
    }

    /// `None` monitors every flow topic.
    pub async fn start_monitoring(&self, org_usr_node: Option<&str>) -> bool {
        acknowledged("start monitoring", self.commands.start_monitoring(org_usr_node).await)
    }

    pub async fn stop_monitoring(&self) -> bool {
        acknowledged("stop monitoring", self.commands.stop_monitoring().await)
    }

    pub async fn get_monitoring_status(&self) -> Option<MonitoringStatus> {
        match self.commands.monitoring_status().await {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::warn!(error = %e, "get monitoring status failed");
                None
            }
        }
    }

    pub async fn get_topic_statistics(&self) -> Vec<TopicStatistic> {
        match self.commands.topic_statistics().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(error = %e, "get topic statistics failed");
                Vec::new()
            }
        }
    }

    /// Clears local outputs and topic stats once the server acknowledged.
    pub async fn clear_outputs(&self) -> bool {
        let ok = acknowledged("clear outputs", self.commands.clear_outputs().await);
        if ok {
            self.inner.state.write().await.clear_outputs();
        }
        ok
    }

    pub async fn get_outputs(&self, query: &OutputsQuery) -> Vec<FlowOutput> {
        match self.commands.outputs(query).await {
            Ok(outputs) => outputs,
            Err(e) => {
                tracing::warn!(error = %e, "get outputs failed");
                Vec::new()
            }
        }
    }
}

impl Drop for ClientMirror {
    fn drop(&mut self) {
        self.inner.token.cancel();
    }
}

fn acknowledged(what: &str, result: Result<CommandAck, ClientError>) -> bool {
    match result {
        Ok(ack) if ack.success => true,
        Ok(ack) => {
            tracing::warn!(command = what, error = ?ack.error, "command not acknowledged");
            false
        }
        Err(e) => {
            tracing::warn!(command = what, error = %e, "command failed");
            false
        }
    }
}
