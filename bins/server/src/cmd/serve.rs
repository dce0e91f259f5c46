use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use broker_kafka::KafkaBroker;
use broker_memory::MemoryBroker;
use flow_api::{BrokerAdmin, BrokerConsumer, BrokerProducer, EnvInfo};
use flow_api_server::AppState;
use flow_engine::{AdminGateway, BroadcastHub, MonitorConfig, OutputMonitor, ProducerGateway};

use crate::config::{BrokerKind, ServeArgs, ServerConfig};
use crate::error::ServerError;

/// Grace period for tasks after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The three broker roles, possibly backed by one object.
struct BrokerHandles {
    admin: Arc<dyn BrokerAdmin>,
    producer: Arc<dyn BrokerProducer>,
    consumer: Arc<dyn BrokerConsumer>,
}

impl BrokerHandles {
    fn from_shared<B>(broker: Arc<B>) -> Self
    where
        B: BrokerAdmin + BrokerProducer + BrokerConsumer + 'static,
    {
        Self { admin: broker.clone(), producer: broker.clone(), consumer: broker }
    }
}

fn connect_broker(config: &ServerConfig) -> Result<BrokerHandles, ServerError> {
    match config.broker {
        BrokerKind::Kafka => {
            let broker = KafkaBroker::new(config.kafka.clone())?;
            tracing::info!(brokers = %config.kafka.brokers, "using kafka broker");
            Ok(BrokerHandles::from_shared(Arc::new(broker)))
        }
        BrokerKind::Memory => {
            tracing::warn!("using in-process memory broker, records are not persisted");
            Ok(BrokerHandles::from_shared(Arc::new(MemoryBroker::default())))
        }
    }
}

/// Periodic `monitoring-stats` + `topic-stats` push.
fn spawn_stats_ticker(monitor: Arc<OutputMonitor>, every: Duration, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => monitor.publish_stats().await,
            }
        }
    })
}

/// Monitor all flow topics. Failures are logged; the API stays up.
fn spawn_autostart(monitor: Arc<OutputMonitor>) -> JoinHandle<()> {
    tokio::spawn(async move {
        match monitor.start(None).await {
            Ok(()) => tracing::info!("autostart: monitoring all flow topics"),
            Err(e) => tracing::error!(error = %e, "autostart failed, monitoring stays off"),
        }
    })
}

/// Resolves on Ctrl+C or SIGTERM. The SIGTERM handler is registered before this returns.
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    Ok(async move {
        #[cfg(unix)]
        let terminate = async move {
            sigterm.recv().await;
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();
        tokio::pin!(terminate);

        tokio::select! {
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => tracing::info!("interrupt received"),
                Err(e) => {
                    tracing::error!(error = %e, "failed to listen for Ctrl+C");
                    (&mut terminate).await;
                    tracing::info!("SIGTERM received");
                }
            },
            _ = &mut terminate => tracing::info!("SIGTERM received"),
        }
    })
}

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("flow-bridge starting");

    // --- Load config ---
    let mut config = ServerConfig::load(args.config.as_deref())?;
    config.apply_env(|key| std::env::var(key).ok());
    tracing::info!(config = ?args.config, port = config.api_port, broker = ?config.broker, "loaded config");

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    // --- Broker, hub, monitor ---
    let broker = connect_broker(&config)?;
    let hub = Arc::new(BroadcastHub::new(config.ws_buffer, config.ws_overflow));
    let admin = AdminGateway::new(broker.admin);
    let monitor = Arc::new(OutputMonitor::new(
        admin.clone(),
        broker.consumer,
        hub.clone(),
        MonitorConfig {
            resubscribe_delay: Duration::from_millis(config.resubscribe_delay_ms),
            ..MonitorConfig::default()
        },
    ));
    let state = AppState::new(
        monitor.clone(),
        hub.clone(),
        ProducerGateway::new(broker.producer),
        admin,
        EnvInfo { org_name: config.org_name.clone(), user_name: config.user_name.clone() },
    );
    tracing::info!(
        ws_buffer = config.ws_buffer,
        ws_overflow = ?config.ws_overflow,
        org = %config.org_name,
        user = %config.user_name,
        "bridge wired"
    );

    let shutdown = shutdown_signal()?;
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    // --- API server (HTTP + WS), bound before monitoring starts ---
    let api_port = config.api_port;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", api_port))
        .await
        .map_err(|source| ServerError::Bind { port: api_port, source })?;
    let api_token = token.clone();
    handles.push(tokio::spawn(async move {
        if let Err(e) = flow_api_server::serve(listener, state, api_token).await {
            tracing::error!(error = %e, "api server error");
        }
    }));
    tracing::info!(port = api_port, "api server (http+ws) listening");

    let autostart = config.autostart.then(|| spawn_autostart(monitor.clone()));

    if config.stats_interval_secs > 0 {
        handles.push(spawn_stats_ticker(
            monitor.clone(),
            Duration::from_secs(config.stats_interval_secs),
            token.clone(),
        ));
        tracing::info!(every_secs = config.stats_interval_secs, "stats ticker started");
    }

    tracing::info!("server ready");

    // --- Wait for Ctrl+C / SIGTERM ---
    shutdown.await;
    tracing::info!("shutting down...");

    token.cancel();
    if let Some(autostart) = autostart {
        autostart.abort();
        let _ = autostart.await;
    }
    monitor.stop().await;

    // Drain: wait up to the grace period, then abort stragglers
    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
    for mut h in handles {
        if tokio::time::timeout_at(deadline, &mut h).await.is_err() {
            h.abort();
            let _ = h.await;
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}
