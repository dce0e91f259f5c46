#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("subscribe ({scope}): {source}")]
    Subscribe { scope: String, source: flow_api::BrokerError },
}
