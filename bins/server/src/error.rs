#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("broker: {0}")]
    Broker(#[from] flow_api::BrokerError),

    #[error("bind api :{port}: {source}")]
    Bind { port: u16, source: std::io::Error },

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
