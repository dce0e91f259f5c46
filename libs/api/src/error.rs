/// Category of a broker error. Lets callers decide between
/// retry (transport), skip (format) and fail fast (config).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid client configuration, permanent.
    Config,
    /// Connection to the broker lost or unreachable; resubscribe.
    Transport,
    /// Record could not be decoded; skip the record.
    Format,
    /// Broker rejected the operation (publish, metadata, subscribe).
    Broker,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Transport => f.write_str("transport"),
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::Broker => f.write_str("broker"),
        }
    }
}

/// Unified error type for all broker trait methods.
///
/// Carries an `ErrorKind` for categorization and a human-readable message.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerError {
    kind: ErrorKind,
    message: String,
}

impl BrokerError {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, msg)
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, msg)
    }

    pub fn format_err(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format, msg)
    }

    pub fn broker(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Broker, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_transport(&self) -> bool {
        self.kind == ErrorKind::Transport
    }
}

impl std::fmt::Debug for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BrokerError {}
