use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

pub use broker_kafka::KafkaConfig;
pub use flow_api::OverflowPolicy;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "flow-bridge", about = "Bridge between Kafka flow topics and UI clients")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bridge server
    Serve(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Path to the TOML config file. Defaults are used without it.
    #[arg(long, env = "CONFIG_PATH")]
    pub config: Option<String>,
}

// ---- TOML Config ----

/// Which broker implementation backs the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerKind {
    #[default]
    Kafka,
    /// In-process broker, no cluster required.
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Reported by `/api/env`; overridden by `ORG_NAME`.
    #[serde(default = "default_org_name")]
    pub org_name: String,
    /// Reported by `/api/env`; overridden by `USER_NAME`.
    #[serde(default = "default_user_name")]
    pub user_name: String,
    /// Buffer size of each WS subscriber.
    #[serde(default = "default_ws_buffer")]
    pub ws_buffer: usize,
    /// Overflow policy for WS subscribers.
    #[serde(default)]
    pub ws_overflow: OverflowPolicy,
    #[serde(default = "default_resubscribe_delay_ms")]
    pub resubscribe_delay_ms: u64,
    /// Period of pushed stats snapshots; 0 disables.
    #[serde(default)]
    pub stats_interval_secs: u64,
    /// Start monitoring all flow topics at boot.
    #[serde(default = "default_autostart")]
    pub autostart: bool,
    #[serde(default)]
    pub broker: BrokerKind,
    #[serde(default)]
    pub kafka: KafkaConfig,
}

fn default_api_port() -> u16 {
    3001
}
fn default_org_name() -> String {
    "default_org".into()
}
fn default_user_name() -> String {
    "default_user".into()
}
fn default_ws_buffer() -> usize {
    1024
}
fn default_resubscribe_delay_ms() -> u64 {
    3000
}
fn default_autostart() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            org_name: default_org_name(),
            user_name: default_user_name(),
            ws_buffer: default_ws_buffer(),
            ws_overflow: OverflowPolicy::default(),
            resubscribe_delay_ms: default_resubscribe_delay_ms(),
            stats_interval_secs: 0,
            autostart: default_autostart(),
            broker: BrokerKind::default(),
            kafka: KafkaConfig::default(),
        }
    }
}

impl ServerConfig {
    /// `None` or a missing file → defaults.
    pub fn load(path: Option<&str>) -> Result<Self, ServerError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(config = %path, "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ServerError::Config { context: "read", detail: format!("'{path}': {e}") });
            }
        };
        Self::parse(&content)
            .map_err(|e| ServerError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// `ORG_NAME` / `USER_NAME` win over the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(org) = lookup("ORG_NAME").filter(|v| !v.is_empty()) {
            self.org_name = org;
        }
        if let Some(user) = lookup("USER_NAME").filter(|v| !v.is_empty()) {
            self.user_name = user;
        }
    }
}
