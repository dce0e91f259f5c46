use serde::{Deserialize, Serialize};

use crate::types::{FlowOutput, MonitoringStatus, TopicStatistic};

/// Push envelope server → subscriber: `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum MonitorEvent {
    FlowOutput(FlowOutput),
    MonitoringStats(MonitoringStatus),
    TopicStats(Vec<TopicStatistic>),
    MonitoringStarted(MonitoringStatus),
    MonitoringStopped(MonitoringStatus),
}

impl MonitorEvent {
    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorEvent::FlowOutput(_) => "flow-output",
            MonitorEvent::MonitoringStats(_) => "monitoring-stats",
            MonitorEvent::TopicStats(_) => "topic-stats",
            MonitorEvent::MonitoringStarted(_) => "monitoring-started",
            MonitorEvent::MonitoringStopped(_) => "monitoring-stopped",
        }
    }
}
