use serde::{Deserialize, Serialize};

use crate::broker::BrokerRecord;
use crate::naming::org_usr_node_of;
use crate::util::now_ms;

// ════════════════════════════════════════════════════════════════
//  Overflow Policy
// ════════════════════════════════════════════════════════════════

/// What to do when a subscriber's bounded channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Channel full: drop the event for this subscriber only.
    Drop,
    /// Channel full: the subscriber is considered hung and is disconnected.
    #[default]
    Disconnect,
}

// ════════════════════════════════════════════════════════════════
//  FlowData
// ════════════════════════════════════════════════════════════════

/// Payload of a consumed record: structured JSON when it parses,
/// otherwise the raw text.
///
/// On the wire both variants are bare JSON values, so decoding is
/// lossy: `Structured(Value::String(s))` comes back as `Raw(s)`.
/// Compare decoded payloads by their JSON form when the variant matters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlowData {
    Raw(String),
    Structured(serde_json::Value),
}

impl FlowData {
    /// Decode broker payload bytes. Never fails: anything that is not
    /// valid JSON is kept as (lossy UTF-8) text.
    pub fn from_payload(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<serde_json::Value>(bytes) {
            Ok(value) => FlowData::Structured(value),
            Err(_) => FlowData::Raw(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    /// Field lookup on structured data.
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        match self {
            FlowData::Structured(value) => value.get(field),
            FlowData::Raw(_) => None,
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  FlowOutput
// ════════════════════════════════════════════════════════════════

/// One normalized consumed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowOutput {
    pub topic: String,
    pub org_usr_node: String,
    pub data: FlowData,
    pub message_key: Option<String>,
    pub partition: i32,
    pub offset: i64,
    /// Broker timestamp, Unix ms.
    pub timestamp: i64,
}

impl FlowOutput {
    /// Normalize a broker record. Missing broker timestamp falls back
    /// to ingestion time; a missing payload becomes empty raw text.
    pub fn from_record(record: BrokerRecord) -> Self {
        let data = match record.payload.as_deref() {
            Some(bytes) => FlowData::from_payload(bytes),
            None => FlowData::Raw(String::new()),
        };
        let org_usr_node = org_usr_node_of(&record.topic).to_string();
        Self {
            org_usr_node,
            topic: record.topic,
            data,
            message_key: record.key,
            partition: record.partition,
            offset: record.offset,
            timestamp: record.timestamp_ms.unwrap_or_else(now_ms),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Statistics / status
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicStatistic {
    pub topic: String,
    pub message_count: u64,
    /// Unix ms of the last record seen on this topic.
    pub last_seen: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringStatus {
    pub active: bool,
    pub subscribed_topics: Vec<String>,
    pub total_outputs: usize,
    pub topic_count: usize,
}

/// Topic set a monitoring session covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MonitorScope {
    AllFlowTopics,
    OrgUsrNode(String),
}

impl MonitorScope {
    /// `None` or an empty identifier means every flow topic.
    pub fn from_node(org_usr_node: Option<&str>) -> Self {
        match org_usr_node.map(str::trim) {
            Some(node) if !node.is_empty() => MonitorScope::OrgUsrNode(node.to_string()),
            _ => MonitorScope::AllFlowTopics,
        }
    }
}

impl std::fmt::Display for MonitorScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorScope::AllFlowTopics => f.write_str("all-flow-topics"),
            MonitorScope::OrgUsrNode(node) => f.write_str(node),
        }
    }
}
