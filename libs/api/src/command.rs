//! Request/response bodies of the command surface.

use serde::{Deserialize, Serialize};

use crate::types::FlowOutput;

/// Default `limit` for output queries without a filter.
pub const DEFAULT_OUTPUTS_LIMIT: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicList {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub flow_topics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub message: Option<serde_json::Value>,
    #[serde(default)]
    pub key: Option<String>,
}

/// A send request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidSend<'a> {
    pub topic: &'a str,
    pub message: &'a serde_json::Value,
    pub key: Option<&'a str>,
}

impl SendMessageRequest {
    /// Topic and message are required; an empty topic, a `null`
    /// message or an empty string message count as missing.
    pub fn validate(&self) -> Result<ValidSend<'_>, &'static str> {
        let topic = self.topic.as_deref().filter(|t| !t.trim().is_empty());
        let message = self.message.as_ref().filter(|m| match m {
            serde_json::Value::Null => false,
            serde_json::Value::String(s) => !s.is_empty(),
            _ => true,
        });
        match (topic, message) {
            (Some(topic), Some(message)) => Ok(ValidSend {
                topic,
                message,
                key: self.key.as_deref(),
            }),
            _ => Err("Topic and message are required"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMonitoringRequest {
    #[serde(default)]
    pub org_usr_node: Option<String>,
}

/// Generic acknowledgement: `{success, message?, error?}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandAck {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: Some(message.into()), error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, message: None, error: Some(error.into()) }
    }
}

/// `GET /outputs` filters. `org_usr_node` wins over `topic`;
/// `limit` only applies when neither is given.
///
/// `limit` is read leniently: the leading integer of the value counts,
/// negative or non-numeric values mean zero and a blank value means unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputsQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_usr_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, deserialize_with = "lenient_limit", skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

fn lenient_limit<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::Num(n)) => Some(usize::try_from(n).unwrap_or(0)),
        Some(Raw::Text(text)) => parse_limit(&text),
    })
}

fn parse_limit(text: &str) -> Option<usize> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let (negative, digits) = match text.as_bytes()[0] {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let end = digits.find(|c: char| !c.is_ascii_digit()).unwrap_or(digits.len());
    if negative || end == 0 {
        return Some(0);
    }
    // saturate on overflow
    Some(digits[..end].parse::<usize>().unwrap_or(usize::MAX))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub outputs: Vec<FlowOutput>,
}

/// `GET /api/env`: default organization / user identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvInfo {
    #[serde(rename = "ORG_NAME")]
    pub org_name: String,
    #[serde(rename = "USER_NAME")]
    pub user_name: String,
}
