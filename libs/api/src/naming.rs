//! Flow-topic naming convention: `organization-user-workflow-topic`.
//!
//! The same predicate is used for topic discovery and for monitor scope
//! resolution, so both sides always agree on what a flow topic is.

/// Suffix every flow topic carries.
pub const FLOW_TOPIC_SUFFIX: &str = "-topic";

/// `true` for topics that carry workflow output.
///
/// Broker-internal topics (`__consumer_offsets`, ...) never qualify,
/// and a bare `-topic` without an orgUsrNode prefix is rejected.
pub fn is_flow_topic(name: &str) -> bool {
    !name.starts_with("__")
        && name.len() > FLOW_TOPIC_SUFFIX.len()
        && name.ends_with(FLOW_TOPIC_SUFFIX)
}

/// orgUsrNode → topic name.
pub fn flow_topic_for(org_usr_node: &str) -> String {
    format!("{org_usr_node}{FLOW_TOPIC_SUFFIX}")
}

/// topic name → orgUsrNode. Topics without the suffix are returned as-is.
pub fn org_usr_node_of(topic: &str) -> &str {
    topic.strip_suffix(FLOW_TOPIC_SUFFIX).unwrap_or(topic)
}
