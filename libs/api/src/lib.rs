//! Shared data model, wire envelopes and broker traits of the flow bridge.

pub mod broker;
pub mod command;
pub mod error;
pub mod event;
pub mod naming;
pub mod types;
pub mod util;

pub use broker::{BrokerAdmin, BrokerConsumer, BrokerProducer, BrokerRecord, BrokerSubscription};
pub use command::{
    CommandAck, EnvInfo, OutputsQuery, OutputsResponse, SendMessageRequest,
    StartMonitoringRequest, TopicList, ValidSend, DEFAULT_OUTPUTS_LIMIT,
};
pub use error::{BrokerError, ErrorKind};
pub use event::MonitorEvent;
pub use naming::{flow_topic_for, is_flow_topic, org_usr_node_of, FLOW_TOPIC_SUFFIX};
pub use types::{
    FlowData, FlowOutput, MonitorScope, MonitoringStatus, OverflowPolicy, TopicStatistic,
};
pub use util::now_ms;
