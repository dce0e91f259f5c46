pub mod error;
pub mod gateway;
pub mod hub;
pub mod log;
pub mod monitor;

pub use error::MonitorError;
pub use gateway::{AdminGateway, ProducerGateway};
pub use hub::{BroadcastHub, EventSink, HubSubscription};
pub use log::{OutputStore, LOG_CAPACITY};
pub use monitor::{MonitorConfig, OutputMonitor, DEFAULT_RESUBSCRIBE_DELAY};
