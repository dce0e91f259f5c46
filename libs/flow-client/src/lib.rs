//! Reconnecting client-side mirror of a running flow bridge.

pub mod commands;
pub mod error;
pub mod mirror;
pub mod reconnect;
pub mod state;

pub use commands::CommandClient;
pub use error::ClientError;
pub use mirror::{ClientMirror, MirrorConfig, TransportState};
pub use reconnect::{ReconnectTimer, RECONNECT_DELAY};
pub use state::{MirrorState, MIRROR_CAPACITY};
