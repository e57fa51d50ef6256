//! l2cap-shim - connection-oriented L2CAP channels over a transport engine
//!
//! This library lets upper-layer Bluetooth services register a PSM, accept or
//! originate channels and receive lifecycle and data events for them, while
//! framing, retransmission and the link itself stay inside an injected
//! [`TransportEngine`].

pub mod error;
pub mod gap;
pub mod l2cap;

// Re-export common types for convenience
pub use error::AddressParseError;
pub use gap::BdAddr;
pub use l2cap::{
    ChannelId, ConfigInfo, ConnectionType, L2capError, L2capResult, L2capShim, ServiceCallbacks,
    ShimConfig, TransportEngine,
};
