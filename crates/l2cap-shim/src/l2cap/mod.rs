//! L2CAP (Logical Link Control and Adaptation Protocol) channel shim
//!
//! This module provides the connection-oriented channel layer between
//! upper-layer services and a transport engine, which is responsible for:
//! - Protocol/Service Multiplexer (PSM) registration and allocation
//! - Tracking open channels and the service owning each of them
//! - Turning engine callbacks into service upcalls

pub mod constants;
pub mod types;
pub mod psm;
pub mod channel;
pub mod engine;
pub mod core;

// Re-export the public API
pub use self::types::*;
pub use self::core::{L2capShim, ServiceCallbacks, ServiceHandle, ShimConfig};
pub use self::channel::ChannelTable;
pub use self::engine::{pending_operation, Completion, PendingOperation, TransportEngine};
pub use self::psm::{PsmAllocator, PsmRegistry};
