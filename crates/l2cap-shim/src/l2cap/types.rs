//! Type definitions for L2CAP operations
//!
//! This module contains the data structures exchanged between services, the
//! channel shim and the transport engine.

use std::fmt;

use bitflags::bitflags;
use thiserror::Error;

use crate::gap::BdAddr;

/// Channel Identifier assigned by the transport engine
pub type ChannelId = u16;

/// Error types specific to L2CAP operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum L2capError {
    #[error("PSM 0x{0:04x} has no registered service")]
    PsmNotRegistered(u16),

    #[error("Channel 0x{0:04x} not found")]
    ChannelNotFound(ChannelId),

    #[error("Channel 0x{0:04x} is already closing")]
    ChannelClosing(ChannelId),

    #[error("Refusing to write an empty payload on channel 0x{0:04x}")]
    EmptyPayload(ChannelId),

    #[error("Connection to psm 0x{psm:04x} at {address} failed")]
    ConnectionFailed { psm: u16, address: BdAddr },

    #[error("Transport engine dropped the pending {0} operation")]
    EngineDropped(&'static str),

    #[error("{0} PSM space exhausted")]
    PsmSpaceExhausted(ConnectionType),
}

/// Result type for L2CAP operations
pub type L2capResult<T> = std::result::Result<T, L2capError>;

/// Connection types for L2CAP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionType {
    /// Classic Bluetooth connection (ACL)
    Classic,
    /// Bluetooth Low Energy connection (LE)
    LE,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classic => write!(f, "Classic"),
            Self::LE => write!(f, "LE"),
        }
    }
}

/// Retransmission and Flow Control modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetransmissionMode {
    /// Basic L2CAP mode (no retransmission or flow control)
    Basic = 0,
    /// Retransmission mode
    Retransmission = 1,
    /// Flow control mode
    FlowControl = 2,
    /// Enhanced Retransmission mode
    EnhancedRetransmission = 3,
    /// Streaming mode
    Streaming = 4,
}

/// Channel mode preference supplied by a service at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErtmInfo {
    pub preferred_mode: RetransmissionMode,
}

/// Channel mode requested from the transport engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Basic,
    EnhancedRetransmission,
}

impl ChannelMode {
    /// Enhanced retransmission is only requested when the service asks for it
    pub fn from_preference(ertm_info: Option<&ErtmInfo>) -> Self {
        match ertm_info {
            Some(info) if info.preferred_mode == RetransmissionMode::EnhancedRetransmission => {
                ChannelMode::EnhancedRetransmission
            }
            _ => ChannelMode::Basic,
        }
    }
}

/// Quality of Service (QoS) Flow Specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QosFlowSpec {
    /// QoS service type
    pub service_type: u8,
    /// Token rate (bytes/second)
    pub token_rate: u32,
    /// Token bucket size (bytes)
    pub token_bucket_size: u32,
    /// Peak bandwidth (bytes/second)
    pub peak_bandwidth: u32,
    /// Latency (microseconds)
    pub latency: u32,
    /// Delay variation (microseconds)
    pub delay_variation: u32,
}

/// Retransmission and Flow Control configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetransmissionFlowControl {
    pub mode: RetransmissionMode,
    pub tx_window_size: u8,
    pub max_retransmit: u8,
    /// Acknowledgment timeout (ms)
    pub retransmit_timeout: u16,
    /// Monitor timeout (ms)
    pub monitor_timeout: u16,
    pub max_pdu_size: u16,
}

/// Extended Flow Specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedFlowSpec {
    pub identifier: u8,
    pub service_type: u8,
    pub max_sdu_size: u16,
    pub sdu_inter_arrival_time: u32,
    pub access_latency: u32,
    pub flush_timeout: u32,
}

/// Result of a configuration exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigResult {
    Success = 0,
    UnacceptableParameters = 1,
    Rejected = 2,
    UnknownOptions = 3,
    Pending = 4,
    FlowSpecRejected = 5,
}

bitflags! {
    /// Optional configuration parameters carried by a [`ConfigInfo`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConfigPresent: u8 {
        const MTU = 0x01;
        const QOS = 0x02;
        const FLUSH_TIMEOUT = 0x04;
        const FCR = 0x08;
        const FCS = 0x10;
        const EXT_FLOW_SPEC = 0x20;
    }
}

/// Channel configuration as seen by the upper layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigInfo {
    pub result: ConfigResult,
    pub mtu: Option<u16>,
    pub qos: Option<QosFlowSpec>,
    pub flush_timeout: Option<u16>,
    pub fcr: Option<RetransmissionFlowControl>,
    pub fcs: Option<u8>,
    pub ext_flow_spec: Option<ExtendedFlowSpec>,
    pub flags: u16,
}

impl ConfigInfo {
    /// Successful configuration with no optional parameters
    pub fn accepted() -> Self {
        Self {
            result: ConfigResult::Success,
            mtu: None,
            qos: None,
            flush_timeout: None,
            fcr: None,
            fcs: None,
            ext_flow_spec: None,
            flags: 0,
        }
    }

    /// Which optional parameters are present
    pub fn present(&self) -> ConfigPresent {
        let mut present = ConfigPresent::empty();
        present.set(ConfigPresent::MTU, self.mtu.is_some());
        present.set(ConfigPresent::QOS, self.qos.is_some());
        present.set(ConfigPresent::FLUSH_TIMEOUT, self.flush_timeout.is_some());
        present.set(ConfigPresent::FCR, self.fcr.is_some());
        present.set(ConfigPresent::FCS, self.fcs.is_some());
        present.set(ConfigPresent::EXT_FLOW_SPEC, self.ext_flow_spec.is_some());
        present
    }
}

impl Default for ConfigInfo {
    fn default() -> Self {
        Self::accepted()
    }
}

/// Outcome reported by a connect confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectResult {
    Success = 0,
    Failed = 1,
}

/// Lifecycle state of a channel as tracked by the shim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L2capChannelState {
    /// Channel is not open
    Closed,
    /// Channel is open and ready for data transfer
    Open,
    /// A local disconnect is waiting for the engine to confirm closure
    WaitDisconnect,
}

impl fmt::Display for L2capChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::WaitDisconnect => write!(f, "Waiting for disconnection"),
        }
    }
}

/// Message envelope used to hand inbound payloads to services
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct L2capMessage {
    /// Offset of the payload within `data`
    pub offset: u16,
    /// Layer specific tag, zero when produced by the shim
    pub layer_specific: u16,
    data: Vec<u8>,
}

impl L2capMessage {
    /// Wrap an inbound payload
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            offset: 0,
            layer_specific: 0,
            data: payload,
        }
    }

    /// Payload bytes, starting at `offset`
    pub fn payload(&self) -> &[u8] {
        self.data.get(self.offset as usize..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.payload().len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload().is_empty()
    }

    pub fn into_payload(mut self) -> Vec<u8> {
        self.data.split_off((self.offset as usize).min(self.data.len()))
    }
}
