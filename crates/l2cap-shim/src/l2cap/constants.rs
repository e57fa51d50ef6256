//! L2CAP constants: PSM ranges, channel identifiers and defaults

use super::types::ChannelId;

// Well-known PSM values (Bluetooth assigned numbers)
pub const PSM_SDP: u16 = 0x0001;
pub const PSM_RFCOMM: u16 = 0x0003;
pub const PSM_BNEP: u16 = 0x000F;
pub const PSM_HID_CONTROL: u16 = 0x0011;
pub const PSM_HID_INTERRUPT: u16 = 0x0013;
pub const PSM_AVCTP: u16 = 0x0017;
pub const PSM_AVDTP: u16 = 0x0019;
pub const PSM_AVCTP_BROWSING: u16 = 0x001B;
pub const PSM_ATT: u16 = 0x001F;

/// First classic dynamic PSM; anything below is a fixed, well-known PSM
pub const CLASSIC_DYNAMIC_PSM_MIN: u16 = 0x1001;
/// Last classic dynamic PSM (high byte even)
pub const CLASSIC_DYNAMIC_PSM_MAX: u16 = 0x7EFF;

/// Vendor reserved classic PSMs, never handed out dynamically
pub const RESERVED_PSM_START: u16 = 0x5AE1;
pub const RESERVED_PSM_END: u16 = 0x5AFF;

/// Virtual PSMs disambiguate outgoing-only connections sharing a client PSM
pub const CLASSIC_VIRTUAL_PSM_MIN: u16 = 0x8001;
pub const CLASSIC_VIRTUAL_PSM_MAX: u16 = 0xFEFF;

/// LE credit based PSM dynamic range
pub const LE_DYNAMIC_PSM_MIN: u16 = 0x0080;
pub const LE_DYNAMIC_PSM_MAX: u16 = 0x00FF;

/// "No channel" sentinel returned by a failed connect
pub const INVALID_CID: ChannelId = 0x0000;

/// MTU advertised when registering a service, unless configured otherwise
pub const L2CAP_DEFAULT_SERVICE_MTU: u16 = 1000;

/// Prefix of the diagnostic dump lines
pub const DUMP_TAG: &str = "shim::legacy::l2cap";

/// Identifier passed to connect indications; responses are correlated by the
/// transport engine, never by the upper layer
pub const UNUSED_SIGNAL_ID: u8 = 0;

/// Result code carried by disconnect confirmations
pub const UNUSED_RESULT: u16 = 0;

/// Closures reported to services never require a disconnect response
pub const DISCONNECT_RESPONSE_REQUIRED: bool = false;
