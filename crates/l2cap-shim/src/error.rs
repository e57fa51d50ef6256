//! Error types for the l2cap-shim library
//!
//! Channel and PSM errors live in [`crate::l2cap::L2capError`]; this module
//! holds the errors of the supporting types.

use thiserror::Error;

/// Errors that can occur when parsing a Bluetooth device address
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AddressParseError {
    #[error("Address must have six colon separated octets: {0}")]
    Malformed(String),

    #[error("Invalid hex digit in address: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}
