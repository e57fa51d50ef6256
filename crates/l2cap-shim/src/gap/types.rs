use crate::error::AddressParseError;
use std::fmt;
use std::str::FromStr;

/// Bluetooth device address.
///
/// Bytes are stored least significant first, the way they travel over HCI;
/// the textual form prints the most significant octet first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BdAddr {
    pub bytes: [u8; 6],
}

impl BdAddr {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.bytes[5],
            self.bytes[4],
            self.bytes[3],
            self.bytes[2],
            self.bytes[1],
            self.bytes[0]
        )
    }
}

impl FromStr for BdAddr {
    type Err = AddressParseError;

    /// Parses `AA:BB:CC:DD:EE:FF` (most significant octet first).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<&str> = s.split(':').collect();
        if octets.len() != 6 || octets.iter().any(|octet| octet.len() != 2) {
            return Err(AddressParseError::Malformed(s.to_string()));
        }

        let mut bytes_be = [0u8; 6];
        hex::decode_to_slice(octets.concat(), &mut bytes_be)?;
        bytes_be.reverse();
        Ok(Self { bytes: bytes_be })
    }
}
