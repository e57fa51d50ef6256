//! Generic Access Profile types shared by the channel layer

pub mod types;

pub use self::types::BdAddr;
