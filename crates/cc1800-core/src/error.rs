//! Errors surfaced by the protocol, composite and sequencer layers.

use thiserror::Error;

use crate::protocol::Direction;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum BootError {
    /// A control or bulk transfer failed or timed out.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Short {direction} at 0x{address:08X}: {actual} of {expected} bytes transferred")]
    ShortTransfer {
        direction: Direction,
        address: u32,
        expected: usize,
        actual: usize,
    },

    #[error(
        "Verify mismatch at 0x{address:08X} (offset {offset}): wrote 0x{expected:02X}, read back 0x{actual:02X}"
    )]
    VerifyMismatch {
        address: u32,
        offset: usize,
        expected: u8,
        actual: u8,
    },

    /// The liveness probe before an operation failed.
    #[error("Device not responding before operation {index}: {source}")]
    DeviceUnresponsive {
        index: usize,
        #[source]
        source: TransportError,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BootError>;
