//! USB Transport layer abstraction.
//!
//! Defines the `UsbTransport` trait for USB communication,
//! allowing different implementations (nusb, mock, etc.).

use std::time::Duration;

use crate::protocol::SetupPacket;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to set configuration {configuration}: {message}")]
    ConfigurationFailed { configuration: u8, message: String },

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Control request {request} failed: {message}")]
    ControlFailed { request: String, message: String },

    #[error("Short response to {request}: expected {expected} bytes, got {actual}")]
    ShortResponse {
        request: String,
        expected: usize,
        actual: usize,
    },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract USB transport interface.
///
/// An implementation represents one opened device with its boot interface
/// already claimed. Every call blocks for at most `timeout`.
pub trait UsbTransport: Send + Sync {
    /// Vendor control transfer with an IN data stage of `setup.length` bytes.
    ///
    /// May return fewer bytes than requested; callers check the length.
    fn control_in(&self, setup: &SetupPacket, timeout: Duration)
    -> Result<Vec<u8>, TransportError>;

    /// Vendor control transfer with an optional OUT data stage.
    fn control_out(
        &self,
        setup: &SetupPacket,
        data: &[u8],
        timeout: Duration,
    ) -> Result<(), TransportError>;

    /// Bulk OUT transfer. Returns the number of bytes the device accepted.
    fn bulk_write(&self, endpoint: u8, data: &[u8], timeout: Duration)
    -> Result<usize, TransportError>;

    /// Bulk IN transfer of up to `len` bytes.
    fn bulk_read(
        &self,
        endpoint: u8,
        len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}
