//! Protocol constants for the CC1800 USB mask-ROM boot mode.

use std::time::Duration;

// ============================================================================
// Device Identification
// ============================================================================

/// ChinaChip vendor ID reported by the boot ROM.
pub const CC1800_VENDOR_ID: u16 = 0x2009;

/// CC1800 boot ROM product ID.
pub const CC1800_PRODUCT_ID: u16 = 0x1218;

/// USB configuration selected before claiming the boot interface.
pub const CC1800_CONFIGURATION: u8 = 1;

/// Interface carrying the control requests and the bulk endpoint.
pub const CC1800_INTERFACE: u8 = 0;

// ============================================================================
// Vendor Requests (bRequest)
// ============================================================================

/// Read the 8-byte CPU info string.
pub const REQ_GET_CPU_INFO: u8 = 0x00;

/// Set the read/write address (wValue = bits 31:16, wIndex = bits 15:0).
pub const REQ_SET_ADDRESS: u8 = 0x01;

/// Set the read/write length, direction in bit 31.
pub const REQ_SET_LENGTH: u8 = 0x02;

/// Read one status byte. Semantics unknown.
pub const REQ_GET_STATUS: u8 = 0x03;

/// Jump to the last set address.
pub const REQ_EXECUTE: u8 = 0x04;

// ============================================================================
// Payload Sizes
// ============================================================================

pub const CPU_INFO_LEN: usize = 8;
pub const STATUS_LEN: usize = 1;

// ============================================================================
// Length Word Encoding
// ============================================================================

/// Set in the length word when the next bulk transfer is host -> device.
pub const DIRECTION_BIT: u32 = 0x8000_0000;

/// Bits of the length word that carry the byte count.
pub const LENGTH_MASK: u32 = !DIRECTION_BIT;

/// Largest transfer the length word can describe.
pub const MAX_TRANSFER_LEN: u32 = LENGTH_MASK;

// ============================================================================
// Endpoints
// ============================================================================

/// Bulk endpoint number used for payloads.
pub const BULK_ENDPOINT: u8 = 1;
pub const BULK_OUT_ADDRESS: u8 = BULK_ENDPOINT;
pub const BULK_IN_ADDRESS: u8 = 0x80 | BULK_ENDPOINT;

// ============================================================================
// Timing
// ============================================================================

pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Per-transfer timeout used when the caller does not supply one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(DEFAULT_TIMEOUT_MS);
