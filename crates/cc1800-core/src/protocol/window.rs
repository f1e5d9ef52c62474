//! Memory windows and their wire encoding.
//!
//! Both the address and the length word travel split across the `wValue`
//! (bits 31:16) and `wIndex` (bits 15:0) fields of a vendor request. The
//! length word additionally carries the direction of the next bulk transfer
//! in bit 31.

use std::fmt;

use crate::error::BootError;
use crate::protocol::constants::{DIRECTION_BIT, LENGTH_MASK, MAX_TRANSFER_LEN};

/// Direction of the bulk transfer following a `SET_LENGTH` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device -> host (download).
    Read,
    /// Host -> device (upload).
    Write,
}

impl Direction {
    pub fn is_write(&self) -> bool {
        matches!(self, Direction::Write)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => write!(f, "read"),
            Direction::Write => write!(f, "write"),
        }
    }
}

/// One address/length/direction triple, valid for a single bulk transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryWindow {
    pub address: u32,
    pub length: u32,
    pub direction: Direction,
}

impl MemoryWindow {
    /// Build a window, rejecting empty, oversized and wrapping windows.
    pub fn new(address: u32, length: u32, direction: Direction) -> Result<Self, BootError> {
        if length == 0 {
            return Err(BootError::InvalidArgument(format!(
                "zero-length {} at 0x{:08X}",
                direction, address
            )));
        }
        if length > MAX_TRANSFER_LEN {
            return Err(BootError::InvalidArgument(format!(
                "length 0x{:X} exceeds maximum 0x{:X}",
                length, MAX_TRANSFER_LEN
            )));
        }
        if address.checked_add(length - 1).is_none() {
            return Err(BootError::InvalidArgument(format!(
                "window 0x{:08X}+0x{:X} wraps past the 32-bit address space",
                address, length
            )));
        }
        Ok(Self {
            address,
            length,
            direction,
        })
    }

    /// Window for a device -> host transfer.
    pub fn read(address: u32, length: u32) -> Result<Self, BootError> {
        Self::new(address, length, Direction::Read)
    }

    /// Window for a host -> device transfer of `len` bytes.
    pub fn write(address: u32, len: usize) -> Result<Self, BootError> {
        let length = u32::try_from(len).map_err(|_| {
            BootError::InvalidArgument(format!("payload of {} bytes does not fit 32 bits", len))
        })?;
        Self::new(address, length, Direction::Write)
    }

    /// Length word as sent by `SET_LENGTH`.
    pub fn length_word(&self) -> u32 {
        encode_length(self.length, self.direction.is_write())
    }

    pub fn len(&self) -> usize {
        self.length as usize
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl fmt::Display for MemoryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} 0x{:08X}..0x{:08X} ({} bytes)",
            self.direction,
            self.address,
            self.address as u64 + self.length as u64,
            self.length
        )
    }
}

/// Split a 32-bit word into `(wValue, wIndex)`.
#[inline]
pub const fn split_word(word: u32) -> (u16, u16) {
    ((word >> 16) as u16, word as u16)
}

/// Encode a transfer length with the direction bit.
///
/// Only the low 31 bits of `len` survive; bit 31 is set for uploads and
/// cleared for downloads.
#[inline]
pub const fn encode_length(len: u32, for_write: bool) -> u32 {
    if for_write {
        len | DIRECTION_BIT
    } else {
        len & LENGTH_MASK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_word() {
        assert_eq!(split_word(0), (0, 0));
        assert_eq!(split_word(0xFFFF_FFFF), (0xFFFF, 0xFFFF));
        assert_eq!(split_word(0x1234_5678), (0x1234, 0x5678));
        assert_eq!(split_word(0x0000_1000), (0x0000, 0x1000));
    }

    #[test]
    fn test_encode_length_direction_bit() {
        for len in [1u32, 16, 0x1234, 0x7FFF_FFFF] {
            let up = encode_length(len, true);
            assert_eq!(up & DIRECTION_BIT, DIRECTION_BIT);
            assert_eq!(up & LENGTH_MASK, len);

            let down = encode_length(len, false);
            assert_eq!(down & DIRECTION_BIT, 0);
            assert_eq!(down & LENGTH_MASK, len);
        }
        assert_eq!(encode_length(0x7FFF_FFFF, true), 0xFFFF_FFFF);
        assert_eq!(encode_length(0x7FFF_FFFF, false), 0x7FFF_FFFF);
    }

    #[test]
    fn test_encode_length_clears_stray_bit() {
        assert_eq!(encode_length(0x8000_0010, false), 0x10);
    }

    #[test]
    fn test_window_rejects_zero_length() {
        assert!(matches!(
            MemoryWindow::read(0x1000, 0),
            Err(BootError::InvalidArgument(_))
        ));
        assert!(matches!(
            MemoryWindow::write(0x1000, 0),
            Err(BootError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_window_rejects_oversized_and_wrapping() {
        assert!(MemoryWindow::read(0, 0x8000_0000).is_err());
        assert!(MemoryWindow::read(0xFFFF_FFF0, 0x20).is_err());
        assert!(MemoryWindow::read(0xFFFF_FFF0, 0x10).is_ok());
    }

    #[test]
    fn test_window_length_word() {
        let w = MemoryWindow::write(0x1000, 16).unwrap();
        assert_eq!(w.length_word(), 0x8000_0010);
        let r = MemoryWindow::read(0x1000, 16).unwrap();
        assert_eq!(r.length_word(), 0x0000_0010);
    }
}
