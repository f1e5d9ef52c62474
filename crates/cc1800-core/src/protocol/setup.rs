//! USB SETUP packet rendering for vendor requests.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::Cursor;

use crate::protocol::constants::*;
use crate::protocol::window::split_word;

/// bmRequestType bits for a vendor request addressed to the device.
const TYPE_VENDOR: u8 = 0x40;
const DIR_IN: u8 = 0x80;

/// Direction of the control data stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlDirection {
    In,
    Out,
}

/// The 8-byte SETUP stage of a CC1800 vendor request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
    pub direction: ControlDirection,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    pub const SIZE: usize = 8;

    pub const fn control_in(request: u8, value: u16, index: u16, length: u16) -> Self {
        Self {
            direction: ControlDirection::In,
            request,
            value,
            index,
            length,
        }
    }

    pub const fn control_out(request: u8, value: u16, index: u16) -> Self {
        Self {
            direction: ControlDirection::Out,
            request,
            value,
            index,
            length: 0,
        }
    }

    pub const fn get_cpu_info() -> Self {
        Self::control_in(REQ_GET_CPU_INFO, 0, 0, CPU_INFO_LEN as u16)
    }

    pub const fn set_address(address: u32) -> Self {
        let (value, index) = split_word(address);
        Self::control_out(REQ_SET_ADDRESS, value, index)
    }

    pub const fn set_length(length_word: u32) -> Self {
        let (value, index) = split_word(length_word);
        Self::control_out(REQ_SET_LENGTH, value, index)
    }

    pub const fn get_status() -> Self {
        Self::control_in(REQ_GET_STATUS, 0, 0, STATUS_LEN as u16)
    }

    pub const fn execute() -> Self {
        Self::control_out(REQ_EXECUTE, 0, 0)
    }

    pub fn request_type(&self) -> u8 {
        match self.direction {
            ControlDirection::In => DIR_IN | TYPE_VENDOR,
            ControlDirection::Out => TYPE_VENDOR,
        }
    }

    /// The 32-bit word carried by `wValue:wIndex`.
    pub fn word(&self) -> u32 {
        ((self.value as u32) << 16) | self.index as u32
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0] = self.request_type();
        out[1] = self.request;
        LittleEndian::write_u16(&mut out[2..4], self.value);
        LittleEndian::write_u16(&mut out[4..6], self.index);
        LittleEndian::write_u16(&mut out[6..8], self.length);
        out
    }

    /// Parse a SETUP packet. Returns `None` for anything that is not a
    /// vendor request to the device.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        let mut cursor = Cursor::new(data);
        let request_type = cursor.read_u8().ok()?;
        if (request_type & !DIR_IN) != TYPE_VENDOR {
            return None;
        }
        let direction = if request_type & DIR_IN != 0 {
            ControlDirection::In
        } else {
            ControlDirection::Out
        };
        Some(Self {
            direction,
            request: cursor.read_u8().ok()?,
            value: cursor.read_u16::<LittleEndian>().ok()?,
            index: cursor.read_u16::<LittleEndian>().ok()?,
            length: cursor.read_u16::<LittleEndian>().ok()?,
        })
    }

    pub fn name(&self) -> &'static str {
        request_name(self.request)
    }
}

impl fmt::Display for SetupPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:02X} {:02X} {:04X} {:04X} {:04X}]",
            self.name(),
            self.request_type(),
            self.request,
            self.value,
            self.index,
            self.length
        )
    }
}

/// Human-readable name of a boot ROM request code.
pub fn request_name(request: u8) -> &'static str {
    match request {
        REQ_GET_CPU_INFO => "GET_CPU_INFO",
        REQ_SET_ADDRESS => "SET_ADDRESS",
        REQ_SET_LENGTH => "SET_LENGTH",
        REQ_GET_STATUS => "GET_STATUS",
        REQ_EXECUTE => "EXECUTE",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_address_bytes() {
        let setup = SetupPacket::set_address(0x1234_5678);
        assert_eq!(
            setup.to_bytes(),
            [0x40, 0x01, 0x34, 0x12, 0x78, 0x56, 0x00, 0x00]
        );
        assert_eq!(setup.word(), 0x1234_5678);
    }

    #[test]
    fn test_get_cpu_info_bytes() {
        let setup = SetupPacket::get_cpu_info();
        assert_eq!(
            setup.to_bytes(),
            [0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00]
        );
    }

    #[test]
    fn test_parse_back() {
        let setup = SetupPacket::set_length(0x8000_0010);
        let parsed = SetupPacket::from_bytes(&setup.to_bytes()).unwrap();
        assert_eq!(parsed, setup);
        assert_eq!(parsed.name(), "SET_LENGTH");
    }

    #[test]
    fn test_rejects_standard_request() {
        // GET_DESCRIPTOR is a standard request, not ours
        assert!(SetupPacket::from_bytes(&[0x80, 0x06, 0, 1, 0, 0, 18, 0]).is_none());
        assert!(SetupPacket::from_bytes(&[0x40, 0x01]).is_none());
    }
}
