//! The five boot ROM vendor requests and the bulk pass-throughs.
//!
//! These functions are stateless: each one encodes a single request and
//! hands it to the transport. Ordering between them (address and length
//! before a bulk transfer or `execute`) is enforced one level up, by
//! [`crate::device::Cc1800Device`].

use std::fmt;
use std::time::Duration;

use tracing::{debug, instrument, trace};

use crate::protocol::constants::*;
use crate::protocol::setup::SetupPacket;
use crate::protocol::window::encode_length;
use crate::transport::{TransportError, UsbTransport};

/// The 8-byte CPU identification string returned by `GET_CPU_INFO`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CpuInfo([u8; CPU_INFO_LEN]);

impl CpuInfo {
    pub const fn new(raw: [u8; CPU_INFO_LEN]) -> Self {
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8; CPU_INFO_LEN] {
        &self.0
    }

    /// Text up to the first NUL, non-printable bytes shown as '.'.
    pub fn as_text(&self) -> String {
        self.0
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            })
            .collect()
    }
}

impl fmt::Debug for CpuInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CpuInfo({:02X?} '{}')", self.0, self.as_text())
    }
}

impl fmt::Display for CpuInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

fn control_out<T: UsbTransport>(
    transport: &T,
    setup: SetupPacket,
    timeout: Duration,
) -> Result<(), TransportError> {
    trace!(setup = %setup, raw = ?setup.to_bytes(), "Control OUT");
    transport.control_out(&setup, &[], timeout)
}

fn control_in<T: UsbTransport>(
    transport: &T,
    setup: SetupPacket,
    timeout: Duration,
) -> Result<Vec<u8>, TransportError> {
    trace!(setup = %setup, raw = ?setup.to_bytes(), "Control IN");
    let data = transport.control_in(&setup, timeout)?;
    let expected = setup.length as usize;
    if data.len() < expected {
        return Err(TransportError::ShortResponse {
            request: setup.name().to_string(),
            expected,
            actual: data.len(),
        });
    }
    Ok(data)
}

/// GET_CPU_INFO (0x00).
#[instrument(level = "debug", skip(transport))]
pub fn get_cpu_info<T: UsbTransport>(
    transport: &T,
    timeout: Duration,
) -> Result<CpuInfo, TransportError> {
    let data = control_in(transport, SetupPacket::get_cpu_info(), timeout)?;
    let mut raw = [0u8; CPU_INFO_LEN];
    raw.copy_from_slice(&data[..CPU_INFO_LEN]);
    Ok(CpuInfo::new(raw))
}

/// SET_ADDRESS (0x01).
#[instrument(level = "debug", skip(transport), fields(address = %format!("0x{:08X}", address)))]
pub fn set_address<T: UsbTransport>(
    transport: &T,
    address: u32,
    timeout: Duration,
) -> Result<(), TransportError> {
    control_out(transport, SetupPacket::set_address(address), timeout)
}

/// SET_LENGTH (0x02).
///
/// `for_write` selects the direction of the next bulk transfer. Bit 31 of
/// `len` is replaced by the direction bit.
#[instrument(level = "debug", skip(transport))]
pub fn set_length<T: UsbTransport>(
    transport: &T,
    len: u32,
    for_write: bool,
    timeout: Duration,
) -> Result<(), TransportError> {
    let word = encode_length(len, for_write);
    debug!(length_word = %format!("0x{:08X}", word), "Encoded length");
    control_out(transport, SetupPacket::set_length(word), timeout)
}

/// GET_STATUS (0x03). **Unsupported.**
///
/// The meaning of the returned byte is unknown, and issuing this request has
/// been observed to start the NAND boot path on some boards. It is exposed
/// for experimentation only and is never used by the sequencer.
#[instrument(level = "debug", skip(transport))]
pub fn get_status<T: UsbTransport>(transport: &T, timeout: Duration) -> Result<u8, TransportError> {
    let data = control_in(transport, SetupPacket::get_status(), timeout)?;
    Ok(data[0])
}

/// EXECUTE (0x04). Jumps to the last address set with SET_ADDRESS.
#[instrument(level = "debug", skip(transport))]
pub fn execute<T: UsbTransport>(transport: &T, timeout: Duration) -> Result<(), TransportError> {
    control_out(transport, SetupPacket::execute(), timeout)
}

/// Bulk OUT on endpoint 1.
pub(crate) fn bulk_write<T: UsbTransport>(
    transport: &T,
    data: &[u8],
    timeout: Duration,
) -> Result<usize, TransportError> {
    let n = transport.bulk_write(BULK_OUT_ADDRESS, data, timeout)?;
    debug!(requested = data.len(), written = n, "Bulk write");
    Ok(n)
}

/// Bulk IN on endpoint 1.
pub(crate) fn bulk_read<T: UsbTransport>(
    transport: &T,
    len: usize,
    timeout: Duration,
) -> Result<Vec<u8>, TransportError> {
    let data = transport.bulk_read(BULK_IN_ADDRESS, len, timeout)?;
    debug!(requested = len, read = data.len(), "Bulk read");
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockCall, MockTransport};

    #[test]
    fn test_set_address_split() {
        for addr in [0u32, 0xFFFF_FFFF, 0x8001_2345] {
            let mock = MockTransport::new();
            set_address(&mock, addr, DEFAULT_TIMEOUT).unwrap();
            assert_eq!(
                mock.calls(),
                vec![MockCall::ControlOut(SetupPacket {
                    direction: crate::protocol::ControlDirection::Out,
                    request: REQ_SET_ADDRESS,
                    value: ((addr >> 16) & 0xFFFF) as u16,
                    index: (addr & 0xFFFF) as u16,
                    length: 0,
                })]
            );
        }
    }

    #[test]
    fn test_set_length_direction() {
        let mock = MockTransport::new();
        set_length(&mock, 0x7FFF_FFFF, true, DEFAULT_TIMEOUT).unwrap();
        set_length(&mock, 0x7FFF_FFFF, false, DEFAULT_TIMEOUT).unwrap();
        let calls = mock.calls();
        assert_eq!(calls[0], MockCall::ControlOut(SetupPacket::set_length(0xFFFF_FFFF)));
        assert_eq!(calls[1], MockCall::ControlOut(SetupPacket::set_length(0x7FFF_FFFF)));
        assert_eq!(mock.length_word(), 0x7FFF_FFFF);
    }

    #[test]
    fn test_get_cpu_info() {
        let mock = MockTransport::new();
        mock.set_cpu_info(*b"CC1800\0\0");
        let info = get_cpu_info(&mock, DEFAULT_TIMEOUT).unwrap();
        assert_eq!(info.as_text(), "CC1800");
        assert_eq!(info.as_bytes(), b"CC1800\0\0");
    }

    #[test]
    fn test_get_cpu_info_short() {
        let mock = MockTransport::new();
        mock.set_cpu_info_len(5);
        let err = get_cpu_info(&mock, DEFAULT_TIMEOUT).unwrap_err();
        assert!(matches!(
            err,
            TransportError::ShortResponse {
                expected: 8,
                actual: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_get_status_passthrough() {
        let mock = MockTransport::new();
        mock.set_status(0x5A);
        assert_eq!(get_status(&mock, DEFAULT_TIMEOUT).unwrap(), 0x5A);
    }

    #[test]
    fn test_cpu_info_text_masks_unprintable() {
        let info = CpuInfo::new([b'A', 0x01, b'B', 0, b'x', b'y', 0, 0]);
        assert_eq!(info.to_string(), "A.B");
    }
}
