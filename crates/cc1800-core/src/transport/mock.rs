//! Mock USB transport for testing.
//!
//! Models the boot ROM closely enough to run real sequences against it:
//! a sparse memory, the address and length registers, and the direction
//! check on the bulk endpoint. Faults can be injected per request type.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::*;
use crate::protocol::{ControlDirection, SetupPacket};

/// One transport call as seen by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    ControlIn(SetupPacket),
    ControlOut(SetupPacket),
    BulkWrite { endpoint: u8, len: usize },
    BulkRead { endpoint: u8, len: usize },
}

#[derive(Debug, Default)]
struct Faults {
    /// Number of CPU info probes that succeed before every further one fails.
    cpu_info_budget: Option<usize>,
    /// Bytes returned by GET_CPU_INFO.
    cpu_info_len: Option<usize>,
    /// Cap on bytes accepted by a bulk write.
    short_write: Option<usize>,
    /// Cap on bytes returned by a bulk read.
    short_read: Option<usize>,
    /// Offset flipped in every bulk read.
    corrupt_offset: Option<usize>,
    /// Request code that fails at the transport level.
    failing_request: Option<u8>,
}

#[derive(Debug)]
struct DeviceModel {
    memory: BTreeMap<u32, u8>,
    address: u32,
    length_word: u32,
    cpu_info: [u8; CPU_INFO_LEN],
    status: u8,
    cpu_info_calls: usize,
    executed: Vec<u32>,
    calls: Vec<MockCall>,
    faults: Faults,
    connected: bool,
}

/// Mock transport backed by an in-memory device model.
pub struct MockTransport {
    model: Arc<Mutex<DeviceModel>>,
    vid: u16,
    pid: u16,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            model: Arc::new(Mutex::new(DeviceModel {
                memory: BTreeMap::new(),
                address: 0,
                length_word: 0,
                cpu_info: *b"CC1800\0\0",
                status: 0,
                cpu_info_calls: 0,
                executed: Vec::new(),
                calls: Vec::new(),
                faults: Faults::default(),
                connected: true,
            })),
            vid: CC1800_VENDOR_ID,
            pid: CC1800_PRODUCT_ID,
        }
    }

    fn model(&self) -> MutexGuard<'_, DeviceModel> {
        self.model.lock().unwrap()
    }

    /// Set the string returned by GET_CPU_INFO.
    pub fn set_cpu_info(&self, info: [u8; CPU_INFO_LEN]) {
        self.model().cpu_info = info;
    }

    /// Truncate the GET_CPU_INFO response to `len` bytes.
    pub fn set_cpu_info_len(&self, len: usize) {
        self.model().faults.cpu_info_len = Some(len);
    }

    pub fn set_status(&self, status: u8) {
        self.model().status = status;
    }

    /// Let `count` CPU info probes succeed, then time out on every later one.
    pub fn fail_cpu_info_after(&self, count: usize) {
        self.model().faults.cpu_info_budget = Some(count);
    }

    /// Accept at most `max` bytes per bulk write.
    pub fn short_bulk_write(&self, max: usize) {
        self.model().faults.short_write = Some(max);
    }

    /// Return at most `max` bytes per bulk read.
    pub fn short_bulk_read(&self, max: usize) {
        self.model().faults.short_read = Some(max);
    }

    /// Invert the byte at `offset` of every bulk read.
    pub fn corrupt_readback(&self, offset: usize) {
        self.model().faults.corrupt_offset = Some(offset);
    }

    /// Fail every control request with this code.
    pub fn fail_request(&self, request: u8) {
        self.model().faults.failing_request = Some(request);
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        self.model().connected = false;
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        self.model().connected = true;
    }

    /// Get all captured calls.
    pub fn calls(&self) -> Vec<MockCall> {
        self.model().calls.clone()
    }

    /// Addresses at which EXECUTE was received.
    pub fn executed(&self) -> Vec<u32> {
        self.model().executed.clone()
    }

    pub fn address(&self) -> u32 {
        self.model().address
    }

    pub fn length_word(&self) -> u32 {
        self.model().length_word
    }

    /// Preload device memory.
    pub fn poke(&self, address: u32, data: &[u8]) {
        let mut model = self.model();
        for (i, &b) in data.iter().enumerate() {
            model.memory.insert(address.wrapping_add(i as u32), b);
        }
    }

    /// Inspect device memory. Unwritten bytes read as zero.
    pub fn peek(&self, address: u32, len: usize) -> Vec<u8> {
        let model = self.model();
        (0..len)
            .map(|i| {
                *model
                    .memory
                    .get(&address.wrapping_add(i as u32))
                    .unwrap_or(&0)
            })
            .collect()
    }

    /// Set VID/PID reported by the transport.
    pub fn set_ids(&mut self, vid: u16, pid: u16) {
        self.vid = vid;
        self.pid = pid;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceModel {
    fn check(&self, setup: &SetupPacket) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        if self.faults.failing_request == Some(setup.request) {
            return Err(TransportError::ControlFailed {
                request: setup.name().to_string(),
                message: "pipe error".into(),
            });
        }
        Ok(())
    }

    /// Decode the SETUP stage the way the ROM sees it on the wire. Anything
    /// that is not a vendor request in the expected direction stalls.
    fn decode(
        &self,
        setup: &SetupPacket,
        direction: ControlDirection,
    ) -> Result<SetupPacket, TransportError> {
        match SetupPacket::from_bytes(&setup.to_bytes()) {
            Some(decoded) if decoded.direction == direction => Ok(decoded),
            _ => Err(TransportError::ControlFailed {
                request: setup.name().to_string(),
                message: "stall".into(),
            }),
        }
    }

    fn armed_len(&self) -> usize {
        (self.length_word & LENGTH_MASK) as usize
    }
}

impl UsbTransport for MockTransport {
    fn control_in(
        &self,
        setup: &SetupPacket,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut model = self.model();
        model.calls.push(MockCall::ControlIn(*setup));
        model.check(setup)?;
        let setup = model.decode(setup, ControlDirection::In)?;

        match setup.request {
            REQ_GET_CPU_INFO => {
                model.cpu_info_calls += 1;
                if let Some(budget) = model.faults.cpu_info_budget
                    && model.cpu_info_calls > budget
                {
                    return Err(TransportError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                let len = model
                    .faults
                    .cpu_info_len
                    .unwrap_or(CPU_INFO_LEN)
                    .min(setup.length as usize);
                Ok(model.cpu_info[..len.min(CPU_INFO_LEN)].to_vec())
            }
            REQ_GET_STATUS => Ok(vec![model.status]),
            _ => Err(TransportError::ControlFailed {
                request: setup.name().to_string(),
                message: "stall".into(),
            }),
        }
    }

    fn control_out(
        &self,
        setup: &SetupPacket,
        _data: &[u8],
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        let mut model = self.model();
        model.calls.push(MockCall::ControlOut(*setup));
        model.check(setup)?;
        let setup = model.decode(setup, ControlDirection::Out)?;

        match setup.request {
            REQ_SET_ADDRESS => model.address = setup.word(),
            REQ_SET_LENGTH => model.length_word = setup.word(),
            REQ_EXECUTE => {
                let address = model.address;
                model.executed.push(address);
            }
            _ => {
                return Err(TransportError::ControlFailed {
                    request: setup.name().to_string(),
                    message: "stall".into(),
                });
            }
        }
        Ok(())
    }

    fn bulk_write(
        &self,
        endpoint: u8,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut model = self.model();
        model.calls.push(MockCall::BulkWrite {
            endpoint,
            len: data.len(),
        });
        if !model.connected {
            return Err(TransportError::Disconnected);
        }
        if endpoint != BULK_OUT_ADDRESS || model.length_word & DIRECTION_BIT == 0 {
            return Err(TransportError::WriteFailed("endpoint stalled".into()));
        }

        let mut n = data.len().min(model.armed_len());
        if let Some(max) = model.faults.short_write {
            n = n.min(max);
        }
        let base = model.address;
        for (i, &b) in data[..n].iter().enumerate() {
            model.memory.insert(base.wrapping_add(i as u32), b);
        }
        Ok(n)
    }

    fn bulk_read(
        &self,
        endpoint: u8,
        len: usize,
        _timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut model = self.model();
        model.calls.push(MockCall::BulkRead { endpoint, len });
        if !model.connected {
            return Err(TransportError::Disconnected);
        }
        if endpoint != BULK_IN_ADDRESS || model.length_word & DIRECTION_BIT != 0 {
            return Err(TransportError::ReadFailed("endpoint stalled".into()));
        }

        let mut n = len.min(model.armed_len());
        if let Some(max) = model.faults.short_read {
            n = n.min(max);
        }
        let base = model.address;
        let mut out: Vec<u8> = (0..n)
            .map(|i| *model.memory.get(&base.wrapping_add(i as u32)).unwrap_or(&0))
            .collect();
        if let Some(offset) = model.faults.corrupt_offset
            && offset < out.len()
        {
            out[offset] ^= 0xFF;
        }
        Ok(out)
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
