//! Device session wrapper.
//!
//! The boot ROM keeps one address register and one length/direction
//! register per session, and every bulk transfer and `EXECUTE` acts on
//! whatever was last written to them. [`Cc1800Device`] mirrors those
//! registers on the host side and only exposes the bulk endpoint through an
//! [`ArmedTransfer`], which can only be obtained by issuing `SET_ADDRESS`
//! and `SET_LENGTH` for the window first.

use std::marker::PhantomData;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{BootError, Result};
use crate::protocol::requests::{self, bulk_read, bulk_write};
use crate::protocol::{CpuInfo, DEFAULT_TIMEOUT, Direction, MemoryWindow};
use crate::transport::UsbTransport;

/// Compile-time direction of an armed transfer.
pub trait TransferDirection {
    const DIRECTION: Direction;
}

/// Host -> device.
#[derive(Debug)]
pub enum Upload {}

/// Device -> host.
#[derive(Debug)]
pub enum Download {}

impl TransferDirection for Upload {
    const DIRECTION: Direction = Direction::Write;
}

impl TransferDirection for Download {
    const DIRECTION: Direction = Direction::Read;
}

/// A borrowed, open CC1800 boot session.
pub struct Cc1800Device<'t, T: UsbTransport> {
    transport: &'t T,
    timeout: Duration,
    /// Last address written with SET_ADDRESS in this session.
    address: Option<u32>,
    /// Last window fully armed (address and length) in this session.
    armed: Option<MemoryWindow>,
}

impl<'t, T: UsbTransport> Cc1800Device<'t, T> {
    pub fn new(transport: &'t T) -> Self {
        Self {
            transport,
            timeout: DEFAULT_TIMEOUT,
            address: None,
            armed: None,
        }
    }

    /// Override the per-transfer timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn transport(&self) -> &'t T {
        self.transport
    }

    /// Last window armed in this session, if any.
    pub fn armed_window(&self) -> Option<MemoryWindow> {
        self.armed
    }

    pub fn cpu_info(&mut self) -> Result<CpuInfo> {
        Ok(requests::get_cpu_info(self.transport, self.timeout)?)
    }

    /// Read the status byte. **Unsupported**, see [`requests::get_status`].
    pub fn experimental_status(&mut self) -> Result<u8> {
        warn!("GET_STATUS is unsupported and may change the boot path");
        Ok(requests::get_status(self.transport, self.timeout)?)
    }

    /// Arm a host -> device transfer of `len` bytes at `address`.
    pub fn arm_upload(
        &mut self,
        address: u32,
        len: usize,
    ) -> Result<ArmedTransfer<'_, 't, T, Upload>> {
        let window = MemoryWindow::write(address, len)?;
        self.arm(window)
    }

    /// Arm a device -> host transfer of `length` bytes at `address`.
    pub fn arm_download(
        &mut self,
        address: u32,
        length: u32,
    ) -> Result<ArmedTransfer<'_, 't, T, Download>> {
        let window = MemoryWindow::read(address, length)?;
        self.arm(window)
    }

    fn arm<D: TransferDirection>(
        &mut self,
        window: MemoryWindow,
    ) -> Result<ArmedTransfer<'_, 't, T, D>> {
        debug_assert_eq!(window.direction, D::DIRECTION);
        debug!(window = %window, "Arming transfer");

        // Whatever happens below, the old window is no longer trustworthy
        self.armed = None;
        requests::set_address(self.transport, window.address, self.timeout)?;
        self.address = Some(window.address);
        requests::set_length(
            self.transport,
            window.length,
            window.direction.is_write(),
            self.timeout,
        )?;
        self.armed = Some(window);

        Ok(ArmedTransfer {
            device: self,
            window,
            _direction: PhantomData,
        })
    }

    /// Jump to the last address set in the device.
    ///
    /// The ROM cannot report whether an address was ever set. When this
    /// session has not set one, the request is still issued and the device
    /// runs whatever address it holds from before.
    pub fn execute(&mut self) -> Result<Option<u32>> {
        match self.address {
            Some(address) => info!(address = %format!("0x{:08X}", address), "Executing"),
            None => warn!("Executing without an address set in this session"),
        }
        requests::execute(self.transport, self.timeout)?;
        Ok(self.address)
    }
}

/// Proof that SET_ADDRESS and SET_LENGTH were issued for `window`.
///
/// Consumed by the single bulk transfer it allows.
pub struct ArmedTransfer<'d, 't, T: UsbTransport, D: TransferDirection> {
    device: &'d mut Cc1800Device<'t, T>,
    window: MemoryWindow,
    _direction: PhantomData<D>,
}

impl<T: UsbTransport, D: TransferDirection> ArmedTransfer<'_, '_, T, D> {
    pub fn window(&self) -> MemoryWindow {
        self.window
    }
}

impl<T: UsbTransport> ArmedTransfer<'_, '_, T, Upload> {
    /// Send `data`, which must be exactly the armed length.
    pub fn write(self, data: &[u8]) -> Result<usize> {
        if data.len() != self.window.len() {
            return Err(BootError::InvalidArgument(format!(
                "payload is {} bytes but window is {}",
                data.len(),
                self.window.length
            )));
        }
        let written = bulk_write(self.device.transport, data, self.device.timeout)?;
        if written < data.len() {
            return Err(BootError::ShortTransfer {
                direction: Direction::Write,
                address: self.window.address,
                expected: data.len(),
                actual: written,
            });
        }
        Ok(written)
    }
}

impl<T: UsbTransport> ArmedTransfer<'_, '_, T, Download> {
    /// Receive exactly the armed length.
    pub fn read(self) -> Result<Vec<u8>> {
        let expected = self.window.len();
        let mut data = bulk_read(self.device.transport, expected, self.device.timeout)?;
        if data.len() < expected {
            return Err(BootError::ShortTransfer {
                direction: Direction::Read,
                address: self.window.address,
                expected,
                actual: data.len(),
            });
        }
        data.truncate(expected);
        Ok(data)
    }
}
