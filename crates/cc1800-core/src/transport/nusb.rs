//! nusb-based USB transport implementation.

use std::time::Duration;

use nusb::transfer::{
    Buffer, Bulk, ControlIn, ControlOut, ControlType, In, Out, Recipient, TransferError,
};
use nusb::{Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument, trace};

use super::traits::{TransportError, UsbTransport};
use crate::config::ToolConfig;
use crate::protocol::SetupPacket;
use crate::protocol::constants::{
    CC1800_CONFIGURATION, CC1800_INTERFACE, CC1800_PRODUCT_ID, CC1800_VENDOR_ID,
};

/// Largest single bulk submission; longer payloads are split.
const MAX_BULK_CHUNK: usize = 64 * 1024;

/// nusb-based USB transport.
pub struct NusbTransport {
    interface: Interface,
    vid: u16,
    pid: u16,
}

impl NusbTransport {
    /// Open the first CC1800 in USB boot mode.
    pub fn open() -> Result<Self, TransportError> {
        Self::open_with_ids(CC1800_VENDOR_ID, CC1800_PRODUCT_ID)
    }

    /// Open a device with specific VID/PID.
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self, TransportError> {
        Self::open_device(vid, pid, CC1800_CONFIGURATION, CC1800_INTERFACE)
    }

    /// Open the device described by a tool configuration.
    pub fn open_with_config(config: &ToolConfig) -> Result<Self, TransportError> {
        Self::open_device(
            config.vendor_id,
            config.product_id,
            config.configuration,
            config.interface,
        )
    }

    #[instrument(level = "info", fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    fn open_device(
        vid: u16,
        pid: u16,
        configuration: u8,
        interface: u8,
    ) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        info!(
            bus = %device_info.bus_id(),
            address = device_info.device_address(),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let active = device
            .active_configuration()
            .map(|c| c.configuration_value())
            .ok();
        if active != Some(configuration) {
            device
                .set_configuration(configuration)
                .wait()
                .map_err(|e| TransportError::ConfigurationFailed {
                    configuration,
                    message: e.to_string(),
                })?;
        }

        let iface = device.claim_interface(interface).wait().map_err(|e| {
            TransportError::ClaimInterfaceFailed {
                interface,
                message: e.to_string(),
            }
        })?;

        info!(configuration, interface, "Device opened successfully");

        Ok(Self {
            interface: iface,
            vid,
            pid,
        })
    }
}

fn map_transfer_error(e: TransferError, timeout: Duration, request: &str) -> TransportError {
    match e {
        TransferError::Cancelled => TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        },
        TransferError::Disconnected => TransportError::Disconnected,
        other => TransportError::ControlFailed {
            request: request.to_string(),
            message: other.to_string(),
        },
    }
}

impl UsbTransport for NusbTransport {
    #[instrument(level = "trace", skip(self), fields(request = setup.name()))]
    fn control_in(
        &self,
        setup: &SetupPacket,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let data = self
            .interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: setup.request,
                    value: setup.value,
                    index: setup.index,
                    length: setup.length,
                },
                timeout,
            )
            .wait()
            .map_err(|e| map_transfer_error(e, timeout, setup.name()))?;

        trace!(bytes = data.len(), "Control IN complete");
        Ok(data)
    }

    #[instrument(level = "trace", skip(self, data), fields(request = setup.name()))]
    fn control_out(
        &self,
        setup: &SetupPacket,
        data: &[u8],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: setup.request,
                    value: setup.value,
                    index: setup.index,
                    data,
                },
                timeout,
            )
            .wait()
            .map_err(|e| map_transfer_error(e, timeout, setup.name()))
    }

    #[instrument(skip(self, data), fields(len = data.len()))]
    fn bulk_write(
        &self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut ep = self
            .interface
            .endpoint::<Bulk, Out>(endpoint)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        let mut written = 0;
        for chunk in data.chunks(MAX_BULK_CHUNK) {
            let mut buf = Buffer::new(chunk.len());
            buf.extend_from_slice(chunk);

            let completion = ep.transfer_blocking(buf, timeout);
            completion.status.map_err(|e| match e {
                TransferError::Cancelled => TransportError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                },
                TransferError::Disconnected => TransportError::Disconnected,
                other => TransportError::WriteFailed(format!(
                    "bulk write failed at offset {}: {}",
                    written, other
                )),
            })?;

            written += completion.actual_len;
            if completion.actual_len < chunk.len() {
                break;
            }
        }

        debug!(bytes_written = written, "Write complete");
        Ok(written)
    }

    #[instrument(skip(self))]
    fn bulk_read(
        &self,
        endpoint: u8,
        len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut ep = self
            .interface
            .endpoint::<Bulk, In>(endpoint)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

        let max_packet_size = ep.max_packet_size();
        let mut result = Vec::with_capacity(len);

        while result.len() < len {
            let remaining = len - result.len();
            let request_len = remaining.min(MAX_BULK_CHUNK);
            // IN requests must be a multiple of the max packet size
            let aligned_len = request_len.div_ceil(max_packet_size) * max_packet_size;

            let mut buf = Buffer::new(aligned_len);
            buf.set_requested_len(aligned_len);

            let completion = ep.transfer_blocking(buf, timeout);
            let received = completion.into_result().map_err(|e| match e {
                TransferError::Cancelled => TransportError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                },
                TransferError::Disconnected => TransportError::Disconnected,
                other => TransportError::ReadFailed(format!(
                    "bulk read failed at offset {}: {}",
                    result.len(),
                    other
                )),
            })?;

            let take = received.len().min(remaining);
            result.extend_from_slice(&received[..take]);

            // Short packet ends the transfer
            if received.len() < request_len {
                break;
            }
        }

        debug!(bytes_read = result.len(), "Read complete");
        Ok(result)
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
