//! Event system for UI decoupling.
//!
//! Allows CLI/TUI/GUI to subscribe to boot session events without
//! tight coupling to the core logic.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::protocol::SetupPacket;
use crate::sequencer::SequencerState;
use crate::transport::{TransportError, UsbTransport};

/// USB packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Transmit (Host -> Device)
    Rx, // Receive (Device -> Host)
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Events emitted while running a command sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum BootEvent {
    /// First probe answered by this device.
    DeviceConnected { vid: u16, pid: u16 },
    /// CPU info, reported once per run.
    CpuInfo { info: String },
    /// Sequencer state changed.
    StateChanged {
        from: SequencerState,
        to: SequencerState,
    },
    /// An operation is about to be dispatched.
    OperationStarted {
        index: usize,
        total: usize,
        operation: String,
    },
    Uploaded { address: u32, bytes: usize },
    Verified { address: u32, bytes: usize },
    /// Readback differed after a write. Advisory.
    VerifyMismatch {
        address: u32,
        offset: usize,
        expected: u8,
        actual: u8,
        count: usize,
    },
    Downloaded { address: u32, bytes: usize },
    /// EXECUTE sent; `address` is the last one set in this run, if any.
    Executed { address: Option<u32> },
    /// The sequence aborted.
    Error { message: String },
    /// USB transfer sent/received.
    Packet {
        direction: PacketDirection,
        packet_type: String,
        length: usize,
    },
    /// All operations completed successfully.
    Complete,
}

/// Observer trait for receiving boot events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait BootObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &BootEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl BootObserver for NullObserver {
    fn on_event(&self, _event: &BootEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl BootObserver for TracingObserver {
    fn on_event(&self, event: &BootEvent) {
        match event {
            BootEvent::DeviceConnected { vid, pid } => {
                tracing::info!(vid = %format!("{:04X}", vid), pid = %format!("{:04X}", pid), "Device connected");
            }
            BootEvent::CpuInfo { info } => {
                tracing::info!("CPU info: {}", info);
            }
            BootEvent::StateChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "State changed");
            }
            BootEvent::OperationStarted {
                index,
                total,
                operation,
            } => {
                tracing::info!(step = %format!("{}/{}", index + 1, total), "{}", operation);
            }
            BootEvent::Uploaded { address, bytes } => {
                tracing::info!(address = %format!("0x{:08X}", address), bytes, "Uploaded");
            }
            BootEvent::Verified { address, bytes } => {
                tracing::info!(address = %format!("0x{:08X}", address), bytes, "Verified");
            }
            BootEvent::VerifyMismatch {
                address,
                offset,
                expected,
                actual,
                count,
            } => {
                tracing::warn!(
                    address = %format!("0x{:08X}", address),
                    offset,
                    expected = %format!("0x{:02X}", expected),
                    actual = %format!("0x{:02X}", actual),
                    count,
                    "Data mismatch"
                );
            }
            BootEvent::Downloaded { address, bytes } => {
                tracing::info!(address = %format!("0x{:08X}", address), bytes, "Downloaded");
            }
            BootEvent::Executed { address } => match address {
                Some(a) => tracing::info!(address = %format!("0x{:08X}", a), "Executed"),
                None => tracing::info!("Executed at last address"),
            },
            BootEvent::Error { message } => {
                tracing::error!("{}", message);
            }
            BootEvent::Packet {
                direction,
                packet_type,
                length,
            } => {
                tracing::trace!(
                    dir = %direction,
                    type_ = %packet_type,
                    len = length,
                    "USB Packet"
                );
            }
            BootEvent::Complete => {
                tracing::info!("Operation complete");
            }
        }
    }
}

/// Transport wrapper that emits packet events.
pub struct ObservableTransport<'a, T: UsbTransport, O: BootObserver> {
    inner: &'a T,
    observer: Arc<O>,
}

impl<'a, T: UsbTransport, O: BootObserver> ObservableTransport<'a, T, O> {
    pub fn new(inner: &'a T, observer: Arc<O>) -> Self {
        Self { inner, observer }
    }

    fn packet(&self, direction: PacketDirection, packet_type: &str, length: usize) {
        self.observer.on_event(&BootEvent::Packet {
            direction,
            packet_type: packet_type.to_string(),
            length,
        });
    }
}

impl<T: UsbTransport, O: BootObserver> UsbTransport for ObservableTransport<'_, T, O> {
    fn control_in(
        &self,
        setup: &SetupPacket,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let res = self.inner.control_in(setup, timeout);
        if let Ok(data) = &res {
            self.packet(PacketDirection::Rx, setup.name(), data.len());
        }
        res
    }

    fn control_out(
        &self,
        setup: &SetupPacket,
        data: &[u8],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let res = self.inner.control_out(setup, data, timeout);
        if res.is_ok() {
            self.packet(PacketDirection::Tx, setup.name(), data.len());
        }
        res
    }

    fn bulk_write(
        &self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let res = self.inner.bulk_write(endpoint, data, timeout);
        if let Ok(n) = &res {
            self.packet(PacketDirection::Tx, "Data", *n);
        }
        res
    }

    fn bulk_read(
        &self,
        endpoint: u8,
        len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let res = self.inner.bulk_read(endpoint, len, timeout);
        if let Ok(data) = &res
            && !data.is_empty()
        {
            self.packet(PacketDirection::Rx, "Data", data.len());
        }
        res
    }

    fn vendor_id(&self) -> u16 {
        self.inner.vendor_id()
    }

    fn product_id(&self) -> u16 {
        self.inner.product_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Cc1800Device;
    use crate::transport::MockTransport;
    use std::sync::Mutex;

    #[derive(Default)]
    struct PacketLog(Mutex<Vec<(PacketDirection, String, usize)>>);

    impl BootObserver for PacketLog {
        fn on_event(&self, event: &BootEvent) {
            if let BootEvent::Packet {
                direction,
                packet_type,
                length,
            } = event
            {
                self.0
                    .lock()
                    .unwrap()
                    .push((*direction, packet_type.clone(), *length));
            }
        }
    }

    #[test]
    fn test_observable_transport_reports_packets() {
        let mock = MockTransport::new();
        let log = Arc::new(PacketLog::default());
        let observed = ObservableTransport::new(&mock, log.clone());
        let mut dev = Cc1800Device::new(&observed);

        dev.cpu_info().unwrap();
        dev.arm_upload(0x10, 4).unwrap().write(&[1, 2, 3, 4]).unwrap();

        let packets = log.0.lock().unwrap().clone();
        assert_eq!(
            packets,
            vec![
                (PacketDirection::Rx, "GET_CPU_INFO".to_string(), 8),
                (PacketDirection::Tx, "SET_ADDRESS".to_string(), 0),
                (PacketDirection::Tx, "SET_LENGTH".to_string(), 0),
                (PacketDirection::Tx, "Data".to_string(), 4),
            ]
        );
    }

    #[test]
    fn test_observable_transport_forwards_ids() {
        let mut mock = MockTransport::new();
        mock.set_ids(0x1234, 0x5678);
        let observed = ObservableTransport::new(&mock, Arc::new(NullObserver));
        assert_eq!(observed.vendor_id(), 0x1234);
        assert_eq!(observed.product_id(), 0x5678);
    }
}
