//! CC1800-Core: USB mask-ROM boot protocol for the ChinaChip CC1800 SoC.
//!
//! The boot ROM understands five vendor control requests: read the CPU
//! info string, set an address, set a length and direction, read a status
//! byte, and execute at the last address. Payloads move over bulk
//! endpoint 1 after an address/length pair has been set.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Transport**: USB communication abstraction (nusb, mock)
//! - **Protocol**: Request codes, wire encoding, stateless requests
//! - **Device**: Session wrapper that gates bulk transfers behind an armed window
//! - **Ops**: Upload, download, verify and execute
//! - **Sequencer**: Runs an ordered list of user operations
//! - **Events**: Observer pattern for UI decoupling
//!
//! # Example
//!
//! ```no_run
//! use cc1800_core::{Cc1800Device, CommandSequencer, NusbTransport, Operation};
//!
//! let transport = NusbTransport::open().expect("no device");
//! let mut device = Cc1800Device::new(&transport);
//! let ops = vec![
//!     Operation::Write { address: 0x1000, data: std::fs::read("loader.bin").unwrap() },
//!     Operation::Exec,
//! ];
//! let mut discard = |_: usize, _: u32, _: Vec<u8>| Ok::<(), std::io::Error>(());
//! CommandSequencer::new()
//!     .run(&mut device, &ops, &mut discard)
//!     .expect("boot failed");
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod ops;
pub mod protocol;
pub mod sequencer;
pub mod transport;

// Re-exports for convenience
pub use config::ToolConfig;
pub use device::{ArmedTransfer, Cc1800Device, Download, Upload};
pub use error::BootError;
pub use events::{BootEvent, BootObserver, NullObserver, ObservableTransport, TracingObserver};
pub use ops::{Mismatch, download, upload, upload_verify_execute};
pub use protocol::{CpuInfo, Direction, MemoryWindow};
pub use sequencer::{CommandSequencer, Operation, ReadSink, SequenceReport, SequencerState};
pub use transport::{MockTransport, NusbTransport, TransportError, UsbTransport};
