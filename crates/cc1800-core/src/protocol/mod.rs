//! Protocol module - CC1800 boot ROM request definitions.

pub mod constants;
pub mod requests;
pub mod setup;
pub mod window;

pub use constants::*;
pub use requests::{CpuInfo, execute, get_cpu_info, get_status, set_address, set_length};
pub use setup::{ControlDirection, SetupPacket};
pub use window::{Direction, MemoryWindow, encode_length, split_word};
