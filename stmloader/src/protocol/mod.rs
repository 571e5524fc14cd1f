//! Bootloader protocol: framing, checksum and download session state.

pub mod crc;
pub mod frame;
pub mod session;

// Re-export common types
pub use crc::firmware_crc32;
pub use frame::{Command, CommandFrame, DeviceError, Response, PACKET_SIZE};
pub use session::DownloadSession;
