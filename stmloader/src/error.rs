//! Error types for stmloader.

use crate::protocol::frame::DeviceError;
use std::io;
use thiserror::Error;

/// Result type for stmloader operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for stmloader operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The bootloader answered a command with an ERROR frame.
    #[error("Device error: {0}")]
    Device(DeviceError),

    /// Malformed or unexpected response outside the packet retry path.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A firmware download was abandoned before all packets were sent.
    #[error("Download aborted: {0}")]
    DownloadAborted(String),

    /// Firmware image exceeds the protocol's 16-bit packet counter.
    #[error("Firmware too large: {packets} packets exceed the 16-bit packet count")]
    FirmwareTooLarge {
        /// Number of 64-byte packets the image would need.
        packets: usize,
    },

    /// No serial port matched the requested device.
    #[error("Device not found")]
    DeviceNotFound,

    /// External toolchain failure (ELF to binary conversion).
    #[error("Toolchain error: {0}")]
    Toolchain(String),
}
