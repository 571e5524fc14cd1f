//! Serial port abstraction.
//!
//! Protocol code talks to the [`Port`] trait instead of a concrete
//! serial handle, keeping the exchange and download layers testable
//! against a scripted mock:
//!
//! ```text
//! +------------------+
//! |  Flasher (logic) |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |    Port trait    |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |    NativePort    |
//! |   (serialport)   |
//! +------------------+
//! ```
//!
//! The port is borrowed by the protocol engine for the duration of each
//! call; opening and closing happen outside the engine.

pub mod detect;
pub mod native;

use crate::error::Result;
use std::io::{Read, Write};
use std::time::Duration;

/// Baud rate of the bootloader link.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Serial parameters for opening a bootloader link.
///
/// The protocol itself is fixed at 8 data bits, no parity, one stop bit
/// and no flow control; only the port path, baud rate and read timeout
/// vary.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyACM0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read timeout bounding every response wait.
    pub timeout: Duration,
}

impl SerialConfig {
    /// Create a configuration for the given port at the protocol's
    /// default baud rate.
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate: DEFAULT_BAUD,
            timeout: Duration::from_secs(1),
        }
    }

    /// Set the read timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Bidirectional byte stream with read-timeout semantics.
pub trait Port: Read + Write + Send {
    /// Set the read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current read timeout.
    fn timeout(&self) -> Duration;

    /// Discard any pending bytes in both directions.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;
}

// Re-export the native implementation
pub use detect::{DetectedPort, UsbDevice, auto_detect_port, detect_ports};
pub use native::NativePort;
