//! # stmloader
//!
//! Host-side library for a custom STM32 serial bootloader.
//!
//! The bootloader speaks a small framed protocol over a UART/USB-serial
//! link: 7-byte command frames down, 3-byte acknowledgment frames up,
//! and firmware streamed as raw 64-byte packets protected by a CRC-32
//! announced up front. This crate provides:
//!
//! - Command and response framing ([`protocol::frame`])
//! - The device's CRC-32 variant ([`protocol::crc`])
//! - Command/packet exchanges and the download orchestrator ([`flasher`])
//! - Serial port abstraction and USB auto-detection ([`port`])
//! - Firmware image loading, including ELF conversion ([`image`])
//!
//! ## Example
//!
//! ```rust,no_run
//! use stmloader::Flasher;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let firmware = stmloader::image::load("app.bin".as_ref())?;
//!
//!     let mut flasher = Flasher::open("/dev/ttyACM0")?;
//!     flasher.erase_app()?;
//!     flasher.download_firmware(&firmware, |sent, total| {
//!         println!("Packet {sent}/{total}");
//!     })?;
//!     flasher.execute()?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod error;
pub mod flasher;
pub mod image;
pub mod port;
pub mod protocol;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library
/// loops.
///
/// The checker should return `true` when the current operation should
/// stop (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding
/// application.
#[must_use]
pub fn is_interrupt_requested() -> bool {
    INTERRUPT_CHECKER.get().is_some_and(|checker| checker())
}

#[cfg(test)]
pub(crate) fn test_reset_interrupt() {
    use std::sync::atomic::{AtomicBool, Ordering};

    static TEST_INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    let flag = TEST_INTERRUPT_FLAG
        .get_or_init(|| {
            let shared = Arc::new(AtomicBool::new(false));
            let checker = Arc::clone(&shared);
            set_interrupt_checker(move || checker.load(Ordering::Relaxed));
            shared
        })
        .clone();

    flag.store(false, Ordering::Relaxed);
}

// Re-exports for convenience
pub use {
    error::{Error, Result},
    flasher::{ExchangeOutcome, Flasher, PACKET_ATTEMPTS, RESPONSE_TIMEOUT},
    port::{
        DEFAULT_BAUD, DetectedPort, NativePort, Port, SerialConfig, UsbDevice, auto_detect_port,
        detect_ports,
    },
    protocol::{
        DownloadSession, PACKET_SIZE, firmware_crc32,
        frame::{Command, CommandFrame, DeviceError, Response},
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_defaults_to_false() {
        test_reset_interrupt();
        assert!(!is_interrupt_requested());
    }
}
