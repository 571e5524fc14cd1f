//! USB device detection and serial port auto-discovery.
//!
//! The bootloader enumerates as a USB virtual COM port with a fixed
//! VID/PID pair; boards wired through a separate USB-to-UART bridge show
//! up under the bridge vendor instead, so the common bridge chips are
//! recognized as plausible candidates too.

use crate::error::{Error, Result};
use log::{debug, info, trace};

/// USB vendor ID of the bootloader's virtual COM port.
pub const DEVICE_VID: u16 = 1055;

/// USB product ID of the bootloader's virtual COM port.
pub const DEVICE_PID: u16 = 22300;

/// Known USB device kinds behind a serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbDevice {
    /// The bootloader's own virtual COM port.
    Bootloader,
    /// CH340/CH341 USB-to-serial converter.
    Ch340,
    /// Silicon Labs CP210x USB-to-serial converter.
    Cp210x,
    /// FTDI FT232/FT2232/FT4232 USB-to-serial converter.
    Ftdi,
    /// Unknown device.
    Unknown,
}

impl UsbDevice {
    /// Classify a VID/PID combination.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        if vid == DEVICE_VID && pid == DEVICE_PID {
            return Self::Bootloader;
        }
        match vid {
            // CH340/CH341 family
            0x1A86 => Self::Ch340,
            // Silicon Labs CP210x family
            0x10C4 => Self::Cp210x,
            // FTDI family
            0x0403 => Self::Ftdi,
            _ => Self::Unknown,
        }
    }

    /// Get a human-readable name for the device.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bootloader => "Bootloader VCP",
            Self::Ch340 => "CH340/CH341",
            Self::Cp210x => "CP210x",
            Self::Ftdi => "FTDI",
            Self::Unknown => "Unknown",
        }
    }

    /// Check if this is a known/expected device type.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Detected serial port information.
#[derive(Debug, Clone)]
pub struct DetectedPort {
    /// Port name/path (e.g., "/dev/ttyACM0" or "COM3").
    pub name: String,
    /// USB device type if detected.
    pub device: UsbDevice,
    /// USB Vendor ID (if available).
    pub vid: Option<u16>,
    /// USB Product ID (if available).
    pub pid: Option<u16>,
    /// Device manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Device product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial: Option<String>,
}

/// Detect all available serial ports with USB device information.
pub fn detect_ports() -> Vec<DetectedPort> {
    let mut result = Vec::new();

    match serialport::available_ports() {
        Ok(ports) => {
            for port_info in ports {
                let mut detected = DetectedPort {
                    name: port_info.port_name.clone(),
                    device: UsbDevice::Unknown,
                    vid: None,
                    pid: None,
                    manufacturer: None,
                    product: None,
                    serial: None,
                };

                if let serialport::SerialPortType::UsbPort(usb_info) = port_info.port_type {
                    detected.vid = Some(usb_info.vid);
                    detected.pid = Some(usb_info.pid);
                    detected.manufacturer = usb_info.manufacturer;
                    detected.product = usb_info.product;
                    detected.serial = usb_info.serial_number;
                    detected.device = UsbDevice::from_vid_pid(usb_info.vid, usb_info.pid);

                    trace!(
                        "Found USB port: {} (VID: {:04X}, PID: {:04X}, Device: {:?})",
                        port_info.port_name, usb_info.vid, usb_info.pid, detected.device
                    );
                }

                result.push(detected);
            }
        }
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
        }
    }

    result
}

/// Auto-detect a single port candidate.
///
/// Prefers the bootloader's own VCP over generic USB-UART bridges, and a
/// known bridge over an anonymous port.
pub fn auto_detect_port() -> Result<DetectedPort> {
    let ports = detect_ports();

    if let Some(port) = ports.iter().find(|p| p.device == UsbDevice::Bootloader) {
        info!("Auto-detected bootloader VCP: {}", port.name);
        return Ok(port.clone());
    }

    if let Some(port) = ports.iter().find(|p| p.device.is_known()) {
        info!(
            "Auto-detected {} USB-UART bridge: {}",
            port.device.name(),
            port.name
        );
        return Ok(port.clone());
    }

    if let Some(port) = ports.into_iter().next() {
        info!("Using first available port: {}", port.name);
        return Ok(port);
    }

    Err(Error::DeviceNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usb_device_from_vid_pid() {
        assert_eq!(
            UsbDevice::from_vid_pid(DEVICE_VID, DEVICE_PID),
            UsbDevice::Bootloader
        );
        assert_eq!(UsbDevice::from_vid_pid(0x1A86, 0x7523), UsbDevice::Ch340);
        assert_eq!(UsbDevice::from_vid_pid(0x10C4, 0xEA60), UsbDevice::Cp210x);
        assert_eq!(UsbDevice::from_vid_pid(0x0403, 0x6001), UsbDevice::Ftdi);
        assert_eq!(UsbDevice::from_vid_pid(0x0000, 0x0000), UsbDevice::Unknown);
    }

    #[test]
    fn test_bootloader_requires_exact_pid() {
        // Same vendor with a different product is not our device.
        assert_eq!(UsbDevice::from_vid_pid(DEVICE_VID, 1), UsbDevice::Unknown);
    }

    #[test]
    fn test_detect_ports_does_not_panic() {
        let _ = detect_ports();
    }
}
