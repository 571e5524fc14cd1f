//! Wire framing for the bootloader command protocol.
//!
//! Commands travel in fixed 7-byte frames, responses in fixed 3-byte
//! frames:
//!
//! ```text
//! Command frame:
//! +---------+----------------------------------+
//! | Command |   Payload (0..6, zero-padded)    |
//! +---------+----------------------------------+
//! |  1 byte |             6 bytes              |
//! +---------+----------------------------------+
//!
//! Response frame:
//! +---------+------------+------------+
//! | Command |  Value LSB |  Value MSB |
//! +---------+------------+------------+
//! ```
//!
//! The 16-bit response value carries the packet sequence number on
//! packet acknowledgments; on command acknowledgments and error frames
//! only the low byte is meaningful (the echoed command identifier or
//! the error code).

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::fmt;

/// Command frame length on the wire.
pub const COMMAND_FRAME_LEN: usize = 7;

/// Response frame length on the wire.
pub const RESPONSE_FRAME_LEN: usize = 3;

/// Maximum command payload (frame minus the identifier byte).
pub const MAX_PAYLOAD_LEN: usize = COMMAND_FRAME_LEN - 1;

/// Firmware packet size in bytes. Packets carry no header; their
/// identity is implicit in transmission order.
pub const PACKET_SIZE: usize = 64;

/// Command identifiers understood by the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Positive acknowledgment of a command (0x10).
    Ack = 0x10,

    /// Firmware data packet (0x20).
    Packet = 0x20,

    /// Positive acknowledgment of a packet (0x30).
    PacketAck = 0x30,

    /// Negative acknowledgment of a packet (0x40).
    PacketNack = 0x40,

    /// Error report from the device (0x50).
    Error = 0x50,

    /// Jump to the user application (0x60).
    Execute = 0x60,

    /// Erase the user application (0x70).
    EraseApp = 0x70,

    /// Start a firmware download (0x80).
    DownloadFw = 0x80,
}

impl Command {
    /// Human-readable command name, used in log events.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ack => "ACK",
            Self::Packet => "PACKET",
            Self::PacketAck => "PACKET_ACK",
            Self::PacketNack => "PACKET_NACK",
            Self::Error => "ERROR",
            Self::Execute => "EXECUTE",
            Self::EraseApp => "ERASE_APP",
            Self::DownloadFw => "DOWNLOAD_FW",
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x10 => Ok(Self::Ack),
            0x20 => Ok(Self::Packet),
            0x30 => Ok(Self::PacketAck),
            0x40 => Ok(Self::PacketNack),
            0x50 => Ok(Self::Error),
            0x60 => Ok(Self::Execute),
            0x70 => Ok(Self::EraseApp),
            0x80 => Ok(Self::DownloadFw),
            other => Err(other),
        }
    }
}

/// Builder for 7-byte command frames.
#[derive(Debug)]
pub struct CommandFrame {
    command: Command,
    payload: Vec<u8>,
}

impl CommandFrame {
    /// Create a frame with an empty payload.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            payload: Vec::new(),
        }
    }

    /// Build an ERASE_APP frame.
    pub fn erase_app() -> Self {
        Self::new(Command::EraseApp)
    }

    /// Build an EXECUTE frame.
    pub fn execute() -> Self {
        Self::new(Command::Execute)
    }

    /// Build a DOWNLOAD_FW frame.
    ///
    /// The payload carries the packet count followed by the firmware
    /// checksum, both little-endian, filling all six payload bytes.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn download_fw(total_packets: u16, crc: u32) -> Self {
        let mut frame = Self::new(Command::DownloadFw);
        frame
            .payload
            .write_u16::<LittleEndian>(total_packets)
            .unwrap();
        frame.payload.write_u32::<LittleEndian>(crc).unwrap();
        frame
    }

    /// Get the command identifier.
    pub fn command(&self) -> Command {
        self.command
    }

    /// Encode to the fixed 7-byte wire frame, zero-padding the payload.
    ///
    /// # Panics
    ///
    /// Panics if the payload exceeds six bytes. The fixed command set
    /// cannot produce such a frame, so this is an invariant check rather
    /// than a recoverable error.
    pub fn encode(&self) -> [u8; COMMAND_FRAME_LEN] {
        assert!(
            self.payload.len() <= MAX_PAYLOAD_LEN,
            "command payload exceeds {MAX_PAYLOAD_LEN} bytes"
        );

        let mut frame = [0u8; COMMAND_FRAME_LEN];
        frame[0] = self.command as u8;
        frame[1..=self.payload.len()].copy_from_slice(&self.payload);
        frame
    }
}

/// Decoded 3-byte response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    /// Raw response command byte.
    pub command: u8,
    /// 16-bit little-endian value from bytes 1-2.
    pub value: u16,
}

impl Response {
    /// Decode a response from raw bytes.
    ///
    /// Anything but exactly 3 bytes is invalid. A short read is
    /// indistinguishable from a malformed frame and is never partially
    /// interpreted.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() != RESPONSE_FRAME_LEN {
            return None;
        }

        Some(Self {
            command: data[0],
            value: LittleEndian::read_u16(&data[1..3]),
        })
    }

    /// Low byte of the value field: the echoed command identifier on
    /// command ACKs, the error code on ERROR frames.
    pub fn low_byte(&self) -> u8 {
        (self.value & 0x00FF) as u8
    }
}

/// Error conditions the bootloader reports in an ERROR frame.
///
/// The code-to-condition mapping is wire data shared with the device
/// firmware and must be reproduced exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// 0x7F - application checksum incorrect.
    ChecksumMismatch,
    /// 0x80 - command not recognized.
    InvalidCommand,
    /// 0x81 - command not valid in the current bootloader state.
    InvalidState,
    /// 0x82 - receive timeout reached.
    ReceiveTimeout,
    /// 0x83 - firmware download failed.
    DownloadFailed,
    /// 0x84 - no user application found.
    NoUserApp,
    /// Any code outside the published table. Reported, never a crash.
    Unrecognized(u8),
}

impl DeviceError {
    /// Map a wire error code to its condition.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x7F => Self::ChecksumMismatch,
            0x80 => Self::InvalidCommand,
            0x81 => Self::InvalidState,
            0x82 => Self::ReceiveTimeout,
            0x83 => Self::DownloadFailed,
            0x84 => Self::NoUserApp,
            other => Self::Unrecognized(other),
        }
    }

    /// The wire code for this condition.
    pub fn code(self) -> u8 {
        match self {
            Self::ChecksumMismatch => 0x7F,
            Self::InvalidCommand => 0x80,
            Self::InvalidState => 0x81,
            Self::ReceiveTimeout => 0x82,
            Self::DownloadFailed => 0x83,
            Self::NoUserApp => 0x84,
            Self::Unrecognized(code) => code,
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChecksumMismatch => write!(f, "checksum mismatch"),
            Self::InvalidCommand => write!(f, "invalid command"),
            Self::InvalidState => write!(f, "invalid bootloader state"),
            Self::ReceiveTimeout => write!(f, "receive timeout"),
            Self::DownloadFailed => write!(f, "download failed"),
            Self::NoUserApp => write!(f, "user application not found"),
            Self::Unrecognized(code) => write!(f, "unrecognized error code 0x{code:02X}"),
        }
    }
}
