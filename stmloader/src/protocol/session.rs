//! Download session state for a single firmware transfer.

use crate::error::{Error, Result};
use crate::protocol::crc::firmware_crc32;
use crate::protocol::frame::PACKET_SIZE;

/// State owned by the download orchestrator for the duration of one
/// firmware transfer: the padded image, its packet count and checksum.
///
/// The session owns its buffer exclusively and only hands out read-only
/// packet slices. It is created when a transfer starts and dropped on
/// completion or abort; nothing is persisted.
#[derive(Debug)]
pub struct DownloadSession {
    data: Vec<u8>,
    total_packets: u16,
    crc: u32,
}

impl DownloadSession {
    /// Prepare a transfer: pad the image with trailing zero bytes to the
    /// next multiple of 64 and checksum the padded buffer.
    ///
    /// An image whose length is already a multiple of 64 gains no extra
    /// block. Returns [`Error::FirmwareTooLarge`] when the packet count
    /// does not fit the protocol's 16-bit counter.
    pub fn new(firmware: &[u8]) -> Result<Self> {
        let padded_len = firmware.len().div_ceil(PACKET_SIZE) * PACKET_SIZE;

        let packets = padded_len / PACKET_SIZE;
        let total_packets =
            u16::try_from(packets).map_err(|_| Error::FirmwareTooLarge { packets })?;

        let mut data = firmware.to_vec();
        data.resize(padded_len, 0);
        let crc = firmware_crc32(&data);

        Ok(Self {
            data,
            total_packets,
            crc,
        })
    }

    /// Number of 64-byte packets in this transfer.
    pub fn total_packets(&self) -> u16 {
        self.total_packets
    }

    /// CRC32 of the padded, word-reordered image.
    pub fn crc(&self) -> u32 {
        self.crc
    }

    /// Length of the padded image in bytes.
    pub fn padded_len(&self) -> usize {
        self.data.len()
    }

    /// Read-only 64-byte slice for the given packet index.
    pub fn packet(&self, index: u16) -> &[u8] {
        let start = usize::from(index) * PACKET_SIZE;
        &self.data[start..start + PACKET_SIZE]
    }

    /// Iterate packets in ascending transmission order.
    pub fn packets(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(PACKET_SIZE)
    }
}
