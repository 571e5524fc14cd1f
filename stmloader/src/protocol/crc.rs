//! CRC-32 variant used for firmware integrity checks.
//!
//! The bootloader verifies downloads with the STM32 hardware CRC unit:
//! polynomial `0x04C11DB7`, initial value `0xFFFFFFFF`, no bit reflection
//! and no final XOR (the CRC-32/MPEG-2 configuration). The peripheral
//! consumes 32-bit words, so the host must feed each little-endian word
//! of the image most-significant-byte first.
//!
//! Substituting the common reflected CRC-32 here produces values the
//! device will reject; the difference is covered by tests.

const POLY: u32 = 0x04C1_1DB7;
const INIT: u32 = 0xFFFF_FFFF;

fn update(mut crc: u32, byte: u8) -> u32 {
    crc ^= u32::from(byte) << 24;
    for _ in 0..8 {
        crc = if crc & 0x8000_0000 != 0 {
            (crc << 1) ^ POLY
        } else {
            crc << 1
        };
    }
    crc
}

/// CRC-32/MPEG-2 over a raw byte stream.
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    data.iter().fold(INIT, |crc, &byte| update(crc, byte))
}

/// Firmware checksum as the device computes it.
///
/// Each 4-byte little-endian chunk is byte-reversed before entering the
/// CRC, matching the word order of the device's CRC peripheral. A
/// trailing chunk shorter than 4 bytes is reversed as-is; download
/// payloads are padded to a multiple of 64 so in practice every chunk is
/// full.
pub fn firmware_crc32(data: &[u8]) -> u32 {
    let mut crc = INIT;
    for chunk in data.chunks(4) {
        for &byte in chunk.iter().rev() {
            crc = update(crc, byte);
        }
    }
    crc
}
