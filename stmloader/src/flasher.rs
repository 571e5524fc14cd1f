//! Bootloader driver: command exchanges, packet transfer and the
//! firmware download orchestration.
//!
//! The protocol is strictly synchronous: one frame out, one response in,
//! nothing pipelined. The device walks Idle -> Erased -> Programmed ->
//! Running as commands succeed; the host never tracks that state beyond
//! its log narrative and trusts each ACK/ERROR as the sole source of
//! truth.
//!
//! ## Example
//!
//! ```rust,no_run
//! use stmloader::Flasher;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut flasher = Flasher::open("/dev/ttyACM0")?;
//!
//!     flasher.erase_app()?;
//!     let firmware = std::fs::read("app.bin")?;
//!     flasher.download_firmware(&firmware, |sent, total| {
//!         println!("Packet {sent}/{total}");
//!     })?;
//!     flasher.execute()?;
//!
//!     Ok(())
//! }
//! ```

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::frame::{
    Command, CommandFrame, DeviceError, PACKET_SIZE, RESPONSE_FRAME_LEN, Response,
};
use crate::protocol::session::DownloadSession;
use log::{debug, info, trace, warn};
use std::io::{Read as _, Write as _};
use std::time::Duration;

/// Fixed timeout bounding every command and packet response read.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Total attempts per firmware packet (one initial send plus two retries).
pub const PACKET_ATTEMPTS: u32 = 3;

/// Classification of a single command exchange.
///
/// Every exchange collapses to this tri-state; callers branch on it and
/// never on raw response bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Device acknowledged the command.
    Ok,
    /// Device answered with an ERROR frame.
    DeviceError(DeviceError),
    /// Short, malformed or unexpected response.
    Invalid,
}

/// Classification of one packet exchange attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PacketOutcome {
    Ack,
    /// NACK, sequence mismatch or malformed response; worth retrying.
    Retryable,
}

/// Bootloader protocol driver over a serial [`Port`].
///
/// Holds exclusive use of the port for the duration of every operation;
/// only one download session can run against a port at a time.
pub struct Flasher<P: Port> {
    port: P,
}

impl<P: Port> Flasher<P> {
    /// Create a flasher over an already opened port.
    ///
    /// The port's configured read timeout bounds every response wait;
    /// [`Flasher::open`] configures the protocol's 10 second timeout.
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Consume the flasher and return the underlying port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Run one command exchange and classify the response.
    ///
    /// Stale bytes from a previous timed-out exchange are flushed before
    /// the frame goes out, then exactly one 3-byte response is read under
    /// the port timeout. Commands are attempted exactly once: re-issuing
    /// a timed-out ERASE_APP or EXECUTE could repeat a destructive
    /// operation the device already performed.
    pub fn command(&mut self, frame: &CommandFrame) -> Result<ExchangeOutcome> {
        let name = frame.command().name();
        info!("Sending {name} command");

        self.port.clear_buffers()?;

        let encoded = frame.encode();
        trace!("TX {name}: {encoded:02X?}");
        self.port.write_all(&encoded)?;
        self.port.flush()?;

        let outcome = match self.read_response()? {
            Some(resp)
                if resp.command == Command::Ack as u8
                    && resp.low_byte() == frame.command() as u8 =>
            {
                ExchangeOutcome::Ok
            }
            Some(resp) if resp.command == Command::Error as u8 => {
                ExchangeOutcome::DeviceError(DeviceError::from_code(resp.low_byte()))
            }
            Some(resp) => {
                debug!("Unexpected response to {name}: {resp:?}");
                ExchangeOutcome::Invalid
            }
            None => ExchangeOutcome::Invalid,
        };

        match outcome {
            ExchangeOutcome::Ok => info!("{name} acknowledged"),
            ExchangeOutcome::DeviceError(err) => warn!("{name} rejected by device: {err}"),
            ExchangeOutcome::Invalid => warn!("Invalid response to {name}"),
        }

        Ok(outcome)
    }

    /// Send one 64-byte firmware packet and wait for its acknowledgment.
    ///
    /// The payload goes out verbatim; the packet's identity lives only in
    /// the sequence number the device echoes back. A NACK, a mismatched
    /// sequence number and a malformed response all count as the same
    /// retryable outcome, up to [`PACKET_ATTEMPTS`] attempts in total.
    /// Returns `Ok(false)` once the attempts are exhausted.
    pub fn send_packet(&mut self, payload: &[u8], seq: u16) -> Result<bool> {
        assert_eq!(
            payload.len(),
            PACKET_SIZE,
            "firmware packets are exactly {PACKET_SIZE} bytes"
        );

        for attempt in 1..=PACKET_ATTEMPTS {
            debug!("> Packet {seq} (attempt {attempt}/{PACKET_ATTEMPTS})");
            self.port.write_all(payload)?;
            self.port.flush()?;

            match self.read_packet_response(seq)? {
                PacketOutcome::Ack => {
                    debug!("< Packet {seq} acknowledged");
                    return Ok(true);
                }
                PacketOutcome::Retryable => {
                    if attempt < PACKET_ATTEMPTS {
                        warn!("< Packet {seq} not acknowledged, retrying");
                    }
                }
            }
        }

        warn!("< Packet {seq} failed after {PACKET_ATTEMPTS} attempts");
        Ok(false)
    }

    fn read_packet_response(&mut self, seq: u16) -> Result<PacketOutcome> {
        let Some(resp) = self.read_response()? else {
            debug!("< Invalid response for packet {seq}");
            return Ok(PacketOutcome::Retryable);
        };

        if resp.command == Command::PacketAck as u8 && resp.value == seq {
            return Ok(PacketOutcome::Ack);
        }

        if resp.command == Command::PacketNack as u8 && resp.value == seq {
            debug!("< Packet {seq} NACKed by device");
        } else {
            debug!("< Unexpected response for packet {seq}: {resp:?}");
        }
        Ok(PacketOutcome::Retryable)
    }

    /// Read one fixed-size response frame.
    ///
    /// Returns `None` when the read times out or yields anything other
    /// than exactly 3 bytes; a partial frame is never interpreted.
    fn read_response(&mut self) -> Result<Option<Response>> {
        let mut buf = [0u8; RESPONSE_FRAME_LEN];
        let mut filled = 0;

        while filled < RESPONSE_FRAME_LEN {
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(Error::Io(e)),
            }
        }

        trace!("RX: {:02X?}", &buf[..filled]);
        Ok(Response::decode(&buf[..filled]))
    }

    /// Run one complete firmware download.
    ///
    /// Pads and checksums the image, announces the transfer with a
    /// DOWNLOAD_FW command and streams the packets in strict ascending
    /// order. The first failure aborts the whole transfer with no
    /// resume; a later attempt restarts from the DOWNLOAD_FW command.
    /// `progress` is called with `(packets_sent, total_packets)` after
    /// each acknowledged packet.
    #[allow(clippy::cast_possible_truncation)]
    pub fn download_firmware<F>(&mut self, firmware: &[u8], mut progress: F) -> Result<()>
    where
        F: FnMut(usize, usize),
    {
        let session = DownloadSession::new(firmware)?;
        let total = session.total_packets();

        info!(
            "Firmware size: {} bytes ({} bytes padded)",
            firmware.len(),
            session.padded_len()
        );
        info!("Packets to send: {total} x {PACKET_SIZE} bytes");
        info!("Firmware CRC32: 0x{:08X}", session.crc());

        self.expect_ok(&CommandFrame::download_fw(total, session.crc()))?;

        info!("Start downloading...");

        for (index, packet) in session.packets().enumerate() {
            if crate::is_interrupt_requested() {
                warn!("Firmware download interrupted");
                return Err(Error::DownloadAborted("interrupted".into()));
            }

            // Safe cast: the session caps the packet count at u16::MAX.
            let seq = index as u16;
            if !self.send_packet(packet, seq)? {
                warn!("Firmware download aborted");
                return Err(Error::DownloadAborted(format!(
                    "packet {seq} not acknowledged after {PACKET_ATTEMPTS} attempts"
                )));
            }

            progress(index + 1, usize::from(total));
        }

        info!("Firmware successfully flashed");
        Ok(())
    }

    /// Erase the user application.
    ///
    /// On success the device moves from Idle to Erased; its ACK is the
    /// only confirmation the host gets.
    pub fn erase_app(&mut self) -> Result<()> {
        self.expect_ok(&CommandFrame::erase_app())?;
        info!("User application erased");
        Ok(())
    }

    /// Hand control to the user application.
    pub fn execute(&mut self) -> Result<()> {
        self.expect_ok(&CommandFrame::execute())?;
        info!("Bootloader executing user application");
        Ok(())
    }

    fn expect_ok(&mut self, frame: &CommandFrame) -> Result<()> {
        match self.command(frame)? {
            ExchangeOutcome::Ok => Ok(()),
            ExchangeOutcome::DeviceError(err) => Err(Error::Device(err)),
            ExchangeOutcome::Invalid => Err(Error::Protocol(format!(
                "invalid response to {}",
                frame.command().name()
            ))),
        }
    }
}

impl Flasher<crate::port::NativePort> {
    /// Open the serial port with the protocol's fixed parameters
    /// (115200 baud, 8N1, 10 second read timeout) and wrap it in a
    /// flasher.
    ///
    /// Opening is retried a few times; some USB VCPs need a moment after
    /// enumeration before the OS lets anyone in.
    pub fn open(port_name: &str) -> Result<Self> {
        const MAX_OPEN_ATTEMPTS: usize = 3;
        const OPEN_RETRY_DELAY: Duration = Duration::from_millis(500);

        let config =
            crate::port::SerialConfig::new(port_name).with_timeout(RESPONSE_TIMEOUT);

        let mut last_error = None;
        for attempt in 1..=MAX_OPEN_ATTEMPTS {
            match crate::port::NativePort::open(&config) {
                Ok(port) => {
                    if attempt > 1 {
                        debug!("Port opened on attempt {attempt}");
                    }
                    return Ok(Self::new(port));
                }
                Err(e) => {
                    warn!("Failed to open port {port_name} (attempt {attempt}/{MAX_OPEN_ATTEMPTS}): {e}");
                    last_error = Some(e);
                    if attempt < MAX_OPEN_ATTEMPTS {
                        std::thread::sleep(OPEN_RETRY_DELAY);
                    }
                }
            }
        }

        Err(last_error.unwrap_or(Error::DeviceNotFound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{Read, Write};

    /// Scripted serial port with separate read/write sides.
    ///
    /// Reads drain a pre-loaded response script and time out once it is
    /// empty; every `write` call is recorded as one observed frame.
    struct MockPort {
        script: VecDeque<u8>,
        writes: Vec<Vec<u8>>,
        clears: usize,
    }

    impl MockPort {
        fn new(responses: &[&[u8]]) -> Self {
            Self {
                script: responses.iter().flat_map(|r| r.iter().copied()).collect(),
                writes: Vec::new(),
                clears: 0,
            }
        }

        /// Writes of command-frame size (7 bytes).
        fn command_writes(&self) -> Vec<&Vec<u8>> {
            self.writes.iter().filter(|w| w.len() == 7).collect()
        }

        /// Writes of packet size (64 bytes).
        fn packet_writes(&self) -> Vec<&Vec<u8>> {
            self.writes.iter().filter(|w| w.len() == PACKET_SIZE).collect()
        }
    }

    impl Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.script.is_empty() {
                return Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "no data"));
            }
            let n = buf.len().min(self.script.len());
            for b in buf.iter_mut().take(n) {
                *b = self.script.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.writes.push(buf.to_vec());
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Port for MockPort {
        fn set_timeout(&mut self, _timeout: Duration) -> crate::Result<()> {
            Ok(())
        }
        fn timeout(&self) -> Duration {
            RESPONSE_TIMEOUT
        }
        fn clear_buffers(&mut self) -> crate::Result<()> {
            self.clears += 1;
            Ok(())
        }
        fn name(&self) -> &str {
            "mock"
        }
    }

    fn ack_for(command: Command) -> [u8; 3] {
        [Command::Ack as u8, command as u8, 0x00]
    }

    fn error(code: u8) -> [u8; 3] {
        [Command::Error as u8, code, 0x00]
    }

    fn packet_ack(seq: u16) -> [u8; 3] {
        let [lo, hi] = seq.to_le_bytes();
        [Command::PacketAck as u8, lo, hi]
    }

    fn packet_nack(seq: u16) -> [u8; 3] {
        let [lo, hi] = seq.to_le_bytes();
        [Command::PacketNack as u8, lo, hi]
    }

    #[test]
    fn test_command_ack_is_ok() {
        let port = MockPort::new(&[&ack_for(Command::EraseApp)]);
        let mut flasher = Flasher::new(port);

        let outcome = flasher.command(&CommandFrame::erase_app()).unwrap();
        assert_eq!(outcome, ExchangeOutcome::Ok);

        let port = flasher.into_port();
        assert_eq!(port.writes, vec![vec![0x70, 0, 0, 0, 0, 0, 0]]);
        // Stale bytes are flushed before the frame goes out.
        assert_eq!(port.clears, 1);
    }

    #[test]
    fn test_command_error_maps_device_error() {
        let port = MockPort::new(&[&error(0x84)]);
        let mut flasher = Flasher::new(port);

        let outcome = flasher.command(&CommandFrame::execute()).unwrap();
        assert_eq!(
            outcome,
            ExchangeOutcome::DeviceError(DeviceError::NoUserApp)
        );
    }

    #[test]
    fn test_command_unknown_error_code_is_reported() {
        let port = MockPort::new(&[&error(0x42)]);
        let mut flasher = Flasher::new(port);

        let outcome = flasher.command(&CommandFrame::execute()).unwrap();
        assert_eq!(
            outcome,
            ExchangeOutcome::DeviceError(DeviceError::Unrecognized(0x42))
        );
    }

    #[test]
    fn test_command_short_response_is_invalid_without_retry() {
        // Two bytes then silence: a short read classifies as Invalid and
        // the command is not re-issued.
        let port = MockPort::new(&[&[Command::Ack as u8, Command::Execute as u8]]);
        let mut flasher = Flasher::new(port);

        let outcome = flasher.command(&CommandFrame::execute()).unwrap();
        assert_eq!(outcome, ExchangeOutcome::Invalid);
        assert_eq!(flasher.into_port().writes.len(), 1);
    }

    #[test]
    fn test_command_ack_for_wrong_command_is_invalid() {
        let port = MockPort::new(&[&ack_for(Command::EraseApp)]);
        let mut flasher = Flasher::new(port);

        let outcome = flasher.command(&CommandFrame::execute()).unwrap();
        assert_eq!(outcome, ExchangeOutcome::Invalid);
    }

    #[test]
    fn test_packet_acked_on_third_attempt() {
        let port = MockPort::new(&[&packet_nack(5), &packet_nack(5), &packet_ack(5)]);
        let mut flasher = Flasher::new(port);

        let sent = flasher.send_packet(&[0xAB; PACKET_SIZE], 5).unwrap();
        assert!(sent);
        assert_eq!(flasher.into_port().writes.len(), 3);
    }

    #[test]
    fn test_packet_retries_exhausted_no_fourth_attempt() {
        let port = MockPort::new(&[&packet_nack(0), &packet_nack(0), &packet_nack(0)]);
        let mut flasher = Flasher::new(port);

        let sent = flasher.send_packet(&[0x00; PACKET_SIZE], 0).unwrap();
        assert!(!sent);
        assert_eq!(flasher.into_port().writes.len(), 3);
    }

    #[test]
    fn test_packet_ack_short_circuits() {
        let port = MockPort::new(&[&packet_ack(9), &packet_nack(9)]);
        let mut flasher = Flasher::new(port);

        let sent = flasher.send_packet(&[0x42; PACKET_SIZE], 9).unwrap();
        assert!(sent);
        assert_eq!(flasher.into_port().writes.len(), 1);
    }

    #[test]
    fn test_packet_sequence_mismatch_behaves_like_nack() {
        // An ACK carrying the wrong sequence number is retryable, not a
        // success.
        let port = MockPort::new(&[&packet_ack(7), &packet_ack(8)]);
        let mut flasher = Flasher::new(port);

        let sent = flasher.send_packet(&[0x11; PACKET_SIZE], 8).unwrap();
        assert!(sent);
        assert_eq!(flasher.into_port().writes.len(), 2);
    }

    #[test]
    fn test_download_aborts_with_zero_packets_on_device_error() {
        crate::test_reset_interrupt();
        let port = MockPort::new(&[&error(0x81)]);
        let mut flasher = Flasher::new(port);

        let result = flasher.download_firmware(&[0xAA; 130], |_, _| {});
        match result {
            Err(Error::Device(DeviceError::InvalidState)) => {}
            other => panic!("expected device error, got {other:?}"),
        }

        let port = flasher.into_port();
        assert_eq!(port.command_writes().len(), 1);
        assert!(port.packet_writes().is_empty());
    }

    #[test]
    fn test_download_aborts_on_invalid_command_response() {
        crate::test_reset_interrupt();
        let port = MockPort::new(&[]);
        let mut flasher = Flasher::new(port);

        let result = flasher.download_firmware(&[0xAA; 10], |_, _| {});
        assert!(matches!(result, Err(Error::Protocol(_))));
        assert!(flasher.into_port().packet_writes().is_empty());
    }

    #[test]
    fn test_download_stops_at_first_failed_packet() {
        crate::test_reset_interrupt();
        let port = MockPort::new(&[
            &ack_for(Command::DownloadFw),
            &packet_ack(0),
            &packet_nack(1),
            &packet_nack(1),
            &packet_nack(1),
        ]);
        let mut flasher = Flasher::new(port);

        let result = flasher.download_firmware(&[0x77; 192], |_, _| {});
        assert!(matches!(result, Err(Error::DownloadAborted(_))));

        // Packet 0 once, packet 1 three times, packet 2 never.
        assert_eq!(flasher.into_port().packet_writes().len(), 4);
    }

    #[test]
    fn test_download_end_to_end_130_bytes() {
        crate::test_reset_interrupt();
        let _ = env_logger::builder().is_test(true).try_init();

        let firmware: Vec<u8> = (0..130u32).map(|i| (i % 251) as u8).collect();
        let session = DownloadSession::new(&firmware).unwrap();
        assert_eq!(session.total_packets(), 3);

        let port = MockPort::new(&[
            &ack_for(Command::DownloadFw),
            &packet_ack(0),
            &packet_ack(1),
            &packet_ack(2),
        ]);
        let mut flasher = Flasher::new(port);

        let mut reported = Vec::new();
        flasher
            .download_firmware(&firmware, |sent, total| reported.push((sent, total)))
            .unwrap();

        let port = flasher.into_port();

        // Exactly one command write, then 3 packet writes in image order.
        let commands = port.command_writes();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0][0], Command::DownloadFw as u8);
        assert_eq!(&commands[0][1..3], &[0x03, 0x00]);
        assert_eq!(
            &commands[0][3..7],
            &session.crc().to_le_bytes(),
            "DOWNLOAD_FW carries the padded image CRC, little-endian"
        );

        let packets = port.packet_writes();
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].as_slice(), &firmware[..64]);
        assert_eq!(packets[1].as_slice(), &firmware[64..128]);
        assert_eq!(&packets[2][..2], &firmware[128..130]);
        assert_eq!(packets[2][2..], [0u8; 62], "final packet is zero-padded");

        assert_eq!(reported, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn test_erase_app_maps_outcomes() {
        let port = MockPort::new(&[&ack_for(Command::EraseApp)]);
        let mut flasher = Flasher::new(port);
        flasher.erase_app().unwrap();

        let port = MockPort::new(&[&error(0x81)]);
        let mut flasher = Flasher::new(port);
        assert!(matches!(
            flasher.erase_app(),
            Err(Error::Device(DeviceError::InvalidState))
        ));
    }

    #[test]
    fn test_execute_without_application_fails() {
        let port = MockPort::new(&[&error(0x84)]);
        let mut flasher = Flasher::new(port);
        assert!(matches!(
            flasher.execute(),
            Err(Error::Device(DeviceError::NoUserApp))
        ));
    }
}
