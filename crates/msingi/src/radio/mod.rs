//! # Radio Transport
//!
//! A driver for LoRa modules controlled through a line-oriented `AT`
//! command channel, such as the `RYLR896`.
//!
//! The module offers no framing and no reliability of its own: every
//! command is a text line, every answer is a text line, and inbound data
//! appears as unsolicited `+RCV=` notifications. This driver turns that
//! channel into a length-delimited message link:
//!
//! - payloads travel as uppercase hexadecimal inside `AT+SEND`
//! - every wait is bounded by a timeout, so no call blocks indefinitely
//! - inbound lines are fully validated before any byte is handed out
//!
//! The driver never retries. Callers decide their own retry policy.

mod command;
mod frame;

pub use command::{COMMAND_CAPACITY, Command, CommandLine, bandwidth_code};
pub use frame::{
    FrameError, MAX_HEX_SIZE, MAX_PAYLOAD_SIZE, Payload, RadioFrame, SignalQuality, decode_hex,
    encode_hex_upper, parse_receive_line,
};

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};

use heapless::Vec;

use log::{debug, info, warn};

use crate::config::{MAX_SPREADING_FACTOR, MIN_SPREADING_FACTOR, RadioConfig};
use crate::error::{Error, Result};

// Line delimiter written after every command.
const LINE_DELIMITER: &[u8] = b"\r\n";
// Substring of an affirmative response.
const AFFIRMATIVE: &[u8] = b"+OK";
// Capacity of a captured command response. Longer responses are consumed
// but truncated.
const RESPONSE_CAPACITY: usize = 64;
// Capacity of a captured inbound line, enough for a maximum-size frame.
const FRAME_LINE_CAPACITY: usize = 512;
// Delay between serial polls while waiting for data.
const POLL_DELAY_US: u32 = 100;
// Settle time between two configuration commands.
const CONFIG_SETTLE_MS: u32 = 100;

/// A monotonic millisecond clock.
///
/// The counter starts at boot and wraps around; elapsed times are always
/// computed with wrapping arithmetic.
pub trait Clock {
    /// Milliseconds elapsed since boot.
    fn now_ms(&self) -> u32;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}

/// A point-to-point message link towards the proof server.
pub trait Link {
    /// Transmits `payload` to the peer.
    ///
    /// # Errors
    ///
    /// Fails if the payload is too large, or if the local radio does not
    /// confirm the transmission in time.
    fn send(&mut self, payload: &[u8]) -> Result<()>;

    /// Returns the next validated inbound frame, if one is pending.
    fn poll_receive(&mut self) -> Option<RadioFrame>;

    /// Whether inbound input is waiting to be polled.
    fn has_pending(&mut self) -> bool;
}

// Outcome of a bounded line read.
struct LineRead {
    // The line delimiter was received.
    terminated: bool,
    // Some bytes did not fit in the buffer.
    truncated: bool,
}

/// The radio transport driver.
pub struct RadioTransport<S, D, C>
where
    S: Read + Write + ReadReady,
    D: DelayNs,
    C: Clock,
{
    serial: S,
    delay: D,
    clock: C,
    config: RadioConfig,
    signal: SignalQuality,
}

impl<S, D, C> RadioTransport<S, D, C>
where
    S: Read + Write + ReadReady,
    D: DelayNs,
    C: Clock,
{
    /// Creates a [`RadioTransport`] over the given serial channel, delay
    /// provider and clock.
    #[must_use]
    pub fn new(serial: S, delay: D, clock: C, config: RadioConfig) -> Self {
        Self {
            serial,
            delay,
            clock,
            config,
            signal: SignalQuality::default(),
        }
    }

    /// Discards stale input and checks that the module answers `AT`.
    ///
    /// # Errors
    ///
    /// Fails if the module does not answer affirmatively in time.
    pub fn begin(&mut self) -> Result<()> {
        self.command(&Command::Probe)?;
        info!("Radio module answered");
        Ok(())
    }

    /// Applies the whole [`RadioConfig`]: frequency, modulation, output
    /// power, network identifier and address.
    ///
    /// # Errors
    ///
    /// Stops at the first command that fails.
    pub fn apply(&mut self) -> Result<()> {
        let config = self.config;
        self.configure(
            config.frequency_hz,
            config.spreading_factor,
            config.bandwidth_khz,
        )?;
        self.set_network_id(config.network_id)?;
        self.set_address(config.address)
    }

    /// Configures frequency, spreading factor and bandwidth, then sets the
    /// configured output power.
    ///
    /// # Errors
    ///
    /// Stops at the first command that fails.
    pub fn configure(
        &mut self,
        frequency_hz: u32,
        spreading_factor: u8,
        bandwidth_khz: u16,
    ) -> Result<()> {
        self.set_band(frequency_hz)?;
        self.delay.delay_ms(CONFIG_SETTLE_MS);

        self.set_parameters(spreading_factor, bandwidth_khz)?;
        self.delay.delay_ms(CONFIG_SETTLE_MS);

        self.set_tx_power(self.config.tx_power_dbm)?;

        info!(
            "Radio configured: {} MHz, SF{}, {} kHz",
            frequency_hz / 1_000_000,
            self.config.spreading_factor,
            bandwidth_khz
        );

        Ok(())
    }

    /// Sets the carrier frequency in Hz.
    ///
    /// # Errors
    ///
    /// Fails on a non-affirmative or missing response.
    pub fn set_band(&mut self, frequency_hz: u32) -> Result<()> {
        self.command(&Command::Band(frequency_hz))?;
        self.config.frequency_hz = frequency_hz;
        Ok(())
    }

    /// Sets the spreading factor and bandwidth, with the configured coding
    /// rate and preamble.
    ///
    /// The spreading factor is clamped between `7` and `12`.
    ///
    /// # Errors
    ///
    /// Fails on a non-affirmative or missing response.
    pub fn set_parameters(&mut self, spreading_factor: u8, bandwidth_khz: u16) -> Result<()> {
        let spreading_factor = spreading_factor.clamp(MIN_SPREADING_FACTOR, MAX_SPREADING_FACTOR);
        self.command(&Command::Parameter {
            spreading_factor,
            bandwidth: bandwidth_code(bandwidth_khz),
            coding_rate: self.config.coding_rate,
            preamble: self.config.preamble,
        })?;
        self.config.spreading_factor = spreading_factor;
        self.config.bandwidth_khz = bandwidth_khz;
        Ok(())
    }

    /// Sets the output power in dBm.
    ///
    /// # Errors
    ///
    /// Fails on a non-affirmative or missing response.
    pub fn set_tx_power(&mut self, dbm: u8) -> Result<()> {
        self.command(&Command::TxPower(dbm))?;
        self.config.tx_power_dbm = dbm;
        Ok(())
    }

    /// Sets the network identifier.
    ///
    /// # Errors
    ///
    /// Fails on a non-affirmative or missing response.
    pub fn set_network_id(&mut self, id: u8) -> Result<()> {
        self.command(&Command::NetworkId(id))?;
        self.config.network_id = id;
        Ok(())
    }

    /// Sets the local radio address.
    ///
    /// # Errors
    ///
    /// Fails on a non-affirmative or missing response.
    pub fn set_address(&mut self, address: u16) -> Result<()> {
        self.command(&Command::Address(address))?;
        self.config.address = address;
        Ok(())
    }

    /// Transmits `payload` to the configured peer address.
    ///
    /// A success only means the local module accepted the transmission,
    /// not that the peer processed it.
    ///
    /// # Errors
    ///
    /// Fails without issuing any command if the payload exceeds
    /// [`MAX_PAYLOAD_SIZE`]. Fails if the module does not confirm in time.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::transport("payload exceeds 240 bytes"));
        }

        let mut hex = [0u8; MAX_HEX_SIZE];
        let hex = encode_hex_upper(payload, &mut hex)?;

        self.command(&Command::Send {
            address: self.config.peer_address,
            hex,
        })
    }

    /// Returns the next inbound frame, without blocking if none is
    /// pending.
    ///
    /// Once input is pending, a single line is read within the configured
    /// receive window. Malformed, truncated or incomplete lines are
    /// discarded and reported as `None`.
    pub fn poll_receive(&mut self) -> Option<RadioFrame> {
        match self.serial.read_ready() {
            Ok(true) => {}
            Ok(false) => return None,
            Err(_) => {
                warn!("Radio serial channel failed while polling");
                return None;
            }
        }

        let mut line = Vec::<u8, FRAME_LINE_CAPACITY>::new();
        let read = match self.read_line(&mut line, self.config.receive_window_ms) {
            Ok(read) => read,
            Err(e) => {
                warn!("Radio receive failed: {e}");
                return None;
            }
        };

        if read.truncated {
            warn!("Discarding oversized radio line");
            return None;
        }

        if !read.terminated {
            warn!("Discarding radio frame: {}", FrameError::Unterminated);
            return None;
        }

        match parse_receive_line(&line) {
            Ok(frame) => {
                self.signal = frame.signal;
                debug!(
                    "Radio RX: {} bytes from {} (RSSI {} dBm, SNR {} dB)",
                    frame.payload.len(),
                    frame.source,
                    frame.signal.rssi,
                    frame.signal.snr
                );
                Some(frame)
            }
            Err(e) => {
                warn!("Discarding radio frame: {e}");
                None
            }
        }
    }

    /// Whether the serial channel holds unread input.
    pub fn has_pending(&mut self) -> bool {
        self.serial.read_ready().unwrap_or_else(|_| {
            warn!("Radio serial channel failed while polling");
            false
        })
    }

    /// Signal quality of the last valid inbound frame.
    #[must_use]
    #[inline]
    pub const fn last_signal(&self) -> SignalQuality {
        self.signal
    }

    /// Current radio configuration.
    #[must_use]
    #[inline]
    pub const fn config(&self) -> &RadioConfig {
        &self.config
    }

    /// Releases the serial channel.
    #[must_use]
    pub fn release(self) -> S {
        self.serial
    }

    fn command(&mut self, command: &Command<'_>) -> Result<()> {
        let line = command.format()?;

        self.discard_pending()?;

        debug!("Radio TX: {line}");
        self.write_line(line.as_bytes())?;

        let mut response = Vec::<u8, RESPONSE_CAPACITY>::new();
        let _read = self.read_line(&mut response, self.config.command_timeout_ms)?;

        if response.is_empty() {
            return Err(Error::transport("no response from radio"));
        }

        debug!(
            "Radio RX: {}",
            core::str::from_utf8(&response)
                .unwrap_or("<binary>")
                .trim_end()
        );

        if response.windows(AFFIRMATIVE.len()).any(|w| w == AFFIRMATIVE) {
            Ok(())
        } else {
            Err(Error::transport("radio rejected command"))
        }
    }

    fn discard_pending(&mut self) -> Result<()> {
        let mut scratch = [0u8; 32];
        let mut discarded = 0;
        while self.serial.read_ready().map_err(|_| serial_error())? {
            discarded += self.serial.read(&mut scratch).map_err(|_| serial_error())?;
        }

        if discarded > 0 {
            warn!("Discarded {discarded} bytes of unread radio input");
        }

        Ok(())
    }

    fn write_line(&mut self, line: &[u8]) -> Result<()> {
        self.serial.write_all(line).map_err(|_| serial_error())?;
        self.serial
            .write_all(LINE_DELIMITER)
            .map_err(|_| serial_error())?;
        self.serial.flush().map_err(|_| serial_error())
    }

    // Captures bytes up to and including the next line feed, or until the
    // timeout elapses.
    fn read_line<const N: usize>(
        &mut self,
        line: &mut Vec<u8, N>,
        timeout_ms: u32,
    ) -> Result<LineRead> {
        let start = self.clock.now_ms();
        let mut truncated = false;

        loop {
            if self.clock.now_ms().wrapping_sub(start) >= timeout_ms {
                return Ok(LineRead {
                    terminated: false,
                    truncated,
                });
            }

            if !self.serial.read_ready().map_err(|_| serial_error())? {
                self.delay.delay_us(POLL_DELAY_US);
                continue;
            }

            let mut byte = [0u8; 1];
            if self.serial.read(&mut byte).map_err(|_| serial_error())? == 0 {
                continue;
            }

            if line.push(byte[0]).is_err() {
                truncated = true;
            }

            if byte[0] == b'\n' {
                return Ok(LineRead {
                    terminated: true,
                    truncated,
                });
            }
        }
    }
}

impl<S, D, C> Link for RadioTransport<S, D, C>
where
    S: Read + Write + ReadReady,
    D: DelayNs,
    C: Clock,
{
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        RadioTransport::send(self, payload)
    }

    fn poll_receive(&mut self) -> Option<RadioFrame> {
        RadioTransport::poll_receive(self)
    }

    fn has_pending(&mut self) -> bool {
        RadioTransport::has_pending(self)
    }
}

#[inline]
const fn serial_error() -> Error {
    Error::transport("serial channel failure")
}
