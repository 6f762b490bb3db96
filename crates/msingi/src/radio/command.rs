use core::fmt::Write;

use heapless::String;

use crate::error::{Error, Result};

/// Capacity of a single command line, large enough for a maximum-size
/// `AT+SEND`.
pub const COMMAND_CAPACITY: usize = 512;

/// A formatted command line, without its delimiter.
pub type CommandLine = String<COMMAND_CAPACITY>;

/// Commands understood by the radio module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// `AT`: checks that the module answers.
    Probe,
    /// `AT+BAND=<hz>`: sets the carrier frequency.
    Band(u32),
    /// `AT+PARAMETER=<sf>,<bw>,<cr>,<preamble>`: sets the modulation.
    Parameter {
        /// Spreading factor.
        spreading_factor: u8,
        /// Bandwidth code, see [`bandwidth_code`].
        bandwidth: u8,
        /// Coding rate code.
        coding_rate: u8,
        /// Preamble length.
        preamble: u8,
    },
    /// `AT+CRFOP=<dbm>`: sets the output power.
    TxPower(u8),
    /// `AT+NETWORKID=<id>`: sets the network identifier.
    NetworkId(u8),
    /// `AT+ADDRESS=<addr>`: sets the local address.
    Address(u16),
    /// `AT+SEND=<addr>,<hexlen>,<HEX>`: transmits hex-encoded data.
    Send {
        /// Destination address.
        address: u16,
        /// Uppercase hex payload.
        hex: &'a str,
    },
}

impl Command<'_> {
    /// Formats the command line.
    ///
    /// # Errors
    ///
    /// Fails if the line exceeds [`COMMAND_CAPACITY`].
    pub fn format(&self) -> Result<CommandLine> {
        let mut line = CommandLine::new();

        match *self {
            Self::Probe => line.push_str("AT").map_err(|()| core::fmt::Error),
            Self::Band(hz) => write!(line, "AT+BAND={hz}"),
            Self::Parameter {
                spreading_factor,
                bandwidth,
                coding_rate,
                preamble,
            } => write!(
                line,
                "AT+PARAMETER={spreading_factor},{bandwidth},{coding_rate},{preamble}"
            ),
            Self::TxPower(dbm) => write!(line, "AT+CRFOP={dbm}"),
            Self::NetworkId(id) => write!(line, "AT+NETWORKID={id}"),
            Self::Address(address) => write!(line, "AT+ADDRESS={address}"),
            Self::Send { address, hex } => write!(line, "AT+SEND={address},{},{hex}", hex.len()),
        }
        .map_err(|_| Error::transport("command exceeds line buffer"))?;

        Ok(line)
    }
}

/// Maps a bandwidth in kHz to the module bandwidth code.
///
/// `500` kHz and above map to `2`, `250` kHz and above to `1`, anything
/// else to `0` (125 kHz).
#[must_use]
pub const fn bandwidth_code(bandwidth_khz: u16) -> u8 {
    if bandwidth_khz >= 500 {
        2
    } else if bandwidth_khz >= 250 {
        1
    } else {
        0
    }
}
