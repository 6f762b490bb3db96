use heapless::Vec;

use crate::error::Error;

/// Maximum payload the radio module can carry in a single transmission.
pub const MAX_PAYLOAD_SIZE: usize = 240;
/// Maximum length of a hex-encoded payload.
pub const MAX_HEX_SIZE: usize = 2 * MAX_PAYLOAD_SIZE;

// Receive notification prefix.
const RECEIVE_PREFIX: &str = "+RCV=";

/// A decoded inbound payload.
pub type Payload = Vec<u8, MAX_PAYLOAD_SIZE>;

/// Signal quality of a reception.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalQuality {
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// Signal-to-noise ratio in dB.
    pub snr: i8,
}

/// A validated inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioFrame {
    /// Address of the sending radio.
    pub source: u16,
    /// Decoded payload bytes.
    pub payload: Payload,
    /// Signal quality of this reception.
    pub signal: SignalQuality,
}

/// Reasons why a receive notification is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// The line does not start with `+RCV=`.
    MissingPrefix,
    /// A field is missing or empty.
    MissingField,
    /// The line carries more than five fields.
    TooManyFields,
    /// A numeric field cannot be parsed.
    InvalidNumber,
    /// The declared length disagrees with the hex data.
    LengthMismatch,
    /// The hex data has an odd number of digits.
    OddHexLength,
    /// The hex data contains a non-hexadecimal character.
    InvalidHex,
    /// The payload exceeds [`MAX_PAYLOAD_SIZE`] or the output buffer.
    PayloadTooLarge,
    /// The line ended before its delimiter was received.
    Unterminated,
    /// The line is not valid text.
    NotText,
}

impl FrameError {
    const fn description(self) -> &'static str {
        match self {
            Self::MissingPrefix => "frame does not start with +RCV=",
            Self::MissingField => "frame field missing",
            Self::TooManyFields => "frame has too many fields",
            Self::InvalidNumber => "frame numeric field is invalid",
            Self::LengthMismatch => "frame length disagrees with its data",
            Self::OddHexLength => "frame hex data has odd length",
            Self::InvalidHex => "frame hex data is invalid",
            Self::PayloadTooLarge => "frame payload too large",
            Self::Unterminated => "frame line is incomplete",
            Self::NotText => "frame is not text",
        }
    }
}

impl core::fmt::Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.description().fmt(f)
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Error::transport(e.description())
    }
}

/// Encodes `payload` as uppercase hexadecimal into `out`.
///
/// # Errors
///
/// Fails if `out` is shorter than twice the payload length.
pub fn encode_hex_upper<'a>(payload: &[u8], out: &'a mut [u8]) -> Result<&'a str, FrameError> {
    let len = payload.len() * 2;
    if out.len() < len {
        return Err(FrameError::PayloadTooLarge);
    }

    let hex = &mut out[..len];
    hex::encode_to_slice(payload, hex).map_err(|_| FrameError::PayloadTooLarge)?;
    hex.make_ascii_uppercase();

    core::str::from_utf8(hex).map_err(|_| FrameError::NotText)
}

/// Decodes hexadecimal digits of either case into `out`.
///
/// # Errors
///
/// Fails on an odd number of digits, on a non-hexadecimal digit, or if
/// `out` cannot hold the decoded bytes.
pub fn decode_hex<'a>(hex: &[u8], out: &'a mut [u8]) -> Result<&'a [u8], FrameError> {
    if hex.len() % 2 != 0 {
        return Err(FrameError::OddHexLength);
    }

    let len = hex.len() / 2;
    if out.len() < len {
        return Err(FrameError::PayloadTooLarge);
    }

    let bytes = &mut out[..len];
    hex::decode_to_slice(hex, bytes).map_err(|_| FrameError::InvalidHex)?;

    Ok(bytes)
}

/// Parses a `+RCV=<addr>,<len>,<hexdata>,<rssi>,<snr>` line.
///
/// A trailing line delimiter is ignored. The declared length may count
/// either hex digits or payload bytes.
///
/// # Errors
///
/// Returns the first [`FrameError`] found. A rejected line never yields
/// partial data.
pub fn parse_receive_line(line: &[u8]) -> Result<RadioFrame, FrameError> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    let text = core::str::from_utf8(line).map_err(|_| FrameError::NotText)?;
    let body = text
        .strip_prefix(RECEIVE_PREFIX)
        .ok_or(FrameError::MissingPrefix)?;

    let mut fields = body.split(',');
    let source = parse_number::<u16>(next_field(&mut fields)?)?;
    let length = parse_number::<usize>(next_field(&mut fields)?)?;
    let hex = next_field(&mut fields)?;
    let rssi = parse_number::<i16>(next_field(&mut fields)?)?;
    let snr = parse_number::<i8>(next_field(&mut fields)?)?;

    if fields.next().is_some() {
        return Err(FrameError::TooManyFields);
    }

    if hex.len() % 2 != 0 {
        return Err(FrameError::OddHexLength);
    }

    if length != hex.len() && length != hex.len() / 2 {
        return Err(FrameError::LengthMismatch);
    }

    if hex.len() > MAX_HEX_SIZE {
        return Err(FrameError::PayloadTooLarge);
    }

    let mut buffer = [0u8; MAX_PAYLOAD_SIZE];
    let bytes = decode_hex(hex.as_bytes(), &mut buffer)?;
    let payload = Payload::from_slice(bytes).map_err(|()| FrameError::PayloadTooLarge)?;

    Ok(RadioFrame {
        source,
        payload,
        signal: SignalQuality { rssi, snr },
    })
}

fn next_field<'a>(fields: &mut core::str::Split<'a, char>) -> Result<&'a str, FrameError> {
    fields
        .next()
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .ok_or(FrameError::MissingField)
}

fn parse_number<T: core::str::FromStr>(field: &str) -> Result<T, FrameError> {
    field.parse().map_err(|_| FrameError::InvalidNumber)
}
