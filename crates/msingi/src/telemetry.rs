//! # Signed Telemetry
//!
//! Every telemetry report is a fixed-layout [`DataPacket`] sent as a single
//! radio payload, without further framing:
//!
//! | Offset | Size | Field |
//! |-------:|-----:|-------|
//! | 0 | 32 | commitment |
//! | 32 | 4 | temperature, `f32` little-endian |
//! | 36 | 4 | humidity, `f32` little-endian |
//! | 40 | 4 | soil moisture, `f32` little-endian |
//! | 44 | 4 | timestamp, `u32` little-endian |
//! | 48 | 32 | nullifier |
//! | 80 | 64 | signature |
//!
//! The signature covers the first 80 bytes. The nullifier binds the report
//! to an epoch: it is the same for every report of a device within one
//! epoch and unlinkable across epochs.

use crate::crypto::{
    CryptoProvider, DIGEST_SIZE, Digest, KeySlot, PublicKey, SIGNATURE_SIZE, Signature,
};
use crate::error::{Error, Result};
use crate::sensor::Measurement;

/// Domain tag of the nullifier MAC.
pub const NULLIFIER_DOMAIN: &str = "msingi:nullifier:v1";

/// Size of the signed region of a packet.
pub const SIGNED_SIZE: usize = DIGEST_SIZE + 4 * 4 + DIGEST_SIZE;
/// Size of a whole packet.
pub const PACKET_SIZE: usize = SIGNED_SIZE + SIGNATURE_SIZE;

// Capacity of the nullifier MAC input buffer.
const NULLIFIER_BUFFER_SIZE: usize = 64;

const TEMPERATURE_OFFSET: usize = DIGEST_SIZE;
const HUMIDITY_OFFSET: usize = TEMPERATURE_OFFSET + 4;
const SOIL_MOISTURE_OFFSET: usize = HUMIDITY_OFFSET + 4;
const TIMESTAMP_OFFSET: usize = SOIL_MOISTURE_OFFSET + 4;
const NULLIFIER_OFFSET: usize = TIMESTAMP_OFFSET + 4;

/// A signed telemetry packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPacket {
    /// Enrollment commitment of the device.
    pub commitment: Digest,
    /// Air temperature in °C.
    pub temperature: f32,
    /// Relative humidity in %.
    pub humidity: f32,
    /// Soil moisture in %.
    pub soil_moisture: f32,
    /// Milliseconds since boot, wrapping.
    pub timestamp: u32,
    /// Epoch nullifier.
    pub nullifier: Digest,
    /// Signature over the first [`SIGNED_SIZE`] bytes.
    pub signature: Signature,
}

impl DataPacket {
    /// Returns the signed region of the packet.
    #[must_use]
    pub fn signed_bytes(&self) -> [u8; SIGNED_SIZE] {
        let mut bytes = [0u8; SIGNED_SIZE];
        bytes[..TEMPERATURE_OFFSET].copy_from_slice(&self.commitment);
        bytes[TEMPERATURE_OFFSET..HUMIDITY_OFFSET].copy_from_slice(&self.temperature.to_le_bytes());
        bytes[HUMIDITY_OFFSET..SOIL_MOISTURE_OFFSET].copy_from_slice(&self.humidity.to_le_bytes());
        bytes[SOIL_MOISTURE_OFFSET..TIMESTAMP_OFFSET]
            .copy_from_slice(&self.soil_moisture.to_le_bytes());
        bytes[TIMESTAMP_OFFSET..NULLIFIER_OFFSET].copy_from_slice(&self.timestamp.to_le_bytes());
        bytes[NULLIFIER_OFFSET..].copy_from_slice(&self.nullifier);
        bytes
    }

    /// Returns the wire image of the packet.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; PACKET_SIZE] {
        let mut bytes = [0u8; PACKET_SIZE];
        bytes[..SIGNED_SIZE].copy_from_slice(&self.signed_bytes());
        bytes[SIGNED_SIZE..].copy_from_slice(&self.signature);
        bytes
    }

    /// Parses a wire image.
    ///
    /// # Errors
    ///
    /// Fails if `bytes` is not exactly [`PACKET_SIZE`] bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; PACKET_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::protocol("telemetry packet has wrong length"))?;

        Ok(Self {
            commitment: field(bytes, 0),
            temperature: f32::from_le_bytes(field(bytes, TEMPERATURE_OFFSET)),
            humidity: f32::from_le_bytes(field(bytes, HUMIDITY_OFFSET)),
            soil_moisture: f32::from_le_bytes(field(bytes, SOIL_MOISTURE_OFFSET)),
            timestamp: u32::from_le_bytes(field(bytes, TIMESTAMP_OFFSET)),
            nullifier: field(bytes, NULLIFIER_OFFSET),
            signature: field(bytes, SIGNED_SIZE),
        })
    }
}

// Copies `N` bytes starting at `offset`. Offsets are packet-layout
// constants, so the range always lies within the packet.
fn field<const N: usize>(bytes: &[u8; PACKET_SIZE], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

/// Derives the nullifier of the device for `epoch`.
///
/// The MAC input is the domain tag followed by the big-endian epoch.
///
/// # Errors
///
/// Fails if the MAC operation fails.
pub fn nullifier<C: CryptoProvider>(crypto: &mut C, epoch: u32) -> Result<Digest> {
    let tag = NULLIFIER_DOMAIN.as_bytes();
    let len = tag.len() + 4;

    let mut input = [0u8; NULLIFIER_BUFFER_SIZE];
    input[..tag.len()].copy_from_slice(tag);
    input[tag.len()..len].copy_from_slice(&epoch.to_be_bytes());

    crypto.mac(KeySlot::DeviceKey, &input[..len])
}

/// Builds and signs the packet reporting `measurement` for `epoch`.
///
/// # Errors
///
/// Fails if the nullifier or the signature cannot be computed. No
/// partially signed packet is ever returned.
pub fn build_packet<C: CryptoProvider>(
    crypto: &mut C,
    commitment: &Digest,
    epoch: u32,
    measurement: &Measurement,
    timestamp: u32,
) -> Result<DataPacket> {
    let mut packet = DataPacket {
        commitment: *commitment,
        temperature: measurement.temperature,
        humidity: measurement.humidity,
        soil_moisture: measurement.soil_moisture,
        timestamp,
        nullifier: nullifier(crypto, epoch)?,
        signature: [0u8; SIGNATURE_SIZE],
    };

    packet.signature = crypto.sign(&packet.signed_bytes())?;

    Ok(packet)
}

/// Verifies the signature of `packet` against `public_key`.
///
/// # Errors
///
/// Fails if the verification engine fails.
pub fn verify_packet<C: CryptoProvider>(
    crypto: &mut C,
    public_key: &PublicKey,
    packet: &DataPacket,
) -> Result<bool> {
    crypto.verify(public_key, &packet.signed_bytes(), &packet.signature)
}
