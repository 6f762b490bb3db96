use crate::error::{Error, Result};

/// Discriminant of a registration request, sent by the device only.
pub const REGISTRATION_REQUEST: u8 = 0x00;
/// Discriminant of a registration acknowledgment.
pub const REGISTRATION_ACK: u8 = 0x01;
/// Discriminant of an epoch update.
pub const EPOCH_UPDATE: u8 = 0x02;
/// Discriminant of a proof confirmation.
pub const PROOF_CONFIRMATION: u8 = 0x03;

/// Size of a registration request: discriminant and commitment.
pub const REGISTRATION_SIZE: usize = 1 + 32;

// Size of an epoch update: discriminant and big-endian epoch.
const EPOCH_UPDATE_SIZE: usize = 1 + 4;

/// A control message sent by the proof server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// The proof server accepted the registration commitment.
    RegistrationAck,
    /// The proof server announced a new epoch.
    EpochUpdate(u32),
    /// The proof server confirmed a proof.
    ProofConfirmation,
    /// An unrecognized discriminant.
    Unknown(u8),
}

impl ControlMessage {
    /// Decodes a control message from an inbound payload.
    ///
    /// Bytes following a recognized message are ignored. A registration
    /// request coming from the network is not a valid control message and
    /// is decoded as [`ControlMessage::Unknown`].
    ///
    /// # Errors
    ///
    /// Fails on an empty payload and on an epoch update shorter than five
    /// bytes.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let (&discriminant, body) = payload
            .split_first()
            .ok_or(Error::protocol("empty control message"))?;

        Ok(match discriminant {
            REGISTRATION_ACK => Self::RegistrationAck,
            EPOCH_UPDATE => {
                let epoch = body
                    .get(..EPOCH_UPDATE_SIZE - 1)
                    .and_then(|bytes| <[u8; 4]>::try_from(bytes).ok())
                    .ok_or(Error::protocol("truncated epoch update"))?;
                Self::EpochUpdate(u32::from_be_bytes(epoch))
            }
            PROOF_CONFIRMATION => Self::ProofConfirmation,
            other => Self::Unknown(other),
        })
    }

    /// Returns the message discriminant.
    #[must_use]
    pub const fn discriminant(&self) -> u8 {
        match self {
            Self::RegistrationAck => REGISTRATION_ACK,
            Self::EpochUpdate(_) => EPOCH_UPDATE,
            Self::ProofConfirmation => PROOF_CONFIRMATION,
            Self::Unknown(discriminant) => *discriminant,
        }
    }
}

/// Encodes a registration request carrying `commitment`.
#[must_use]
pub fn registration_request(commitment: &[u8; 32]) -> [u8; REGISTRATION_SIZE] {
    let mut message = [0u8; REGISTRATION_SIZE];
    message[0] = REGISTRATION_REQUEST;
    message[1..].copy_from_slice(commitment);
    message
}
