//! # BRACE Enrollment
//!
//! Anonymous enrollment of a device with the proof server.
//!
//! Instead of its public key, the device submits a commitment
//!
//! ```text
//! SHA256(pad32("msingi:commitment:v1") || public_key || blinding_factor)
//! ```
//!
//! where the blinding factor is a 32 bytes random secret that never leaves
//! the device. The proof server learns the commitment only, so it cannot
//! link later telemetry back to the device key.
//!
//! The enrollment state machine only moves forward:
//!
//! ```text
//! Unregistered --register()--> PendingAck --confirm()--> Registered
//! ```
//!
//! Once acknowledged, the blinding factor is persisted on the secure
//! element and [`EnrollmentClient::restore`] recovers the `Registered`
//! state on every following boot.

use log::{info, warn};

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::control::registration_request;
use crate::crypto::{
    Abbreviated, CryptoProvider, DIGEST_SIZE, Digest, KeySlot, PUBLIC_KEY_SIZE, PublicKey,
    SECRET_SIZE, padded_domain,
};
use crate::error::{Error, Result};
use crate::radio::Link;

/// Domain tag of the commitment hash.
pub const COMMITMENT_DOMAIN: &str = "msingi:commitment:v1";

// Size of the commitment hash input.
const COMMITMENT_INPUT_SIZE: usize = DIGEST_SIZE + PUBLIC_KEY_SIZE + SECRET_SIZE;

/// Enrollment states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentState {
    /// No registration has been sent yet.
    Unregistered,
    /// A registration was sent and its acknowledgment is awaited.
    PendingAck,
    /// The proof server acknowledged the registration.
    Registered,
}

impl core::fmt::Display for EnrollmentState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Unregistered => "Unregistered",
            Self::PendingAck => "PendingAck",
            Self::Registered => "Registered",
        }
        .fmt(f)
    }
}

/// The secret blinding factor of a commitment.
///
/// Its memory is wiped when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct BlindingFactor([u8; SECRET_SIZE]);

impl BlindingFactor {
    /// Draws a new blinding factor from the hardware random generator.
    ///
    /// # Errors
    ///
    /// Fails if the random generator fails.
    pub fn generate<C: CryptoProvider>(crypto: &mut C) -> Result<Self> {
        let mut factor = Self([0u8; SECRET_SIZE]);
        crypto.random_bytes(&mut factor.0)?;
        Ok(factor)
    }

    /// Creates a blinding factor from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SECRET_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SECRET_SIZE] {
        &self.0
    }
}

impl core::fmt::Debug for BlindingFactor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("BlindingFactor(..)")
    }
}

/// Computes the commitment of `public_key` under `blinding_factor`.
///
/// The result is deterministic in its two inputs.
///
/// # Errors
///
/// Fails if the hashing engine fails.
pub fn commitment<C: CryptoProvider>(
    crypto: &mut C,
    public_key: &PublicKey,
    blinding_factor: &BlindingFactor,
) -> Result<Digest> {
    let mut input = [0u8; COMMITMENT_INPUT_SIZE];
    input[..DIGEST_SIZE].copy_from_slice(&padded_domain::<DIGEST_SIZE>(COMMITMENT_DOMAIN));
    input[DIGEST_SIZE..DIGEST_SIZE + PUBLIC_KEY_SIZE].copy_from_slice(public_key);
    input[DIGEST_SIZE + PUBLIC_KEY_SIZE..].copy_from_slice(blinding_factor.as_bytes());

    let digest = crypto.sha256(&input);
    input.zeroize();

    digest
}

/// The enrollment identity of a device.
#[derive(Debug)]
pub struct DeviceIdentity {
    public_key: PublicKey,
    blinding_factor: BlindingFactor,
    commitment: Digest,
}

impl DeviceIdentity {
    /// Builds the identity for the device key and `blinding_factor`.
    ///
    /// # Errors
    ///
    /// Fails if the public key cannot be retrieved or hashed.
    pub fn derive<C: CryptoProvider>(
        crypto: &mut C,
        blinding_factor: BlindingFactor,
    ) -> Result<Self> {
        let public_key = crypto.public_key(KeySlot::DeviceKey)?;
        let commitment = commitment(crypto, &public_key, &blinding_factor)?;

        Ok(Self {
            public_key,
            blinding_factor,
            commitment,
        })
    }

    /// Returns the device public key.
    #[must_use]
    #[inline]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Returns the commitment.
    #[must_use]
    #[inline]
    pub const fn commitment(&self) -> &Digest {
        &self.commitment
    }
}

/// The enrollment client.
#[derive(Debug)]
pub struct EnrollmentClient {
    state: EnrollmentState,
    identity: Option<DeviceIdentity>,
}

impl Default for EnrollmentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl EnrollmentClient {
    /// Creates an [`EnrollmentClient`] in the
    /// [`EnrollmentState::Unregistered`] state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: EnrollmentState::Unregistered,
            identity: None,
        }
    }

    /// Recovers the enrollment from a persisted blinding factor.
    ///
    /// When the secure element holds a blinding factor, the commitment is
    /// recomputed and the client starts as
    /// [`EnrollmentState::Registered`]. Otherwise it starts as
    /// [`EnrollmentState::Unregistered`].
    ///
    /// # Errors
    ///
    /// Fails if the persisted secret cannot be read or the commitment
    /// cannot be recomputed.
    pub fn restore<C: CryptoProvider>(crypto: &mut C) -> Result<Self> {
        let Some(mut secret) = crypto.load_secret(KeySlot::BlindingFactor)? else {
            info!("No persisted enrollment, starting unregistered");
            return Ok(Self::new());
        };

        let blinding_factor = BlindingFactor::from_bytes(secret);
        secret.zeroize();

        let identity = DeviceIdentity::derive(crypto, blinding_factor)?;
        info!(
            "Enrollment restored with commitment {}",
            Abbreviated(identity.commitment())
        );

        Ok(Self {
            state: EnrollmentState::Registered,
            identity: Some(identity),
        })
    }

    /// Sends a registration request carrying the device commitment.
    ///
    /// On success the client waits for the acknowledgment in
    /// [`EnrollmentState::PendingAck`]. The blinding factor is drawn on the
    /// first attempt only: while waiting, a registration resends the
    /// pending commitment, so a late acknowledgment always refers to it.
    ///
    /// # Errors
    ///
    /// Fails if the device is already registered, if a crypto operation
    /// fails or if the radio does not confirm the transmission. The state
    /// is unchanged on failure.
    pub fn register<C, L>(&mut self, crypto: &mut C, link: &mut L) -> Result<()>
    where
        C: CryptoProvider,
        L: Link,
    {
        if self.state == EnrollmentState::Registered {
            return Err(Error::protocol("device already registered"));
        }

        if let Some(identity) = self.identity.as_ref() {
            link.send(&registration_request(identity.commitment()))?;
            info!(
                "Registration resent with commitment {}",
                Abbreviated(identity.commitment())
            );
            return Ok(());
        }

        let blinding_factor = BlindingFactor::generate(crypto)?;
        let identity = DeviceIdentity::derive(crypto, blinding_factor)?;

        link.send(&registration_request(identity.commitment()))?;

        info!(
            "Registration sent with commitment {}",
            Abbreviated(identity.commitment())
        );

        self.identity = Some(identity);
        self.state = EnrollmentState::PendingAck;

        Ok(())
    }

    /// Handles a registration acknowledgment.
    ///
    /// Persists the blinding factor and moves to
    /// [`EnrollmentState::Registered`]. Returns `false` when no
    /// registration was pending, in which case nothing changes.
    ///
    /// # Errors
    ///
    /// Fails if the blinding factor cannot be persisted. The client stays
    /// in [`EnrollmentState::PendingAck`].
    pub fn confirm<C: CryptoProvider>(&mut self, crypto: &mut C) -> Result<bool> {
        let identity = match (self.state, self.identity.as_ref()) {
            (EnrollmentState::PendingAck, Some(identity)) => identity,
            (EnrollmentState::Registered, _) => {
                info!("Duplicate registration acknowledgment");
                return Ok(false);
            }
            _ => {
                warn!("Registration acknowledgment without a pending registration");
                return Ok(false);
            }
        };

        crypto.store_secret(KeySlot::BlindingFactor, identity.blinding_factor.as_bytes())?;

        self.state = EnrollmentState::Registered;
        info!("Registration acknowledged, device registered");

        Ok(true)
    }

    /// Returns the current [`EnrollmentState`].
    #[must_use]
    #[inline]
    pub const fn state(&self) -> EnrollmentState {
        self.state
    }

    /// Whether the device is registered.
    #[must_use]
    #[inline]
    pub const fn is_registered(&self) -> bool {
        matches!(self.state, EnrollmentState::Registered)
    }

    /// Returns the current commitment, once a registration was sent.
    #[must_use]
    pub fn commitment(&self) -> Option<&Digest> {
        self.identity.as_ref().map(DeviceIdentity::commitment)
    }

    /// Returns the current [`DeviceIdentity`], once a registration was
    /// sent.
    #[must_use]
    pub const fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// Returns the Merkle membership proof of the commitment.
    ///
    /// The proof server does not deliver proofs to devices yet, so no
    /// proof is ever available.
    #[must_use]
    pub const fn merkle_proof(&self) -> Option<&[Digest]> {
        None
    }
}
