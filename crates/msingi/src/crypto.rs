//! # Crypto Provider
//!
//! The capability interface of the secure element that holds the device
//! key pair and the enrollment secrets.
//!
//! Private key material never crosses this interface: the core asks the
//! provider to sign, to compute keyed MACs and to hand out the public key.
//! The only secret the core ever sees is the blinding factor, which it
//! generates through [`CryptoProvider::random_bytes`] and persists through
//! [`CryptoProvider::store_secret`].

use crate::error::Result;

/// Size of an uncompressed elliptic-curve public key (`X || Y`).
pub const PUBLIC_KEY_SIZE: usize = 64;
/// Size of a raw `R || S` signature.
pub const SIGNATURE_SIZE: usize = 64;
/// Size of a SHA-256 digest or of a MAC tag.
pub const DIGEST_SIZE: usize = 32;
/// Size of a persisted secret.
pub const SECRET_SIZE: usize = 32;

/// An uncompressed elliptic-curve public key.
pub type PublicKey = [u8; PUBLIC_KEY_SIZE];
/// A raw signature.
pub type Signature = [u8; SIGNATURE_SIZE];
/// A SHA-256 digest.
pub type Digest = [u8; DIGEST_SIZE];

/// Secure element slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySlot {
    /// The device signing key pair.
    DeviceKey = 0,
    /// The enrollment blinding factor.
    BlindingFactor = 1,
}

impl KeySlot {
    /// Returns the slot number on the secure element.
    #[must_use]
    #[inline]
    pub const fn index(self) -> u8 {
        self as u8
    }
}

/// Hardware-backed cryptographic primitives.
///
/// Every method takes `&mut self` because secure elements are driven over a
/// shared bus. Failures are reported as
/// [`ErrorKind::Crypto`](crate::error::ErrorKind::Crypto) errors.
pub trait CryptoProvider {
    /// Fills `buffer` with random bytes from the hardware generator.
    ///
    /// # Errors
    ///
    /// Fails on a hardware fault.
    fn random_bytes(&mut self, buffer: &mut [u8]) -> Result<()>;

    /// Computes the SHA-256 digest of `data`.
    ///
    /// # Errors
    ///
    /// Fails if the hashing engine is unavailable.
    fn sha256(&mut self, data: &[u8]) -> Result<Digest>;

    /// Computes a keyed MAC of `data` with the key held in `slot`.
    ///
    /// # Errors
    ///
    /// Fails if the slot holds no key or the MAC engine is unavailable.
    fn mac(&mut self, slot: KeySlot, data: &[u8]) -> Result<Digest>;

    /// Signs the SHA-256 digest of `data` with the device key.
    ///
    /// # Errors
    ///
    /// Fails if the device key is missing or the signing operation fails.
    fn sign(&mut self, data: &[u8]) -> Result<Signature>;

    /// Verifies `signature` over the SHA-256 digest of `data`.
    ///
    /// # Errors
    ///
    /// Fails if the verification engine is unavailable. An invalid
    /// signature is reported as `Ok(false)`.
    fn verify(&mut self, public_key: &PublicKey, data: &[u8], signature: &Signature)
    -> Result<bool>;

    /// Returns the public key of the key pair held in `slot`.
    ///
    /// # Errors
    ///
    /// Fails if the slot holds no key pair.
    fn public_key(&mut self, slot: KeySlot) -> Result<PublicKey>;

    /// Whether a key pair is provisioned in `slot`.
    fn is_key_provisioned(&mut self, slot: KeySlot) -> bool;

    /// Generates a new key pair in `slot`.
    ///
    /// # Errors
    ///
    /// Fails if the slot is locked or the generation fails.
    fn generate_key(&mut self, slot: KeySlot) -> Result<()>;

    /// Loads the secret persisted in `slot`, if any.
    ///
    /// # Errors
    ///
    /// Fails if the storage cannot be read.
    fn load_secret(&mut self, slot: KeySlot) -> Result<Option<[u8; SECRET_SIZE]>>;

    /// Persists `secret` in `slot`.
    ///
    /// # Errors
    ///
    /// Fails if the storage cannot be written.
    fn store_secret(&mut self, slot: KeySlot, secret: &[u8; SECRET_SIZE]) -> Result<()>;
}

/// Makes sure a device key pair exists in [`KeySlot::DeviceKey`].
///
/// Returns `true` when a new key pair had to be generated.
///
/// # Errors
///
/// Fails if key generation fails.
pub fn provision_device_key<C: CryptoProvider>(crypto: &mut C) -> Result<bool> {
    if crypto.is_key_provisioned(KeySlot::DeviceKey) {
        log::info!("Device key already provisioned");
        return Ok(false);
    }

    log::warn!("Device key not provisioned, generating...");
    crypto.generate_key(KeySlot::DeviceKey)?;
    log::info!("Device key provisioned");

    Ok(true)
}

/// Copies an ASCII domain tag into a zero-padded fixed-size block.
///
/// Tags longer than `N` are truncated.
#[must_use]
pub(crate) fn padded_domain<const N: usize>(tag: &str) -> [u8; N] {
    let mut block = [0u8; N];
    let len = tag.len().min(N);
    block[..len].copy_from_slice(&tag.as_bytes()[..len]);
    block
}

/// Displays the first eight bytes of a digest as lowercase hexadecimal.
pub(crate) struct Abbreviated<'a>(pub(crate) &'a [u8]);

impl core::fmt::Display for Abbreviated<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for byte in self.0.iter().take(8) {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
