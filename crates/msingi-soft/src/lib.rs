//! A software secure element for running `msingi` devices on an operating
//! system.
//!
//! This crate provides:
//!
//! - [`SoftSecureElement`], an implementation of the
//!   [`CryptoProvider`] contract backed by
//!   `secp256k1` ECDSA over SHA-256, HMAC-SHA256 and the operating system
//!   random generator. Slots are kept in memory, so their content lives as
//!   long as the element itself.
//! - [`SystemClock`], a [`Clock`] measuring the milliseconds elapsed since
//!   its creation.
//!
//! Together with a serial port, they run the whole device protocol on a
//! host, which is how simulations and integration tests exercise it.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::time::Instant;

use hmac::{Hmac, Mac};

use log::{debug, info};

use rand::RngCore;
use rand::rngs::OsRng;

use secp256k1::ecdsa::Signature as EcdsaSignature;
use secp256k1::{All, Message, PublicKey as EcPublicKey, Secp256k1, SecretKey};

use sha2::{Digest as _, Sha256};

use msingi::crypto::{
    CryptoProvider, Digest, KeySlot, PUBLIC_KEY_SIZE, PublicKey, SECRET_SIZE, Signature,
};
use msingi::error::{Error, Result};
use msingi::radio::Clock;

type HmacSha256 = Hmac<Sha256>;

// Tag of an uncompressed SEC1 point.
const UNCOMPRESSED_TAG: u8 = 0x04;

/// A secure element implemented in software.
pub struct SoftSecureElement {
    secp: Secp256k1<All>,
    device_key: Option<SecretKey>,
    secrets: [Option<[u8; SECRET_SIZE]>; 2],
}

impl Default for SoftSecureElement {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftSecureElement {
    /// Creates an empty [`SoftSecureElement`], without device key.
    #[must_use]
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
            device_key: None,
            secrets: [None, None],
        }
    }

    /// Creates a [`SoftSecureElement`] holding the given device secret key.
    ///
    /// # Errors
    ///
    /// Fails if `secret` is not a valid `secp256k1` scalar.
    pub fn with_device_key(secret: &[u8; 32]) -> Result<Self> {
        let key = SecretKey::from_slice(secret).map_err(|_| Error::crypto("invalid device key"))?;
        Ok(Self {
            device_key: Some(key),
            ..Self::new()
        })
    }

    fn device_key(&self) -> Result<&SecretKey> {
        self.device_key
            .as_ref()
            .ok_or(Error::crypto("device key not provisioned"))
    }

    fn mac_key(&self, slot: KeySlot) -> Result<[u8; 32]> {
        match slot {
            KeySlot::DeviceKey => self.device_key().map(SecretKey::secret_bytes),
            KeySlot::BlindingFactor => self.secrets[slot_index(slot)]
                .ok_or(Error::crypto("blinding factor slot is empty")),
        }
    }
}

impl CryptoProvider for SoftSecureElement {
    fn random_bytes(&mut self, buffer: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(buffer)
            .map_err(|_| Error::crypto("random generator failure"))
    }

    fn sha256(&mut self, data: &[u8]) -> Result<Digest> {
        Ok(Sha256::digest(data).into())
    }

    fn mac(&mut self, slot: KeySlot, data: &[u8]) -> Result<Digest> {
        let key = self.mac_key(slot)?;
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&key)
            .map_err(|_| Error::crypto("invalid MAC key"))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().into())
    }

    fn sign(&mut self, data: &[u8]) -> Result<Signature> {
        let key = self.device_key()?;
        let message = Message::from_digest(Sha256::digest(data).into());
        Ok(self.secp.sign_ecdsa(&message, key).serialize_compact())
    }

    fn verify(
        &mut self,
        public_key: &PublicKey,
        data: &[u8],
        signature: &Signature,
    ) -> Result<bool> {
        let mut point = [0u8; PUBLIC_KEY_SIZE + 1];
        point[0] = UNCOMPRESSED_TAG;
        point[1..].copy_from_slice(public_key);
        let public_key =
            EcPublicKey::from_slice(&point).map_err(|_| Error::crypto("invalid public key"))?;

        let Ok(signature) = EcdsaSignature::from_compact(signature) else {
            debug!("Malformed signature");
            return Ok(false);
        };

        let message = Message::from_digest(Sha256::digest(data).into());
        Ok(self
            .secp
            .verify_ecdsa(&message, &signature, &public_key)
            .is_ok())
    }

    fn public_key(&mut self, slot: KeySlot) -> Result<PublicKey> {
        if slot != KeySlot::DeviceKey {
            return Err(Error::crypto("slot holds no key pair"));
        }

        let point = EcPublicKey::from_secret_key(&self.secp, self.device_key()?)
            .serialize_uncompressed();

        let mut public_key = [0u8; PUBLIC_KEY_SIZE];
        public_key.copy_from_slice(&point[1..]);
        Ok(public_key)
    }

    fn is_key_provisioned(&mut self, slot: KeySlot) -> bool {
        match slot {
            KeySlot::DeviceKey => self.device_key.is_some(),
            KeySlot::BlindingFactor => false,
        }
    }

    fn generate_key(&mut self, slot: KeySlot) -> Result<()> {
        if slot != KeySlot::DeviceKey {
            return Err(Error::crypto("slot holds no key pair"));
        }

        self.device_key = Some(SecretKey::new(&mut OsRng));
        info!("Software device key generated");

        Ok(())
    }

    fn load_secret(&mut self, slot: KeySlot) -> Result<Option<[u8; SECRET_SIZE]>> {
        Ok(self.secrets[slot_index(slot)])
    }

    fn store_secret(&mut self, slot: KeySlot, secret: &[u8; SECRET_SIZE]) -> Result<()> {
        if slot == KeySlot::DeviceKey {
            return Err(Error::crypto("device key slot is not writable"));
        }

        self.secrets[slot_index(slot)] = Some(*secret);
        debug!("Secret stored in slot {}", slot.index());

        Ok(())
    }
}

#[inline]
fn slot_index(slot: KeySlot) -> usize {
    usize::from(slot.index())
}

/// A millisecond [`Clock`] based on [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    /// Creates a [`SystemClock`] starting at zero now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        // Truncation wraps the counter like a firmware tick.
        self.start.elapsed().as_millis() as u32
    }
}
