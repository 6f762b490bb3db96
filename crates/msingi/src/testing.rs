//! Test doubles shared by the unit tests of this crate.

extern crate std;

use core::cell::Cell;
use core::convert::Infallible;

use std::collections::VecDeque;
use std::vec::Vec;

use hmac::{Hmac, Mac};
use sha2::{Digest as _, Sha256};

use crate::crypto::{
    CryptoProvider, Digest, KeySlot, PUBLIC_KEY_SIZE, PublicKey, SECRET_SIZE, Signature,
};
use crate::error::{Error, Result};
use crate::radio::{Clock, Link, RadioFrame, SignalQuality};

type HmacSha256 = Hmac<Sha256>;

/// The device secret every [`FakeCrypto`] starts with.
pub(crate) const DEVICE_SECRET: [u8; 32] = [0x5A; 32];

/// Operations of [`FakeCrypto`] that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Random,
    Sha256,
    Mac,
    Sign,
    PublicKey,
    GenerateKey,
    StoreSecret,
}

/// A deterministic crypto provider.
///
/// Hashing and MACs are real SHA-256 and HMAC-SHA256 so digests can be
/// checked against independent computations. The "signature" is a pair of
/// HMAC tags, which is enough to exercise the signed byte range.
pub(crate) struct FakeCrypto {
    device_secret: Option<[u8; 32]>,
    secrets: [Option<[u8; SECRET_SIZE]>; 2],
    failing: Option<Operation>,
    counter: u8,
}

impl FakeCrypto {
    pub(crate) fn new() -> Self {
        Self {
            device_secret: Some(DEVICE_SECRET),
            secrets: [None, None],
            failing: None,
            counter: 0,
        }
    }

    pub(crate) fn unprovisioned() -> Self {
        Self {
            device_secret: None,
            ..Self::new()
        }
    }

    pub(crate) fn fail_on(&mut self, operation: Operation) {
        self.failing = Some(operation);
    }

    pub(crate) fn heal(&mut self) {
        self.failing = None;
    }

    pub(crate) fn is_provisioned(&self) -> bool {
        self.device_secret.is_some()
    }

    pub(crate) fn stored(&self, slot: KeySlot) -> Option<[u8; SECRET_SIZE]> {
        self.secrets[slot.index() as usize]
    }

    pub(crate) fn hmac(key: &[u8], data: &[u8]) -> Digest {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(key).unwrap();
        mac.update(data);
        mac.finalize().into_bytes().into()
    }

    fn check(&self, operation: Operation) -> Result<()> {
        if self.failing == Some(operation) {
            Err(Error::crypto("injected failure"))
        } else {
            Ok(())
        }
    }

    fn secret(&self) -> Result<[u8; 32]> {
        self.device_secret
            .ok_or(Error::crypto("device key not provisioned"))
    }

    fn signature_for(secret: &[u8; 32], data: &[u8]) -> Signature {
        let first = Self::hmac(secret, data);
        let second = Self::hmac(secret, &first);
        let mut signature = [0u8; 64];
        signature[..32].copy_from_slice(&first);
        signature[32..].copy_from_slice(&second);
        signature
    }

    fn public_key_for(secret: &[u8; 32]) -> PublicKey {
        let x: [u8; 32] = Sha256::digest(secret).into();
        let y: [u8; 32] = Sha256::digest(x).into();
        let mut key = [0u8; PUBLIC_KEY_SIZE];
        key[..32].copy_from_slice(&x);
        key[32..].copy_from_slice(&y);
        key
    }
}

impl CryptoProvider for FakeCrypto {
    fn random_bytes(&mut self, buffer: &mut [u8]) -> Result<()> {
        self.check(Operation::Random)?;
        self.counter = self.counter.wrapping_add(1);
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = self.counter.wrapping_mul(31).wrapping_add(i as u8);
        }
        Ok(())
    }

    fn sha256(&mut self, data: &[u8]) -> Result<Digest> {
        self.check(Operation::Sha256)?;
        Ok(Sha256::digest(data).into())
    }

    fn mac(&mut self, _slot: KeySlot, data: &[u8]) -> Result<Digest> {
        self.check(Operation::Mac)?;
        let secret = self.secret()?;
        Ok(Self::hmac(&secret, data))
    }

    fn sign(&mut self, data: &[u8]) -> Result<Signature> {
        self.check(Operation::Sign)?;
        let secret = self.secret()?;
        Ok(Self::signature_for(&secret, data))
    }

    fn verify(
        &mut self,
        public_key: &PublicKey,
        data: &[u8],
        signature: &Signature,
    ) -> Result<bool> {
        let secret = self.secret()?;
        Ok(*public_key == Self::public_key_for(&secret)
            && *signature == Self::signature_for(&secret, data))
    }

    fn public_key(&mut self, _slot: KeySlot) -> Result<PublicKey> {
        self.check(Operation::PublicKey)?;
        let secret = self.secret()?;
        Ok(Self::public_key_for(&secret))
    }

    fn is_key_provisioned(&mut self, _slot: KeySlot) -> bool {
        self.device_secret.is_some()
    }

    fn generate_key(&mut self, _slot: KeySlot) -> Result<()> {
        self.check(Operation::GenerateKey)?;
        self.device_secret = Some(DEVICE_SECRET);
        Ok(())
    }

    fn load_secret(&mut self, slot: KeySlot) -> Result<Option<[u8; SECRET_SIZE]>> {
        Ok(self.secrets[slot.index() as usize])
    }

    fn store_secret(&mut self, slot: KeySlot, secret: &[u8; SECRET_SIZE]) -> Result<()> {
        self.check(Operation::StoreSecret)?;
        self.secrets[slot.index() as usize] = Some(*secret);
        Ok(())
    }
}

/// A clock advancing by a fixed step every time it is read.
pub(crate) struct StepClock {
    now: Cell<u32>,
    step: u32,
}

impl StepClock {
    pub(crate) fn new(step: u32) -> Self {
        Self {
            now: Cell::new(0),
            step,
        }
    }

    pub(crate) fn frozen_at(now: u32) -> Self {
        Self {
            now: Cell::new(now),
            step: 0,
        }
    }

    pub(crate) fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for StepClock {
    fn now_ms(&self) -> u32 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(self.step));
        now
    }
}

/// A link recording sent payloads and replaying queued frames.
#[derive(Default)]
pub(crate) struct FakeLink {
    pub(crate) sent: Vec<Vec<u8>>,
    pub(crate) inbound: VecDeque<RadioFrame>,
    pub(crate) fail_send: bool,
}

impl FakeLink {
    pub(crate) fn push_inbound(&mut self, payload: &[u8]) {
        self.inbound.push_back(RadioFrame {
            source: 1,
            payload: heapless::Vec::from_slice(payload).unwrap(),
            signal: SignalQuality { rssi: -40, snr: 9 },
        });
    }
}

impl Link for FakeLink {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        if self.fail_send {
            return Err(Error::transport("no response from radio"));
        }
        self.sent.push(payload.to_vec());
        Ok(())
    }

    fn poll_receive(&mut self) -> Option<RadioFrame> {
        self.inbound.pop_front()
    }

    fn has_pending(&mut self) -> bool {
        !self.inbound.is_empty()
    }
}

/// An in-memory AT-command modem.
///
/// Every line written by the transport pops the next scripted reply into
/// the receive queue.
#[derive(Default)]
pub(crate) struct ScriptedSerial {
    pub(crate) written: Vec<u8>,
    rx: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
}

impl ScriptedSerial {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(mut self, reply: &[u8]) -> Self {
        self.replies.push_back(reply.to_vec());
        self
    }

    pub(crate) fn inbound(mut self, bytes: &[u8]) -> Self {
        self.rx.extend(bytes.iter().copied());
        self
    }

    pub(crate) fn written_str(&self) -> &str {
        core::str::from_utf8(&self.written).unwrap()
    }

    pub(crate) fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl embedded_io::ErrorType for ScriptedSerial {
    type Error = Infallible;
}

impl embedded_io::Read for ScriptedSerial {
    fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, Self::Error> {
        let mut count = 0;
        while count < buf.len() {
            match self.rx.pop_front() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }
}

impl embedded_io::ReadReady for ScriptedSerial {
    fn read_ready(&mut self) -> core::result::Result<bool, Self::Error> {
        Ok(!self.rx.is_empty())
    }
}

impl embedded_io::Write for ScriptedSerial {
    fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, Self::Error> {
        for byte in buf {
            self.written.push(*byte);
            if *byte == b'\n' {
                if let Some(reply) = self.replies.pop_front() {
                    self.rx.extend(reply);
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> core::result::Result<(), Self::Error> {
        Ok(())
    }
}
