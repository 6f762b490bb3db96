//! The protocol core of a `msingi` agricultural telemetry device.
//!
//! A device enrolls anonymously with a proof server and then periodically
//! reports signed sensor readings over a LoRa radio link. This crate
//! provides APIs to:
//!
//! - Drive a LoRa module through its `AT` command channel, turning a
//!   line-oriented serial link into a bounded, validated message link.
//! - Enroll the device with the BRACE commitment scheme, so the proof
//!   server never learns the device public key.
//! - Build signed telemetry packets tagged with a per-epoch nullifier.
//! - Run the cooperative control loop that sequences enrollment, scheduled
//!   telemetry and inbound control messages.
//!
//! Cryptographic primitives, sensors, serial channels, clocks and delays
//! are external collaborators, accessed through the [`crypto::CryptoProvider`]
//! and [`sensor::SensorProvider`] traits, the [`embedded-io`] and
//! [`embedded-hal`] traits and the [`radio::Clock`] trait.
//!
//! This crate is `no_std` and never allocates.
//!
//! [`embedded-io`]: https://crates.io/crates/embedded-io
//! [`embedded-hal`]: https://crates.io/crates/embedded-hal

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![no_std]

/// Anonymous enrollment with the proof server.
pub mod brace;
/// Device and radio configuration.
pub mod config;
/// Control messages exchanged with the proof server.
pub mod control;
/// The device control loop.
pub mod controller;
/// The secure element capability interface.
pub mod crypto;
/// Error handling.
pub mod error;
/// The `AT` command radio transport.
pub mod radio;
/// Sensor readings and their physical bounds.
pub mod sensor;
/// Signed telemetry packets and nullifiers.
pub mod telemetry;

#[cfg(test)]
mod testing;
