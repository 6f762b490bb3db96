use embedded_hal::delay::DelayNs;

use heapless::Vec;

use log::{error, info, warn};

use crate::brace::EnrollmentClient;
use crate::config::DeviceConfig;
use crate::control::ControlMessage;
use crate::crypto::{Abbreviated, CryptoProvider};
use crate::error::{Error, Result};
use crate::radio::{Clock, Link};
use crate::sensor::SensorProvider;
use crate::telemetry::{DataPacket, build_packet};

/// Maximum number of inbound frames handled in one loop iteration.
pub const INBOUND_BUDGET: usize = 8;

/// The outcome of a scheduled cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Cycle {
    /// A registration was attempted.
    Enrollment(Result<()>),
    /// A telemetry transmission was attempted.
    Telemetry(Result<DataPacket>),
}

impl Cycle {
    /// Whether the cycle completed.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        match self {
            Self::Enrollment(result) => result.is_ok(),
            Self::Telemetry(result) => result.is_ok(),
        }
    }
}

/// What happened during a loop iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// The control messages handled, in arrival order.
    pub messages: Vec<ControlMessage, INBOUND_BUDGET>,
    /// The scheduled cycle run, if any.
    pub cycle: Option<Cycle>,
}

/// The single cooperative control loop of a device.
///
/// Each iteration drains the pending inbound control messages, up to
/// [`INBOUND_BUDGET`] frames, then runs one scheduled cycle if the
/// telemetry interval has elapsed.
/// A scheduled cycle either sends a registration, while the device is not
/// registered, or collects, signs and transmits one telemetry packet.
/// Failed cycles are abandoned and retried at the next schedule.
pub struct DeviceController<L, C, S, K, D>
where
    L: Link,
    C: CryptoProvider,
    S: SensorProvider,
    K: Clock,
    D: DelayNs,
{
    link: L,
    crypto: C,
    sensors: S,
    clock: K,
    delay: D,
    config: DeviceConfig,
    enrollment: EnrollmentClient,
    epoch: u32,
    last_cycle_ms: Option<u32>,
}

impl<L, C, S, K, D> DeviceController<L, C, S, K, D>
where
    L: Link,
    C: CryptoProvider,
    S: SensorProvider,
    K: Clock,
    D: DelayNs,
{
    /// Creates an unregistered [`DeviceController`] at epoch `0`.
    #[must_use]
    pub fn new(link: L, crypto: C, sensors: S, clock: K, delay: D) -> Self {
        Self {
            link,
            crypto,
            sensors,
            clock,
            delay,
            config: DeviceConfig::new(),
            enrollment: EnrollmentClient::new(),
            epoch: 0,
            last_cycle_ms: None,
        }
    }

    /// Sets the [`DeviceConfig`].
    #[must_use]
    pub fn config(mut self, config: DeviceConfig) -> Self {
        self.config = config;
        self
    }

    /// Recovers a persisted enrollment from the secure element.
    ///
    /// # Errors
    ///
    /// Fails if the persisted enrollment cannot be read back.
    pub fn restore(mut self) -> Result<Self> {
        self.enrollment = EnrollmentClient::restore(&mut self.crypto)?;
        Ok(self)
    }

    /// Runs the control loop forever.
    pub fn run(&mut self) -> ! {
        info!("Device controller started");
        loop {
            let _step = self.step();
            self.idle();
        }
    }

    /// Runs a single loop iteration, without the idle delay.
    ///
    /// Inbound messages are always drained before the scheduled cycle, so
    /// an acknowledgment received in the same iteration is taken into
    /// account when choosing between enrollment and telemetry.
    pub fn step(&mut self) -> Step {
        let mut messages = Vec::new();
        for _ in 0..INBOUND_BUDGET {
            if !self.link.has_pending() {
                break;
            }
            if let Some(message) = self.poll_inbound() {
                // Capacity matches the budget.
                let _ = messages.push(message);
            }
        }

        if self.link.has_pending() {
            warn!("Inbound budget exhausted, frames left pending");
        }

        let now = self.clock.now_ms();
        let cycle = self.is_cycle_due(now).then(|| self.run_cycle(now));

        Step { messages, cycle }
    }

    /// Handles the next pending inbound control message, if any.
    pub fn poll_inbound(&mut self) -> Option<ControlMessage> {
        let frame = self.link.poll_receive()?;

        match ControlMessage::decode(&frame.payload) {
            Ok(message) => {
                self.handle_message(message);
                Some(message)
            }
            Err(e) => {
                warn!("Ignoring control message from {}: {e}", frame.source);
                None
            }
        }
    }

    /// Applies a control message to the device state.
    pub fn handle_message(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::RegistrationAck => {
                if let Err(e) = self.enrollment.confirm(&mut self.crypto) {
                    error!("Failed to complete the registration: {e}");
                }
            }
            ControlMessage::EpochUpdate(epoch) => {
                if epoch < self.epoch {
                    warn!("Epoch moved backwards from {} to {epoch}", self.epoch);
                }
                self.epoch = epoch;
                info!("Epoch updated to {epoch}");
            }
            ControlMessage::ProofConfirmation => {
                info!("Proof confirmed by the server");
            }
            ControlMessage::Unknown(discriminant) => {
                warn!("Unknown control message 0x{discriminant:02x}");
            }
        }
    }

    /// Whether a scheduled cycle is due at `now_ms`.
    #[must_use]
    pub fn is_cycle_due(&self, now_ms: u32) -> bool {
        self.last_cycle_ms.is_none_or(|last| {
            now_ms.wrapping_sub(last) >= self.config.telemetry_interval_ms
        })
    }

    /// Returns the last known epoch.
    #[must_use]
    #[inline]
    pub const fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Returns the start time of the last scheduled cycle.
    #[must_use]
    #[inline]
    pub const fn last_cycle_ms(&self) -> Option<u32> {
        self.last_cycle_ms
    }

    /// Returns the enrollment client.
    #[must_use]
    #[inline]
    pub const fn enrollment(&self) -> &EnrollmentClient {
        &self.enrollment
    }

    /// Returns the radio link.
    #[must_use]
    #[inline]
    pub const fn link(&self) -> &L {
        &self.link
    }

    /// Returns the radio link mutably.
    #[must_use]
    #[inline]
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Returns the crypto provider mutably.
    #[must_use]
    #[inline]
    pub fn crypto_mut(&mut self) -> &mut C {
        &mut self.crypto
    }

    // Waits between two iterations, never less than 1 ms.
    fn idle(&mut self) {
        self.delay.delay_ms(self.config.idle_delay_ms.max(1));
    }

    fn run_cycle(&mut self, now_ms: u32) -> Cycle {
        self.last_cycle_ms = Some(now_ms);

        if self.enrollment.is_registered() {
            let result = self.transmit_telemetry();
            if let Err(e) = &result {
                error!("Telemetry cycle aborted: {e}");
            }
            Cycle::Telemetry(result)
        } else {
            let result = self.enrollment.register(&mut self.crypto, &mut self.link);
            if let Err(e) = &result {
                error!("Enrollment cycle aborted: {e}");
            }
            Cycle::Enrollment(result)
        }
    }

    fn transmit_telemetry(&mut self) -> Result<DataPacket> {
        let commitment = *self
            .enrollment
            .commitment()
            .ok_or(Error::protocol("registered without a commitment"))?;

        let measurement = self.sensors.read_all();
        if let Err(e) = measurement.validate() {
            warn!("Transmitting questionable reading: {e}");
        }

        let packet = build_packet(
            &mut self.crypto,
            &commitment,
            self.epoch,
            &measurement,
            self.clock.now_ms(),
        )?;

        self.link.send(&packet.to_bytes())?;

        info!(
            "Telemetry sent for epoch {} with nullifier {}",
            self.epoch,
            Abbreviated(&packet.nullifier)
        );

        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal::delay::DelayNs;
    use embedded_hal_mock::eh1::delay::NoopDelay;

    use crate::brace::EnrollmentState;
    use crate::config::DeviceConfig;
    use crate::control::ControlMessage;
    use crate::crypto::{CryptoProvider, KeySlot};
    use crate::error::ErrorKind;
    use crate::radio::Clock;
    use crate::sensor::{Measurement, SensorProvider};
    use crate::telemetry::{DataPacket, nullifier};
    use crate::testing::{FakeCrypto, FakeLink, Operation, StepClock};

    use super::{Cycle, DeviceController, INBOUND_BUDGET};

    const INTERVAL_MS: u32 = 60_000;

    struct FixedSensors(Measurement);

    impl SensorProvider for FixedSensors {
        fn read_all(&mut self) -> Measurement {
            self.0
        }
    }

    type Controller<'a> =
        DeviceController<FakeLink, FakeCrypto, FixedSensors, &'a StepClock, NoopDelay>;

    fn controller(clock: &StepClock, crypto: FakeCrypto) -> Controller<'_> {
        DeviceController::new(
            FakeLink::default(),
            crypto,
            FixedSensors(Measurement::new(21.3, 55.0, 40.0)),
            clock,
            NoopDelay::new(),
        )
        .config(DeviceConfig::new().telemetry_interval_ms(INTERVAL_MS))
    }

    fn registered(clock: &StepClock) -> Controller<'_> {
        let mut controller = controller(clock, FakeCrypto::new());
        let _ = controller.step();
        controller.link.push_inbound(&[0x01]);
        let _ = controller.step();
        assert!(controller.enrollment().is_registered());
        controller
    }

    #[test]
    fn first_iteration_registers() {
        let clock = StepClock::frozen_at(0);
        let mut controller = controller(&clock, FakeCrypto::new());

        let step = controller.step();
        assert!(step.messages.is_empty());
        assert_eq!(step.cycle, Some(Cycle::Enrollment(Ok(()))));
        assert_eq!(controller.enrollment().state(), EnrollmentState::PendingAck);
        assert_eq!(controller.link.sent.len(), 1);
        assert_eq!(controller.link.sent[0].len(), 33);
        assert_eq!(controller.last_cycle_ms(), Some(0));

        let step = controller.step();
        assert_eq!(step.cycle, None);
    }

    #[test]
    fn acknowledgment_registers_device() {
        let clock = StepClock::frozen_at(0);
        let mut controller = controller(&clock, FakeCrypto::new());
        let _ = controller.step();

        controller.link.push_inbound(&[0x01]);
        let step = controller.step();

        assert_eq!(step.messages.as_slice(), [ControlMessage::RegistrationAck]);
        assert_eq!(step.cycle, None);
        assert_eq!(controller.enrollment().state(), EnrollmentState::Registered);
    }

    #[test]
    fn acknowledgment_is_handled_before_due_cycle() {
        let clock = StepClock::frozen_at(0);
        let mut controller = controller(&clock, FakeCrypto::new());
        let _ = controller.step();

        controller.link.push_inbound(&[0x01]);
        clock.advance(INTERVAL_MS);
        let step = controller.step();

        assert_eq!(step.messages.as_slice(), [ControlMessage::RegistrationAck]);
        assert!(matches!(step.cycle, Some(Cycle::Telemetry(Ok(_)))));
        assert_eq!(controller.link.sent.len(), 2);
        assert_eq!(controller.link.sent[1].len(), 144);
    }

    #[test]
    fn queued_frames_are_drained_before_due_cycle() {
        let clock = StepClock::frozen_at(0);
        let mut controller = controller(&clock, FakeCrypto::new());
        let _ = controller.step();
        let commitment = *controller.enrollment().commitment().unwrap();

        controller.link.push_inbound(&[0x02, 0x00, 0x00, 0x00, 0x03]);
        controller.link.push_inbound(&[0x7F, 0x00]);
        controller.link.push_inbound(&[0x01]);
        clock.advance(INTERVAL_MS);
        let step = controller.step();

        assert_eq!(
            step.messages.as_slice(),
            [
                ControlMessage::EpochUpdate(3),
                ControlMessage::Unknown(0x7F),
                ControlMessage::RegistrationAck,
            ]
        );
        assert!(matches!(step.cycle, Some(Cycle::Telemetry(Ok(_)))));
        assert_eq!(controller.enrollment().state(), EnrollmentState::Registered);
        assert_eq!(controller.enrollment().commitment(), Some(&commitment));
        assert_eq!(controller.link.sent.len(), 2);
    }

    #[test]
    fn inbound_drain_is_bounded() {
        let clock = StepClock::frozen_at(0);
        let mut controller = registered(&clock);

        for _ in 0..INBOUND_BUDGET + 2 {
            controller.link.push_inbound(&[0x03]);
        }

        let step = controller.step();
        assert_eq!(step.messages.len(), INBOUND_BUDGET);
        assert_eq!(controller.link.inbound.len(), 2);

        let step = controller.step();
        assert_eq!(step.messages.len(), 2);
    }

    #[test]
    fn malformed_frames_do_not_stop_the_drain() {
        let clock = StepClock::frozen_at(0);
        let mut controller = controller(&clock, FakeCrypto::new());
        let _ = controller.step();

        controller.link.push_inbound(&[0x02, 0x01]);
        controller.link.push_inbound(&[0x01]);
        let step = controller.step();

        assert_eq!(step.messages.as_slice(), [ControlMessage::RegistrationAck]);
        assert!(controller.enrollment().is_registered());
    }

    #[test]
    fn idle_delay_is_never_zero() {
        #[derive(Default)]
        struct TotalDelay(u64);

        impl DelayNs for TotalDelay {
            fn delay_ns(&mut self, ns: u32) {
                self.0 += u64::from(ns);
            }
        }

        let clock = StepClock::frozen_at(0);
        let mut controller = DeviceController::new(
            FakeLink::default(),
            FakeCrypto::new(),
            FixedSensors(Measurement::new(21.3, 55.0, 40.0)),
            &clock,
            TotalDelay::default(),
        )
        .config(DeviceConfig {
            idle_delay_ms: 0,
            ..DeviceConfig::new()
        });

        controller.idle();
        assert_eq!(controller.delay.0, 1_000_000);

        controller.config.idle_delay_ms = 250;
        controller.idle();
        assert_eq!(controller.delay.0, 251_000_000);
    }

    #[test]
    fn registered_device_sends_signed_telemetry() {
        let clock = StepClock::frozen_at(0);
        let mut controller = registered(&clock);

        controller.link.push_inbound(&[0x02, 0x00, 0x00, 0x00, 0x05]);
        clock.advance(INTERVAL_MS);
        let step = controller.step();

        assert_eq!(step.messages.as_slice(), [ControlMessage::EpochUpdate(5)]);
        assert_eq!(controller.epoch(), 5);

        let Some(Cycle::Telemetry(Ok(packet))) = step.cycle else {
            panic!("expected a telemetry cycle");
        };

        let sent = controller.link.sent.last().unwrap();
        assert_eq!(sent.as_slice(), packet.to_bytes().as_slice());
        assert_eq!(DataPacket::from_bytes(sent).unwrap(), packet);

        assert_eq!(&packet.commitment, controller.enrollment().commitment().unwrap());
        assert_eq!(packet.timestamp, INTERVAL_MS);
        assert_eq!(
            packet.nullifier,
            nullifier(controller.crypto_mut(), 5).unwrap()
        );
    }

    #[test]
    fn cycles_follow_the_interval() {
        let clock = StepClock::frozen_at(0);
        let mut controller = registered(&clock);
        let sent = controller.link.sent.len();

        clock.advance(INTERVAL_MS - 1);
        assert!(controller.step().cycle.is_none());

        clock.advance(1);
        assert!(controller.step().cycle.is_some());
        assert_eq!(controller.link.sent.len(), sent + 1);
    }

    #[test]
    fn interval_survives_clock_wrap() {
        let clock = StepClock::frozen_at(u32::MAX - 10);
        let mut controller = controller(&clock, FakeCrypto::new());
        let _ = controller.step();

        clock.advance(INTERVAL_MS - 1);
        assert!(!controller.is_cycle_due(clock.now_ms()));

        clock.advance(1);
        assert!(controller.is_cycle_due(clock.now_ms()));
    }

    #[test]
    fn failed_cycle_waits_for_next_schedule() {
        let clock = StepClock::frozen_at(0);
        let mut controller = registered(&clock);

        controller.link.fail_send = true;
        clock.advance(INTERVAL_MS);
        let step = controller.step();
        let Some(Cycle::Telemetry(Err(error))) = step.cycle else {
            panic!("expected a failed telemetry cycle");
        };
        assert_eq!(error.kind(), ErrorKind::Transport);

        controller.link.fail_send = false;
        assert!(controller.step().cycle.is_none());

        clock.advance(INTERVAL_MS);
        assert!(controller.step().cycle.is_some_and(|cycle| cycle.is_ok()));
    }

    #[test]
    fn crypto_failure_aborts_telemetry_without_sending() {
        let clock = StepClock::frozen_at(0);
        let mut controller = registered(&clock);
        let sent = controller.link.sent.len();

        controller.crypto.fail_on(Operation::Sign);
        clock.advance(INTERVAL_MS);
        let cycle = controller.step().cycle.unwrap();

        assert!(!cycle.is_ok());
        assert_eq!(controller.link.sent.len(), sent);
    }

    #[test]
    fn failed_registration_is_retried_next_schedule() {
        let clock = StepClock::frozen_at(0);
        let mut controller = controller(&clock, FakeCrypto::new());

        controller.link.fail_send = true;
        let cycle = controller.step().cycle.unwrap();
        assert!(!cycle.is_ok());
        assert_eq!(controller.enrollment().state(), EnrollmentState::Unregistered);

        controller.link.fail_send = false;
        clock.advance(INTERVAL_MS);
        assert_eq!(
            controller.step().cycle,
            Some(Cycle::Enrollment(Ok(())))
        );
    }

    #[test]
    fn lower_epoch_is_accepted() {
        let clock = StepClock::frozen_at(0);
        let mut controller = controller(&clock, FakeCrypto::new());

        controller.handle_message(ControlMessage::EpochUpdate(9));
        controller.handle_message(ControlMessage::EpochUpdate(3));

        assert_eq!(controller.epoch(), 3);
    }

    #[test]
    fn unknown_and_malformed_messages_change_nothing() {
        let clock = StepClock::frozen_at(0);
        let mut controller = registered(&clock);
        let epoch = controller.epoch();

        controller.link.push_inbound(&[0x7F]);
        assert_eq!(
            controller.step().messages.as_slice(),
            [ControlMessage::Unknown(0x7F)]
        );

        controller.link.push_inbound(&[0x02, 0x01]);
        assert!(controller.step().messages.is_empty());

        controller.link.push_inbound(&[0x03]);
        assert_eq!(
            controller.step().messages.as_slice(),
            [ControlMessage::ProofConfirmation]
        );

        assert_eq!(controller.epoch(), epoch);
        assert!(controller.enrollment().is_registered());
    }

    #[test]
    fn invalid_readings_are_transmitted() {
        let clock = StepClock::frozen_at(0);
        let mut controller = registered(&clock);
        controller.sensors = FixedSensors(Measurement::new(99.0, 55.0, 40.0).invalid());

        clock.advance(INTERVAL_MS);
        let Some(Cycle::Telemetry(Ok(packet))) = controller.step().cycle else {
            panic!("expected a telemetry cycle");
        };
        assert_eq!(packet.temperature, 99.0);
    }

    #[test]
    fn restored_device_skips_enrollment() {
        let clock = StepClock::frozen_at(0);
        let mut crypto = FakeCrypto::new();
        crypto
            .store_secret(KeySlot::BlindingFactor, &[0x33; 32])
            .unwrap();

        let mut controller = controller(&clock, crypto).restore().unwrap();
        assert!(controller.enrollment().is_registered());

        let cycle = controller.step().cycle;
        assert!(matches!(cycle, Some(Cycle::Telemetry(Ok(_)))));
        assert_eq!(controller.link.sent[0].len(), 144);
    }
}
