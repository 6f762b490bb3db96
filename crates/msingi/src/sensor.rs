use core::ops::RangeInclusive;

use crate::error::{Error, Result};

/// Accepted air temperature range, in °C.
pub const TEMPERATURE_RANGE: RangeInclusive<f32> = -10.0..=50.0;
/// Accepted relative humidity range, in %.
pub const HUMIDITY_RANGE: RangeInclusive<f32> = 0.0..=100.0;
/// Accepted soil moisture range, in %.
pub const SOIL_MOISTURE_RANGE: RangeInclusive<f32> = 0.0..=100.0;

/// A set of environmental readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Air temperature in °C.
    pub temperature: f32,
    /// Relative humidity in %.
    pub humidity: f32,
    /// Atmospheric pressure in hPa.
    pub pressure: f32,
    /// Soil moisture in %.
    pub soil_moisture: f32,
    /// Whether the sensors reported every value as available and sound.
    pub valid: bool,
}

impl Measurement {
    /// Creates a valid [`Measurement`] without pressure.
    #[must_use]
    pub const fn new(temperature: f32, humidity: f32, soil_moisture: f32) -> Self {
        Self {
            temperature,
            humidity,
            pressure: 0.0,
            soil_moisture,
            valid: true,
        }
    }

    /// Sets the atmospheric pressure in hPa.
    #[must_use]
    pub const fn pressure(mut self, pressure: f32) -> Self {
        self.pressure = pressure;
        self
    }

    /// Marks the measurement as invalid.
    #[must_use]
    pub const fn invalid(mut self) -> Self {
        self.valid = false;
        self
    }

    /// Checks the readings against their physical bounds.
    ///
    /// # Errors
    ///
    /// Fails with a validation error if the sensors flagged the reading as
    /// invalid, or if a value lies outside its range. `NaN` values are
    /// always out of range.
    pub fn validate(&self) -> Result<()> {
        if !self.valid {
            return Err(Error::validation("sensor reading flagged invalid"));
        }

        if !TEMPERATURE_RANGE.contains(&self.temperature) {
            return Err(Error::validation("temperature out of range"));
        }

        if !HUMIDITY_RANGE.contains(&self.humidity) {
            return Err(Error::validation("humidity out of range"));
        }

        if !SOIL_MOISTURE_RANGE.contains(&self.soil_moisture) {
            return Err(Error::validation("soil moisture out of range"));
        }

        Ok(())
    }
}

/// Access to the environmental sensors.
pub trait SensorProvider {
    /// Reads every sensor once.
    ///
    /// Unavailable or implausible readings are reported through
    /// [`Measurement::valid`].
    fn read_all(&mut self) -> Measurement;
}
