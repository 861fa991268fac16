pub mod bme280;
pub mod scd41;
pub mod tsl2572;

use core::marker::PhantomData;

use thiserror_no_std::Error;

/// Number of values in one combined sample across all sensors.
pub const MAX_VALUES: usize = 7;

/// Failure of a [`Sensor`] read, with enough context to log or display it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor} not found on the bus")]
    NotFound { sensor: &'static str },
    #[error("{sensor} {operation} failed: {details}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor} timed out during {operation}")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
}

/// Trait for sensor reading data structures.
/// Provides compile-time guarantees about the number of values and their conversion to arrays.
pub trait SensorReadings<const COUNT: usize> {
    /// Convert the readings into a fixed-size array.
    fn to_array(self) -> [i32; COUNT];
}

/// Trait for sensors that produce typed readings.
pub trait Sensor<const COUNT: usize> {
    /// The type of readings this sensor produces.
    type Readings: SensorReadings<COUNT>;

    /// Read the sensor and return typed readings.
    fn read(&mut self) -> Result<Self::Readings, SensorError>;
}

// Type-level index markers
pub struct Idx<const N: usize>;

pub struct IndexedSensor<S, const START: usize, const COUNT: usize>
where
    S: Sensor<COUNT>,
{
    sensor: S,
    _marker: PhantomData<Idx<START>>,
}

impl<S, const START: usize, const COUNT: usize> From<S> for IndexedSensor<S, START, COUNT>
where
    S: Sensor<COUNT>,
{
    fn from(value: S) -> Self {
        Self::new(value)
    }
}

impl<S, const START: usize, const COUNT: usize> IndexedSensor<S, START, COUNT>
where
    S: Sensor<COUNT>,
{
    pub const fn new(sensor: S) -> Self {
        Self {
            sensor,
            _marker: PhantomData,
        }
    }

    /// Read and write to the values array at the correct indices.
    /// Type safety ensures the readings are stored at the declared START position.
    pub fn read_into(&mut self, values: &mut [i32; MAX_VALUES]) -> Result<(), SensorError> {
        let readings = self.sensor.read()?;
        let data = readings.to_array();
        values[START..START + COUNT].copy_from_slice(&data);
        Ok(())
    }

    /// Get the starting index where this sensor's data is stored.
    pub const fn start_index() -> usize {
        START
    }

    /// Get the number of values this sensor produces.
    pub const fn value_count() -> usize {
        COUNT
    }

    /// Get the absolute index for a specific reading within this sensor.
    pub const fn reading_index(offset: usize) -> usize {
        START + offset
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.sensor
    }
}

pub mod indices {
    use crate::sensors::IndexedSensor;
    use crate::sensors::bme280::Bme280Sensor;
    use crate::sensors::scd41::Scd41Sensor;
    use crate::sensors::tsl2572::Tsl2572Sensor;

    // These indices are the only link between a sensor's position in the
    // sample array and the values it writes there. A sensor producing several
    // readings must keep its START/COUNT in step with the constants below.

    pub type Bme280Indexed<I, D> = IndexedSensor<Bme280Sensor<I, D>, 0, 3>;
    pub type Scd41Indexed<I, D> = IndexedSensor<Scd41Sensor<I, D>, 3, 3>;
    pub type Tsl2572Indexed<I, D> = IndexedSensor<Tsl2572Sensor<I, D>, 6, 1>;

    pub const TEMPERATURE: usize = 0;
    pub const HUMIDITY: usize = 1;
    pub const PRESSURE: usize = 2;
    pub const CO2: usize = 3;
    pub const CO2_SENSOR_TEMPERATURE: usize = 4;
    pub const CO2_SENSOR_HUMIDITY: usize = 5;
    pub const ILLUMINANCE: usize = 6;
}

pub use indices::*;

/// Integer division rounding half away from zero. `den` must be positive.
pub(crate) const fn div_round(num: i64, den: i64) -> i64 {
    if num >= 0 {
        (num + den / 2) / den
    } else {
        (num - den / 2) / den
    }
}

/// Round half away from zero to an integer.
pub(crate) fn round_half_away(value: f32) -> i64 {
    if value >= 0.0 {
        (value + 0.5) as i64
    } else {
        (value - 0.5) as i64
    }
}

/// Round to one decimal place.
pub(crate) fn round_tenths(value: f32) -> f32 {
    round_half_away(value * 10.0) as f32 / 10.0
}

/// Convert a value with one decimal place into integer thousandths.
pub(crate) fn to_milli(value: f32) -> i32 {
    round_half_away(value * 1000.0) as i32
}
