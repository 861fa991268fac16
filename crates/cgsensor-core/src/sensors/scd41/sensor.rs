use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{error, info};

use super::{Measurement, Scd41};
use crate::config::Scd41Config;
use crate::error::Error;
use crate::sensors::{Sensor, SensorError, SensorReadings, to_milli};

const SENSOR: &str = "SCD41";

/// Typed readings from the SCD41 sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scd41Readings {
    pub co2_ppm: i32,
    pub temperature_milli_celsius: i32,
    pub humidity_milli_percent: i32,
}

impl SensorReadings<3> for Scd41Readings {
    fn to_array(self) -> [i32; 3] {
        [
            self.co2_ppm,
            self.temperature_milli_celsius,
            self.humidity_milli_percent,
        ]
    }
}

impl From<Measurement> for Scd41Readings {
    fn from(m: Measurement) -> Self {
        Self {
            co2_ppm: m.co2_ppm as i32,
            temperature_milli_celsius: to_milli(m.temperature),
            humidity_milli_percent: to_milli(m.humidity),
        }
    }
}

/// Periodic-measurement wrapper around [`Scd41`].
///
/// Each read first takes whatever measurement is already waiting. If there
/// is none, the sensor is (re)started and the read waits up to
/// `Scd41Config::read_timeout_s` for fresh data.
pub struct Scd41Sensor<I, D> {
    sensor: Scd41<I, D>,
}

impl<I: I2c, D: DelayNs> Scd41Sensor<I, D> {
    pub fn new(i2c: I, delay: D, config: Scd41Config) -> Self {
        Self {
            sensor: Scd41::with_config(i2c, delay, config),
        }
    }

    pub fn driver_mut(&mut self) -> &mut Scd41<I, D> {
        &mut self.sensor
    }

    fn restart_and_read(&mut self) -> Result<Option<Measurement>, Error<I::Error>> {
        // The sensor may still be measuring from an earlier session that this
        // driver does not know about, so stop unconditionally.
        self.sensor.stop()?;
        self.sensor.start_periodic()?;
        info!("SCD41: restarted periodic measurement, waiting for data");
        let timeout_s = self.sensor.config().read_timeout_s;
        self.sensor.read_measurement(timeout_s)
    }
}

impl<I: I2c, D: DelayNs> Sensor<3> for Scd41Sensor<I, D> {
    type Readings = Scd41Readings;

    fn read(&mut self) -> Result<Scd41Readings, SensorError> {
        let waiting = self.sensor.read_measurement(0).map_err(|e| {
            error!("SCD41 read measurement failed: {:?}", e);
            e.to_sensor_error(SENSOR, "read CO2 measurement")
        })?;

        let measurement = match waiting {
            Some(m) => Some(m),
            None => self.restart_and_read().map_err(|e| {
                error!("SCD41 restart failed: {:?}", e);
                e.to_sensor_error(SENSOR, "restart periodic measurement")
            })?,
        };

        measurement.map(Scd41Readings::from).ok_or_else(|| {
            error!("SCD41 data not ready after restart");
            SensorError::Timeout {
                sensor: SENSOR,
                operation: "wait for data ready status",
            }
        })
    }
}
