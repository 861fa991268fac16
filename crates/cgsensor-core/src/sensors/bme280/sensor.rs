use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::Bme280;
use crate::config::Bme280Config;
use crate::sensors::{Sensor, SensorError, SensorReadings, round_half_away, to_milli};

const SENSOR: &str = "BME280";

/// Typed readings from the BME280 sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bme280Readings {
    pub temperature_milli_celsius: i32,
    pub humidity_milli_percent: i32,
    pub pressure_pa: i32,
}

impl SensorReadings<3> for Bme280Readings {
    fn to_array(self) -> [i32; 3] {
        [
            self.temperature_milli_celsius,
            self.humidity_milli_percent,
            self.pressure_pa,
        ]
    }
}

pub struct Bme280Sensor<I, D> {
    sensor: Bme280<I, D>,
}

impl<I: I2c, D: DelayNs> Bme280Sensor<I, D> {
    pub fn new(i2c: I, delay: D, config: Bme280Config) -> Self {
        Self {
            sensor: Bme280::with_config(i2c, delay, config),
        }
    }

    pub fn driver_mut(&mut self) -> &mut Bme280<I, D> {
        &mut self.sensor
    }
}

impl<I: I2c, D: DelayNs> Sensor<3> for Bme280Sensor<I, D> {
    type Readings = Bme280Readings;

    fn read(&mut self) -> Result<Bme280Readings, SensorError> {
        let measurement = self.sensor.measure().map_err(|e| {
            log::error!("BME280 measurement failed: {:?}", e);
            e.to_sensor_error(SENSOR, "forced measurement")
        })?;

        let pressure = measurement.pressure.ok_or_else(|| {
            log::error!("BME280 pressure compensation hit a zero denominator");
            SensorError::ReadFailed {
                sensor: SENSOR,
                operation: "compensate pressure",
                details: "calibration data produced a zero denominator",
            }
        })?;

        Ok(Bme280Readings {
            temperature_milli_celsius: to_milli(measurement.temperature),
            humidity_milli_percent: to_milli(measurement.humidity),
            pressure_pa: round_half_away(pressure * 100.0) as i32,
        })
    }
}
