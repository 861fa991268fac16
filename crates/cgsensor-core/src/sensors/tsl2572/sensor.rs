use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::Tsl2572;
use crate::config::Tsl2572Config;
use crate::sensors::{Sensor, SensorError, SensorReadings, to_milli};

/// Typed readings from the TSL2572 sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tsl2572Readings {
    pub illuminance_milli_lux: i32,
}

impl SensorReadings<1> for Tsl2572Readings {
    fn to_array(self) -> [i32; 1] {
        [self.illuminance_milli_lux]
    }
}

pub struct Tsl2572Sensor<I, D> {
    sensor: Tsl2572<I, D>,
}

impl<I: I2c, D: DelayNs> Tsl2572Sensor<I, D> {
    pub fn new(i2c: I, delay: D, config: Tsl2572Config) -> Self {
        Self {
            sensor: Tsl2572::with_config(i2c, delay, config),
        }
    }

    pub fn driver_mut(&mut self) -> &mut Tsl2572<I, D> {
        &mut self.sensor
    }
}

impl<I: I2c, D: DelayNs> Sensor<1> for Tsl2572Sensor<I, D> {
    type Readings = Tsl2572Readings;

    fn read(&mut self) -> Result<Tsl2572Readings, SensorError> {
        let illuminance = self.sensor.auto_measure().map_err(|e| {
            log::error!("TSL2572 measurement failed: {:?}", e);
            e.to_sensor_error("TSL2572", "auto-ranged light measurement")
        })?;

        Ok(Tsl2572Readings {
            illuminance_milli_lux: to_milli(illuminance.lux),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollConfig;
    use crate::sensors::MAX_VALUES;
    use crate::sensors::indices::{ILLUMINANCE, Tsl2572Indexed};
    use crate::testing::VirtualClock;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    const ADDR: u8 = 0x39;

    fn pass(atime: u8, control: u8, ch0: u16, ch1: u16) -> Vec<I2cTransaction> {
        let [c0l, c0h] = ch0.to_le_bytes();
        let [c1l, c1h] = ch1.to_le_bytes();
        vec![
            I2cTransaction::write(ADDR, vec![0xA0, 0x01]),
            I2cTransaction::write(ADDR, vec![0xA1, atime]),
            I2cTransaction::write(ADDR, vec![0xAD, 0x00]),
            I2cTransaction::write(ADDR, vec![0xAF, control]),
            I2cTransaction::write(ADDR, vec![0xA0, 0x03]),
            I2cTransaction::write_read(ADDR, vec![0xB3], vec![0x11]),
            I2cTransaction::write(ADDR, vec![0xA0, 0x00]),
            I2cTransaction::write_read(ADDR, vec![0xB4], vec![c0l, c0h, c1l, c1h]),
        ]
    }

    #[test]
    fn test_reading_in_milli_lux() {
        let mut expectations = vec![I2cTransaction::write_read(ADDR, vec![0xB2], vec![0x34])];
        // probe of 100 counts selects 128 cycles at x16
        expectations.extend(pass(252, 0x00, 100, 20));
        expectations.extend(pass(128, 0x02, 30000, 5000));

        let mut i2c = I2cMock::new(&expectations);
        let sensor = Tsl2572Sensor::new(
            i2c.clone(),
            VirtualClock::default().delay(),
            Tsl2572Config::default(),
        );
        let mut indexed = Tsl2572Indexed::new(sensor);

        let mut values = [0i32; MAX_VALUES];
        indexed.read_into(&mut values).unwrap();
        assert_eq!(values[ILLUMINANCE], 221_600);
        i2c.done();
    }

    #[test]
    fn test_stuck_status_is_a_timeout() {
        let mut expectations = vec![I2cTransaction::write_read(ADDR, vec![0xB2], vec![0x34])];
        expectations.extend(pass(252, 0x00, 0, 0)[..5].iter().cloned());
        expectations.push(I2cTransaction::write_read(ADDR, vec![0xB3], vec![0x00]));
        expectations.push(I2cTransaction::write(ADDR, vec![0xA0, 0x00]));

        let mut i2c = I2cMock::new(&expectations);
        let config = Tsl2572Config {
            poll: PollConfig::new(10, 10),
        };
        let mut sensor =
            Tsl2572Sensor::new(i2c.clone(), VirtualClock::default().delay(), config);

        assert_eq!(
            sensor.read().unwrap_err(),
            SensorError::Timeout {
                sensor: "TSL2572",
                operation: "auto-ranged light measurement"
            }
        );
        i2c.done();
    }
}
