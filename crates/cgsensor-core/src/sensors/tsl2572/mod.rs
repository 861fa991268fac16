//! TSL2572 ambient light sensor
//!
//! The sensor's useful range spans several decades, so a measurement is
//! taken in two passes: a short probe exposure picks an integration time
//! and gain from [`ladder::LADDER`], then the real exposure is converted to
//! lux.

pub mod ladder;
mod sensor;

pub use ladder::{Exposure, ExposureSetting, Gain};
pub use sensor::{Tsl2572Readings, Tsl2572Sensor};

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::config::Tsl2572Config;
use crate::error::Error;

pub const TSL2572_ADDR: u8 = 0x39;

// =============================================================================
// Register Addresses
// =============================================================================

/// OR-ed into every register address
pub const COMMAND_BIT: u8 = 0xA0;

pub const REG_ENABLE: u8 = 0x00;
pub const REG_ATIME: u8 = 0x01;
pub const REG_CONFIG: u8 = 0x0D;
pub const REG_CONTROL: u8 = 0x0F;
pub const REG_ID: u8 = 0x12;
pub const REG_STATUS: u8 = 0x13;
/// C0DATA, C0DATAH, C1DATA, C1DATAH
pub const REG_C0DATA: u8 = 0x14;

/// TSL25721 (3.3 V) and TSL25723 (1.8 V)
pub const KNOWN_CHIP_IDS: [u8; 2] = [0x34, 0x3D];

const STATUS_AVALID: u8 = 0x01;
const STATUS_AINT: u8 = 0x10;

// =============================================================================
// Register Values
// =============================================================================

/// Contents of the ENABLE register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnableFlags {
    /// Oscillator on
    pub power_on: bool,
    /// ALS enable
    pub als: bool,
    /// Wait timer between ALS cycles
    pub wait: bool,
}

impl EnableFlags {
    pub const OFF: Self = Self {
        power_on: false,
        als: false,
        wait: false,
    };
    pub const POWER_ON: Self = Self {
        power_on: true,
        als: false,
        wait: false,
    };
    pub const MEASURING: Self = Self {
        power_on: true,
        als: true,
        wait: false,
    };

    pub const fn bits(self) -> u8 {
        (self.power_on as u8) | (self.als as u8) << 1 | (self.wait as u8) << 3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// An integration cycle has completed since ALS was enabled
    pub valid: bool,
    /// ALS interrupt raised
    pub interrupt: bool,
}

impl Status {
    pub fn from_register(val: u8) -> Self {
        Self {
            valid: val & STATUS_AVALID != 0,
            interrupt: val & STATUS_AINT != 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.valid && self.interrupt
    }
}

/// Result of an auto-ranged measurement.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Illuminance {
    /// lux, one decimal place
    pub lux: f32,
    pub exposure: Exposure,
}

// =============================================================================
// Driver Implementation
// =============================================================================

pub struct Tsl2572<I2C, D> {
    i2c: I2C,
    delay: D,
    config: Tsl2572Config,
}

impl<I2C, D> Tsl2572<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_config(i2c, delay, Tsl2572Config::default())
    }

    pub fn with_config(i2c: I2C, delay: D, config: Tsl2572Config) -> Self {
        Self { i2c, delay, config }
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Error<I2C::Error>> {
        self.i2c
            .write_read(TSL2572_ADDR, &[reg | COMMAND_BIT], buf)?;
        Ok(())
    }

    fn write_register(&mut self, reg: u8, val: u8) -> Result<(), Error<I2C::Error>> {
        self.i2c.write(TSL2572_ADDR, &[reg | COMMAND_BIT, val])?;
        Ok(())
    }

    /// # Returns
    /// The chip ID, or `Error::DeviceNotFound` if it is not a TSL2572.
    pub fn identify(&mut self) -> Result<u8, Error<I2C::Error>> {
        let mut id = [0u8; 1];
        self.read_registers(REG_ID, &mut id)?;
        if KNOWN_CHIP_IDS.contains(&id[0]) {
            Ok(id[0])
        } else {
            Err(Error::DeviceNotFound { found: id[0] })
        }
    }

    pub fn write_enable(&mut self, flags: EnableFlags) -> Result<(), Error<I2C::Error>> {
        self.write_register(REG_ENABLE, flags.bits())
    }

    /// Set the integration time in 2.73 ms cycles.
    ///
    /// # Returns
    /// `Error::InvalidArgument` outside `1..=256`, without touching the bus.
    pub fn write_atime(&mut self, integ_cycles: u16) -> Result<(), Error<I2C::Error>> {
        check_integ_cycles(integ_cycles)?;
        self.write_register(REG_ATIME, (256 - integ_cycles) as u8)
    }

    pub fn write_gain(&mut self, gain: Gain) -> Result<(), Error<I2C::Error>> {
        self.write_register(REG_CONFIG, gain.config_bits())?;
        self.write_register(REG_CONTROL, gain.control_bits())
    }

    pub fn read_status(&mut self) -> Result<Status, Error<I2C::Error>> {
        let mut status = [0u8; 1];
        self.read_registers(REG_STATUS, &mut status)?;
        Ok(Status::from_register(status[0]))
    }

    /// Read both ADC channels as `(ch0, ch1)`.
    pub fn read_channels(&mut self) -> Result<(u16, u16), Error<I2C::Error>> {
        let mut data = [0u8; 4];
        self.read_registers(REG_C0DATA, &mut data)?;
        Ok((
            u16::from_le_bytes([data[0], data[1]]),
            u16::from_le_bytes([data[2], data[3]]),
        ))
    }

    /// Run one exposure and return the raw channel counts.
    ///
    /// The ALS is stopped while the exposure is reconfigured, started, then
    /// powered down once a valid result is latched. A failed wait still
    /// powers the chip down before the error is returned.
    pub fn integrate(
        &mut self,
        setting: ExposureSetting,
    ) -> Result<Exposure, Error<I2C::Error>> {
        check_integ_cycles(setting.integ_cycles)?;
        self.write_enable(EnableFlags::POWER_ON)?;
        self.write_atime(setting.integ_cycles)?;
        self.write_gain(setting.gain)?;
        self.write_enable(EnableFlags::MEASURING)?;
        if let Err(e) = self.wait_for_result() {
            if self.write_enable(EnableFlags::OFF).is_err() {
                warn!("TSL2572: power down after failed integration also failed");
            }
            return Err(e);
        }
        self.write_enable(EnableFlags::OFF)?;

        let (ch0, ch1) = self.read_channels()?;
        trace!("TSL2572: {:?} ch0={} ch1={}", setting, ch0, ch1);
        Ok(Exposure { ch0, ch1, setting })
    }

    fn wait_for_result(&mut self) -> Result<(), Error<I2C::Error>> {
        let poll = self.config.poll;
        for _ in 0..poll.max_attempts() {
            if self.read_status()?.is_complete() {
                return Ok(());
            }
            self.delay.delay_ms(poll.interval_ms);
        }
        Err(Error::Timeout {
            operation: "TSL2572 integration",
        })
    }

    /// One exposure with a fixed setting, converted to lux.
    pub fn measure_with(
        &mut self,
        setting: ExposureSetting,
    ) -> Result<Illuminance, Error<I2C::Error>> {
        let exposure = self.integrate(setting)?;
        Ok(Illuminance {
            lux: exposure.lux(),
            exposure,
        })
    }

    /// Identify the chip, probe the light level, then measure with the
    /// setting the probe selects.
    pub fn auto_measure(&mut self) -> Result<Illuminance, Error<I2C::Error>> {
        self.identify()?;
        let probe = self.integrate(ladder::PROBE)?;
        let setting = ladder::select(probe.max_count());
        debug!(
            "TSL2572: probe max {} selects {:?}",
            probe.max_count(),
            setting
        );
        self.measure_with(setting)
    }
}

fn check_integ_cycles<E: core::fmt::Debug>(integ_cycles: u16) -> Result<(), Error<E>> {
    if (1..=256).contains(&integ_cycles) {
        Ok(())
    } else {
        Err(Error::InvalidArgument {
            argument: "integration cycles",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollConfig;
    use crate::testing::VirtualClock;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    const ADDR: u8 = TSL2572_ADDR;

    /// Bus traffic of one exposure up to and including the first status poll.
    fn exposure_setup(atime: u8, config: u8, control: u8) -> Vec<I2cTransaction> {
        vec![
            I2cTransaction::write(ADDR, vec![0xA0, 0x01]),
            I2cTransaction::write(ADDR, vec![0xA1, atime]),
            I2cTransaction::write(ADDR, vec![0xAD, config]),
            I2cTransaction::write(ADDR, vec![0xAF, control]),
            I2cTransaction::write(ADDR, vec![0xA0, 0x03]),
        ]
    }

    fn status(val: u8) -> I2cTransaction {
        I2cTransaction::write_read(ADDR, vec![0xB3], vec![val])
    }

    fn finish(ch0: u16, ch1: u16) -> Vec<I2cTransaction> {
        let [c0l, c0h] = ch0.to_le_bytes();
        let [c1l, c1h] = ch1.to_le_bytes();
        vec![
            I2cTransaction::write(ADDR, vec![0xA0, 0x00]),
            I2cTransaction::write_read(ADDR, vec![0xB4], vec![c0l, c0h, c1l, c1h]),
        ]
    }

    #[test]
    fn test_identify() {
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![0xB2], vec![0x34]),
            I2cTransaction::write_read(ADDR, vec![0xB2], vec![0x3D]),
            I2cTransaction::write_read(ADDR, vec![0xB2], vec![0x00]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut tsl = Tsl2572::new(i2c.clone(), VirtualClock::default().delay());

        assert_eq!(tsl.identify().unwrap(), 0x34);
        assert_eq!(tsl.identify().unwrap(), 0x3D);
        assert!(tsl.identify().unwrap_err().is_device_absent());
        i2c.done();
    }

    #[test]
    fn test_auto_measure_two_passes() {
        let mut expectations = vec![I2cTransaction::write_read(ADDR, vec![0xB2], vec![0x34])];
        // probe: 4 cycles, x1
        expectations.extend(exposure_setup(252, 0x00, 0x00));
        expectations.push(status(0x01));
        expectations.push(status(0x11));
        expectations.extend(finish(5000, 800));
        // 5000 counts is bright: 64 cycles, x0.16
        expectations.extend(exposure_setup(192, 0x04, 0x00));
        expectations.push(status(0x11));
        expectations.extend(finish(20000, 12000));

        let mut i2c = I2cMock::new(&expectations);
        let clock = VirtualClock::default();
        let mut tsl = Tsl2572::new(i2c.clone(), clock.delay());

        let result = tsl.auto_measure().unwrap();
        assert_eq!(result.lux, 1287.8);
        assert_eq!(
            result.exposure.setting,
            ExposureSetting::new(64, Gain::X0_16)
        );
        assert_eq!(clock.now_ms(), 10);
        i2c.done();
    }

    #[test]
    fn test_dark_scene_uses_highest_gain() {
        let mut expectations = vec![I2cTransaction::write_read(ADDR, vec![0xB2], vec![0x3D])];
        expectations.extend(exposure_setup(252, 0x00, 0x00));
        expectations.push(status(0x11));
        expectations.extend(finish(3, 1));
        expectations.extend(exposure_setup(0, 0x00, 0x03));
        expectations.push(status(0x11));
        expectations.extend(finish(400, 100));

        let mut i2c = I2cMock::new(&expectations);
        let mut tsl = Tsl2572::new(i2c.clone(), VirtualClock::default().delay());

        let result = tsl.auto_measure().unwrap();
        assert_eq!(
            result.exposure.setting,
            ExposureSetting::new(256, Gain::X120)
        );
        assert_eq!(result.lux, 0.2);
        i2c.done();
    }

    #[test]
    fn test_integration_times_out() {
        let config = Tsl2572Config {
            poll: PollConfig::new(10, 30),
        };
        let mut expectations = exposure_setup(192, 0x00, 0x01);
        for _ in 0..3 {
            expectations.push(status(0x01));
        }
        // powered down even though no result arrived
        expectations.push(I2cTransaction::write(ADDR, vec![0xA0, 0x00]));

        let mut i2c = I2cMock::new(&expectations);
        let clock = VirtualClock::default();
        let mut tsl = Tsl2572::with_config(i2c.clone(), clock.delay(), config);

        let err = tsl.integrate(ExposureSetting::new(64, Gain::X8)).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(clock.now_ms(), 30);
        i2c.done();
    }

    #[test]
    fn test_invalid_exposure_is_rejected_before_bus_traffic() {
        let expectations: [I2cTransaction; 0] = [];
        let mut i2c = I2cMock::new(&expectations);
        let mut tsl = Tsl2572::new(i2c.clone(), VirtualClock::default().delay());

        for cycles in [0, 257] {
            let err = tsl
                .measure_with(ExposureSetting::new(cycles, Gain::X1))
                .unwrap_err();
            assert!(matches!(err, Error::InvalidArgument { .. }));
        }
        i2c.done();
    }

    #[test]
    fn test_write_atime_range() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0xA1, 0xFF]),
            I2cTransaction::write(ADDR, vec![0xA1, 0x00]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut tsl = Tsl2572::new(i2c.clone(), VirtualClock::default().delay());

        tsl.write_atime(1).unwrap();
        tsl.write_atime(256).unwrap();
        assert!(matches!(
            tsl.write_atime(0).unwrap_err(),
            Error::InvalidArgument { .. }
        ));
        assert!(matches!(
            tsl.write_atime(257).unwrap_err(),
            Error::InvalidArgument { .. }
        ));
        i2c.done();
    }

    #[test]
    fn test_enable_bits() {
        assert_eq!(EnableFlags::OFF.bits(), 0x00);
        assert_eq!(EnableFlags::POWER_ON.bits(), 0x01);
        assert_eq!(EnableFlags::MEASURING.bits(), 0x03);
        let all = EnableFlags {
            power_on: true,
            als: true,
            wait: true,
        };
        assert_eq!(all.bits(), 0x0B);
    }

    #[test]
    fn test_read_channels_little_endian() {
        let expectations = [I2cTransaction::write_read(
            ADDR,
            vec![0xB4],
            vec![0x34, 0x12, 0xCD, 0xAB],
        )];
        let mut i2c = I2cMock::new(&expectations);
        let mut tsl = Tsl2572::new(i2c.clone(), VirtualClock::default().delay());

        assert_eq!(tsl.read_channels().unwrap(), (0x1234, 0xABCD));
        i2c.done();
    }
}
