//! BME280 temperature, humidity and pressure sensor
//!
//! Measurements are taken in forced mode: the driver programs oversampling,
//! triggers one conversion, polls the status register until the conversion is
//! done, then reads calibration and ADC data in two bursts and runs the Bosch
//! compensation formulas.

mod calibration;
mod compensation;
mod sensor;

pub use calibration::{CALIB_00_LEN, CALIB_26_LEN, CalibrationSet};
pub use compensation::{
    Measurement, RawSample, SKIPPED_HUMIDITY, SKIPPED_PRESSURE_OR_TEMPERATURE, TFine, compensate,
    compensate_humidity, compensate_pressure, compensate_temperature,
};
pub use sensor::{Bme280Readings, Bme280Sensor};

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::config::Bme280Config;
use crate::error::Error;

// =============================================================================
// Register Addresses
// =============================================================================

pub const ADDR_CALIB_00: u8 = 0x88;
pub const ADDR_CHIP_ID: u8 = 0xD0;
pub const ADDR_RESET: u8 = 0xE0;
pub const ADDR_CALIB_26: u8 = 0xE1;
pub const ADDR_CTRL_HUM: u8 = 0xF2;
pub const ADDR_STATUS: u8 = 0xF3;
pub const ADDR_CTRL_MEAS: u8 = 0xF4;
pub const ADDR_CONFIG: u8 = 0xF5;
/// Start of the burst-readable ADC block (press_msb .. hum_lsb)
pub const ADDR_DATA: u8 = 0xF7;

/// Chip IDs this driver accepts.
pub const KNOWN_CHIP_IDS: [u8; 1] = [0x60];

/// Value written to `ADDR_RESET` to trigger a power-on reset.
const SOFT_RESET_COMMAND: u8 = 0xB6;
/// Start-up time after a soft reset
const SOFT_RESET_DELAY_MS: u32 = 2;
/// Grace period between triggering a forced conversion and the first status poll
const FORCED_START_DELAY_MS: u32 = 10;

const STATUS_MEASURING: u8 = 0x08;
const STATUS_IM_UPDATE: u8 = 0x01;

// =============================================================================
// Enums
// =============================================================================

/// I2C address, selected by the SDO pin.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bme280Address {
    /// SDO to GND
    Primary,
    /// SDO to VDDIO
    Secondary,
}

impl Bme280Address {
    pub const fn addr(self) -> u8 {
        match self {
            Self::Primary => 0x76,
            Self::Secondary => 0x77,
        }
    }
}

/// Sensor power mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    Sleep = 0b00,
    Forced = 0b01,
    Normal = 0b11,
}

/// Oversampling of one measurement channel
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Oversampling {
    Skipped = 0,
    X1 = 1,
    X2 = 2,
    X4 = 3,
    X8 = 4,
    X16 = 5,
}

/// Inactive duration between conversions in normal mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Standby {
    Ms0_5 = 0,
    Ms62_5 = 1,
    Ms125 = 2,
    Ms250 = 3,
    Ms500 = 4,
    Ms1000 = 5,
    Ms10 = 6,
    Ms20 = 7,
}

/// IIR filter coefficient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Filter {
    Off = 0,
    X2 = 1,
    X4 = 2,
    X8 = 3,
    X16 = 4,
}

/// Contents of the status register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// A conversion is running
    pub measuring: bool,
    /// NVM data is being copied to image registers
    pub im_update: bool,
}

impl Status {
    pub fn from_register(val: u8) -> Self {
        Self {
            measuring: val & STATUS_MEASURING != 0,
            im_update: val & STATUS_IM_UPDATE != 0,
        }
    }
}

// =============================================================================
// Driver Implementation
// =============================================================================

pub struct Bme280<I2C, D> {
    i2c: I2C,
    delay: D,
    config: Bme280Config,
}

impl<I2C, D> Bme280<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    /// Create a driver for a BME280 at the primary address with default
    /// oversampling and poll settings.
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_config(i2c, delay, Bme280Config::default())
    }

    pub fn with_config(i2c: I2C, delay: D, config: Bme280Config) -> Self {
        Self { i2c, delay, config }
    }

    /// Give back the bus and delay.
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    /// 7-bit I2C address this driver talks to
    pub fn address(&self) -> u8 {
        self.config.address.addr()
    }

    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Error<I2C::Error>> {
        let addr = self.address();
        self.i2c.write_read(addr, &[reg], buf)?;
        Ok(())
    }

    fn read_register(&mut self, reg: u8) -> Result<u8, Error<I2C::Error>> {
        let mut buf = [0u8; 1];
        self.read_registers(reg, &mut buf)?;
        Ok(buf[0])
    }

    fn write_register(&mut self, reg: u8, val: u8) -> Result<(), Error<I2C::Error>> {
        let addr = self.address();
        self.i2c.write(addr, &[reg, val])?;
        Ok(())
    }

    /// Read the chip ID and check it against [`KNOWN_CHIP_IDS`].
    ///
    /// # Returns
    /// The chip ID, or `Error::DeviceNotFound` for any other value.
    pub fn identify(&mut self) -> Result<u8, Error<I2C::Error>> {
        let id = self.read_register(ADDR_CHIP_ID)?;
        if KNOWN_CHIP_IDS.contains(&id) {
            Ok(id)
        } else {
            Err(Error::DeviceNotFound { found: id })
        }
    }

    /// Reset the device to its power-on state.
    pub fn soft_reset(&mut self) -> Result<(), Error<I2C::Error>> {
        self.write_register(ADDR_RESET, SOFT_RESET_COMMAND)?;
        self.delay.delay_ms(SOFT_RESET_DELAY_MS);
        Ok(())
    }

    pub fn read_status(&mut self) -> Result<Status, Error<I2C::Error>> {
        self.read_register(ADDR_STATUS).map(Status::from_register)
    }

    /// Write the normal-mode standby time and IIR filter.
    pub fn write_config(
        &mut self,
        standby: Standby,
        filter: Filter,
    ) -> Result<(), Error<I2C::Error>> {
        self.write_register(ADDR_CONFIG, ((standby as u8) << 5) | ((filter as u8) << 2))
    }

    /// Write oversampling for all channels and the power mode.
    ///
    /// `ctrl_hum` only takes effect after a write to `ctrl_meas`, so it is
    /// written first. Writing `Forced` or `Normal` starts measuring.
    pub fn write_ctrl(
        &mut self,
        mode: Mode,
        temperature: Oversampling,
        pressure: Oversampling,
        humidity: Oversampling,
    ) -> Result<(), Error<I2C::Error>> {
        self.write_register(ADDR_CTRL_HUM, humidity as u8)?;
        self.write_register(
            ADDR_CTRL_MEAS,
            ((temperature as u8) << 5) | ((pressure as u8) << 2) | mode as u8,
        )
    }

    /// Start one forced-mode conversion and wait until it has finished.
    pub fn trigger_forced_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        let os = self.config.oversampling;
        self.write_config(Standby::Ms0_5, Filter::Off)?;
        self.write_ctrl(Mode::Forced, os, os, os)?;
        self.delay.delay_ms(FORCED_START_DELAY_MS);
        self.wait_until_idle()
    }

    /// Poll the `measuring` bit until the device reports it is done.
    fn wait_until_idle(&mut self) -> Result<(), Error<I2C::Error>> {
        let poll = self.config.poll;
        for attempt in 0..poll.max_attempts() {
            if !self.read_status()?.measuring {
                trace!("BME280: conversion complete after {} polls", attempt + 1);
                return Ok(());
            }
            self.delay.delay_ms(poll.interval_ms);
        }
        Err(Error::Timeout {
            operation: "BME280 conversion",
        })
    }

    /// Read both calibration blocks. Safe to call on every cycle.
    pub fn read_calibration(&mut self) -> Result<CalibrationSet, Error<I2C::Error>> {
        let mut calib00 = [0u8; CALIB_00_LEN];
        let mut calib26 = [0u8; CALIB_26_LEN];
        self.read_registers(ADDR_CALIB_00, &mut calib00)?;
        self.read_registers(ADDR_CALIB_26, &mut calib26)?;
        let cal = CalibrationSet::from_bytes(&calib00, &calib26);
        debug!("BME280: calibration {:?}", cal);
        Ok(cal)
    }

    /// Read the pressure, temperature and humidity ADC registers in one burst.
    pub fn read_raw(&mut self) -> Result<RawSample, Error<I2C::Error>> {
        let mut data = [0u8; 8];
        self.read_registers(ADDR_DATA, &mut data)?;
        Ok(RawSample::from_bytes(&data))
    }

    /// Read calibration and ADC data and compensate them.
    pub fn read_compensated(&mut self) -> Result<Measurement, Error<I2C::Error>> {
        let cal = self.read_calibration()?;
        let raw = self.read_raw()?;
        debug!("BME280: raw {:?}", raw);
        Ok(compensate(&cal, &raw))
    }

    /// Identify the chip, take one forced measurement and return the
    /// compensated values.
    pub fn measure(&mut self) -> Result<Measurement, Error<I2C::Error>> {
        self.identify()?;
        self.trigger_forced_measurement()?;
        self.read_compensated()
    }
}
