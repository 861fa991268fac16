//! SCD41 photoacoustic CO₂ sensor
//!
//! Every multi-byte value on the wire is protected by a CRC-8 per 16-bit
//! word. While a periodic measurement is running the sensor only accepts a
//! handful of commands; the driver tracks the measurement mode and refuses
//! anything else before it reaches the bus.

pub mod crc;
pub mod frame;
mod sensor;

pub use frame::Command;
pub use sensor::{Scd41Readings, Scd41Sensor};

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::Scd41Config;
use crate::error::Error;
use crate::sensors::{div_round, round_half_away};
use frame::{WORD_LEN, WriteFrame, decode_words};

/// Fixed I2C address of the SCD41
pub const SCD41_ADDR: u8 = 0x62;

// =============================================================================
// Timing
// =============================================================================

/// Time the sensor needs after `stop_periodic_measurement` before it accepts
/// new commands
pub const STOP_SETTLE_MS: u32 = 500;
pub const PERSIST_SETTLE_MS: u32 = 800;
pub const FACTORY_RESET_SETTLE_MS: u32 = 1200;
pub const REINIT_SETTLE_MS: u32 = 20;
/// Time between the forced recalibration command and reading its result
pub const FRC_SETTLE_MS: u32 = 400;
/// Interval between data-ready polls in `read_measurement`
pub const DATA_READY_POLL_MS: u32 = 100;

/// Mask of the status word bits that signal new data
const DATA_READY_MASK: u16 = 0x0003;
/// Response word of a failed forced recalibration
const FRC_FAILED: u16 = 0xFFFF;
/// Offset of the forced recalibration correction word
const FRC_ZERO: i32 = 0x8000;

/// Measurement state tracked by the driver.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeasurementMode {
    #[default]
    Idle,
    /// New data every 5 s
    PeriodicNormal,
    /// New data every 30 s
    PeriodicLowPower,
    /// A single-shot measurement has been triggered and not yet read
    SingleShotPending,
}

impl MeasurementMode {
    pub const fn is_periodic(self) -> bool {
        matches!(self, Self::PeriodicNormal | Self::PeriodicLowPower)
    }
}

/// One decoded measurement.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub co2_ppm: u16,
    /// °C, one decimal place
    pub temperature: f32,
    /// %RH, one decimal place
    pub humidity: f32,
}

impl Measurement {
    /// Decode the three data words of a `read_measurement` response.
    pub fn from_words(words: [u16; 3]) -> Self {
        let temperature_tenths = div_round(1750 * words[1] as i64, 65536) - 450;
        let humidity_tenths = div_round(1000 * words[2] as i64, 65536);
        Self {
            co2_ppm: words[0],
            temperature: temperature_tenths as f32 / 10.0,
            humidity: humidity_tenths as f32 / 10.0,
        }
    }
}

/// Compensation settings held in the sensor's RAM.
///
/// Changes are lost on power cycle unless followed by
/// [`Scd41::persist_settings`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SensorConfig {
    pub automatic_self_calibration: bool,
    pub altitude_m: u16,
    pub temperature_offset_c: f32,
    /// Write-only on the device, so always `None` when read back.
    pub ambient_pressure_hpa: Option<u16>,
}

impl Default for SensorConfig {
    /// Factory defaults
    fn default() -> Self {
        Self {
            automatic_self_calibration: true,
            altitude_m: 0,
            temperature_offset_c: 4.0,
            ambient_pressure_hpa: None,
        }
    }
}

/// Result of a successful forced recalibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrcCorrection {
    /// Change applied to the sensor's internal CO₂ reference, in ppm
    pub correction_ppm: i16,
}

/// Encode a temperature offset in °C as the sensor's 16-bit word.
pub fn encode_temperature_offset(offset_c: f32) -> Option<u16> {
    if !offset_c.is_finite() {
        return None;
    }
    let word = round_half_away(offset_c * 65536.0 / 175.0);
    u16::try_from(word).ok()
}

/// Decode the sensor's temperature offset word, rounded to one decimal.
pub fn decode_temperature_offset(word: u16) -> f32 {
    div_round(1750 * word as i64, 65536) as f32 / 10.0
}

// =============================================================================
// Driver Implementation
// =============================================================================

pub struct Scd41<I2C, D> {
    i2c: I2C,
    delay: D,
    mode: MeasurementMode,
    config: Scd41Config,
}

impl<I2C, D> Scd41<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    /// The driver assumes the sensor is idle. If it may still be measuring
    /// from an earlier session, call [`stop`](Self::stop) first.
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_config(i2c, delay, Scd41Config::default())
    }

    pub fn with_config(i2c: I2C, delay: D, config: Scd41Config) -> Self {
        Self {
            i2c,
            delay,
            mode: MeasurementMode::Idle,
            config,
        }
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    pub fn mode(&self) -> MeasurementMode {
        self.mode
    }

    pub fn config(&self) -> &Scd41Config {
        &self.config
    }

    fn check_allowed(&self, command: Command) -> Result<(), Error<I2C::Error>> {
        if self.mode.is_periodic() && !command.allowed_in_periodic() {
            return Err(Error::CommandNotAllowed {
                command: command.code(),
                mode: self.mode,
            });
        }
        Ok(())
    }

    fn write_frame(
        &mut self,
        command: Command,
        frame: WriteFrame,
    ) -> Result<(), Error<I2C::Error>> {
        self.check_allowed(command)?;
        self.i2c.write(SCD41_ADDR, frame.as_bytes())?;
        Ok(())
    }

    fn send(&mut self, command: Command) -> Result<(), Error<I2C::Error>> {
        self.write_frame(command, WriteFrame::command(command))
    }

    fn send_word(&mut self, command: Command, word: u16) -> Result<(), Error<I2C::Error>> {
        self.write_frame(command, WriteFrame::with_word(command, word))
    }

    fn read_words<const N: usize>(
        &mut self,
        command: Command,
    ) -> Result<[u16; N], Error<I2C::Error>> {
        self.check_allowed(command)?;
        let mut buf = [0u8; 3 * WORD_LEN];
        let buf = &mut buf[..N * WORD_LEN];
        self.i2c
            .write_read(SCD41_ADDR, &command.code().to_be_bytes(), buf)?;
        decode_words::<N>(buf).map_err(|e| Error::FrameCorruption {
            command: command.code(),
            word: e.word,
        })
    }

    fn read_word(&mut self, command: Command) -> Result<u16, Error<I2C::Error>> {
        let [word] = self.read_words::<1>(command)?;
        Ok(word)
    }

    // -------------------------------------------------------------------------
    // Measurement state machine
    // -------------------------------------------------------------------------

    /// Start measuring every 5 s.
    pub fn start_periodic(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send(Command::StartPeriodicMeasurement)?;
        self.mode = MeasurementMode::PeriodicNormal;
        info!("SCD41: periodic measurement started");
        Ok(())
    }

    /// Start measuring every 30 s.
    pub fn start_low_power_periodic(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send(Command::StartLowPowerPeriodicMeasurement)?;
        self.mode = MeasurementMode::PeriodicLowPower;
        info!("SCD41: low power periodic measurement started");
        Ok(())
    }

    /// Stop any periodic measurement and wait until the sensor accepts
    /// commands again.
    pub fn stop(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send(Command::StopPeriodicMeasurement)?;
        self.mode = MeasurementMode::Idle;
        self.delay.delay_ms(STOP_SETTLE_MS);
        info!("SCD41: periodic measurement stopped");
        Ok(())
    }

    /// Trigger one measurement and wait up to `timeout_s` seconds for it.
    ///
    /// A single-shot conversion takes about 5 s.
    pub fn measure_single_shot(
        &mut self,
        timeout_s: u32,
    ) -> Result<Option<Measurement>, Error<I2C::Error>> {
        self.send(Command::MeasureSingleShot)?;
        self.mode = MeasurementMode::SingleShotPending;
        let result = self.read_measurement(timeout_s);
        self.mode = MeasurementMode::Idle;
        result
    }

    /// Whether a new measurement is waiting to be read.
    pub fn data_ready(&mut self) -> Result<bool, Error<I2C::Error>> {
        let status = self.read_word(Command::GetDataReadyStatus)?;
        Ok(status & DATA_READY_MASK != 0)
    }

    /// Wait up to `timeout_s` seconds for new data, then read it.
    ///
    /// Data readiness is checked every 100 ms, `timeout_s * 10 + 1` times in
    /// total, with no sleep after the last check. Returns `Ok(None)` if no
    /// data became ready.
    pub fn read_measurement(
        &mut self,
        timeout_s: u32,
    ) -> Result<Option<Measurement>, Error<I2C::Error>> {
        let attempts = timeout_s.saturating_mul(10).saturating_add(1);
        let mut attempt = 0;
        while !self.data_ready()? {
            attempt += 1;
            if attempt >= attempts {
                warn!("SCD41: no data ready after {} s", timeout_s);
                return Ok(None);
            }
            self.delay.delay_ms(DATA_READY_POLL_MS);
        }

        let words = self.read_words::<3>(Command::ReadMeasurement)?;
        let measurement = Measurement::from_words(words);
        debug!("SCD41: {:?}", measurement);
        Ok(Some(measurement))
    }

    // -------------------------------------------------------------------------
    // Configuration registers
    // -------------------------------------------------------------------------

    /// Set the offset subtracted from the internal temperature reading.
    ///
    /// # Returns
    /// `Error::InvalidArgument` if the encoded offset does not fit the
    /// 16-bit register (below 0 °C or at 175 °C and above).
    pub fn set_temperature_offset(&mut self, offset_c: f32) -> Result<(), Error<I2C::Error>> {
        let word = encode_temperature_offset(offset_c).ok_or(Error::InvalidArgument {
            argument: "temperature offset",
        })?;
        self.send_word(Command::SetTemperatureOffset, word)
    }

    pub fn temperature_offset(&mut self) -> Result<f32, Error<I2C::Error>> {
        self.read_word(Command::GetTemperatureOffset)
            .map(decode_temperature_offset)
    }

    /// Altitude above sea level in metres, used for pressure compensation.
    pub fn set_sensor_altitude(&mut self, altitude_m: u16) -> Result<(), Error<I2C::Error>> {
        self.send_word(Command::SetSensorAltitude, altitude_m)
    }

    pub fn sensor_altitude(&mut self) -> Result<u16, Error<I2C::Error>> {
        self.read_word(Command::GetSensorAltitude)
    }

    /// Ambient pressure in hPa. Overrides the altitude setting and may be
    /// sent during periodic measurement.
    pub fn set_ambient_pressure(&mut self, pressure_hpa: u16) -> Result<(), Error<I2C::Error>> {
        self.send_word(Command::SetAmbientPressure, pressure_hpa)
    }

    pub fn set_automatic_self_calibration(
        &mut self,
        enabled: bool,
    ) -> Result<(), Error<I2C::Error>> {
        self.send_word(Command::SetAutomaticSelfCalibrationEnabled, enabled as u16)
    }

    pub fn automatic_self_calibration(&mut self) -> Result<bool, Error<I2C::Error>> {
        Ok(self.read_word(Command::GetAutomaticSelfCalibrationEnabled)? == 1)
    }

    /// Read every readable configuration register.
    pub fn settings(&mut self) -> Result<SensorConfig, Error<I2C::Error>> {
        Ok(SensorConfig {
            automatic_self_calibration: self.automatic_self_calibration()?,
            altitude_m: self.sensor_altitude()?,
            temperature_offset_c: self.temperature_offset()?,
            ambient_pressure_hpa: None,
        })
    }

    /// Write every configuration register. Ambient pressure is only sent
    /// when set.
    pub fn apply_settings(&mut self, settings: &SensorConfig) -> Result<(), Error<I2C::Error>> {
        self.set_temperature_offset(settings.temperature_offset_c)?;
        self.set_sensor_altitude(settings.altitude_m)?;
        self.set_automatic_self_calibration(settings.automatic_self_calibration)?;
        if let Some(pressure) = settings.ambient_pressure_hpa {
            self.set_ambient_pressure(pressure)?;
        }
        debug!("SCD41: applied {:?}", settings);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Maintenance
    // -------------------------------------------------------------------------

    /// Store the current configuration in EEPROM.
    pub fn persist_settings(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send(Command::PersistSettings)?;
        self.delay.delay_ms(PERSIST_SETTLE_MS);
        info!("SCD41: settings persisted");
        Ok(())
    }

    /// Erase configuration and calibration history in EEPROM.
    pub fn perform_factory_reset(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send(Command::PerformFactoryReset)?;
        self.delay.delay_ms(FACTORY_RESET_SETTLE_MS);
        info!("SCD41: factory reset");
        Ok(())
    }

    /// Reload configuration from EEPROM.
    pub fn reinit(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send(Command::Reinit)?;
        self.delay.delay_ms(REINIT_SETTLE_MS);
        Ok(())
    }

    /// Recalibrate against a known CO₂ concentration.
    ///
    /// The sensor must have been measuring in the target environment for
    /// at least 3 minutes and then stopped.
    ///
    /// # Returns
    /// `Ok(None)` if the sensor reports failure.
    pub fn perform_forced_recalibration(
        &mut self,
        target_ppm: u16,
    ) -> Result<Option<FrcCorrection>, Error<I2C::Error>> {
        let command = Command::PerformForcedRecalibration;
        self.send_word(command, target_ppm)?;
        self.delay.delay_ms(FRC_SETTLE_MS);

        let mut buf = [0u8; WORD_LEN];
        self.i2c.read(SCD41_ADDR, &mut buf)?;
        if u16::from_be_bytes([buf[0], buf[1]]) == FRC_FAILED {
            warn!("SCD41: forced recalibration failed");
            return Ok(None);
        }
        let [raw] = decode_words::<1>(&buf).map_err(|e| Error::FrameCorruption {
            command: command.code(),
            word: e.word,
        })?;

        let correction_ppm = (raw as i32 - FRC_ZERO) as i16;
        info!("SCD41: forced recalibration, correction {} ppm", correction_ppm);
        Ok(Some(FrcCorrection { correction_ppm }))
    }

    /// 48-bit unique serial number.
    pub fn serial_number(&mut self) -> Result<u64, Error<I2C::Error>> {
        let words = self.read_words::<3>(Command::GetSerialNumber)?;
        Ok(words
            .iter()
            .fold(0u64, |serial, &word| (serial << 16) | word as u64))
    }
}
