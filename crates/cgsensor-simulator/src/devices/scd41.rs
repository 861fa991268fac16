//! SCD41 command model.
//!
//! Mirrors the behaviour the driver relies on: CRC-checked payloads, the
//! periodic-mode command whitelist, data becoming ready once per measurement
//! interval, busy windows after slow commands, and settings that survive a
//! `reinit` only if they were persisted. The EEPROM holds a postcard-encoded
//! `SensorConfig`.

use cgsensor_core::sensors::scd41::frame::{self, Command, WORD_LEN};
use cgsensor_core::sensors::scd41::{
    SCD41_ADDR, SensorConfig, decode_temperature_offset, encode_temperature_offset,
};
use embedded_hal::i2c::ErrorKind;
use heapless::Vec;
use log::{debug, warn};

use super::{NACK_DATA, SimDevice};

const NORMAL_INTERVAL_MS: u64 = 5_000;
const LOW_POWER_INTERVAL_MS: u64 = 30_000;
const SINGLE_SHOT_MS: u64 = 5_000;

/// Largest response: three words
const MAX_RESPONSE: usize = 3 * WORD_LEN;
/// Room for one postcard-encoded `SensorConfig`
const NVM_SIZE: usize = 32;

const SERIAL: [u16; 3] = [0xF896, 0x9F07, 0x3BBE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Periodic { interval_ms: u64 },
    SingleShot,
}

pub struct Scd41Model {
    state: State,
    /// When the next measurement becomes readable; `None` when nothing is
    /// scheduled
    data_at_ms: Option<u64>,
    /// Commands are NACKed until this time
    busy_until_ms: u64,
    ram: SensorConfig,
    nvm: Vec<u8, NVM_SIZE>,
    response: Vec<u8, MAX_RESPONSE>,
    /// Offset applied to the simulated CO₂ level by forced recalibration
    co2_correction: i32,
    measurements: u32,
}

impl Default for Scd41Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Scd41Model {
    pub fn new() -> Self {
        let mut model = Self {
            state: State::Idle,
            data_at_ms: None,
            busy_until_ms: 0,
            ram: SensorConfig::default(),
            nvm: Vec::new(),
            response: Vec::new(),
            co2_correction: 0,
            measurements: 0,
        };
        // A factory-fresh part has its defaults in EEPROM
        model.persist();
        model
    }

    /// Settings currently in EEPROM, if they decode.
    pub fn persisted(&self) -> Option<SensorConfig> {
        postcard::from_bytes(&self.nvm).ok()
    }

    fn persist(&mut self) {
        let mut buf = [0u8; NVM_SIZE];
        match postcard::to_slice(&self.ram, &mut buf) {
            Ok(encoded) => {
                self.nvm.clear();
                // encoded is a prefix of a NVM_SIZE buffer, so it always fits
                let _ = self.nvm.extend_from_slice(encoded);
            }
            Err(e) => warn!("sim SCD41: cannot encode settings: {}", e),
        }
    }

    fn reload(&mut self) {
        match self.persisted() {
            Some(config) => self.ram = config,
            None => warn!("sim SCD41: EEPROM contents do not decode, keeping RAM settings"),
        }
    }

    fn respond(&mut self, words: &[u16]) {
        self.response.clear();
        for &word in words {
            let _ = self.response.extend_from_slice(&frame::encode_word(word));
        }
    }

    fn data_ready(&self, now_ms: u64) -> bool {
        self.data_at_ms.is_some_and(|at| now_ms >= at)
    }

    /// Raw words of the current simulated measurement.
    fn measurement_words(&self) -> [u16; 3] {
        let step = self.measurements % 10;
        let co2 = (650 + 15 * step as i32 + self.co2_correction).clamp(0, u16::MAX as i32);
        // 24.0 °C before the offset, 45.0 %RH
        let temperature_c = 24.0 + 4.0 - self.ram.temperature_offset_c;
        let temperature_word = ((temperature_c + 45.0) * 65536.0 / 175.0) as u32;
        let humidity_word = (45.0_f32 * 65536.0 / 100.0) as u32;
        [
            co2 as u16,
            temperature_word.min(0xFFFF) as u16,
            humidity_word.min(0xFFFF) as u16,
        ]
    }

    fn argument(&self, command: Command, bytes: &[u8]) -> Result<u16, ErrorKind> {
        if bytes.len() != WORD_LEN {
            warn!("sim SCD41: {:?} expects one data word", command);
            return Err(NACK_DATA);
        }
        frame::decode_words::<1>(bytes)
            .map(|[word]| word)
            .map_err(|_| {
                warn!("sim SCD41: CRC mismatch in {:?} payload", command);
                NACK_DATA
            })
    }

    fn execute(&mut self, now_ms: u64, command: Command, payload: &[u8]) -> Result<(), ErrorKind> {
        self.response.clear();
        match command {
            Command::StartPeriodicMeasurement | Command::StartLowPowerPeriodicMeasurement => {
                let interval_ms = if command == Command::StartPeriodicMeasurement {
                    NORMAL_INTERVAL_MS
                } else {
                    LOW_POWER_INTERVAL_MS
                };
                self.state = State::Periodic { interval_ms };
                self.data_at_ms = Some(now_ms + interval_ms);
            }
            Command::MeasureSingleShot => {
                self.state = State::SingleShot;
                self.data_at_ms = Some(now_ms + SINGLE_SHOT_MS);
            }
            Command::StopPeriodicMeasurement => {
                self.state = State::Idle;
                self.data_at_ms = None;
                self.busy_until_ms = now_ms + 500;
            }
            Command::GetDataReadyStatus => {
                let status = if self.data_ready(now_ms) { 0x8006 } else { 0x8000 };
                self.respond(&[status]);
            }
            Command::ReadMeasurement => {
                if !self.data_ready(now_ms) {
                    return Err(NACK_DATA);
                }
                let words = self.measurement_words();
                self.respond(&words);
                self.measurements += 1;
                self.data_at_ms = match self.state {
                    // Unread measurements are overwritten, not queued
                    State::Periodic { interval_ms } => self
                        .data_at_ms
                        .map(|at| at + interval_ms * ((now_ms - at) / interval_ms + 1)),
                    State::SingleShot | State::Idle => {
                        self.state = State::Idle;
                        None
                    }
                };
            }
            Command::SetTemperatureOffset => {
                let word = self.argument(command, payload)?;
                self.ram.temperature_offset_c = decode_temperature_offset(word);
            }
            Command::GetTemperatureOffset => {
                let word = encode_temperature_offset(self.ram.temperature_offset_c).unwrap_or(0);
                self.respond(&[word]);
            }
            Command::SetSensorAltitude => {
                self.ram.altitude_m = self.argument(command, payload)?;
            }
            Command::GetSensorAltitude => self.respond(&[self.ram.altitude_m]),
            Command::SetAmbientPressure => {
                self.ram.ambient_pressure_hpa = Some(self.argument(command, payload)?);
            }
            Command::SetAutomaticSelfCalibrationEnabled => {
                self.ram.automatic_self_calibration = self.argument(command, payload)? == 1;
            }
            Command::GetAutomaticSelfCalibrationEnabled => {
                self.respond(&[self.ram.automatic_self_calibration as u16]);
            }
            Command::PerformForcedRecalibration => {
                let target = i32::from(self.argument(command, payload)?);
                self.busy_until_ms = now_ms + 400;
                if self.measurements == 0 {
                    // Never measured: nothing to recalibrate against
                    self.respond(&[0xFFFF]);
                } else {
                    let current = i32::from(self.measurement_words()[0]);
                    let correction = target - current;
                    self.co2_correction += correction;
                    self.respond(&[(correction + 0x8000) as u16]);
                }
            }
            Command::PersistSettings => {
                // Ambient pressure is not stored
                self.ram.ambient_pressure_hpa = None;
                self.persist();
                self.busy_until_ms = now_ms + 800;
            }
            Command::PerformFactoryReset => {
                self.ram = SensorConfig::default();
                self.co2_correction = 0;
                self.persist();
                self.busy_until_ms = now_ms + 1200;
            }
            Command::Reinit => {
                self.reload();
                self.busy_until_ms = now_ms + 20;
            }
            Command::GetSerialNumber => self.respond(&SERIAL),
        }
        Ok(())
    }
}

impl SimDevice for Scd41Model {
    fn address(&self) -> u8 {
        SCD41_ADDR
    }

    fn write(&mut self, now_ms: u64, bytes: &[u8]) -> Result<(), ErrorKind> {
        if now_ms < self.busy_until_ms {
            warn!("sim SCD41: write while busy until {} ms", self.busy_until_ms);
            return Err(NACK_DATA);
        }
        let (code, payload) = match bytes {
            [hi, lo, rest @ ..] => (u16::from_be_bytes([*hi, *lo]), rest),
            _ => return Err(NACK_DATA),
        };
        let Some(command) = Command::from_code(code) else {
            warn!("sim SCD41: unknown command {:#06x}", code);
            return Err(NACK_DATA);
        };
        if matches!(self.state, State::Periodic { .. }) && !command.allowed_in_periodic() {
            warn!("sim SCD41: {:?} ignored during periodic measurement", command);
            return Err(NACK_DATA);
        }
        debug!("sim SCD41: {:?}", command);
        self.execute(now_ms, command, payload)
    }

    fn read(&mut self, _now_ms: u64, buf: &mut [u8]) -> Result<(), ErrorKind> {
        if buf.len() > self.response.len() {
            return Err(NACK_DATA);
        }
        buf.copy_from_slice(&self.response[..buf.len()]);
        self.response.clear();
        Ok(())
    }
}
