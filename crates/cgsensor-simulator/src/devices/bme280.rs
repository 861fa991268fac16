//! BME280 register model: forced-mode conversions with a slowly drifting
//! environment.

use embedded_hal::i2c::ErrorKind;
use log::debug;

use super::{NACK_DATA, SimDevice};

const CHIP_ID: u8 = 0x60;

const REG_CALIB_00: usize = 0x88;
const REG_CHIP_ID: usize = 0xD0;
const REG_RESET: u8 = 0xE0;
const REG_CALIB_26: usize = 0xE1;
const REG_CTRL_HUM: u8 = 0xF2;
const REG_STATUS: u8 = 0xF3;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_DATA: usize = 0xF7;

/// Factory trimming of the simulated part (Bosch datasheet example values).
const CALIB_00: [u8; 26] = [
    0x70, 0x6B, 0x43, 0x67, 0x18, 0xFC, 0x7D, 0x8E, 0x43, 0xD6, 0xD0, 0x0B, 0x27, 0x0B, 0x8C,
    0x00, 0xF9, 0xFF, 0x8C, 0x3C, 0xF8, 0xC6, 0x70, 0x17, 0x00, 0x4B,
];
const CALIB_26: [u8; 7] = [0x6A, 0x01, 0x00, 0x13, 0x29, 0x03, 0x1E];

/// Raw ADC values at t = 0: 25.1 °C, 1006.5 hPa, 55 %RH
const BASE_ADC_T: u32 = 519_888;
const BASE_ADC_P: u32 = 415_148;
const BASE_ADC_H: u32 = 30_000;

const SKIPPED_20BIT: u32 = 0x80000;
const SKIPPED_16BIT: u32 = 0x8000;

pub struct Bme280Model {
    address: u8,
    regs: [u8; 256],
    pointer: u8,
    measuring_until_ms: u64,
}

impl Bme280Model {
    pub fn new(address: u8) -> Self {
        let mut model = Self {
            address,
            regs: [0; 256],
            pointer: 0,
            measuring_until_ms: 0,
        };
        model.power_on_reset();
        model
    }

    fn power_on_reset(&mut self) {
        self.regs = [0; 256];
        self.regs[REG_CHIP_ID] = CHIP_ID;
        self.regs[REG_CALIB_00..REG_CALIB_00 + CALIB_00.len()].copy_from_slice(&CALIB_00);
        self.regs[REG_CALIB_26..REG_CALIB_26 + CALIB_26.len()].copy_from_slice(&CALIB_26);
        self.store_adc(SKIPPED_20BIT, SKIPPED_20BIT, SKIPPED_16BIT);
        self.measuring_until_ms = 0;
    }

    fn store_adc(&mut self, adc_p: u32, adc_t: u32, adc_h: u32) {
        let data = &mut self.regs[REG_DATA..REG_DATA + 8];
        data[0] = (adc_p >> 12) as u8;
        data[1] = (adc_p >> 4) as u8;
        data[2] = ((adc_p & 0x0F) << 4) as u8;
        data[3] = (adc_t >> 12) as u8;
        data[4] = (adc_t >> 4) as u8;
        data[5] = ((adc_t & 0x0F) << 4) as u8;
        data[6] = (adc_h >> 8) as u8;
        data[7] = adc_h as u8;
    }

    /// Oversampling field to sample count; 0 means skipped.
    fn samples(osrs: u8) -> u64 {
        match osrs & 0x07 {
            0 => 0,
            n @ 1..=5 => 1 << (n - 1),
            _ => 16,
        }
    }

    fn start_forced(&mut self, now_ms: u64, ctrl_meas: u8) {
        let osrs_t = ctrl_meas >> 5;
        let osrs_p = (ctrl_meas >> 2) & 0x07;
        let osrs_h = self.regs[REG_CTRL_HUM as usize] & 0x07;

        // Typical conversion time from the datasheet, rounded up
        let t = Self::samples(osrs_t);
        let p = Self::samples(osrs_p);
        let h = Self::samples(osrs_h);
        let half_ms = u64::from(p > 0) + u64::from(h > 0);
        let duration_ms = 1 + 2 * (t + p + h) + half_ms.div_ceil(2);
        self.measuring_until_ms = now_ms + duration_ms;

        // One-minute sawtooth around the base values
        let phase = ((now_ms / 1000) % 60) as u32;
        let channel = |samples: u64, value: u32, skipped: u32| {
            if samples == 0 { skipped } else { value }
        };
        self.store_adc(
            channel(p, BASE_ADC_P - phase * 20, SKIPPED_20BIT),
            channel(t, BASE_ADC_T + phase * 40, SKIPPED_20BIT),
            channel(h, BASE_ADC_H + phase * 8, SKIPPED_16BIT),
        );
        debug!("sim BME280: forced conversion for {} ms", duration_ms);
    }

    fn write_register(&mut self, now_ms: u64, reg: u8, val: u8) {
        match reg {
            REG_RESET if val == 0xB6 => self.power_on_reset(),
            REG_CTRL_MEAS => {
                // Forced mode returns to sleep on its own
                if matches!(val & 0x03, 0b01 | 0b10) {
                    self.start_forced(now_ms, val);
                    self.regs[reg as usize] = val & !0x03;
                } else {
                    self.regs[reg as usize] = val;
                }
            }
            REG_STATUS => {}
            _ => self.regs[reg as usize] = val,
        }
    }
}

impl SimDevice for Bme280Model {
    fn address(&self) -> u8 {
        self.address
    }

    fn write(&mut self, now_ms: u64, bytes: &[u8]) -> Result<(), ErrorKind> {
        match bytes {
            [] => Err(NACK_DATA),
            [reg] => {
                self.pointer = *reg;
                Ok(())
            }
            pairs if pairs.len() % 2 == 0 => {
                for pair in pairs.chunks_exact(2) {
                    self.write_register(now_ms, pair[0], pair[1]);
                }
                Ok(())
            }
            _ => Err(NACK_DATA),
        }
    }

    fn read(&mut self, now_ms: u64, buf: &mut [u8]) -> Result<(), ErrorKind> {
        let measuring = now_ms < self.measuring_until_ms;
        for byte in buf.iter_mut() {
            *byte = match self.pointer {
                REG_STATUS if measuring => 0x08,
                REG_STATUS => 0x00,
                reg => self.regs[reg as usize],
            };
            self.pointer = self.pointer.wrapping_add(1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{SimBus, SimClock};
    use cgsensor_core::sensors::bme280::Bme280;

    fn driver() -> (Bme280<SimBus, crate::devices::SimDelay>, SimClock) {
        let clock = SimClock::default();
        let mut bus = SimBus::new(clock.clone());
        bus.attach(Bme280Model::new(0x76));
        (Bme280::new(bus, clock.delay()), clock)
    }

    #[test]
    fn test_measure_matches_datasheet_sample() {
        let (mut bme, clock) = driver();

        let m = bme.measure().unwrap();
        assert_eq!(m.temperature, 25.1);
        assert_eq!(m.pressure, Some(1006.5));
        assert_eq!(m.humidity, 55.0);
        // x16 on every channel converts for 98 ms
        assert_eq!(clock.now_ms(), 98);
    }

    #[test]
    fn test_environment_drifts_over_time() {
        let (mut bme, clock) = driver();
        let first = bme.measure().unwrap();
        clock.advance_ns(30_000_000_000);
        let later = bme.measure().unwrap();
        assert!(later.temperature > first.temperature);
    }

    #[test]
    fn test_soft_reset_restores_sentinels() {
        let (mut bme, _) = driver();
        bme.measure().unwrap();
        bme.soft_reset().unwrap();
        let raw = bme.read_raw().unwrap();
        assert_eq!(raw.temperature, SKIPPED_20BIT);
        assert_eq!(raw.humidity, SKIPPED_16BIT);
    }
}
