//! TSL2572 register model with a scripted light level.

use embedded_hal::i2c::ErrorKind;
use log::{debug, warn};

use super::{NACK_DATA, SimDevice};

const ADDR: u8 = 0x39;
const CHIP_ID: u8 = 0x34;

const COMMAND_BIT: u8 = 0x80;
const REG_ENABLE: u8 = 0x00;
const REG_ATIME: u8 = 0x01;
const REG_CONFIG: u8 = 0x0D;
const REG_CONTROL: u8 = 0x0F;
const REG_ID: u8 = 0x12;
const REG_STATUS: u8 = 0x13;
const REG_C0DATA: u8 = 0x14;

const ENABLE_PON: u8 = 0x01;
const ENABLE_AEN: u8 = 0x02;
const CYCLE_MS: f32 = 2.73;
/// Infrared share of channel 0 for the simulated light source
const IR_RATIO: f32 = 0.2;

pub struct Tsl2572Model {
    regs: [u8; 32],
    pointer: u8,
    integration_started_ms: Option<u64>,
    /// Light level as a function of time in ms
    scene: fn(u64) -> f32,
}

impl Default for Tsl2572Model {
    fn default() -> Self {
        Self::new()
    }
}

/// Office lighting that dims and brightens over a minute.
fn office(now_ms: u64) -> f32 {
    let phase = (now_ms / 1000 % 60) as f32;
    300.0 + 10.0 * phase
}

impl Tsl2572Model {
    pub fn new() -> Self {
        Self::with_scene(office)
    }

    pub fn with_scene(scene: fn(u64) -> f32) -> Self {
        let mut regs = [0u8; 32];
        regs[REG_ATIME as usize] = 0xFF;
        regs[REG_ID as usize] = CHIP_ID;
        Self {
            regs,
            pointer: 0,
            integration_started_ms: None,
            scene,
        }
    }

    fn integ_cycles(&self) -> u32 {
        256 - u32::from(self.regs[REG_ATIME as usize])
    }

    fn gain(&self) -> f32 {
        let base = match self.regs[REG_CONTROL as usize] & 0x03 {
            0 => 1.0,
            1 => 8.0,
            2 => 16.0,
            _ => 120.0,
        };
        if self.regs[REG_CONFIG as usize] & 0x04 != 0 {
            base * 0.16
        } else {
            base
        }
    }

    fn integration_ms(&self) -> u64 {
        (self.integ_cycles() as f32 * CYCLE_MS).ceil() as u64
    }

    /// Latch channel counts for the configured exposure.
    fn latch(&mut self, now_ms: u64) {
        let lux = (self.scene)(now_ms);
        let cpl = self.integ_cycles() as f32 * CYCLE_MS * self.gain() / 60.0;
        // Inverse of lux = (ch0 - 1.87 ch1) / cpl with ch1 = IR_RATIO * ch0
        let ch0 = lux * cpl / (1.0 - 1.87 * IR_RATIO);
        let full_scale = (1024 * self.integ_cycles() - 1).min(u32::from(u16::MAX)) as f32;
        let ch0 = ch0.min(full_scale) as u16;
        let ch1 = (ch0 as f32 * IR_RATIO) as u16;

        let data = REG_C0DATA as usize;
        self.regs[data..data + 2].copy_from_slice(&ch0.to_le_bytes());
        self.regs[data + 2..data + 4].copy_from_slice(&ch1.to_le_bytes());
        // AVALID and AINT
        self.regs[REG_STATUS as usize] = 0x11;
        debug!("sim TSL2572: {} lux -> ch0={} ch1={}", lux, ch0, ch1);
    }

    /// Complete a running integration whose time has elapsed.
    fn update(&mut self, now_ms: u64) {
        if let Some(started) = self.integration_started_ms
            && now_ms >= started + self.integration_ms()
        {
            self.integration_started_ms = None;
            self.latch(now_ms);
        }
    }

    fn write_register(&mut self, now_ms: u64, reg: u8, val: u8) {
        if reg == REG_ENABLE {
            let running = val & (ENABLE_PON | ENABLE_AEN) == ENABLE_PON | ENABLE_AEN;
            if running && self.integration_started_ms.is_none() {
                self.regs[REG_STATUS as usize] = 0;
                self.integration_started_ms = Some(now_ms);
            } else if !running {
                self.integration_started_ms = None;
            }
        }
        if let Some(slot) = self.regs.get_mut(reg as usize) {
            *slot = val;
        }
    }
}

impl SimDevice for Tsl2572Model {
    fn address(&self) -> u8 {
        ADDR
    }

    fn write(&mut self, now_ms: u64, bytes: &[u8]) -> Result<(), ErrorKind> {
        let Some((&command, data)) = bytes.split_first() else {
            return Err(NACK_DATA);
        };
        if command & COMMAND_BIT == 0 {
            warn!("sim TSL2572: command bit missing in {:#04x}", command);
            return Err(NACK_DATA);
        }
        self.update(now_ms);
        // Auto-increment protocol: type bits 0b01
        self.pointer = command & 0x1F;
        for (i, &val) in data.iter().enumerate() {
            self.write_register(now_ms, self.pointer + i as u8, val);
        }
        Ok(())
    }

    fn read(&mut self, now_ms: u64, buf: &mut [u8]) -> Result<(), ErrorKind> {
        self.update(now_ms);
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self
                .regs
                .get(self.pointer as usize + i)
                .copied()
                .unwrap_or(0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{SimBus, SimClock, SimDelay};
    use cgsensor_core::sensors::tsl2572::{ExposureSetting, Gain, Tsl2572};

    fn driver(scene: fn(u64) -> f32) -> (Tsl2572<SimBus, SimDelay>, SimClock) {
        let clock = SimClock::default();
        let mut bus = SimBus::new(clock.clone());
        bus.attach(Tsl2572Model::with_scene(scene));
        (Tsl2572::new(bus, clock.delay()), clock)
    }

    #[test]
    fn test_office_light() {
        let (mut tsl, clock) = driver(|_| 300.0);
        let result = tsl.auto_measure().unwrap();
        assert_eq!(result.exposure.setting, ExposureSetting::new(128, Gain::X16));
        assert!((result.lux - 300.0).abs() < 1.0, "lux {}", result.lux);
        // 11 ms probe and 350 ms exposure, each rounded up to the 10 ms poll
        assert_eq!(clock.now_ms(), 20 + 350);
    }

    #[test]
    fn test_darkness_selects_highest_gain() {
        let (mut tsl, _) = driver(|_| 0.5);
        let result = tsl.auto_measure().unwrap();
        assert_eq!(result.exposure.setting, ExposureSetting::new(256, Gain::X120));
        assert!((result.lux - 0.5).abs() < 0.15, "lux {}", result.lux);
    }

    #[test]
    fn test_sunlight_selects_lowest_gain() {
        let (mut tsl, _) = driver(|_| 20_000.0);
        let result = tsl.auto_measure().unwrap();
        assert_eq!(result.exposure.setting, ExposureSetting::new(64, Gain::X0_16));
        assert!((result.lux - 20_000.0).abs() < 20.0, "lux {}", result.lux);
    }

    #[test]
    fn test_missing_command_bit_is_nacked() {
        let mut model = Tsl2572Model::new();
        assert_eq!(model.write(0, &[REG_ID]), Err(NACK_DATA));
        assert_eq!(model.write(0, &[0xA0 | REG_ID]), Ok(()));
        let mut id = [0u8; 1];
        model.read(0, &mut id).unwrap();
        assert_eq!(id[0], CHIP_ID);
    }
}
