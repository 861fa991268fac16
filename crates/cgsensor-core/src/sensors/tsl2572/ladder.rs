//! Exposure settings and the auto-range ladder.

use serde::{Deserialize, Serialize};

use crate::sensors::round_tenths;

/// Duration of one ALS integration cycle, in ms
pub const CYCLE_MS: f32 = 2.73;

/// Analog gain of the ALS channels.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gain {
    X0_16,
    X1,
    X8,
    X16,
    X120,
}

impl Gain {
    pub const fn factor(self) -> f32 {
        match self {
            Self::X0_16 => 0.16,
            Self::X1 => 1.0,
            Self::X8 => 8.0,
            Self::X16 => 16.0,
            Self::X120 => 120.0,
        }
    }

    /// CONFIG register value. ×0.16 is ×1 with the AGL bit set.
    pub const fn config_bits(self) -> u8 {
        match self {
            Self::X0_16 => 0x04,
            _ => 0x00,
        }
    }

    /// AGAIN field of the CONTROL register.
    pub const fn control_bits(self) -> u8 {
        match self {
            Self::X0_16 | Self::X1 => 0,
            Self::X8 => 1,
            Self::X16 => 2,
            Self::X120 => 3,
        }
    }
}

/// Integration length and gain of one exposure.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExposureSetting {
    /// Number of 2.73 ms integration cycles, `1..=256`
    pub integ_cycles: u16,
    pub gain: Gain,
}

impl ExposureSetting {
    pub const fn new(integ_cycles: u16, gain: Gain) -> Self {
        Self { integ_cycles, gain }
    }

    /// Counts per lux
    pub fn counts_per_lux(&self) -> f32 {
        self.integ_cycles as f32 * CYCLE_MS * self.gain.factor() / 60.0
    }
}

/// Short, low-gain exposure used to probe the light level.
pub const PROBE: ExposureSetting = ExposureSetting::new(4, Gain::X1);

/// Headroom kept below each rung's saturation count.
const MARGIN: f32 = 0.8;

/// `(upper bound of probe counts, setting)`, from darkest to brightest.
/// Anything above the last bound uses [`BRIGHTEST`].
pub const LADDER: [(f32, ExposureSetting); 4] = [
    (8.53 * MARGIN, ExposureSetting::new(256, Gain::X120)),
    (128.0 * MARGIN, ExposureSetting::new(128, Gain::X16)),
    (512.0 * MARGIN, ExposureSetting::new(64, Gain::X8)),
    (4096.0 * MARGIN, ExposureSetting::new(64, Gain::X1)),
];
pub const BRIGHTEST: ExposureSetting = ExposureSetting::new(64, Gain::X0_16);

/// Pick the exposure for the measuring pass from the probe's larger channel.
pub fn select(probe_max: u16) -> ExposureSetting {
    LADDER
        .iter()
        .find(|(bound, _)| (probe_max as f32) < *bound)
        .map_or(BRIGHTEST, |(_, setting)| *setting)
}

/// Raw channel counts of one exposure.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exposure {
    /// Visible plus infrared
    pub ch0: u16,
    /// Infrared
    pub ch1: u16,
    pub setting: ExposureSetting,
}

impl Exposure {
    pub fn max_count(&self) -> u16 {
        self.ch0.max(self.ch1)
    }

    /// Illuminance in lux, one decimal place, never negative.
    pub fn lux(&self) -> f32 {
        let cpl = self.setting.counts_per_lux();
        let ch0 = self.ch0 as f32;
        let ch1 = self.ch1 as f32;
        let lux1 = (ch0 - 1.87 * ch1) / cpl;
        let lux2 = (0.63 * ch0 - ch1) / cpl;
        round_tenths(lux1.max(lux2).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exposure(integ_cycles: u16, gain: Gain, ch0: u16, ch1: u16) -> Exposure {
        Exposure {
            ch0,
            ch1,
            setting: ExposureSetting::new(integ_cycles, gain),
        }
    }

    #[test]
    fn test_ladder_boundaries() {
        assert_eq!(select(0), ExposureSetting::new(256, Gain::X120));
        assert_eq!(select(6), ExposureSetting::new(256, Gain::X120));
        assert_eq!(select(7), ExposureSetting::new(128, Gain::X16));
        assert_eq!(select(102), ExposureSetting::new(128, Gain::X16));
        assert_eq!(select(103), ExposureSetting::new(64, Gain::X8));
        assert_eq!(select(409), ExposureSetting::new(64, Gain::X8));
        assert_eq!(select(410), ExposureSetting::new(64, Gain::X1));
        assert_eq!(select(3276), ExposureSetting::new(64, Gain::X1));
        assert_eq!(select(3277), BRIGHTEST);
        assert_eq!(select(u16::MAX), BRIGHTEST);
    }

    #[test]
    fn test_ladder_is_ordered() {
        for pair in LADDER.windows(2) {
            assert!(pair[0].0 < pair[1].0);
        }
    }

    #[test]
    fn test_lux() {
        assert_eq!(exposure(128, Gain::X16, 30000, 5000).lux(), 221.6);
        assert_eq!(exposure(64, Gain::X1, 2000, 400).lux(), 429.9);
        assert_eq!(exposure(256, Gain::X120, 400, 100).lux(), 0.2);
        assert_eq!(exposure(64, Gain::X0_16, 20000, 12000).lux(), 1287.8);
        assert_eq!(exposure(64, Gain::X8, 3000, 1000).lux(), 48.5);
    }

    #[test]
    fn test_lux_never_negative() {
        // infrared dominated: both formulas go negative
        assert_eq!(exposure(64, Gain::X0_16, 1000, 900).lux(), 0.0);
        assert_eq!(exposure(1, Gain::X1, 0, u16::MAX).lux(), 0.0);
        for ch1 in (0..=u16::MAX).step_by(997) {
            assert!(exposure(64, Gain::X8, 500, ch1).lux() >= 0.0);
        }
    }

    #[test]
    fn test_gain_register_bits() {
        assert_eq!(Gain::X0_16.config_bits(), 0x04);
        assert_eq!(Gain::X0_16.control_bits(), 0);
        assert_eq!(Gain::X120.config_bits(), 0x00);
        assert_eq!(Gain::X120.control_bits(), 3);
    }
}
