//! Bosch fixed-point compensation formulas.
//!
//! All arithmetic is done on `i64`. Several intermediate products and the
//! `<< 35` / `<< 47` terms of the pressure formula do not fit in 32 bits.
//! Right shifts on `i64` are arithmetic, matching the two's-complement
//! behaviour the reference code relies on. Multiplications that only overflow
//! with nonsensical calibration data wrap instead of panicking.
//!
//! Sentinel ADC values (a skipped channel) compensate to zero. A skipped
//! temperature zeroes all three channels: pressure and humidity depend on
//! `t_fine`, and no stale `t_fine` from an earlier sample is carried over.

use serde::{Deserialize, Serialize};

use super::calibration::CalibrationSet;
use crate::sensors::div_round;

/// ADC value reported for a skipped pressure or temperature measurement.
pub const SKIPPED_PRESSURE_OR_TEMPERATURE: u32 = 0x80000;
/// ADC value reported for a skipped humidity measurement.
pub const SKIPPED_HUMIDITY: u32 = 0x8000;

/// Upper clamp of the humidity intermediate, 100 %RH in Q22.10 shifted by 12.
const HUMIDITY_MAX: i64 = 419_430_400;

/// Raw ADC values as read from `0xF7..=0xFE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    /// 20-bit pressure ADC value
    pub pressure: u32,
    /// 20-bit temperature ADC value
    pub temperature: u32,
    /// 16-bit humidity ADC value
    pub humidity: u32,
}

impl RawSample {
    pub fn from_bytes(data: &[u8; 8]) -> Self {
        let adc20 = |msb: u8, lsb: u8, xlsb: u8| {
            ((msb as u32) << 12) | ((lsb as u32) << 4) | ((xlsb as u32) >> 4)
        };
        Self {
            pressure: adc20(data[0], data[1], data[2]),
            temperature: adc20(data[3], data[4], data[5]),
            humidity: ((data[6] as u32) << 8) | data[7] as u32,
        }
    }
}

/// Fine temperature shared by the pressure and humidity formulas.
///
/// Only [`compensate_temperature`] creates one, so pressure and humidity
/// cannot be compensated before temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TFine(i64);

impl TFine {
    pub fn value(self) -> i64 {
        self.0
    }
}

/// Compensated values, each rounded to one decimal place.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Temperature in °C
    pub temperature: f32,
    /// Pressure in hPa, `None` when the compensation denominator was zero
    pub pressure: Option<f32>,
    /// Relative humidity in %RH
    pub humidity: f32,
}

/// Temperature in 0.01 °C and the fine temperature.
///
/// Returns `None` for a skipped measurement.
pub fn compensate_temperature(cal: &CalibrationSet, adc_t: u32) -> Option<(i64, TFine)> {
    if adc_t == SKIPPED_PRESSURE_OR_TEMPERATURE {
        return None;
    }

    let adc_t = adc_t as i64;
    let t1 = cal.dig_t1 as i64;
    let t2 = cal.dig_t2 as i64;
    let t3 = cal.dig_t3 as i64;

    let var1 = (((adc_t >> 3) - (t1 << 1)) * t2) >> 11;
    let var2 = (((((adc_t >> 4) - t1) * ((adc_t >> 4) - t1)) >> 12) * t3) >> 14;
    let t_fine = var1 + var2;

    Some(((t_fine * 5 + 128) >> 8, TFine(t_fine)))
}

/// Pressure in Pa as unsigned Q24.8.
///
/// A skipped measurement gives `Some(0)`. `None` means the denominator of the
/// formula was zero and no pressure can be reported.
pub fn compensate_pressure(cal: &CalibrationSet, adc_p: u32, t_fine: TFine) -> Option<i64> {
    if adc_p == SKIPPED_PRESSURE_OR_TEMPERATURE {
        return Some(0);
    }

    let p1 = cal.dig_p1 as i64;
    let p2 = cal.dig_p2 as i64;
    let p3 = cal.dig_p3 as i64;
    let p4 = cal.dig_p4 as i64;
    let p5 = cal.dig_p5 as i64;
    let p6 = cal.dig_p6 as i64;
    let p7 = cal.dig_p7 as i64;
    let p8 = cal.dig_p8 as i64;
    let p9 = cal.dig_p9 as i64;

    let mut var1 = t_fine.0 - 128_000;
    let mut var2 = var1.wrapping_mul(var1).wrapping_mul(p6);
    var2 = var2.wrapping_add(var1.wrapping_mul(p5) << 17);
    var2 = var2.wrapping_add(p4 << 35);
    var1 = (var1.wrapping_mul(var1).wrapping_mul(p3) >> 8)
        .wrapping_add(var1.wrapping_mul(p2) << 12);
    var1 = ((1i64 << 47).wrapping_add(var1)).wrapping_mul(p1) >> 33;
    if var1 == 0 {
        return None;
    }

    let mut p = 1_048_576 - adc_p as i64;
    p = floor_div(((p << 31).wrapping_sub(var2)).wrapping_mul(3125), var1);
    var1 = p9.wrapping_mul(p >> 13).wrapping_mul(p >> 13) >> 25;
    var2 = p8.wrapping_mul(p) >> 19;
    p = (p.wrapping_add(var1).wrapping_add(var2) >> 8) + (p7 << 4);

    Some(p)
}

/// Relative humidity in %RH as unsigned Q22.10.
///
/// A skipped measurement gives 0.
pub fn compensate_humidity(cal: &CalibrationSet, adc_h: u32, t_fine: TFine) -> i64 {
    if adc_h == SKIPPED_HUMIDITY {
        return 0;
    }

    let adc_h = adc_h as i64;
    let h1 = cal.dig_h1 as i64;
    let h2 = cal.dig_h2 as i64;
    let h3 = cal.dig_h3 as i64;
    let h4 = cal.dig_h4 as i64;
    let h5 = cal.dig_h5 as i64;
    let h6 = cal.dig_h6 as i64;

    let mut v = t_fine.0 - 76_800;
    let scaled = ((adc_h << 14) - (h4 << 20) - h5.wrapping_mul(v) + 16_384) >> 15;
    let sensitivity = ((((v.wrapping_mul(h6) >> 10)
        .wrapping_mul((v.wrapping_mul(h3) >> 11) + 32_768)
        >> 10)
        + 2_097_152)
        .wrapping_mul(h2)
        + 8_192)
        >> 14;
    v = scaled.wrapping_mul(sensitivity);
    v -= ((((v >> 15).wrapping_mul(v >> 15)) >> 7).wrapping_mul(h1)) >> 4;
    v = v.clamp(0, HUMIDITY_MAX);

    v >> 12
}

/// Run temperature, pressure and humidity compensation in that order.
///
/// A skipped temperature measurement leaves no fine temperature to compensate
/// the other channels with, so all three read zero.
pub fn compensate(cal: &CalibrationSet, raw: &RawSample) -> Measurement {
    let Some((centi_celsius, t_fine)) = compensate_temperature(cal, raw.temperature) else {
        return Measurement {
            temperature: 0.0,
            pressure: Some(0.0),
            humidity: 0.0,
        };
    };

    let pressure = compensate_pressure(cal, raw.pressure, t_fine)
        // Q24.8 Pa to tenths of hPa: / 256 / 100 * 10
        .map(|q24_8| tenths_to_f32(div_round(q24_8, 2560)));
    let humidity = compensate_humidity(cal, raw.humidity, t_fine);

    Measurement {
        temperature: tenths_to_f32(div_round(centi_celsius, 10)),
        pressure,
        humidity: tenths_to_f32(div_round(humidity * 10, 1024)),
    }
}

fn tenths_to_f32(tenths: i64) -> f32 {
    tenths as f32 / 10.0
}

/// Division rounding toward negative infinity.
fn floor_div(num: i64, den: i64) -> i64 {
    let q = num.wrapping_div(den);
    if num.wrapping_rem(den) != 0 && ((num < 0) != (den < 0)) {
        q - 1
    } else {
        q
    }
}
