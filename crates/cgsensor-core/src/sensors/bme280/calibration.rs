//! Factory trimming parameters stored in the BME280's non-volatile memory.

/// Length of the first calibration block, `0x88..=0xA1`.
pub const CALIB_00_LEN: usize = 26;
/// Length of the second calibration block, `0xE1..=0xE7`.
pub const CALIB_26_LEN: usize = 7;

/// Compensation coefficients, named as in the Bosch datasheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationSet {
    pub dig_t1: u16,
    pub dig_t2: i16,
    pub dig_t3: i16,

    pub dig_p1: u16,
    pub dig_p2: i16,
    pub dig_p3: i16,
    pub dig_p4: i16,
    pub dig_p5: i16,
    pub dig_p6: i16,
    pub dig_p7: i16,
    pub dig_p8: i16,
    pub dig_p9: i16,

    pub dig_h1: u8,
    pub dig_h2: i16,
    pub dig_h3: u8,
    pub dig_h4: i16,
    pub dig_h5: i16,
    pub dig_h6: i8,
}

impl CalibrationSet {
    /// Decode both calibration blocks.
    ///
    /// `calib00` holds registers `0x88..=0xA1`, `calib26` holds `0xE1..=0xE7`.
    pub fn from_bytes(calib00: &[u8; CALIB_00_LEN], calib26: &[u8; CALIB_26_LEN]) -> Self {
        let u16_at = |i: usize| u16::from_le_bytes([calib00[i], calib00[i + 1]]);
        let i16_at = |i: usize| i16::from_le_bytes([calib00[i], calib00[i + 1]]);

        // dig_H4 and dig_H5 are 12-bit values sharing register 0xE5, with the
        // MSB registers sign-extended.
        let e4 = calib26[3] as i8 as i16;
        let e5 = calib26[4];
        let e6 = calib26[5] as i8 as i16;

        Self {
            dig_t1: u16_at(0),
            dig_t2: i16_at(2),
            dig_t3: i16_at(4),

            dig_p1: u16_at(6),
            dig_p2: i16_at(8),
            dig_p3: i16_at(10),
            dig_p4: i16_at(12),
            dig_p5: i16_at(14),
            dig_p6: i16_at(16),
            dig_p7: i16_at(18),
            dig_p8: i16_at(20),
            dig_p9: i16_at(22),

            // calib00[24] is register 0xA0, which is unused
            dig_h1: calib00[25],
            dig_h2: i16::from_le_bytes([calib26[0], calib26[1]]),
            dig_h3: calib26[2],
            dig_h4: (e4 << 4) | (e5 & 0x0F) as i16,
            dig_h5: (e6 << 4) | (e5 >> 4) as i16,
            dig_h6: calib26[6] as i8,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Calibration block from the Bosch datasheet worked example, with
    /// typical humidity coefficients.
    pub(crate) const DATASHEET_CALIB00: [u8; CALIB_00_LEN] = [
        0x70, 0x6B, 0x43, 0x67, 0x18, 0xFC, // T1..T3
        0x7D, 0x8E, 0x43, 0xD6, 0xD0, 0x0B, // P1..P3
        0x27, 0x0B, 0x8C, 0x00, 0xF9, 0xFF, // P4..P6
        0x8C, 0x3C, 0xF8, 0xC6, 0x70, 0x17, // P7..P9
        0x00, 0x4B, // reserved, H1
    ];
    pub(crate) const DATASHEET_CALIB26: [u8; CALIB_26_LEN] =
        [0x6A, 0x01, 0x00, 0x13, 0x29, 0x03, 0x1E];

    pub(crate) fn datasheet_calibration() -> CalibrationSet {
        CalibrationSet {
            dig_t1: 27504,
            dig_t2: 26435,
            dig_t3: -1000,
            dig_p1: 36477,
            dig_p2: -10685,
            dig_p3: 3024,
            dig_p4: 2855,
            dig_p5: 140,
            dig_p6: -7,
            dig_p7: 15500,
            dig_p8: -14600,
            dig_p9: 6000,
            dig_h1: 75,
            dig_h2: 362,
            dig_h3: 0,
            dig_h4: 313,
            dig_h5: 50,
            dig_h6: 30,
        }
    }

    #[test]
    fn test_decode_datasheet_block() {
        let cal = CalibrationSet::from_bytes(&DATASHEET_CALIB00, &DATASHEET_CALIB26);
        assert_eq!(cal, datasheet_calibration());
    }

    #[test]
    fn test_humidity_nibbles_are_sign_extended() {
        let mut calib26 = DATASHEET_CALIB26;
        calib26[3] = 0xFE; // E4
        calib26[4] = 0xA7; // E5: H5 low nibble 0xA, H4 low nibble 0x7
        calib26[5] = 0xFF; // E6
        let cal = CalibrationSet::from_bytes(&DATASHEET_CALIB00, &calib26);
        assert_eq!(cal.dig_h4, -32 + 7);
        assert_eq!(cal.dig_h5, -16 + 10);
    }

    #[test]
    fn test_negative_h6() {
        let mut calib26 = DATASHEET_CALIB26;
        calib26[6] = 0xF6;
        let cal = CalibrationSet::from_bytes(&DATASHEET_CALIB00, &calib26);
        assert_eq!(cal.dig_h6, -10);
    }
}
