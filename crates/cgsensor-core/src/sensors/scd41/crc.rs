//! Sensirion CRC-8 over one 16-bit word.

pub const CRC8_POLYNOMIAL: u8 = 0x31;
pub const CRC8_INIT: u8 = 0xFF;

/// CRC-8 (poly `0x31`, init `0xFF`, MSB first, no final XOR).
pub const fn crc8(data: &[u8]) -> u8 {
    let mut crc = CRC8_INIT;
    let mut i = 0;
    while i < data.len() {
        crc ^= data[i];
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_POLYNOMIAL
            } else {
                crc << 1
            };
            bit += 1;
        }
        i += 1;
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datasheet_vector() {
        assert_eq!(crc8(&[0xBE, 0xEF]), 0x92);
    }

    #[test]
    fn test_known_words() {
        let cases: [([u8; 2], u8); 8] = [
            ([0x00, 0x00], 0x81),
            ([0x01, 0xF4], 0x33),
            ([0x66, 0x66], 0x93),
            ([0x80, 0x00], 0xA2),
            ([0xFF, 0xFF], 0xAC),
            ([0x05, 0xDA], 0x29),
            ([0xF8, 0x96], 0x31),
            ([0x3B, 0xBE], 0x89),
        ];
        for (word, expected) in cases {
            assert_eq!(crc8(&word), expected, "word {:02X?}", word);
        }
    }

    #[test]
    fn test_empty_input_is_init() {
        assert_eq!(crc8(&[]), CRC8_INIT);
    }
}
