//! Command set and wire framing.
//!
//! Writes are a big-endian 16-bit command, optionally followed by one data
//! word and its CRC. Reads return words of two data bytes plus one CRC byte.

use super::crc::crc8;

/// Bytes per word on the wire, including the CRC.
pub const WORD_LEN: usize = 3;
/// Longest write: command plus one word.
pub const MAX_WRITE_LEN: usize = 2 + WORD_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Command {
    StartPeriodicMeasurement = 0x21B1,
    StartLowPowerPeriodicMeasurement = 0x21AC,
    MeasureSingleShot = 0x219D,
    StopPeriodicMeasurement = 0x3F86,
    GetDataReadyStatus = 0xE4B8,
    ReadMeasurement = 0xEC05,
    SetTemperatureOffset = 0x241D,
    GetTemperatureOffset = 0x2318,
    SetSensorAltitude = 0x2427,
    GetSensorAltitude = 0x2322,
    SetAmbientPressure = 0xE000,
    PerformForcedRecalibration = 0x362F,
    SetAutomaticSelfCalibrationEnabled = 0x2416,
    GetAutomaticSelfCalibrationEnabled = 0x2313,
    PersistSettings = 0x3615,
    PerformFactoryReset = 0x3632,
    Reinit = 0x3646,
    GetSerialNumber = 0x3682,
}

impl Command {
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Look up a command by its wire code.
    pub fn from_code(code: u16) -> Option<Self> {
        ALL_COMMANDS.iter().copied().find(|c| c.code() == code)
    }

    /// Whether the sensor accepts this command while a periodic measurement
    /// is running.
    pub const fn allowed_in_periodic(self) -> bool {
        matches!(
            self,
            Self::ReadMeasurement
                | Self::StopPeriodicMeasurement
                | Self::SetAmbientPressure
                | Self::GetDataReadyStatus
        )
    }
}

pub const ALL_COMMANDS: [Command; 18] = [
    Command::StartPeriodicMeasurement,
    Command::StartLowPowerPeriodicMeasurement,
    Command::MeasureSingleShot,
    Command::StopPeriodicMeasurement,
    Command::GetDataReadyStatus,
    Command::ReadMeasurement,
    Command::SetTemperatureOffset,
    Command::GetTemperatureOffset,
    Command::SetSensorAltitude,
    Command::GetSensorAltitude,
    Command::SetAmbientPressure,
    Command::PerformForcedRecalibration,
    Command::SetAutomaticSelfCalibrationEnabled,
    Command::GetAutomaticSelfCalibrationEnabled,
    Command::PersistSettings,
    Command::PerformFactoryReset,
    Command::Reinit,
    Command::GetSerialNumber,
];

/// An encoded write, at most [`MAX_WRITE_LEN`] bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteFrame {
    bytes: [u8; MAX_WRITE_LEN],
    len: usize,
}

impl WriteFrame {
    /// Bare command with no payload.
    pub const fn command(command: Command) -> Self {
        let [hi, lo] = command.code().to_be_bytes();
        Self {
            bytes: [hi, lo, 0, 0, 0],
            len: 2,
        }
    }

    /// Command followed by one data word and its CRC.
    pub const fn with_word(command: Command, word: u16) -> Self {
        let [hi, lo] = command.code().to_be_bytes();
        let [b0, b1] = word.to_be_bytes();
        Self {
            bytes: [hi, lo, b0, b1, crc8(&[b0, b1])],
            len: MAX_WRITE_LEN,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// A word whose CRC byte did not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcMismatch {
    pub word: usize,
}

/// Encode one data word followed by its CRC.
pub const fn encode_word(word: u16) -> [u8; WORD_LEN] {
    let [b0, b1] = word.to_be_bytes();
    [b0, b1, crc8(&[b0, b1])]
}

/// Split a response into `N` words, checking every CRC.
///
/// `buf` must hold at least `N * WORD_LEN` bytes.
pub fn decode_words<const N: usize>(buf: &[u8]) -> Result<[u16; N], CrcMismatch> {
    let mut words = [0u16; N];
    for (word, (out, chunk)) in words.iter_mut().zip(buf.chunks_exact(WORD_LEN)).enumerate() {
        if crc8(&chunk[..2]) != chunk[2] {
            return Err(CrcMismatch { word });
        }
        *out = u16::from_be_bytes([chunk[0], chunk[1]]);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_command_frame() {
        let frame = WriteFrame::command(Command::StartPeriodicMeasurement);
        assert_eq!(frame.as_bytes(), &[0x21, 0xB1]);
    }

    #[test]
    fn test_command_with_word_frame() {
        let frame = WriteFrame::with_word(Command::SetAmbientPressure, 1013);
        assert_eq!(frame.as_bytes(), &[0xE0, 0x00, 0x03, 0xF5, 0xDB]);
    }

    #[test]
    fn test_decode_measurement_response() {
        let buf = [0x01, 0xF4, 0x33, 0x66, 0x66, 0x93, 0x5E, 0xB9, 0x3C];
        assert_eq!(decode_words::<3>(&buf), Ok([500, 0x6666, 0x5EB9]));
    }

    #[test]
    fn test_decode_reports_corrupt_word() {
        let mut buf = [0x01, 0xF4, 0x33, 0x66, 0x66, 0x93, 0x5E, 0xB9, 0x3C];
        buf[5] ^= 0x01;
        assert_eq!(decode_words::<3>(&buf), Err(CrcMismatch { word: 1 }));
    }

    #[test]
    fn test_periodic_whitelist() {
        let allowed: usize = ALL_COMMANDS
            .iter()
            .filter(|c| c.allowed_in_periodic())
            .count();
        assert_eq!(allowed, 4);
        assert!(Command::SetAmbientPressure.allowed_in_periodic());
        assert!(!Command::SetSensorAltitude.allowed_in_periodic());
        assert!(!Command::StartPeriodicMeasurement.allowed_in_periodic());
    }

    #[test]
    fn test_from_code() {
        assert_eq!(Command::from_code(0xEC05), Some(Command::ReadMeasurement));
        assert_eq!(Command::from_code(0x1234), None);
        for command in ALL_COMMANDS {
            assert_eq!(Command::from_code(command.code()), Some(command));
        }
    }

    #[test]
    fn test_encode_word() {
        assert_eq!(encode_word(0x7FCE), [0x7F, 0xCE, 0x7B]);
    }
}
