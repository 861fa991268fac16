//! Error taxonomy shared by every driver in this crate

use core::fmt::Debug;

use thiserror_no_std::Error;

use crate::sensors::SensorError;
use crate::sensors::scd41::MeasurementMode;

/// Errors that can occur while talking to one of the sensors.
///
/// `E` is the error type of the underlying I2C bus. "Data not ready yet" is
/// never an error: operations that may legitimately find no new data return
/// `Ok(None)` instead.
#[derive(Error, Debug)]
pub enum Error<E: Debug> {
    /// The ID register did not contain a known chip ID.
    ///
    /// The device at this address is the wrong part or absent; callers should
    /// skip it rather than treat it as a bus failure.
    #[error("unexpected chip id {found:#04x}")]
    DeviceNotFound { found: u8 },

    /// I2C communication error
    #[error("I2C transport error: {0:?}")]
    Transport(E),

    /// A CRC byte did not match the word it follows.
    #[error("CRC mismatch in word {word} of response to command {command:#06x}")]
    FrameCorruption { command: u16, word: usize },

    /// A status poll exhausted its safety bound.
    #[error("timed out waiting for {operation}")]
    Timeout { operation: &'static str },

    /// An argument was out of range. Nothing was sent on the bus.
    #[error("invalid argument: {argument}")]
    InvalidArgument { argument: &'static str },

    /// The SCD41 does not accept this command in its current measurement mode.
    #[error("command {command:#06x} not allowed while {mode:?}")]
    CommandNotAllowed { command: u16, mode: MeasurementMode },
}

impl<E: Debug> Error<E> {
    /// True when the error means "no such device here" rather than a failure
    /// of a device that is present.
    pub fn is_device_absent(&self) -> bool {
        matches!(self, Self::DeviceNotFound { .. })
    }

    /// Collapse a driver error into the bus-independent [`SensorError`] used
    /// by the `Sensor` layer.
    pub fn to_sensor_error(&self, sensor: &'static str, operation: &'static str) -> SensorError {
        let details = match self {
            Self::DeviceNotFound { .. } => return SensorError::NotFound { sensor },
            Self::Timeout { .. } => return SensorError::Timeout { sensor, operation },
            Self::Transport(_) => "I2C communication error or sensor not responding",
            Self::FrameCorruption { .. } => "CRC mismatch in response",
            Self::InvalidArgument { .. } => "argument out of range",
            Self::CommandNotAllowed { .. } => "command not allowed in current mode",
        };
        SensorError::ReadFailed {
            sensor,
            operation,
            details,
        }
    }
}

impl<E: Debug> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Self::Transport(e)
    }
}
