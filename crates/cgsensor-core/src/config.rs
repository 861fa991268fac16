//! Driver tuning: poll intervals, safety timeouts and default settings.

use serde::{Deserialize, Serialize};

use crate::sensors::bme280::{Bme280Address, Oversampling};

/// Interval and safety bound for a status-register poll loop.
///
/// The loop gives up after `timeout_ms / interval_ms` unsuccessful checks
/// (at least one check is always made).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval_ms: u32,
    pub timeout_ms: u32,
}

impl PollConfig {
    pub const fn new(interval_ms: u32, timeout_ms: u32) -> Self {
        Self {
            interval_ms,
            timeout_ms,
        }
    }

    /// Number of status checks allowed before the poll is considered timed out.
    pub const fn max_attempts(&self) -> u32 {
        if self.interval_ms == 0 {
            return 1;
        }
        let attempts = self.timeout_ms / self.interval_ms;
        if attempts == 0 { 1 } else { attempts }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bme280Config {
    pub address: Bme280Address,
    /// Oversampling applied to all three channels for forced measurements.
    pub oversampling: Oversampling,
    /// Poll of the status `measuring` bit. The longest conversion (×16 on all
    /// channels) takes about 113 ms.
    pub poll: PollConfig,
}

impl Default for Bme280Config {
    fn default() -> Self {
        Self {
            address: Bme280Address::Primary,
            oversampling: Oversampling::X16,
            poll: PollConfig::new(1, 1000),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scd41Config {
    /// Seconds `read_measurement` waits for the data-ready flag when called
    /// through the `Sensor` layer.
    pub read_timeout_s: u32,
}

impl Default for Scd41Config {
    fn default() -> Self {
        Self { read_timeout_s: 6 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tsl2572Config {
    /// Poll of the AVALID/AINT status bits. A full 256-cycle integration takes
    /// about 700 ms.
    pub poll: PollConfig,
}

impl Default for Tsl2572Config {
    fn default() -> Self {
        Self {
            poll: PollConfig::new(10, 2000),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriverConfig {
    pub bme280: Bme280Config,
    pub scd41: Scd41Config,
    pub tsl2572: Tsl2572Config,
}
