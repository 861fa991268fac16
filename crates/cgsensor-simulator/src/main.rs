//! Desktop simulator for the cgsensor drivers.
//!
//! Puts register-level models of the BME280, SCD41 and TSL2572 on one
//! simulated I2C bus, hands each driver its own shared-bus handle and runs a
//! number of sampling cycles on a virtual clock. Readings are logged.
//!
//! # Environment
//!
//! | Variable              | Meaning                               |
//! |-----------------------|---------------------------------------|
//! | `CGSENSOR_SIM_CYCLES` | Number of sampling cycles (default 3) |
//! | `RUST_LOG`            | Log filter, e.g. `info` or `debug`    |

mod devices;

use std::env;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{info, warn};

use cgsensor_core::{DriverConfig, Error};
use cgsensor_core::sensors::indices::{
    Bme280Indexed, CO2, CO2_SENSOR_HUMIDITY, CO2_SENSOR_TEMPERATURE, HUMIDITY, ILLUMINANCE,
    PRESSURE, Scd41Indexed, TEMPERATURE, Tsl2572Indexed,
};
use cgsensor_core::sensors::scd41::{Scd41, Scd41Sensor, SensorConfig};
use cgsensor_core::sensors::{MAX_VALUES, SensorError, bme280::Bme280Sensor, tsl2572::Tsl2572Sensor};
use cgsensor_core::shared_bus::{SharedI2cDevice, shared_bus};

use devices::{SimBus, SimClock};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const DEFAULT_CYCLES: u32 = 3;

/// Pause between sampling cycles, matching the SCD41's periodic interval.
const SAMPLE_INTERVAL_MS: u32 = 5_000;

/// Altitude written to the SCD41 at start-up.
const SITE_ALTITUDE_M: u16 = 40;

fn cycles_from_env() -> u32 {
    match env::var("CGSENSOR_SIM_CYCLES") {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            warn!(
                "CGSENSOR_SIM_CYCLES={:?} is not a number, using {}",
                value, DEFAULT_CYCLES
            );
            DEFAULT_CYCLES
        }),
        Err(_) => DEFAULT_CYCLES,
    }
}

/// Bring the SCD41 to idle, write and persist its settings, and return its
/// serial number.
fn configure_scd41<I: I2c, D: DelayNs>(
    scd41: &mut Scd41<I, D>,
    settings: &SensorConfig,
) -> Result<u64, Error<I::Error>> {
    scd41.stop()?;
    scd41.apply_settings(settings)?;
    scd41.persist_settings()?;
    scd41.serial_number()
}

fn log_failure(sensor: &str, error: SensorError) {
    warn!("{} skipped this cycle: {}", sensor, error);
}

fn main() {
    env_logger::init();

    let cycles = cycles_from_env();
    let config = DriverConfig::default();
    let clock = SimClock::default();
    let bus = shared_bus(SimBus::with_default_devices(clock.clone()));

    let mut bme280 = Bme280Indexed::new(Bme280Sensor::new(
        SharedI2cDevice::new(&bus),
        clock.delay(),
        config.bme280,
    ));
    let mut scd41 = Scd41Indexed::new(Scd41Sensor::new(
        SharedI2cDevice::new(&bus),
        clock.delay(),
        config.scd41,
    ));
    let mut tsl2572 = Tsl2572Indexed::new(Tsl2572Sensor::new(
        SharedI2cDevice::new(&bus),
        clock.delay(),
        config.tsl2572,
    ));

    // Configure the CO₂ sensor once and keep the settings across power cycles
    let scd41_settings = SensorConfig {
        altitude_m: SITE_ALTITUDE_M,
        ..SensorConfig::default()
    };
    match configure_scd41(scd41.inner_mut().driver_mut(), &scd41_settings) {
        Ok(serial) => info!("SCD41 {:012X} configured: {:?}", serial, scd41_settings),
        Err(e) => warn!("SCD41 configuration failed: {}", e),
    }

    let mut delay = clock.delay();
    for cycle in 1..=cycles {
        let mut values = [0i32; MAX_VALUES];

        if let Err(e) = bme280.read_into(&mut values) {
            log_failure("BME280", e);
        }
        if let Err(e) = scd41.read_into(&mut values) {
            log_failure("SCD41", e);
        }
        if let Err(e) = tsl2572.read_into(&mut values) {
            log_failure("TSL2572", e);
        }

        info!(
            "cycle {}/{} at {} ms: {:.1} °C, {:.1} %RH, {:.1} hPa | CO₂ {} ppm ({:.1} °C, {:.1} %RH) | {:.1} lux",
            cycle,
            cycles,
            clock.now_ms(),
            values[TEMPERATURE] as f32 / 1000.0,
            values[HUMIDITY] as f32 / 1000.0,
            values[PRESSURE] as f32 / 100.0,
            values[CO2],
            values[CO2_SENSOR_TEMPERATURE] as f32 / 1000.0,
            values[CO2_SENSOR_HUMIDITY] as f32 / 1000.0,
            values[ILLUMINANCE] as f32 / 1000.0,
        );

        if cycle < cycles {
            delay.delay_ms(SAMPLE_INTERVAL_MS);
        }
    }
}
