//! Hardware-independent drivers for cgsensor-rs
//!
//! This crate contains the platform-agnostic protocol and compensation logic
//! for three environmental sensors sharing one I2C bus:
//!
//! - [`sensors::bme280`]: temperature, humidity and pressure (Bosch fixed-point
//!   compensation)
//! - [`sensors::scd41`]: CO₂ concentration (CRC-framed command protocol and
//!   periodic measurement state machine)
//! - [`sensors::tsl2572`]: illuminance (two-pass auto-ranging exposure)
//!
//! Every driver is generic over the `embedded-hal` 1.0 blocking [`I2c`] and
//! [`DelayNs`] traits, so it compiles on embedded targets and on desktop hosts
//! (for the simulator and tests). The crate is `#![no_std]`.
//!
//! [`I2c`]: embedded_hal::i2c::I2c
//! [`DelayNs`]: embedded_hal::delay::DelayNs

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod sensors;
pub mod shared_bus;

#[cfg(test)]
pub(crate) mod testing;

pub use config::DriverConfig;
pub use error::Error;
