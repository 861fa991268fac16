//! Register-level models of the three sensors on a simulated I2C bus.
//!
//! All models read one shared [`SimClock`]. Time only moves when a driver
//! sleeps through a [`SimDelay`], so a full measurement cycle that would take
//! seconds on hardware runs instantly and deterministically.

pub mod bme280;
pub mod scd41;
pub mod tsl2572;

use std::cell::Cell;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use log::trace;

pub use bme280::Bme280Model;
pub use scd41::Scd41Model;
pub use tsl2572::Tsl2572Model;

// ----------------------------------------------------------------------------
// Virtual time
// ----------------------------------------------------------------------------

/// Virtual monotonic clock in nanoseconds.
#[derive(Clone, Default)]
pub struct SimClock(Rc<Cell<u64>>);

impl SimClock {
    pub fn now_ms(&self) -> u64 {
        self.0.get() / 1_000_000
    }

    pub fn advance_ns(&self, ns: u64) {
        self.0.set(self.0.get() + ns);
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay {
            clock: self.clone(),
        }
    }
}

/// `DelayNs` that advances the virtual clock instead of sleeping.
pub struct SimDelay {
    clock: SimClock,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.clock.advance_ns(u64::from(ns));
    }
}

// ----------------------------------------------------------------------------
// Bus
// ----------------------------------------------------------------------------

/// NACK after the address byte: nothing answered.
pub const NACK_ADDRESS: ErrorKind = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address);
/// NACK on a data byte: the device refused the command or payload.
pub const NACK_DATA: ErrorKind = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data);

/// A device that can sit on the [`SimBus`].
pub trait SimDevice {
    /// 7-bit I2C address
    fn address(&self) -> u8;

    /// Bytes written by the controller in one write operation.
    fn write(&mut self, now_ms: u64, bytes: &[u8]) -> Result<(), ErrorKind>;

    /// Fill `buf` for one read operation.
    fn read(&mut self, now_ms: u64, buf: &mut [u8]) -> Result<(), ErrorKind>;
}

/// Simulated I2C bus dispatching transactions by address.
pub struct SimBus {
    clock: SimClock,
    devices: Vec<Box<dyn SimDevice>>,
}

impl SimBus {
    pub fn new(clock: SimClock) -> Self {
        Self {
            clock,
            devices: Vec::new(),
        }
    }

    /// Bus with one of each sensor at its default address.
    pub fn with_default_devices(clock: SimClock) -> Self {
        let mut bus = Self::new(clock);
        bus.attach(Bme280Model::new(0x76));
        bus.attach(Scd41Model::new());
        bus.attach(Tsl2572Model::new());
        bus
    }

    pub fn attach(&mut self, device: impl SimDevice + 'static) {
        self.devices.push(Box::new(device));
    }

    fn device(&mut self, address: u8) -> Result<&mut Box<dyn SimDevice>, ErrorKind> {
        self.devices
            .iter_mut()
            .find(|d| d.address() == address)
            .ok_or(NACK_ADDRESS)
    }
}

impl ErrorType for SimBus {
    type Error = ErrorKind;
}

impl I2c for SimBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let now_ms = self.clock.now_ms();
        let device = self.device(address)?;
        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    trace!("sim bus: {:#04x} <- {:02X?}", address, bytes);
                    device.write(now_ms, bytes)?;
                }
                Operation::Read(buf) => {
                    device.read(now_ms, buf)?;
                    trace!("sim bus: {:#04x} -> {:02X?}", address, buf);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_advances_clock() {
        let clock = SimClock::default();
        let mut delay = clock.delay();
        delay.delay_ms(1500);
        delay.delay_us(500);
        assert_eq!(clock.now_ms(), 1500);
        delay.delay_us(500);
        assert_eq!(clock.now_ms(), 1501);
    }

    #[test]
    fn test_unknown_address_is_nacked() {
        let mut bus = SimBus::with_default_devices(SimClock::default());
        assert_eq!(bus.write(0x10, &[0x00]), Err(NACK_ADDRESS));
        let mut id = [0u8; 1];
        assert_eq!(bus.write_read(0x76, &[0xD0], &mut id), Ok(()));
        assert_eq!(id[0], 0x60);
    }
}
