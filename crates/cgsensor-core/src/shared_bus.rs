//! Blocking I2C bus sharing
//!
//! The drivers hold no internal lock: every register transaction is a complete
//! request/response round-trip, and callers are expected to provide mutual
//! exclusion when several drivers live on one bus. `SharedI2cDevice` is that
//! mutual exclusion: each driver gets its own handle and every transaction
//! runs inside a critical section on the shared bus.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal::i2c::{ErrorType, I2c, Operation};

/// A bus that can be handed out to several [`SharedI2cDevice`]s.
pub type SharedBus<T> = Mutex<CriticalSectionRawMutex, RefCell<T>>;

/// Wrap a bus so it can be shared.
pub const fn shared_bus<T>(bus: T) -> SharedBus<T> {
    Mutex::new(RefCell::new(bus))
}

/// I2C bus sharing device using Embassy's blocking `Mutex`.
///
/// The lock is held for exactly one I2C transaction, so poll loops in one
/// driver interleave with transactions of the others but never overlap them.
///
/// # Example
///
/// ```no_run
/// use cgsensor_core::shared_bus::{SharedI2cDevice, shared_bus};
/// # fn demo<B: embedded_hal::i2c::I2c>(i2c: B) {
/// let bus = shared_bus(i2c);
///
/// let bme280_i2c = SharedI2cDevice::new(&bus);
/// let scd41_i2c = SharedI2cDevice::new(&bus);
/// # }
/// ```
pub struct SharedI2cDevice<'a, T> {
    bus: &'a SharedBus<T>,
}

impl<'a, T> SharedI2cDevice<'a, T> {
    /// Create a new `SharedI2cDevice`.
    #[inline]
    pub const fn new(bus: &'a SharedBus<T>) -> Self {
        Self { bus }
    }
}

impl<T> ErrorType for SharedI2cDevice<'_, T>
where
    T: ErrorType,
{
    type Error = T::Error;
}

impl<T> I2c for SharedI2cDevice<'_, T>
where
    T: I2c,
{
    #[inline]
    fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        self.bus.lock(|bus| bus.borrow_mut().read(address, read))
    }

    #[inline]
    fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        self.bus.lock(|bus| bus.borrow_mut().write(address, write))
    }

    #[inline]
    fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.bus
            .lock(|bus| bus.borrow_mut().write_read(address, write, read))
    }

    #[inline]
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.bus
            .lock(|bus| bus.borrow_mut().transaction(address, operations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    #[test]
    fn test_handles_share_one_bus_in_order() {
        let expectations = [
            I2cTransaction::write(0x76, vec![0xF4, 0x01]),
            I2cTransaction::write_read(0x62, vec![0xE4, 0xB8], vec![0x80, 0x06, 0x67]),
            I2cTransaction::read(0x39, vec![0x34]),
        ];
        let mut mock = I2cMock::new(&expectations);
        let bus = shared_bus(mock.clone());

        let mut first = SharedI2cDevice::new(&bus);
        let mut second = SharedI2cDevice::new(&bus);

        first.write(0x76, &[0xF4, 0x01]).unwrap();
        let mut status = [0u8; 3];
        second.write_read(0x62, &[0xE4, 0xB8], &mut status).unwrap();
        assert_eq!(status, [0x80, 0x06, 0x67]);
        let mut id = [0u8; 1];
        first.read(0x39, &mut id).unwrap();
        assert_eq!(id, [0x34]);

        mock.done();
    }
}
