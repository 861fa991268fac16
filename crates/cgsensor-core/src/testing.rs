//! Test doubles: a virtual clock and a bus wrapper that timestamps traffic.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorType, I2c, Operation};

/// Monotonic clock that only moves when a [`VirtualDelay`] sleeps.
#[derive(Clone, Default)]
pub struct VirtualClock(Rc<Cell<u64>>);

impl VirtualClock {
    pub fn now_ns(&self) -> u64 {
        self.0.get()
    }

    pub fn now_ms(&self) -> u64 {
        self.0.get() / 1_000_000
    }

    pub fn delay(&self) -> VirtualDelay {
        VirtualDelay {
            clock: self.clone(),
        }
    }
}

pub struct VirtualDelay {
    clock: VirtualClock,
}

impl DelayNs for VirtualDelay {
    fn delay_ns(&mut self, ns: u32) {
        let cell = &self.clock.0;
        cell.set(cell.get() + u64::from(ns));
    }
}

/// One write observed on the bus, stamped with the virtual time it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEvent {
    pub at_ns: u64,
    pub address: u8,
    pub bytes: Vec<u8>,
}

/// Forwards to an inner bus and records every outgoing write with a timestamp.
pub struct TimedBus<I> {
    inner: I,
    clock: VirtualClock,
    log: Rc<RefCell<Vec<BusEvent>>>,
}

impl<I> TimedBus<I> {
    pub fn new(inner: I, clock: VirtualClock) -> (Self, Rc<RefCell<Vec<BusEvent>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                inner,
                clock,
                log: log.clone(),
            },
            log,
        )
    }

    fn record(&self, address: u8, bytes: &[u8]) {
        self.log.borrow_mut().push(BusEvent {
            at_ns: self.clock.now_ns(),
            address,
            bytes: bytes.to_vec(),
        });
    }
}

impl<I: ErrorType> ErrorType for TimedBus<I> {
    type Error = I::Error;
}

impl<I: I2c> I2c for TimedBus<I> {
    fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        self.record(address, write);
        self.inner.write(address, write)
    }

    fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.record(address, write);
        self.inner.write_read(address, write, read)
    }

    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for op in operations.iter() {
            if let Operation::Write(bytes) = op {
                self.record(address, bytes);
            }
        }
        self.inner.transaction(address, operations)
    }
}
