pub mod dev;
pub mod lcd;

use std::fmt::Debug;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum I2cError {
    #[error("bus lock poisoned")]
    Poisoned,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
    #[error("error: {0}")]
    Other(String),
}

impl From<std::io::Error> for I2cError {
    fn from(err: std::io::Error) -> Self {
        I2cError::Io(err.kind())
    }
}

pub type I2cResult<T> = Result<T, I2cError>;

/// A master-mode I2C bus that can transmit bytes to a slave device.
///
/// Addresses are 7-bit, without the read/write bit. A returned `Ok(())` means
/// the device acknowledged the transfer.
pub trait I2cBus: Debug {
    /// Writes the given bytes to the device at the given address.
    fn write(&mut self, address: u8, bytes: &[u8]) -> I2cResult<()>;
}

/// A bus handle that can be shared between peripherals on the same wire.
///
/// Drivers borrow the mutex and hold the lock only for the duration of a
/// single transaction, so other peripherals can interleave their transfers
/// between the driver's own writes.
pub type SharedI2cBus<'a> = Mutex<dyn I2cBus + 'a>;
