//! I2C bus backend using the Linux `/dev/i2c-*` character devices.

use crate::{I2cBus, I2cError, I2cResult};
use i2cdev::core::{I2CMessage, I2CTransfer};
use i2cdev::linux::{LinuxI2CBus, LinuxI2CError, LinuxI2CMessage};
use log::trace;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};

/// An [I2cBus] backed by a Linux I2C adapter character device.
///
/// Requires the `i2c-dev` kernel module and read/write access to the device
/// node (usually the `i2c` group on Raspberry Pi OS).
pub struct DevI2cBus {
    path: PathBuf,
    bus: LinuxI2CBus,
}

impl DevI2cBus {
    /// Opens the adapter at the given device path, e.g. `/dev/i2c-1`.
    pub fn new(path: impl AsRef<Path>) -> I2cResult<Self> {
        let path = path.as_ref().to_path_buf();
        let bus = LinuxI2CBus::new(&path)?;
        Ok(DevI2cBus { path, bus })
    }

    /// Opens `/dev/i2c-<number>`.
    ///
    /// On Raspberry Pi boards the header pins are adapter 1.
    pub fn new_adapter(number: u8) -> I2cResult<Self> {
        Self::new(format!("/dev/i2c-{number}"))
    }
}

impl Debug for DevI2cBus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DevI2cBus({})", self.path.display())
    }
}

impl From<LinuxI2CError> for I2cError {
    fn from(err: LinuxI2CError) -> Self {
        I2cError::Io(std::io::Error::from(err).kind())
    }
}

impl I2cBus for DevI2cBus {
    fn write(&mut self, address: u8, bytes: &[u8]) -> I2cResult<()> {
        trace!("I2C write to {:#04x}: {:02x?}", address, bytes);
        let mut messages = [LinuxI2CMessage::write(bytes).with_address(address as u16)];
        self.bus.transfer(&mut messages)?;
        Ok(())
    }
}
