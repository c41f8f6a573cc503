//! HD44780 LCD module.
//!
//! The HD44780 is the de-facto standard controller for small character LCDs
//! (16x2, 20x4 and friends). See the [driver] module for the command-level
//! interface and the I2C port expander transport.

pub mod driver;
