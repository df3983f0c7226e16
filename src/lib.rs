#![no_std]
#![doc = include_str!("../README.md")]

#[cfg(test)]
extern crate std;

mod address;
mod command;
pub mod crc;
mod device;
mod driver;
#[cfg(feature = "ds18b20")]
pub mod ds18b20;
mod iowire;
mod result;
mod search;
mod sensor;
#[cfg(test)]
mod sim;
#[cfg(feature = "ds18b20")]
mod thermometers;
mod timebase;

pub use address::{Address, ParseAddressError};
pub use command::{Command, OpCode};
pub use device::Device;
pub use driver::Driver;
pub use iowire::{Direction, DirectionPin, IoWire, Switched};
pub use result::Error;
pub use search::{DeviceSearch, DeviceSearchIter};
pub use sensor::Sensor;
#[cfg(feature = "ds18b20")]
pub use thermometers::ThermometerSet;
pub use timebase::{CycleCounter, CycleTimebase, Timebase};
