use crate::{Device, Driver, Error, IoWire};
use embedded_hal::delay::DelayNs;

pub trait Sensor: Device {
    /// Starts a measurement and returns the milliseconds it takes to finish
    fn start_measurement<W: IoWire>(
        &self,
        wire: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<u16, Error<W::Error>>;

    /// Returns the measured value
    fn read_measurement<W: IoWire>(
        &self,
        wire: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<f32, Error<W::Error>>;

    /// Returns the measured value as the device reports it
    fn read_measurement_raw<W: IoWire>(
        &self,
        wire: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<u16, Error<W::Error>>;
}
