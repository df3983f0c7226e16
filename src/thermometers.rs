use crate::{
    ds18b20::{Ds18b20, Resolution},
    Address, Device, Driver, Error, IoWire,
};
use embedded_hal::delay::DelayNs;
use heapless::Vec;
use log::{debug, warn};

/// The DS18B20s of one bus, up to `N` of them
///
/// Devices beyond the capacity are left out of the table. The last read
/// temperature of each device is kept next to it.
pub struct ThermometerSet<const N: usize> {
    devices: Vec<Ds18b20, N>,
    temperatures: [Option<f32>; N],
    alarmed: Vec<Address, N>,
    resolution: Resolution,
}

impl<const N: usize> ThermometerSet<N> {
    /// `resolution` is applied to every device found by
    /// [`ThermometerSet::initialize`]
    pub fn new(resolution: Resolution) -> Self {
        ThermometerSet {
            devices: Vec::new(),
            temperatures: [None; N],
            alarmed: Vec::new(),
            resolution,
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn devices(&self) -> &[Ds18b20] {
        &self.devices
    }

    /// Devices that reported an alarm in the last [`ThermometerSet::alarm_search`]
    pub fn alarmed(&self) -> &[Address] {
        &self.alarmed
    }

    /// Last temperature read from the device at `index`
    pub fn temperature(&self, index: usize) -> Option<f32> {
        self.temperatures.get(index).copied().flatten()
    }

    /// Resets the bus, enumerates it and gives every thermometer found the
    /// configured resolution and the widest alarm range. Returns whether any
    /// thermometer was found.
    ///
    /// A device that cannot be configured is still recorded and the
    /// enumeration goes on. Only a failing pin or a shorted line aborts.
    pub fn initialize<W: IoWire>(
        &mut self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<bool, Error<W::Error>> {
        driver.init(delay)?;
        self.devices.clear();
        self.temperatures = [None; N];
        self.alarmed.clear();

        while let Some(address) = driver.search_next(delay)? {
            if !Ds18b20::is_valid_address(&address) {
                debug!("ignoring {}, not a thermometer", address);
                continue;
            }
            let device = Ds18b20::from_address_unchecked(address);
            if self.devices.push(device).is_err() {
                warn!("thermometer table full, ignoring {} and the rest", address);
                break;
            }

            let resolution = self.resolution;
            let index = self.devices.len() - 1;
            match Self::configure(&mut self.devices[index], driver, delay, resolution) {
                Ok(()) => {}
                Err(error @ (Error::PortError(_) | Error::WireFault)) => return Err(error),
                Err(error) => warn!("could not configure {}: {:?}", address, error),
            }
        }

        Ok(!self.devices.is_empty())
    }

    fn configure<W: IoWire>(
        device: &mut Ds18b20,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        resolution: Resolution,
    ) -> Result<(), Error<W::Error>> {
        device.set_resolution(driver, delay, resolution)?;
        device.set_alarm_thresholds(driver, delay, 0, 0)
    }

    /// Collects the devices currently signalling an alarm. Returns whether
    /// there are any. The driver's device count is left alone.
    pub fn alarm_search<W: IoWire>(
        &mut self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<bool, Error<W::Error>> {
        self.alarmed.clear();
        driver.rewind_cursor();

        while let Some(address) = driver.search_next_alarmed(delay)? {
            if self.alarmed.push(address).is_err() {
                warn!("alarm table full, ignoring {} and the rest", address);
                break;
            }
        }

        Ok(!self.alarmed.is_empty())
    }

    /// Starts a conversion on every device of the bus
    pub fn start_conversion_all<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<W::Error>> {
        Ds18b20::start_conversion_all(driver, delay)
    }

    /// Waits for the device at `index` to finish converting and stores its
    /// temperature. `None` if there is no such device.
    pub fn read_temperature<W: IoWire>(
        &mut self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        index: usize,
    ) -> Result<Option<f32>, Error<W::Error>> {
        let Some(device) = self.devices.get(index) else {
            return Ok(None);
        };
        let temperature = device.read_temperature(driver, delay)?;
        self.temperatures[index] = Some(temperature);
        Ok(Some(temperature))
    }
}
