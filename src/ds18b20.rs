use byteorder::{ByteOrder, LittleEndian};
use embedded_hal::delay::DelayNs;
use log::warn;

use crate::{crc, Address, Device, Driver, Error, IoWire, OpCode, Sensor};
use core::fmt::Debug;

/// Family code of the DS18B20
pub const FAMILY_CODE: u8 = 0x28;

/// Lowest temperature the alarm registers accept
pub const ALARM_MIN: i8 = -55;
/// Highest temperature the alarm registers accept
pub const ALARM_MAX: i8 = 125;

#[derive(Clone, Copy, Debug)]
#[repr(u8)]
pub enum Command {
    Convert = 0x44,
    WriteScratchpad = 0x4E,
    ReadScratchpad = 0xBE,
    CopyScratchpad = 0x48,
    RecallE2 = 0xB8,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}

/// Number of significant bits of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Resolution {
    Bits9 = 9,
    Bits10 = 10,
    Bits11 = 11,
    Bits12 = 12,
}

impl Resolution {
    const CONFIG_MASK: u8 = 0b0110_0000;
    const CONFIG_SHIFT: u8 = 5;

    pub fn bits(&self) -> u8 {
        *self as u8
    }

    /// Worst case conversion time
    pub fn conversion_time_ms(&self) -> u16 {
        match self {
            Resolution::Bits9 => 94,
            Resolution::Bits10 => 188,
            Resolution::Bits11 => 375,
            Resolution::Bits12 => 750,
        }
    }

    /// Resolution encoded in bits 5 and 6 of the configuration register
    pub fn from_config(config: u8) -> Self {
        match (config & Self::CONFIG_MASK) >> Self::CONFIG_SHIFT {
            0 => Resolution::Bits9,
            1 => Resolution::Bits10,
            2 => Resolution::Bits11,
            _ => Resolution::Bits12,
        }
    }

    /// `config` with the resolution bits replaced, everything else untouched
    pub fn apply_to_config(&self, config: u8) -> u8 {
        (config & !Self::CONFIG_MASK) | ((self.bits() - 9) << Self::CONFIG_SHIFT)
    }

    /// (bits below the fraction field, value of one fraction step in 1/10000 °C)
    fn fraction_field(&self) -> (u8, i16) {
        match self {
            Resolution::Bits9 => (3, 5000),
            Resolution::Bits10 => (2, 2500),
            Resolution::Bits11 => (1, 1250),
            Resolution::Bits12 => (0, 625),
        }
    }
}

impl TryFrom<u8> for Resolution {
    /// The rejected number of bits
    type Error = u8;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            9 => Ok(Resolution::Bits9),
            10 => Ok(Resolution::Bits10),
            11 => Ok(Resolution::Bits11),
            12 => Ok(Resolution::Bits12),
            _ => Err(bits),
        }
    }
}

/// Contents of the 9 byte scratchpad
///
/// | byte | content |
/// |------|---------|
/// | 0, 1 | temperature, little endian |
/// | 2    | TH, high alarm |
/// | 3    | TL, low alarm |
/// | 4    | configuration |
/// | 5-7  | reserved |
/// | 8    | checksum over 0-7 |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scratchpad {
    raw: [u8; Self::BYTES],
}

impl From<[u8; Scratchpad::BYTES]> for Scratchpad {
    fn from(raw: [u8; Scratchpad::BYTES]) -> Self {
        Scratchpad { raw }
    }
}

impl Scratchpad {
    pub const BYTES: usize = 9;

    pub fn as_bytes(&self) -> &[u8; Self::BYTES] {
        &self.raw
    }

    pub fn ensure_valid_crc<E: Debug>(&self) -> Result<(), Error<E>> {
        let computed = crc::crc8(&self.raw[..8]);
        if computed != self.raw[8] {
            Err(Error::ChecksumMismatch(computed, self.raw[8]))
        } else {
            Ok(())
        }
    }

    pub fn raw_temperature(&self) -> u16 {
        LittleEndian::read_u16(&self.raw[0..2])
    }

    pub fn alarm_high(&self) -> i8 {
        self.raw[2] as i8
    }

    pub fn alarm_low(&self) -> i8 {
        self.raw[3] as i8
    }

    pub fn config(&self) -> u8 {
        self.raw[4]
    }

    /// Resolution the device actually converted with
    pub fn resolution(&self) -> Resolution {
        Resolution::from_config(self.config())
    }

    pub fn temperature(&self) -> f32 {
        decode_temperature(self.raw_temperature(), self.resolution())
    }
}

/// Split raw temperature register into integer and fraction parts, both
/// carrying the sign. Bits below the resolution are ignored.
/// Degrees Celsius are integer + fraction/10000
pub fn split_temp(temperature: u16, resolution: Resolution) -> (i16, i16) {
    let negative = temperature & 0x8000 != 0;
    let magnitude = if negative {
        (!temperature).wrapping_add(1)
    } else {
        temperature
    };
    let (shift, step) = resolution.fraction_field();
    let integer = (magnitude >> 4) as i16;
    let fraction = ((magnitude & 0x0F) >> shift) as i16 * step;
    if negative {
        (-integer, -fraction)
    } else {
        (integer, fraction)
    }
}

/// Degrees Celsius for a raw temperature register
pub fn decode_temperature(temperature: u16, resolution: Resolution) -> f32 {
    let (integer, fraction) = split_temp(temperature, resolution);
    integer as f32 + fraction as f32 / 10_000_f32
}

/// Limits alarm thresholds to what the device can measure, a bound of 0 picks
/// the extreme default
pub fn clamp_alarm_thresholds(low: i8, high: i8) -> (i8, i8) {
    let low = if low < ALARM_MIN || low == 0 {
        ALARM_MIN
    } else {
        low
    };
    let high = if high > ALARM_MAX || high == 0 {
        ALARM_MAX
    } else {
        high
    };
    (low, high)
}

#[derive(Debug, Clone, Copy)]
pub struct Ds18b20 {
    address: Address,
    resolution: Resolution,
}

impl From<Ds18b20> for Address {
    fn from(device: Ds18b20) -> Self {
        device.address
    }
}

impl Ds18b20 {
    /// Resolution assumed for conversion times, updated by
    /// [`Ds18b20::set_resolution`] and [`Ds18b20::read_resolution`]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn ensure_valid_address<E: Debug>(&self) -> Result<(), Error<E>> {
        if Self::is_valid_address(&self.address) {
            Ok(())
        } else {
            Err(Error::InvalidAddress(
                FAMILY_CODE,
                self.address.family_code(),
            ))
        }
    }

    /// Starts a conversion on this device
    pub fn start_conversion<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<Resolution, Error<W::Error>> {
        self.ensure_valid_address::<W::Error>()?;
        driver.reset_select_write_only(delay, &self.address, &[Command::Convert.op_code()])?;
        Ok(self.resolution)
    }

    /// Starts a conversion on every device on the bus at once
    pub fn start_conversion_all<W: IoWire>(
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<W::Error>> {
        driver.reset_skip_write_only(delay, &[Command::Convert.op_code()])
    }

    pub fn read_scratchpad<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<Scratchpad, Error<W::Error>> {
        self.ensure_valid_address::<W::Error>()?;
        let mut raw = [0u8; Scratchpad::BYTES];
        driver.reset_select_write_read(
            delay,
            &self.address,
            &[Command::ReadScratchpad.op_code()],
            &mut raw[..],
        )?;
        let scratchpad = Scratchpad::from(raw);
        if let Err(error) = scratchpad.ensure_valid_crc() {
            warn!("scratchpad of {} corrupted: {:?}", self.address, error);
            return Err(error);
        }
        Ok(scratchpad)
    }

    /// Writes TH, TL and configuration into the scratchpad. Nothing is
    /// persisted until [`Ds18b20::copy_scratchpad`].
    pub fn write_scratchpad<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        alarm_high: i8,
        alarm_low: i8,
        config: u8,
    ) -> Result<(), Error<W::Error>> {
        self.ensure_valid_address::<W::Error>()?;
        driver.reset_select_write_only(
            delay,
            &self.address,
            &[
                Command::WriteScratchpad.op_code(),
                alarm_high as u8,
                alarm_low as u8,
                config,
            ],
        )
    }

    /// Persists TH, TL and configuration to EEPROM and waits for the copy to
    /// finish
    pub fn copy_scratchpad<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<W::Error>> {
        self.ensure_valid_address::<W::Error>()?;
        driver.reset_select_write_only(delay, &self.address, &[Command::CopyScratchpad.op_code()])?;
        driver.wait_ready(delay)?;
        Ok(())
    }

    /// Reloads TH, TL and configuration from EEPROM into the scratchpad
    pub fn recall_eeprom<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<W::Error>> {
        self.ensure_valid_address::<W::Error>()?;
        driver.reset_select_write_only(delay, &self.address, &[Command::RecallE2.op_code()])?;
        driver.wait_ready(delay)?;
        Ok(())
    }

    pub fn read_resolution<W: IoWire>(
        &mut self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<Resolution, Error<W::Error>> {
        let resolution = self.read_scratchpad(driver, delay)?.resolution();
        self.resolution = resolution;
        Ok(resolution)
    }

    /// Changes the resolution, keeping the alarm thresholds, and persists it
    pub fn set_resolution<W: IoWire>(
        &mut self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        resolution: Resolution,
    ) -> Result<(), Error<W::Error>> {
        let scratchpad = self.read_scratchpad(driver, delay)?;
        self.write_scratchpad(
            driver,
            delay,
            scratchpad.alarm_high(),
            scratchpad.alarm_low(),
            resolution.apply_to_config(scratchpad.config()),
        )?;
        self.copy_scratchpad(driver, delay)?;
        self.resolution = resolution;
        Ok(())
    }

    /// [`Ds18b20::set_resolution`] from a number of bits, rejecting anything
    /// outside 9..=12 before touching the bus
    pub fn set_resolution_bits<W: IoWire>(
        &mut self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        bits: u8,
    ) -> Result<(), Error<W::Error>> {
        let resolution = Resolution::try_from(bits).map_err(Error::<W::Error>::UnsupportedResolution)?;
        self.set_resolution(driver, delay, resolution)
    }

    /// Current (low, high) alarm thresholds
    pub fn alarm_thresholds<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(i8, i8), Error<W::Error>> {
        let scratchpad = self.read_scratchpad(driver, delay)?;
        Ok((scratchpad.alarm_low(), scratchpad.alarm_high()))
    }

    /// Sets and persists the alarm thresholds, keeping the configuration.
    /// See [`clamp_alarm_thresholds`] for how the bounds are limited.
    pub fn set_alarm_thresholds<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        low: i8,
        high: i8,
    ) -> Result<(), Error<W::Error>> {
        self.ensure_valid_address::<W::Error>()?;
        let (low, high) = clamp_alarm_thresholds(low, high);
        let scratchpad = self.read_scratchpad(driver, delay)?;
        self.write_scratchpad(driver, delay, high, low, scratchpad.config())?;
        self.copy_scratchpad(driver, delay)
    }

    /// Waits for a running conversion to finish and reads the result
    ///
    /// The wait has no timeout, see [`Driver::wait_ready_within`] for a
    /// bounded one.
    pub fn read_temperature<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<f32, Error<W::Error>> {
        self.ensure_valid_address::<W::Error>()?;
        driver.wait_ready(delay)?;
        Ok(self.read_scratchpad(driver, delay)?.temperature())
    }

    pub fn read_raw_temperature<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<u16, Error<W::Error>> {
        Ok(self.read_scratchpad(driver, delay)?.raw_temperature())
    }
}

impl Device for Ds18b20 {
    const FAMILY_CODE: u8 = FAMILY_CODE;

    fn address(&self) -> &Address {
        &self.address
    }

    fn from_address_unchecked(address: Address) -> Self {
        Self {
            address,
            resolution: Resolution::Bits12,
        }
    }
}

impl Sensor for Ds18b20 {
    fn start_measurement<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<u16, Error<W::Error>> {
        Ok(self.start_conversion(driver, delay)?.conversion_time_ms())
    }

    fn read_measurement<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<f32, Error<W::Error>> {
        self.read_temperature(driver, delay)
    }

    fn read_measurement_raw<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<u16, Error<W::Error>> {
        self.read_raw_temperature(driver, delay)
    }
}
