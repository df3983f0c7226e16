use crate::{crc, DeviceSearch, Driver, Error, IoWire};
use core::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    ops::Deref,
    str::FromStr,
};
use embedded_hal::delay::DelayNs;

/// 64-bit ROM code: family code, 48-bit serial number and checksum
#[derive(Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Address {
    raw: [u8; Self::BYTES as usize],
}

impl From<[u8; Self::BYTES as usize]> for Address {
    fn from(raw: [u8; Self::BYTES as usize]) -> Self {
        Address { raw }
    }
}

impl From<Address> for [u8; Address::BYTES as usize] {
    fn from(addr: Address) -> [u8; Address::BYTES as usize] {
        addr.raw
    }
}

impl Deref for Address {
    type Target = [u8; Self::BYTES as usize];

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.raw
    }
}

impl Address {
    /// The length of device address in bytes
    pub const BYTES: u8 = 8;

    /// The length of device address in bits
    pub const BITS: u8 = Self::BYTES * 8;

    pub fn family_code(&self) -> u8 {
        self.raw[0]
    }

    pub fn serial(&self) -> &[u8] {
        &self.raw[1..7]
    }

    pub fn crc(&self) -> u8 {
        self.raw[7]
    }

    /// Does the last byte match the checksum over the first seven?
    pub fn is_crc_valid(&self) -> bool {
        crc::crc8(&self.raw[..7]) == self.crc()
    }

    pub fn ensure_valid_crc<E: Debug>(&self) -> Result<(), Error<E>> {
        let computed = crc::crc8(&self.raw[..7]);
        if computed != self.crc() {
            Err(Error::ChecksumMismatch(computed, self.crc()))
        } else {
            Ok(())
        }
    }

    /// Finds the first device of the given family using a fresh search cursor
    pub fn search_first<W: IoWire>(
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        family_code: u8,
    ) -> Result<Option<Self>, Error<W::Error>> {
        // a targeted pass lands on the requested family whenever one is present
        let mut search = DeviceSearch::new_for_family(family_code);
        Ok(driver
            .search_with(&mut search, delay)?
            .filter(|address| address.family_code() == family_code))
    }
}

/// Error returned when parsing an address from text
#[derive(Debug, PartialEq)]
pub enum ParseAddressError {
    /// Fewer than 16 hex digits
    TooShort,
    /// More than 16 hex digits
    TooLong,
    InvalidDigit(char),
}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut raw = [0u8; Self::BYTES as usize];
        let mut digits = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .map(|c| c.to_digit(16).map(|d| d as u8).ok_or(ParseAddressError::InvalidDigit(c)));

        for byte in raw.iter_mut() {
            match (digits.next(), digits.next()) {
                (Some(high), Some(low)) => *byte = (high? << 4) | low?,
                _ => return Err(ParseAddressError::TooShort),
            }
        }
        if digits.next().is_some() {
            return Err(ParseAddressError::TooLong);
        }

        Ok(Address { raw })
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        for (i, byte) in self.raw.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
