use crate::{Address, Driver, Error, IoWire};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

/// Generic device interface
pub trait Device: Sized {
    /// Device family code
    const FAMILY_CODE: u8;

    /// Get device address
    fn address(&self) -> &Address;

    /// Instantiate device using address without checking the family code
    fn from_address_unchecked(address: Address) -> Self;

    /// Does the address belong to this kind of device?
    fn is_valid_address(address: &Address) -> bool {
        address.family_code() == Self::FAMILY_CODE
    }

    /// Instantiate device from address
    fn from_address<E: Sized + Debug>(address: Address) -> Result<Self, Error<E>> {
        if !Self::is_valid_address(&address) {
            Err(Error::InvalidAddress(
                Self::FAMILY_CODE,
                address.family_code(),
            ))
        } else {
            Ok(Self::from_address_unchecked(address))
        }
    }

    /// First device of this family on the bus
    fn search_first<W: IoWire>(
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<Option<Self>, Error<W::Error>> {
        Address::search_first(driver, delay, Self::FAMILY_CODE)
            .map(|res| res.map(Self::from_address_unchecked))
    }

    /// The only device on the bus, which has to be of this family
    fn get_single<W: IoWire>(
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<Self, Error<W::Error>> {
        let address = driver.read_rom(delay)?;
        Self::from_address(address)
    }
}
