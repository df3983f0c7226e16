use crate::{Address, Command, Driver, Error, IoWire};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use log::{debug, warn};

/// Search cursor
///
/// Bit positions are counted from 1 (least significant bit of the family code)
/// to 64, with 0 meaning "none". The cursor walks the binary tree of ROM codes
/// depth first, taking the 0 branch before the 1 branch at every discrepancy.
#[derive(Debug, Clone, Default)]
pub struct DeviceSearch {
    address: [u8; 8],
    last_discrepancy: u8,
    last_family_discrepancy: u8,
    last_device: bool,
}

impl DeviceSearch {
    pub fn new() -> DeviceSearch {
        DeviceSearch::default()
    }

    /// Cursor whose first pass starts at the given family code
    ///
    /// The first device found is the lowest one of that family or, if there is
    /// none, the next family present on the bus.
    pub fn new_for_family(family: u8) -> DeviceSearch {
        let mut search = DeviceSearch::new();
        search.address[0] = family;
        search.last_discrepancy = Address::BITS;
        search
    }

    /// Back to the state of a cursor that never searched
    pub fn reset(&mut self) {
        *self = DeviceSearch::default();
    }

    /// Makes the next pass continue after the family of the last found device
    pub fn skip_family(&mut self) {
        self.last_discrepancy = self.last_family_discrepancy;
        self.last_family_discrepancy = 0;
        if self.last_discrepancy == 0 {
            self.last_device = true;
        }
    }

    pub fn last_discrepancy(&self) -> u8 {
        self.last_discrepancy
    }

    pub fn last_family_discrepancy(&self) -> u8 {
        self.last_family_discrepancy
    }

    /// Every device has been returned, further passes report nothing
    pub fn is_exhausted(&self) -> bool {
        self.last_device
    }

    fn is_bit_set_in_address(&self, bit: u8) -> bool {
        let index = bit / 8;
        let offset = bit % 8;
        self.address[index as usize] & (0x01 << offset) != 0x00
    }

    fn write_bit_in_address(&mut self, bit: u8, value: bool) {
        let index = bit / 8;
        let offset = bit % 8;
        if value {
            self.address[index as usize] |= 0x01 << offset;
        } else {
            self.address[index as usize] &= !(0x01 << offset);
        }
    }

    /// Iterates over all devices not yet returned by this cursor
    pub fn devices<'a, W: IoWire, D: DelayNs>(
        self,
        wire: &'a mut Driver<W>,
        delay: &'a mut D,
    ) -> DeviceSearchIter<'a, W, D> {
        DeviceSearchIter {
            search: Some(self),
            command: Command::SearchRom,
            wire,
            delay,
        }
    }

    /// Iterates over the devices currently signalling an alarm
    pub fn alarmed_devices<'a, W: IoWire, D: DelayNs>(
        self,
        wire: &'a mut Driver<W>,
        delay: &'a mut D,
    ) -> DeviceSearchIter<'a, W, D> {
        DeviceSearchIter {
            search: Some(self),
            command: Command::AlarmSearch,
            wire,
            delay,
        }
    }
}

pub struct DeviceSearchIter<'a, W: IoWire, D: DelayNs> {
    search: Option<DeviceSearch>,
    command: Command,
    wire: &'a mut Driver<W>,
    delay: &'a mut D,
}

impl<W: IoWire, D: DelayNs> Iterator for DeviceSearchIter<'_, W, D> {
    type Item = Result<Address, Error<W::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut search = self.search.take()?;
        let result = self
            .wire
            .search(&mut search, &mut *self.delay, self.command)
            .transpose()?;
        self.search = Some(search);
        Some(result)
    }
}

impl<E: Debug, W: IoWire<Error = E>> Driver<W> {
    /// Continues the enumeration of all devices using a caller owned cursor
    pub fn search_with(
        &mut self,
        search: &mut DeviceSearch,
        delay: &mut impl DelayNs,
    ) -> Result<Option<Address>, Error<E>> {
        self.search(search, delay, Command::SearchRom)
    }

    /// One search step
    ///
    /// Returns the next device, or `None` once the cursor is exhausted. A pass
    /// without presence, a pass where no device answered and an all-zero
    /// family code rewind the cursor and report `None` as well.
    ///
    /// The ROM checksum of a found address is not enforced, a mismatch is only
    /// logged. Check [`Address::is_crc_valid`] before relying on the address.
    pub fn search(
        &mut self,
        search: &mut DeviceSearch,
        delay: &mut impl DelayNs,
        cmd: Command,
    ) -> Result<Option<Address>, Error<E>> {
        if search.last_device {
            return Ok(None);
        }

        match self.search_pass(search, delay, cmd) {
            Ok(address) if address.family_code() != 0 => {
                debug!("{:?} found {}", cmd, address);
                if !address.is_crc_valid() {
                    warn!("{} fails its ROM checksum", address);
                }
                if search.last_device {
                    debug!("{:?} exhausted", cmd);
                }
                Ok(Some(address))
            }
            Ok(_) | Err(Error::NoPresence) | Err(Error::CollisionAbort) => {
                search.reset();
                Ok(None)
            }
            Err(error) => {
                search.reset();
                Err(error)
            }
        }
    }

    /// Walks the 64 address bits once, following the cursor
    ///
    /// Fails with `NoPresence` if nothing answers the reset and with
    /// `CollisionAbort` if no device answers a bit. The discrepancy positions
    /// and the exhausted flag change only on success.
    pub fn search_pass(
        &mut self,
        search: &mut DeviceSearch,
        delay: &mut impl DelayNs,
        cmd: Command,
    ) -> Result<Address, Error<E>> {
        self.reset(delay)?;
        self.write_command(delay, cmd)?;

        let mut last_zero = 0;
        let mut family_discrepancy = 0;
        for position in 1..=Address::BITS {
            let bit = self.read_bit(delay)?; // normal bit
            let complement = self.read_bit(delay)?; // complementary bit

            let direction = match (bit, complement) {
                (true, true) => return Err(Error::CollisionAbort),
                (true, false) => true,
                (false, true) => false,
                (false, false) => {
                    // devices with 0 and with 1 at this position
                    let direction = if position < search.last_discrepancy {
                        search.is_bit_set_in_address(position - 1)
                    } else {
                        position == search.last_discrepancy
                    };
                    if !direction {
                        last_zero = position;
                        if position <= 8 {
                            family_discrepancy = position;
                        }
                    }
                    direction
                }
            };

            search.write_bit_in_address(position - 1, direction);
            self.write_bit(delay, direction)?;
        }

        search.last_discrepancy = last_zero;
        search.last_family_discrepancy = family_discrepancy;
        search.last_device = last_zero == 0;
        Ok(Address::from(search.address))
    }
}
