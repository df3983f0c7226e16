use crate::{Address, Command, DeviceSearch, Error, IoWire, OpCode, Timebase};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

// Slot timings in microseconds. These are what the devices expect; they are
// not meant to be tuned.
const RESET_LOW_US: u32 = 480;
const PRESENCE_SAMPLE_US: u32 = 70;
const RESET_RECOVERY_US: u32 = 410;
const WRITE_0_LOW_US: u32 = 65;
const WRITE_0_RECOVERY_US: u32 = 5;
const WRITE_1_LOW_US: u32 = 10;
const WRITE_1_RECOVERY_US: u32 = 55;
const READ_LOW_US: u32 = 3;
const READ_SAMPLE_US: u32 = 10;
const READ_RECOVERY_US: u32 = 50;

/// Bus master for one physical line
///
/// Besides the line itself the driver keeps the enumeration cursor used by
/// [`Driver::search_next`] and the number of devices found through it.
pub struct Driver<W: IoWire> {
    io_wire: W,
    cursor: DeviceSearch,
    device_count: u8,
}

impl<E: Debug, W: IoWire<Error = E>> Driver<W> {
    pub fn new(io_wire: W) -> Self {
        Driver {
            io_wire,
            cursor: DeviceSearch::new(),
            device_count: 0,
        }
    }

    /// Gives the line back
    pub fn release(self) -> W {
        self.io_wire
    }

    /// Settles the line and forgets every search result
    pub fn init(&mut self, delay: &mut impl DelayNs) -> Result<(), E> {
        self.set_high()?;
        delay.delay_ms(1);
        self.set_low()?;
        delay.delay_ms(1);
        self.set_high()?;
        delay.delay_ms(2);
        self.reset_search();
        Ok(())
    }

    /// Starts a new enumeration: rewinds the driver's own search cursor and
    /// clears the device count
    pub fn reset_search(&mut self) {
        self.cursor.reset();
        self.device_count = 0;
    }

    /// Rewinds the driver's own search cursor, keeping the device count
    pub fn rewind_cursor(&mut self) {
        self.cursor.reset();
    }

    pub fn search_state(&self) -> &DeviceSearch {
        &self.cursor
    }

    /// Devices found through [`Driver::search_next`] since the last init or
    /// [`Driver::reset_search`]. Alarm searches do not count.
    pub fn device_count(&self) -> u8 {
        self.device_count
    }

    /// Continues the enumeration of all devices on the bus
    pub fn search_next(&mut self, delay: &mut impl DelayNs) -> Result<Option<Address>, Error<E>> {
        self.search_own(delay, Command::SearchRom)
    }

    /// Continues the enumeration of devices signalling an alarm
    pub fn search_next_alarmed(
        &mut self,
        delay: &mut impl DelayNs,
    ) -> Result<Option<Address>, Error<E>> {
        self.search_own(delay, Command::AlarmSearch)
    }

    fn search_own(
        &mut self,
        delay: &mut impl DelayNs,
        cmd: Command,
    ) -> Result<Option<Address>, Error<E>> {
        let mut cursor = core::mem::take(&mut self.cursor);
        let result = self.search(&mut cursor, delay, cmd);
        self.cursor = cursor;
        let found = result?;
        if found.is_some() && cmd == Command::SearchRom {
            self.device_count = self.device_count.saturating_add(1);
        }
        Ok(found)
    }

    pub fn reset_write_read(
        &mut self,
        delay: &mut impl DelayNs,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Error<E>> {
        self.reset(delay)?;
        self.write_bytes(delay, write)?;
        self.read_bytes(delay, read)?;
        Ok(())
    }

    pub fn reset_select_write_read(
        &mut self,
        delay: &mut impl DelayNs,
        addr: &Address,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Error<E>> {
        self.reset(delay)?;
        self.select(delay, addr)?;
        self.write_bytes(delay, write)?;
        self.read_bytes(delay, read)?;
        Ok(())
    }

    pub fn reset_select_write_only(
        &mut self,
        delay: &mut impl DelayNs,
        addr: &Address,
        write: &[u8],
    ) -> Result<(), Error<E>> {
        self.reset(delay)?;
        self.select(delay, addr)?;
        self.write_bytes(delay, write)?;
        Ok(())
    }

    pub fn reset_skip_write_only(
        &mut self,
        delay: &mut impl DelayNs,
        write: &[u8],
    ) -> Result<(), Error<E>> {
        self.reset(delay)?;
        self.skip(delay)?;
        self.write_bytes(delay, write)?;
        Ok(())
    }

    /// Addresses every device at once
    pub fn skip(&mut self, delay: &mut impl DelayNs) -> Result<(), E> {
        self.write_command(delay, Command::SkipRom)
    }

    /// Narrows the following transaction down to `addr`
    pub fn select(&mut self, delay: &mut impl DelayNs, addr: &Address) -> Result<(), E> {
        self.write_command(delay, Command::MatchRom)?;
        self.write_bytes(delay, addr.as_ref())
    }

    /// Reads the ROM code of the only device on the bus
    ///
    /// With more than one device the answers collide and the checksum fails.
    pub fn read_rom(&mut self, delay: &mut impl DelayNs) -> Result<Address, Error<E>> {
        let mut raw = [0u8; Address::BYTES as usize];
        self.reset_write_read(delay, &[Command::ReadRom.op_code()], &mut raw)?;
        let address = Address::from(raw);
        address.ensure_valid_crc::<E>()?;
        Ok(address)
    }

    /// Performs a reset and listens for a presence pulse
    /// Fails with `WireFault` if the line stays low before the pulse (shorted
    /// to ground) and with `NoPresence` if no device answered
    pub fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        self.ensure_wire_high(delay)?;
        self.set_low()?;
        delay.delay_us(RESET_LOW_US);
        self.set_high()?;
        delay.delay_us(PRESENCE_SAMPLE_US);
        let presence = self.is_low()?;
        delay.delay_us(RESET_RECOVERY_US);
        if presence {
            Ok(())
        } else {
            Err(Error::NoPresence)
        }
    }

    pub fn reset_presence(&mut self, delay: &mut impl DelayNs) -> Result<bool, Error<E>> {
        self.reset(delay).map(|_| true).or_else(|error| {
            if matches!(error, Error::NoPresence) {
                Ok(false)
            } else {
                Err(error)
            }
        })
    }

    fn ensure_wire_high(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        for _ in 0..125 {
            if self.is_high()? {
                return Ok(());
            }
            delay.delay_us(2);
        }
        Err(Error::WireFault)
    }

    /// Blocks until a read slot returns 1, i.e. a busy device (conversion,
    /// EEPROM copy) released the line. There is no upper bound.
    pub fn wait_ready(&mut self, delay: &mut impl DelayNs) -> Result<(), E> {
        while !self.read_bit(delay)? {}
        Ok(())
    }

    /// Like [`Driver::wait_ready`], but gives up after `limit_us`
    pub fn wait_ready_within(
        &mut self,
        timebase: &mut impl Timebase,
        limit_us: u32,
    ) -> Result<(), Error<E>> {
        timebase.mark_start();
        loop {
            if self.read_bit(timebase)? {
                return Ok(());
            }
            if timebase.elapsed_us() >= limit_us {
                return Err(Error::Timeout);
            }
        }
    }

    pub fn read_bytes(&mut self, delay: &mut impl DelayNs, dst: &mut [u8]) -> Result<(), E> {
        for d in dst {
            *d = self.read_byte(delay)?;
        }
        Ok(())
    }

    /// Eight read slots, least significant bit first
    pub fn read_byte(&mut self, delay: &mut impl DelayNs) -> Result<u8, E> {
        let mut byte = 0_u8;
        for _ in 0..8 {
            byte >>= 1;
            if self.read_bit(delay)? {
                byte |= 0x80;
            }
        }
        Ok(byte)
    }

    pub fn read_bit(&mut self, delay: &mut impl DelayNs) -> Result<bool, E> {
        self.set_low()?;
        delay.delay_us(READ_LOW_US);
        self.set_high()?;
        delay.delay_us(READ_SAMPLE_US);
        let val = self.is_high();
        delay.delay_us(READ_RECOVERY_US);
        val
    }

    pub fn write_command(&mut self, delay: &mut impl DelayNs, cmd: impl OpCode) -> Result<(), E> {
        self.write_byte(delay, cmd.op_code())
    }

    pub fn write_bytes(&mut self, delay: &mut impl DelayNs, bytes: &[u8]) -> Result<(), E> {
        for b in bytes {
            self.write_byte(delay, *b)?;
        }
        Ok(())
    }

    /// Eight write slots, least significant bit first
    pub fn write_byte(&mut self, delay: &mut impl DelayNs, byte: u8) -> Result<(), E> {
        let mut byte = byte;
        for _ in 0..8 {
            self.write_bit(delay, (byte & 0x01) == 0x01)?;
            byte >>= 1;
        }
        Ok(())
    }

    pub fn write_bit(&mut self, delay: &mut impl DelayNs, high: bool) -> Result<(), E> {
        self.set_low()?;
        delay.delay_us(if high { WRITE_1_LOW_US } else { WRITE_0_LOW_US });
        self.set_high()?;
        delay.delay_us(if high {
            WRITE_1_RECOVERY_US
        } else {
            WRITE_0_RECOVERY_US
        });
        Ok(())
    }

    #[inline(always)]
    fn set_high(&mut self) -> Result<(), E> {
        self.io_wire.set_high()
    }

    #[inline(always)]
    fn set_low(&mut self) -> Result<(), E> {
        self.io_wire.set_low()
    }

    #[inline(always)]
    fn is_high(&mut self) -> Result<bool, E> {
        self.io_wire.is_high()
    }

    #[inline(always)]
    fn is_low(&mut self) -> Result<bool, E> {
        self.io_wire.is_low()
    }
}
