//! In-memory bus with simulated DS18B20 devices
//!
//! The master side only sees pin levels and a clock. Devices decode slots from
//! the length of each low pulse (>= 480 µs reset, < 15 µs a one or a read slot,
//! otherwise a zero) and answer read slots by holding the line low for 30 µs.

use crate::{crc::crc8, Address, IoWire, Timebase};
use core::{cell::RefCell, convert::Infallible};
use embedded_hal::delay::DelayNs;
use std::{rc::Rc, vec::Vec};

const US: u64 = 1_000;
const RESET_MIN_NS: u64 = 480 * US;
const SHORT_SLOT_NS: u64 = 15 * US;
const HOLD_ZERO_NS: u64 = 30 * US;
const PRESENCE_NS: (u64, u64) = (15 * US, 135 * US);
const CONVERSION_NS: u64 = 2_000 * US;
const COPY_NS: u64 = 500 * US;

const FAMILY_DS18B20: u8 = 0x28;
const POWER_ON_SCRATCHPAD: [u8; 9] = [0x50, 0x05, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10, 0x1C];

#[derive(Clone, Copy, Debug, PartialEq)]
enum Phase {
    Idle,
    RomCommand,
    Search { position: u8, step: u8 },
    Match { position: u8, matched: bool },
    ReadRom { position: u8 },
    Function,
    ReadScratchpad { position: u8 },
    WriteScratchpad { index: u8 },
    Busy { until: u64 },
}

struct SimDevice {
    rom: [u8; 8],
    temperature: u16,
    scratchpad: [u8; 9],
    eeprom: [u8; 3],
    alarm: bool,
    corrupt_crc: bool,
    phase: Phase,
    shift: u8,
    count: u8,
}

fn bit_of(bytes: &[u8], position: u8) -> bool {
    bytes[usize::from(position / 8)] & (1 << (position % 8)) != 0
}

impl SimDevice {
    fn new(rom: [u8; 8], temperature: u16) -> Self {
        SimDevice {
            rom,
            temperature,
            scratchpad: POWER_ON_SCRATCHPAD,
            eeprom: [0x4B, 0x46, 0x7F],
            alarm: false,
            corrupt_crc: false,
            phase: Phase::Idle,
            shift: 0,
            count: 0,
        }
    }

    /// Bit this device puts on the line during the next read slot
    fn transmit(&self, now: u64) -> Option<bool> {
        match self.phase {
            Phase::Search { position, step: 0 } => Some(bit_of(&self.rom, position)),
            Phase::Search { position, step: 1 } => Some(!bit_of(&self.rom, position)),
            Phase::ReadRom { position } => Some(bit_of(&self.rom, position)),
            Phase::ReadScratchpad { position } => {
                let mut scratchpad = self.scratchpad;
                if self.corrupt_crc {
                    scratchpad[8] ^= 0xFF;
                }
                Some(bit_of(&scratchpad, position))
            }
            Phase::Busy { until } => Some(now >= until),
            _ => None,
        }
    }

    fn on_reset(&mut self) {
        self.phase = Phase::RomCommand;
        self.shift = 0;
        self.count = 0;
    }

    fn on_slot(&mut self, bit: bool, now: u64) {
        match self.phase {
            Phase::Idle | Phase::Busy { .. } => {}
            Phase::RomCommand | Phase::Function | Phase::WriteScratchpad { .. } => {
                self.shift = (self.shift >> 1) | (u8::from(bit) << 7);
                self.count += 1;
                if self.count == 8 {
                    self.count = 0;
                    self.on_byte(self.shift, now);
                }
            }
            Phase::Search { position, step } => {
                self.phase = match step {
                    0 | 1 => Phase::Search {
                        position,
                        step: step + 1,
                    },
                    _ if bit != bit_of(&self.rom, position) => Phase::Idle,
                    _ if position == 63 => Phase::Function,
                    _ => Phase::Search {
                        position: position + 1,
                        step: 0,
                    },
                }
            }
            Phase::Match { position, matched } => {
                let matched = matched && bit == bit_of(&self.rom, position);
                self.phase = match (position, matched) {
                    (63, true) => Phase::Function,
                    (63, false) => Phase::Idle,
                    _ => Phase::Match {
                        position: position + 1,
                        matched,
                    },
                }
            }
            Phase::ReadRom { position } => {
                self.phase = if position == 63 {
                    Phase::Function
                } else {
                    Phase::ReadRom {
                        position: position + 1,
                    }
                }
            }
            Phase::ReadScratchpad { position } => {
                self.phase = if position == 71 {
                    Phase::Idle
                } else {
                    Phase::ReadScratchpad {
                        position: position + 1,
                    }
                }
            }
        }
    }

    fn on_byte(&mut self, byte: u8, now: u64) {
        self.phase = match (self.phase, byte) {
            (Phase::RomCommand, 0xF0) => Phase::Search {
                position: 0,
                step: 0,
            },
            (Phase::RomCommand, 0xEC) if self.alarm => Phase::Search {
                position: 0,
                step: 0,
            },
            (Phase::RomCommand, 0x55) => Phase::Match {
                position: 0,
                matched: true,
            },
            (Phase::RomCommand, 0xCC) => Phase::Function,
            (Phase::RomCommand, 0x33) => Phase::ReadRom { position: 0 },
            (Phase::Function, 0x44) => {
                self.convert();
                Phase::Busy {
                    until: now + CONVERSION_NS,
                }
            }
            (Phase::Function, 0xBE) => Phase::ReadScratchpad { position: 0 },
            (Phase::Function, 0x4E) => Phase::WriteScratchpad { index: 0 },
            (Phase::Function, 0x48) => {
                self.eeprom.copy_from_slice(&self.scratchpad[2..5]);
                Phase::Busy {
                    until: now + COPY_NS,
                }
            }
            (Phase::Function, 0xB8) => {
                self.scratchpad[2..5].copy_from_slice(&self.eeprom);
                self.scratchpad[8] = crc8(&self.scratchpad[..8]);
                Phase::Busy { until: now }
            }
            (Phase::WriteScratchpad { index }, _) => {
                let value = if index == 2 {
                    (byte & 0x60) | 0x1F
                } else {
                    byte
                };
                self.scratchpad[2 + usize::from(index)] = value;
                self.scratchpad[8] = crc8(&self.scratchpad[..8]);
                if index == 2 {
                    Phase::Idle
                } else {
                    Phase::WriteScratchpad { index: index + 1 }
                }
            }
            _ => Phase::Idle,
        };
    }

    fn convert(&mut self) {
        let bits = ((self.scratchpad[4] >> 5) & 0x03) + 9;
        let undefined = (1u16 << (12 - bits)) - 1;
        let raw = self.temperature & !undefined;
        self.scratchpad[..2].copy_from_slice(&raw.to_le_bytes());
        self.scratchpad[8] = crc8(&self.scratchpad[..8]);

        let whole = (raw as i16) >> 4;
        let high = i16::from(self.scratchpad[2] as i8);
        let low = i16::from(self.scratchpad[3] as i8);
        self.alarm = whole >= high || whole <= low;
    }
}

struct Bus {
    now: u64,
    master_low: bool,
    fell_at: u64,
    hold_until: u64,
    presence: Option<(u64, u64)>,
    devices: Vec<SimDevice>,
    pulses: Vec<u32>,
}

impl Bus {
    fn line_high(&self) -> bool {
        let presence = self
            .presence
            .map_or(false, |(from, to)| self.now >= from && self.now < to);
        !(self.master_low || self.now < self.hold_until || presence)
    }

    fn pull_low(&mut self) {
        if self.master_low {
            return;
        }
        self.master_low = true;
        self.fell_at = self.now;
        let now = self.now;
        if self
            .devices
            .iter()
            .any(|device| device.transmit(now) == Some(false))
        {
            self.hold_until = now + HOLD_ZERO_NS;
        }
    }

    fn release(&mut self) {
        if !self.master_low {
            return;
        }
        self.master_low = false;
        let width = self.now - self.fell_at;
        self.pulses.push((width / US) as u32);
        let now = self.now;
        if width >= RESET_MIN_NS {
            self.devices.iter_mut().for_each(SimDevice::on_reset);
            self.presence = if self.devices.is_empty() {
                None
            } else {
                Some((now + PRESENCE_NS.0, now + PRESENCE_NS.1))
            };
        } else {
            let bit = width < SHORT_SLOT_NS;
            for device in self.devices.iter_mut() {
                device.on_slot(bit, now);
            }
        }
    }

    fn device(&mut self, address: &Address) -> &mut SimDevice {
        self.devices
            .iter_mut()
            .find(|device| device.rom == **address)
            .expect("no such simulated device")
    }
}

#[derive(Clone)]
pub struct SimBus(Rc<RefCell<Bus>>);

impl SimBus {
    pub fn new() -> Self {
        SimBus(Rc::new(RefCell::new(Bus {
            now: 0,
            master_low: false,
            fell_at: 0,
            hold_until: 0,
            presence: None,
            devices: Vec::new(),
            pulses: Vec::new(),
        })))
    }

    pub fn wire(&self) -> SimWire {
        SimWire(self.clone())
    }

    pub fn clock(&self) -> SimClock {
        SimClock {
            bus: self.clone(),
            start: 0,
        }
    }

    pub fn now_us(&self) -> u64 {
        self.0.borrow().now / US
    }

    /// Widths of every low pulse the master produced, in µs
    pub fn low_pulses(&self) -> Vec<u32> {
        self.0.borrow().pulses.clone()
    }

    pub fn add_device(&self, rom: [u8; 8], temperature: u16) -> Address {
        self.0
            .borrow_mut()
            .devices
            .push(SimDevice::new(rom, temperature));
        Address::from(rom)
    }

    /// Adds a DS18B20 with the lower 48 bits of `serial` and a valid ROM checksum
    pub fn add_ds18b20(&self, serial: u64, temperature: u16) -> Address {
        let mut rom = [0u8; 8];
        rom[0] = FAMILY_DS18B20;
        rom[1..7].copy_from_slice(&serial.to_le_bytes()[..6]);
        rom[7] = crc8(&rom[..7]);
        self.add_device(rom, temperature)
    }

    pub fn remove(&self, address: &Address) {
        self.0
            .borrow_mut()
            .devices
            .retain(|device| device.rom != **address);
    }

    pub fn set_temperature(&self, address: &Address, temperature: u16) {
        self.0.borrow_mut().device(address).temperature = temperature;
    }

    pub fn set_alarm(&self, address: &Address, alarm: bool) {
        self.0.borrow_mut().device(address).alarm = alarm;
    }

    pub fn corrupt_crc(&self, address: &Address) {
        self.0.borrow_mut().device(address).corrupt_crc = true;
    }

    pub fn scratchpad(&self, address: &Address) -> [u8; 9] {
        self.0.borrow_mut().device(address).scratchpad
    }

    /// TH, TL and configuration as persisted by the last copy
    pub fn eeprom(&self, address: &Address) -> [u8; 3] {
        self.0.borrow_mut().device(address).eeprom
    }
}

pub struct SimWire(SimBus);

impl IoWire for SimWire {
    type Error = Infallible;

    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.0 .0.borrow().line_high())
    }

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0 .0.borrow_mut().pull_low();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0 .0.borrow_mut().release();
        Ok(())
    }
}

pub struct SimClock {
    bus: SimBus,
    start: u64,
}

impl DelayNs for SimClock {
    fn delay_ns(&mut self, ns: u32) {
        self.bus.0.borrow_mut().now += u64::from(ns);
    }

    fn delay_us(&mut self, us: u32) {
        self.bus.0.borrow_mut().now += u64::from(us) * US;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.bus.0.borrow_mut().now += u64::from(ms) * 1000 * US;
    }
}

impl Timebase for SimClock {
    fn mark_start(&mut self) {
        self.start = self.bus.0.borrow().now;
    }

    fn elapsed_us(&self) -> u32 {
        ((self.bus.0.borrow().now - self.start) / US) as u32
    }
}
