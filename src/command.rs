/// Anything that goes on the wire as a single command byte
pub trait OpCode {
    fn op_code(&self) -> u8;
}

/// ROM level commands, understood by every device on the bus
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(u8)]
pub enum Command {
    ReadRom = 0x33,
    MatchRom = 0x55,
    SkipRom = 0xCC,
    SearchRom = 0xF0,
    /// Search restricted to devices with an alarm condition
    AlarmSearch = 0xEC,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}
