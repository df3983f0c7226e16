use core::fmt::Debug;

/// Error type
#[derive(Debug, PartialEq)]
pub enum Error<E: Sized + Debug> {
    /// Wire not high before the reset pulse, likely shorted
    WireFault,
    /// No presence on wire
    NoPresence,
    /// Both the bit and its complement read high during a search
    CollisionAbort,
    /// Checksum (computed, received)
    ChecksumMismatch(u8, u8),
    /// Family code (expected, found)
    InvalidAddress(u8, u8),
    /// Resolution outside 9..=12 bits
    UnsupportedResolution(u8),
    /// Device did not release the line in time
    Timeout,
    PortError(E),
}

impl<E: Sized + Debug> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::PortError(e)
    }
}
