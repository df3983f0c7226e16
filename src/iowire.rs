use embedded_hal::digital::{Error, ErrorType, InputPin, OutputPin};

/// Open-drain view of the bus line
pub trait IoWire {
    type Error: Error;

    /// Is the line high?
    fn is_high(&mut self) -> Result<bool, Self::Error>;

    /// Is the line low?
    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }

    /// Pulls the line low
    fn set_low(&mut self) -> Result<(), Self::Error>;

    /// Releases the line, letting the pull-up (or a device) decide its level
    fn set_high(&mut self) -> Result<(), Self::Error>;
}

/// Single open-drain pin
impl<IO> IoWire for (IO,)
where
    IO: ErrorType + OutputPin + InputPin,
{
    type Error = IO::Error;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }
}

/// Separate sense and drive pins
impl<E, I, O> IoWire for (I, O)
where
    E: Error,
    I: ErrorType<Error = E> + InputPin,
    O: ErrorType<Error = E> + OutputPin,
{
    type Error = E;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.1.set_low()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.1.set_high()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Direction {
    Input,
    Output,
}

/// Push-pull pin whose direction is switched at run time
pub trait DirectionPin: ErrorType {
    fn set_direction(&mut self, direction: Direction) -> Result<(), Self::Error>;

    fn set_level(&mut self, high: bool) -> Result<(), Self::Error>;

    fn read_level(&mut self) -> Result<bool, Self::Error>;
}

/// Emulates an open-drain line on a [`DirectionPin`]: driving low means output
/// with a low level, releasing means switching back to input.
pub struct Switched<P>(pub P);

impl<P: DirectionPin> IoWire for Switched<P> {
    type Error = P::Error;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.read_level()
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_level(false)?;
        self.0.set_direction(Direction::Output)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_direction(Direction::Input)
    }
}
