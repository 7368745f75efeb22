use core::fmt;

/// Errors returned by the driver.
///
/// `E` is the error type of the underlying bus.  Bus errors are passed through unchanged; the
/// driver never retries a failed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The bus reported an error.
    Bus(E),
    /// The GPIO pin or channel name is already bound to a port.
    PortInUse,
    /// The UART channel was already opened on this controller.
    ChannelAlreadyOpen,
    /// The pins have no internal pull resistors.
    UnsupportedResistorMode,
    /// GPIO pin number out of range (0..=7).
    InvalidPin(u8),
    /// The name does not designate a UART channel.
    UnknownChannel,
    /// No divisor in range 1..=0xffff produces this baud rate from the crystal.
    UnsupportedBaudRate(u32),
    /// A software receive buffer needs room for at least one byte.
    InvalidBufferCapacity,
    /// Interrupt-driven mode was requested, but no interrupt line is configured.
    InterruptNotConfigured,
    /// A blocking read or write did not complete before its deadline.
    Timeout,
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::Bus(e)
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "bus error: {:?}", e),
            Error::PortInUse => f.write_str("port is already in use"),
            Error::ChannelAlreadyOpen => f.write_str("channel is already open"),
            Error::UnsupportedResistorMode => f.write_str("pull resistors are not supported"),
            Error::InvalidPin(pin) => write!(f, "no GPIO pin {}", pin),
            Error::UnknownChannel => f.write_str("unknown channel name"),
            Error::UnsupportedBaudRate(baud) => write!(f, "baud rate {} not reachable", baud),
            Error::InvalidBufferCapacity => f.write_str("receive buffer capacity must be non-zero"),
            Error::InterruptNotConfigured => f.write_str("no interrupt line configured"),
            Error::Timeout => f.write_str("operation timed out"),
        }
    }
}

impl<E: fmt::Debug> embedded_hal::digital::Error for Error<E> {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

impl<E: fmt::Debug> embedded_io::Error for Error<E> {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Error::Timeout => embedded_io::ErrorKind::TimedOut,
            Error::PortInUse | Error::ChannelAlreadyOpen => embedded_io::ErrorKind::AddrInUse,
            Error::UnsupportedBaudRate(_)
            | Error::InvalidBufferCapacity
            | Error::UnsupportedResistorMode
            | Error::InvalidPin(_) => embedded_io::ErrorKind::InvalidInput,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}
