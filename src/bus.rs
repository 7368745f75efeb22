use embedded_hal::i2c as hal_i2c;
use embedded_hal::spi as hal_spi;

/// Blanket trait for types implementing `i2c::I2c`
pub trait I2cBus: hal_i2c::I2c {
    type BusError: From<<Self as hal_i2c::ErrorType>::Error>;
}

impl<T, E> I2cBus for T
where
    T: hal_i2c::I2c<Error = E>,
{
    type BusError = E;
}

/// Blanket trait for types implementing `spi::SpiDevice`
pub trait SpiBus: hal_spi::SpiDevice {
    type BusError: From<<Self as hal_spi::ErrorType>::Error>;
}

impl<T, E> SpiBus for T
where
    T: hal_spi::SpiDevice<Error = E>,
{
    type BusError = E;
}

/// Register-level access to the SC16IS752, independent of the physical bus.
///
/// `subaddr` is the register sub-address byte as built by [`crate::regs::subaddress()`].
pub trait Sc16is752Bus {
    type BusError;

    fn write_reg(&mut self, subaddr: u8, value: u8) -> Result<(), Self::BusError>;

    /// Read `buf.len()` bytes from one register.  On RHR this drains that many bytes from the
    /// receive FIFO, as the chip does not advance the register pointer.
    fn read_burst(&mut self, subaddr: u8, buf: &mut [u8]) -> Result<(), Self::BusError>;

    fn read_reg(&mut self, subaddr: u8) -> Result<u8, Self::BusError> {
        let mut buf = [0x00];
        self.read_burst(subaddr, &mut buf)?;
        Ok(buf[0])
    }
}

/// Address pin strapping.  Each of A0/A1 can be tied to one of four signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressPin {
    Vdd = 0,
    Vss = 1,
    Scl = 2,
    Sda = 3,
}

/// 7-bit I2C address for the given A1/A0 strapping (0x48..=0x57).
pub const fn i2c_address(a1: AddressPin, a0: AddressPin) -> u8 {
    0x48 | ((a1 as u8) << 2) | (a0 as u8)
}

pub struct I2cInterface<I2C> {
    i2c: I2C,
    addr: u8,
}

impl<I2C> I2cInterface<I2C> {
    pub fn new(i2c: I2C, addr: u8) -> Self {
        Self { i2c, addr }
    }
}

impl<I2C: I2cBus> Sc16is752Bus for I2cInterface<I2C> {
    type BusError = I2C::BusError;

    fn write_reg(&mut self, subaddr: u8, value: u8) -> Result<(), Self::BusError> {
        self.i2c.write(self.addr, &[subaddr, value])?;
        Ok(())
    }

    fn read_burst(&mut self, subaddr: u8, buf: &mut [u8]) -> Result<(), Self::BusError> {
        self.i2c.write_read(self.addr, &[subaddr], buf)?;
        Ok(())
    }
}

/// Read flag in the first byte of an SPI transfer.
const SPI_READ: u8 = 0x80;

pub struct SpiInterface<SPI>(SPI);

impl<SPI> SpiInterface<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self(spi)
    }
}

impl<SPI: SpiBus> Sc16is752Bus for SpiInterface<SPI> {
    type BusError = SPI::BusError;

    fn write_reg(&mut self, subaddr: u8, value: u8) -> Result<(), Self::BusError> {
        self.0.write(&[subaddr, value])?;
        Ok(())
    }

    fn read_burst(&mut self, subaddr: u8, buf: &mut [u8]) -> Result<(), Self::BusError> {
        let write = [SPI_READ | subaddr];
        let mut tx = [
            hal_spi::Operation::Write(&write),
            hal_spi::Operation::Read(buf),
        ];
        self.0.transaction(&mut tx)?;
        Ok(())
    }
}
