//! Support for the `SC16IS752` "Dual UART with I2C-bus/SPI interface, 64 bytes of transmit and
//! receive FIFOs, IrDA SIR built-in support"
use crate::bus::{I2cBus, I2cInterface, SpiBus, SpiInterface};
use crate::channel::{Channel, LineConfig, Rs485Config, RxMode};
use crate::driver::Driver;
use crate::gpio::{GpioPin, InputPort, OutputPort, ResistorMode};
use crate::interrupt::InterruptHandler;
use crate::regs::{bits, ChannelId, Register};
use crate::{Error, PortMutex, Sc16is752Bus};
use embedded_hal::delay::DelayNs;

/// Default crystal frequency of SC16IS752 boards.
pub const DEFAULT_CRYSTAL_HZ: u32 = 14_745_600;

/// Edge on which the platform triggers the interrupt dispatcher.
///
/// The IRQ output of the chip is active low, so `Falling` is the only edge that works reliably.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InterruptEdge {
    Falling,
    Rising,
    Both,
}

/// Controller configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Frequency of the crystal or clock on XTAL1.
    pub crystal_hz: u32,
    /// Edge of the wired interrupt line, `None` if the IRQ output is not connected.
    pub interrupt_edge: Option<InterruptEdge>,
    /// Poll IOState on every dispatcher call, even when IIR reports no GPIO change.
    pub gpio_poll_fallback: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crystal_hz: DEFAULT_CRYSTAL_HZ,
            interrupt_edge: None,
            gpio_poll_fallback: false,
        }
    }
}

/// SC16IS752 dual UART and 8-bit GPIO expander.
///
/// Construction performs no bus access.  Channels and GPIO ports are handed out as handles
/// borrowing the controller.
pub struct Sc16is752<M>(M);

impl<I2C> Sc16is752<core::cell::RefCell<Driver<I2cInterface<I2C>>>>
where
    I2C: I2cBus,
{
    /// Controller on an I2C bus, `address` as returned by [`crate::i2c_address()`].
    pub fn new_i2c(i2c: I2C, address: u8, config: Config) -> Self {
        Self::with_mutex(I2cInterface::new(i2c, address), config)
    }
}

impl<SPI> Sc16is752<core::cell::RefCell<Driver<SpiInterface<SPI>>>>
where
    SPI: SpiBus,
{
    pub fn new_spi(spi: SPI, config: Config) -> Self {
        Self::with_mutex(SpiInterface::new(spi), config)
    }
}

impl<B, M> Sc16is752<M>
where
    B: Sc16is752Bus,
    M: PortMutex<Port = Driver<B>>,
{
    pub fn with_mutex(bus: B, config: Config) -> Self {
        match config.interrupt_edge {
            Some(InterruptEdge::Falling) | None => {}
            Some(edge) => log::warn!(
                "SC16IS752: {:?} edge configured, the IRQ output signals on the falling edge",
                edge
            ),
        }
        Self(M::create(Driver::new(bus, config)))
    }

    pub fn config(&self) -> Config {
        self.0.lock(|drv| drv.config)
    }

    /// Issue a software reset.  All registers return to their defaults.
    ///
    /// Fails with [`Error::PortInUse`] while a channel or GPIO port is bound.
    pub fn reset(&self) -> Result<(), Error<B::BusError>> {
        self.0.lock(|drv| {
            if drv.has_bound_ports() {
                return Err(Error::PortInUse);
            }
            drv.write_register(Register::IOCONTROL, bits::IOCONTROL_SRESET)?;
            drv.gpio_last = 0x00;
            log::debug!("SC16IS752: software reset");
            Ok(())
        })
    }

    /// Check that a chip responds by writing and reading back the scratch pad register.
    pub fn probe(&self) -> Result<bool, Error<B::BusError>> {
        const PATTERN: u8 = 0x5a;
        self.0.lock(|drv| {
            drv.write_channel_register(Register::SPR, ChannelId::A, PATTERN)?;
            let readback = drv.read_channel_register(Register::SPR, ChannelId::A)?;
            if readback != PATTERN {
                log::debug!("SC16IS752: scratch pad read back {:#04x}", readback);
            }
            Ok(readback == PATTERN)
        })
    }

    /// Latch GPIO input changes: the interrupt stays asserted until IOState is read.
    pub fn set_input_latch(&self, enable: bool) -> Result<(), Error<B::BusError>> {
        self.0.lock(|drv| {
            if enable {
                drv.set_bit(Register::IOCONTROL, bits::IOCONTROL_LATCH_BIT)
            } else {
                drv.clear_bit(Register::IOCONTROL, bits::IOCONTROL_LATCH_BIT)
            }
        })?;
        Ok(())
    }

    /// Bind GPIO pin `pin` (0..=7) to an input port.
    pub fn gpio_input(
        &self,
        pin: u8,
        resistor: ResistorMode,
    ) -> Result<InputPort<'_, M>, Error<B::BusError>> {
        self.0.lock(|drv| drv.configure_input(pin, resistor))?;
        Ok(GpioPin::new(pin, &self.0))
    }

    /// Bind GPIO pin `pin` (0..=7) to an output port driving `initial`.
    pub fn gpio_output(
        &self,
        pin: u8,
        initial: bool,
    ) -> Result<OutputPort<'_, M>, Error<B::BusError>> {
        self.0.lock(|drv| drv.configure_output(pin, initial))?;
        Ok(GpioPin::new(pin, &self.0))
    }

    /// Open a UART channel in RS232 mode.
    pub fn open_channel<D: DelayNs>(
        &self,
        channel: ChannelId,
        line: LineConfig,
        rx: RxMode,
        delay: D,
    ) -> Result<Channel<'_, M, D>, Error<B::BusError>> {
        self.0.lock(|drv| drv.open_channel(channel, &line, None, rx))?;
        Ok(Channel::new(&self.0, channel, line, rx, delay))
    }

    /// Open a UART channel in RS485 mode, with RTS as the transceiver's driver enable.
    pub fn open_channel_rs485<D: DelayNs>(
        &self,
        channel: ChannelId,
        line: LineConfig,
        rs485: Rs485Config,
        rx: RxMode,
        delay: D,
    ) -> Result<Channel<'_, M, D>, Error<B::BusError>> {
        self.0
            .lock(|drv| drv.open_channel(channel, &line, Some(rs485), rx))?;
        Ok(Channel::new(&self.0, channel, line, rx, delay))
    }

    /// Open a channel by its logical name, `"Channel A"` or `"Channel B"`.
    pub fn open_named<D: DelayNs>(
        &self,
        name: &str,
        line: LineConfig,
        rx: RxMode,
        delay: D,
    ) -> Result<Channel<'_, M, D>, Error<B::BusError>> {
        let channel = ChannelId::from_name(name).ok_or(Error::UnknownChannel)?;
        self.open_channel(channel, line, rx, delay)
            .map_err(|e| match e {
                Error::ChannelAlreadyOpen => Error::PortInUse,
                e => e,
            })
    }

    /// Dispatcher to call when the interrupt line fires.
    pub fn interrupt_handler(&self) -> InterruptHandler<'_, M> {
        let config = self.config();
        if config.interrupt_edge.is_none() && !config.gpio_poll_fallback {
            log::warn!("SC16IS752: interrupt handler requested without an interrupt line");
        }
        InterruptHandler::new(&self.0)
    }
}
