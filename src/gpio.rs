//! GPIO ports on the eight IO pins.
use core::marker::PhantomData;
use embedded_hal::digital as hal_digital;

use crate::driver::{Driver, PinSlot, PortRegistry};
use crate::regs::Register;
use crate::{Error, PortMutex, Sc16is752Bus};

/// Number of GPIO pins on the SC16IS752.
pub const PIN_COUNT: u8 = 8;

/// Pin Modes
pub mod mode {
    /// Trait for pin-modes which can be used to set a logic level.
    pub trait HasOutput {}
    /// Trait for pin-modes which can be used to read a logic level.
    pub trait HasInput {}

    /// Pin configured as an input.
    pub struct Input;
    impl HasInput for Input {}

    /// Pin configured as an output.
    pub struct Output;
    impl HasOutput for Output {}
}

/// Requested pull resistor of an input.  The SC16IS752 has none, so only `Disabled` is
/// accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResistorMode {
    Disabled,
    PullUp,
    PullDown,
}

/// Level change observed on an input pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinChange {
    pub pin: u8,
    pub level: bool,
}

/// Input change callback.
///
/// Called by the interrupt dispatcher with the controller locked; it must not access the
/// controller itself.
pub type PinChangeHandler = fn(PinChange);

impl<B: Sc16is752Bus> Driver<B> {
    fn claim_pin(&self, pin: u8) -> Result<(), Error<B::BusError>> {
        if pin >= PIN_COUNT {
            return Err(Error::InvalidPin(pin));
        }
        match self.pins[pin as usize] {
            PinSlot::Free => Ok(()),
            _ => Err(Error::PortInUse),
        }
    }

    pub(crate) fn configure_input(
        &mut self,
        pin: u8,
        resistor: ResistorMode,
    ) -> Result<(), Error<B::BusError>> {
        self.claim_pin(pin)?;
        if resistor != ResistorMode::Disabled {
            return Err(Error::UnsupportedResistorMode);
        }
        let mask = 1 << pin;

        self.clear_bit(Register::IODIR, pin)?;
        if self.has_interrupt_line() {
            self.set_bit(Register::IOINTENA, pin)?;
        }
        let level = self.read_io_state()? & mask != 0;

        self.gpio_last = (self.gpio_last & !mask) | if level { mask } else { 0 };
        self.pins[pin as usize] = PinSlot::Input {
            level,
            handler: None,
        };
        log::debug!("GPIO{}: input, level {}", pin, level);
        Ok(())
    }

    pub(crate) fn configure_output(
        &mut self,
        pin: u8,
        initial: bool,
    ) -> Result<(), Error<B::BusError>> {
        self.claim_pin(pin)?;
        let mask = 1 << pin;

        // Latch the level before switching the direction so the pin never glitches.
        if initial {
            self.update_io_state(mask, 0)?;
        } else {
            self.update_io_state(0, mask)?;
        }
        if self.has_interrupt_line() {
            self.clear_bit(Register::IOINTENA, pin)?;
        }
        self.set_bit(Register::IODIR, pin)?;

        self.pins[pin as usize] = PinSlot::Output { level: initial };
        log::debug!("GPIO{}: output, level {}", pin, initial);
        Ok(())
    }

    /// Drive several outputs with one IOState write and record the new levels.
    pub(crate) fn write_outputs(&mut self, mask_high: u8, mask_low: u8) -> Result<(), B::BusError> {
        self.update_io_state(mask_high, mask_low)?;
        for (i, slot) in self.pins.iter_mut().enumerate() {
            if let PinSlot::Output { level } = slot {
                if mask_high & (1 << i) != 0 {
                    *level = true;
                } else if mask_low & (1 << i) != 0 {
                    *level = false;
                }
            }
        }
        Ok(())
    }

    /// Compare the input levels against the last serviced state and notify every input that
    /// changed.  Returns the mask of changed pins.
    pub(crate) fn service_gpio(&mut self) -> Result<u8, B::BusError> {
        let inputs = self.input_mask();
        let state = self.read_io_state()? & inputs;
        let changed = (state ^ self.gpio_last) & inputs;

        for pin in 0..PIN_COUNT {
            let mask = 1 << pin;
            if changed & mask == 0 {
                continue;
            }
            if let PinSlot::Input { level, handler } = &mut self.pins[pin as usize] {
                *level = state & mask != 0;
                log::trace!("GPIO{}: changed to {}", pin, *level);
                if let Some(notify) = *handler {
                    notify(PinChange { pin, level: *level });
                }
            }
        }
        self.gpio_last = state;
        Ok(changed)
    }
}

/// A GPIO pin bound to an input or output port.
///
/// Obtained from [`crate::Sc16is752::gpio_input()`] or [`crate::Sc16is752::gpio_output()`].
/// Dropping the port frees the pin again; its hardware direction is left unchanged.
pub struct GpioPin<'a, MODE, M>
where
    M: PortMutex,
    M::Port: PortRegistry,
{
    pin: u8,
    port: &'a M,
    _m: PhantomData<MODE>,
}

pub type InputPort<'a, M> = GpioPin<'a, mode::Input, M>;
pub type OutputPort<'a, M> = GpioPin<'a, mode::Output, M>;

impl<'a, MODE, M> GpioPin<'a, MODE, M>
where
    M: PortMutex,
    M::Port: PortRegistry,
{
    pub(crate) fn new(pin: u8, port: &'a M) -> Self {
        assert!(pin < PIN_COUNT);
        Self {
            pin,
            port,
            _m: PhantomData,
        }
    }

    pub fn pin_number(&self) -> u8 {
        self.pin
    }

    pub(crate) fn pin_mask(&self) -> u8 {
        1 << self.pin
    }

    pub(crate) fn port_driver(&self) -> &'a M {
        self.port
    }
}

impl<'a, MODE, M> Drop for GpioPin<'a, MODE, M>
where
    M: PortMutex,
    M::Port: PortRegistry,
{
    fn drop(&mut self) {
        let pin = self.pin;
        self.port.lock(|drv| drv.release_pin(pin));
    }
}

impl<'a, MODE: mode::HasInput, B, M> GpioPin<'a, MODE, M>
where
    B: Sc16is752Bus,
    M: PortMutex<Port = Driver<B>>,
{
    pub fn is_high(&self) -> Result<bool, Error<B::BusError>> {
        let mask = self.pin_mask();
        let state = self.port.lock(|drv| drv.read_io_state())?;
        Ok(state & mask != 0)
    }

    pub fn is_low(&self) -> Result<bool, Error<B::BusError>> {
        Ok(!self.is_high()?)
    }

    /// Level as of the last serviced GPIO interrupt (or the level at configuration time).
    pub fn state(&self) -> bool {
        let pin = self.pin as usize;
        self.port.lock(|drv| match drv.pins[pin] {
            PinSlot::Input { level, .. } => level,
            _ => false,
        })
    }

    /// Register a callback for level changes found by the interrupt dispatcher.
    pub fn set_change_handler(&mut self, handler: Option<PinChangeHandler>) {
        let pin = self.pin as usize;
        self.port.lock(|drv| {
            if let PinSlot::Input { handler: h, .. } = &mut drv.pins[pin] {
                *h = handler;
            }
        });
    }
}

impl<'a, MODE: mode::HasOutput, B, M> GpioPin<'a, MODE, M>
where
    B: Sc16is752Bus,
    M: PortMutex<Port = Driver<B>>,
{
    pub fn set_state(&mut self, high: bool) -> Result<(), Error<B::BusError>> {
        let mask = self.pin_mask();
        let (mask_high, mask_low) = if high { (mask, 0) } else { (0, mask) };
        self.port.lock(|drv| drv.write_outputs(mask_high, mask_low))?;
        Ok(())
    }

    pub fn set_high(&mut self) -> Result<(), Error<B::BusError>> {
        self.set_state(true)
    }

    pub fn set_low(&mut self) -> Result<(), Error<B::BusError>> {
        self.set_state(false)
    }

    /// Last level written to the pin.
    pub fn is_set_high(&self) -> bool {
        let pin = self.pin as usize;
        self.port.lock(|drv| match drv.pins[pin] {
            PinSlot::Output { level } => level,
            _ => false,
        })
    }

    pub fn is_set_low(&self) -> bool {
        !self.is_set_high()
    }

    pub fn toggle(&mut self) -> Result<(), Error<B::BusError>> {
        let level = self.is_set_high();
        self.set_state(!level)
    }
}

impl<'a, MODE, B, M> hal_digital::ErrorType for GpioPin<'a, MODE, M>
where
    B: Sc16is752Bus,
    B::BusError: core::fmt::Debug,
    M: PortMutex<Port = Driver<B>>,
{
    type Error = Error<B::BusError>;
}

impl<'a, MODE: mode::HasInput, B, M> hal_digital::InputPin for GpioPin<'a, MODE, M>
where
    B: Sc16is752Bus,
    B::BusError: core::fmt::Debug,
    M: PortMutex<Port = Driver<B>>,
{
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        GpioPin::is_high(self)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        GpioPin::is_low(self)
    }
}

impl<'a, MODE: mode::HasOutput, B, M> hal_digital::OutputPin for GpioPin<'a, MODE, M>
where
    B: Sc16is752Bus,
    B::BusError: core::fmt::Debug,
    M: PortMutex<Port = Driver<B>>,
{
    fn set_low(&mut self) -> Result<(), Self::Error> {
        GpioPin::set_low(self)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        GpioPin::set_high(self)
    }
}

impl<'a, MODE: mode::HasOutput, B, M> hal_digital::StatefulOutputPin for GpioPin<'a, MODE, M>
where
    B: Sc16is752Bus,
    B::BusError: core::fmt::Debug,
    M: PortMutex<Port = Driver<B>>,
{
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(GpioPin::is_set_high(self))
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(GpioPin::is_set_low(self))
    }

    fn toggle(&mut self) -> Result<(), Self::Error> {
        GpioPin::toggle(self)
    }
}

/// Set multiple output pins with a single IOState write.
///
/// Setting pins one after the other takes one bus transaction each, so the pins would change
/// state at noticeably different times.
///
/// ## Example
/// ```no_run
/// # let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[] as &[embedded_hal_mock::eh1::i2c::Transaction]);
/// # let sc = sc16is752::Sc16is752::new_i2c(i2c, 0x48, sc16is752::Config::default());
/// let mut led = sc.gpio_output(0, false).unwrap();
/// let mut enable = sc.gpio_output(1, true).unwrap();
/// sc16is752::write_multiple([&mut led, &mut enable], [true, false]).unwrap();
/// ```
///
/// # Panics
/// Panics if the pins belong to different controllers.
pub fn write_multiple<B, M, MODE: mode::HasOutput, const N: usize>(
    pins: [&mut GpioPin<'_, MODE, M>; N],
    states: [bool; N],
) -> Result<(), Error<B::BusError>>
where
    B: Sc16is752Bus,
    M: PortMutex<Port = Driver<B>>,
{
    let mut mask_set_high = 0x00;
    let mut mask_set_low = 0x00;

    let Some(first) = pins.first() else {
        return Ok(());
    };
    let port_driver = first.port_driver();
    for (pin, state) in pins.iter().zip(states.iter()) {
        assert!(core::ptr::eq(pin.port_driver(), port_driver));
        if *state {
            mask_set_high |= pin.pin_mask();
        } else {
            mask_set_low |= pin.pin_mask();
        }
    }

    port_driver.lock(|drv| drv.write_outputs(mask_set_high, mask_set_low))?;
    Ok(())
}

/// Read multiple input pins with a single IOState read.
///
/// ## Example
/// ```no_run
/// # let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[] as &[embedded_hal_mock::eh1::i2c::Transaction]);
/// # let sc = sc16is752::Sc16is752::new_i2c(i2c, 0x48, sc16is752::Config::default());
/// let a = sc.gpio_input(4, sc16is752::ResistorMode::Disabled).unwrap();
/// let b = sc.gpio_input(5, sc16is752::ResistorMode::Disabled).unwrap();
/// let values = sc16is752::read_multiple([&a, &b]).unwrap();
/// ```
///
/// # Panics
/// Panics if the pins belong to different controllers.
pub fn read_multiple<B, M, MODE: mode::HasInput, const N: usize>(
    pins: [&GpioPin<'_, MODE, M>; N],
) -> Result<[bool; N], Error<B::BusError>>
where
    B: Sc16is752Bus,
    M: PortMutex<Port = Driver<B>>,
{
    let mut ret = [false; N];
    let Some(first) = pins.first() else {
        return Ok(ret);
    };
    let port_driver = first.port_driver();
    let state = port_driver.lock(|drv| drv.read_io_state())?;

    for (pin, value) in pins.iter().zip(ret.iter_mut()) {
        assert!(core::ptr::eq(pin.port_driver(), port_driver));
        *value = state & pin.pin_mask() != 0;
    }
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, InterruptEdge, Sc16is752};
    use embedded_hal::digital::{InputPin, OutputPin, StatefulOutputPin};
    use embedded_hal_mock::eh1::i2c as mock_i2c;

    const ADDR: u8 = 0x48;

    #[test]
    fn output_sets_level_before_direction() {
        let expectations = [
            // gpio_output(3, false)
            mock_i2c::Transaction::write_read(ADDR, vec![0x58], vec![0xff]),
            mock_i2c::Transaction::write(ADDR, vec![0x58, 0xf7]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x50], vec![0x00]),
            mock_i2c::Transaction::write(ADDR, vec![0x50, 0x08]),
            // set_high
            mock_i2c::Transaction::write_read(ADDR, vec![0x58], vec![0xf7]),
            mock_i2c::Transaction::write(ADDR, vec![0x58, 0xff]),
            // toggle
            mock_i2c::Transaction::write_read(ADDR, vec![0x58], vec![0xff]),
            mock_i2c::Transaction::write(ADDR, vec![0x58, 0xf7]),
        ];
        let mut bus = mock_i2c::Mock::new(&expectations);

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, Config::default());
        let mut pin = sc.gpio_output(3, false).unwrap();
        assert!(pin.is_set_low());
        pin.set_high().unwrap();
        assert!(pin.is_set_high());
        StatefulOutputPin::toggle(&mut pin).unwrap();
        assert!(!StatefulOutputPin::is_set_high(&mut pin).unwrap());

        bus.done();
    }

    #[test]
    fn pin_claims_are_checked_before_bus_access() {
        let expectations = [
            mock_i2c::Transaction::write_read(ADDR, vec![0x58], vec![0x01]),
            mock_i2c::Transaction::write(ADDR, vec![0x58, 0x09]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x50], vec![0x00]),
            mock_i2c::Transaction::write(ADDR, vec![0x50, 0x08]),
        ];
        let mut bus = mock_i2c::Mock::new(&expectations);

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, Config::default());
        let _out = sc.gpio_output(3, true).unwrap();

        assert!(matches!(
            sc.gpio_input(3, ResistorMode::Disabled),
            Err(Error::PortInUse)
        ));
        assert!(matches!(sc.gpio_output(3, false), Err(Error::PortInUse)));
        assert!(matches!(
            sc.gpio_input(8, ResistorMode::Disabled),
            Err(Error::InvalidPin(8))
        ));
        assert!(matches!(
            sc.gpio_input(2, ResistorMode::PullUp),
            Err(Error::UnsupportedResistorMode)
        ));
        assert!(matches!(
            sc.gpio_input(2, ResistorMode::PullDown),
            Err(Error::UnsupportedResistorMode)
        ));

        bus.done();
    }

    #[test]
    fn input_with_interrupt_line() {
        let expectations = [
            // gpio_input(0)
            mock_i2c::Transaction::write_read(ADDR, vec![0x50], vec![0x00]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x60], vec![0x00]),
            mock_i2c::Transaction::write(ADDR, vec![0x60, 0x01]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x58], vec![0x01]),
            // is_high, read twice because of the zero value
            mock_i2c::Transaction::write_read(ADDR, vec![0x58], vec![0x00]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x58], vec![0x00]),
            // is_high through the digital trait
            mock_i2c::Transaction::write_read(ADDR, vec![0x58], vec![0x81]),
        ];
        let mut bus = mock_i2c::Mock::new(&expectations);

        let config = Config {
            interrupt_edge: Some(InterruptEdge::Falling),
            ..Config::default()
        };
        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, config);
        let mut pin = sc.gpio_input(0, ResistorMode::Disabled).unwrap();
        assert!(pin.state());
        assert!(!pin.is_high().unwrap());
        assert!(InputPin::is_high(&mut pin).unwrap());
        assert_eq!(pin.pin_number(), 0);

        bus.done();
    }

    #[test]
    fn released_pin_can_be_claimed_again() {
        let expectations = [
            mock_i2c::Transaction::write_read(ADDR, vec![0x50], vec![0x00]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x58], vec![0x20]),
            // now as an output driven low
            mock_i2c::Transaction::write_read(ADDR, vec![0x58], vec![0x20]),
            mock_i2c::Transaction::write(ADDR, vec![0x58, 0x00]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x50], vec![0x00]),
            mock_i2c::Transaction::write(ADDR, vec![0x50, 0x20]),
            // already low
            mock_i2c::Transaction::write_read(ADDR, vec![0x58], vec![0x40]),
        ];
        let mut bus = mock_i2c::Mock::new(&expectations);

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, Config::default());
        let pin = sc.gpio_input(5, ResistorMode::Disabled).unwrap();
        drop(pin);
        let mut pin = sc.gpio_output(5, false).unwrap();
        assert!(pin.is_set_low());
        OutputPin::set_low(&mut pin).unwrap();

        bus.done();
    }

    #[test]
    fn multiple_pins_in_one_transaction() {
        let expectations = [
            // outputs 0 and 1, inputs 6 and 7
            mock_i2c::Transaction::write_read(ADDR, vec![0x58], vec![0xc0]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x50], vec![0x00]),
            mock_i2c::Transaction::write(ADDR, vec![0x50, 0x01]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x58], vec![0xc0]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x50], vec![0x01]),
            mock_i2c::Transaction::write(ADDR, vec![0x50, 0x03]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x50], vec![0x03]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x58], vec![0xc0]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x50], vec![0x03]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x58], vec![0xc0]),
            // write_multiple
            mock_i2c::Transaction::write_read(ADDR, vec![0x58], vec![0xc0]),
            mock_i2c::Transaction::write(ADDR, vec![0x58, 0xc1]),
            // read_multiple
            mock_i2c::Transaction::write_read(ADDR, vec![0x58], vec![0x41]),
        ];
        let mut bus = mock_i2c::Mock::new(&expectations);

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, Config::default());
        let mut out0 = sc.gpio_output(0, false).unwrap();
        let mut out1 = sc.gpio_output(1, false).unwrap();
        let in6 = sc.gpio_input(6, ResistorMode::Disabled).unwrap();
        let in7 = sc.gpio_input(7, ResistorMode::Disabled).unwrap();

        write_multiple([&mut out0, &mut out1], [true, false]).unwrap();
        assert!(out0.is_set_high());
        assert!(out1.is_set_low());
        assert_eq!(read_multiple([&in6, &in7]).unwrap(), [true, false]);

        bus.done();
    }
}
