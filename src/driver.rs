use crate::bus::Sc16is752Bus;
use crate::channel::ChannelEventHandler;
use crate::fifo::CircularByteBuffer;
use crate::regs::{subaddress, ChannelId, Register};
use crate::{Config, PinChangeHandler};

/// Bookkeeping for one of the eight GPIO pins.
#[derive(Clone, Copy)]
pub(crate) enum PinSlot {
    Free,
    Input {
        level: bool,
        handler: Option<PinChangeHandler>,
    },
    Output {
        level: bool,
    },
}

pub(crate) enum RxState {
    Polled,
    InterruptDriven(CircularByteBuffer),
}

/// Per-channel state while the channel is open.
pub(crate) struct ChannelState {
    pub(crate) rx: RxState,
    /// Overrun seen by a drain and not yet taken by the consumer.
    pub(crate) overrun_pending: bool,
    pub(crate) dropped_bytes: u32,
    /// Bytes rejected by a full software buffer since the last accepted byte.
    pub(crate) full_streak: u32,
    pub(crate) last_full_report: Option<u64>,
    pub(crate) handler: Option<ChannelEventHandler>,
}

impl ChannelState {
    pub(crate) fn new(rx: RxState) -> Self {
        Self {
            rx,
            overrun_pending: false,
            dropped_bytes: 0,
            full_streak: 0,
            last_full_report: None,
            handler: None,
        }
    }
}

/// Register-level driver and owner of all port state of one controller.
///
/// Pins and channels handed out by [`crate::Sc16is752`] only carry an index into this
/// structure and reach it through the [`crate::PortMutex`].
pub struct Driver<B> {
    bus: B,
    pub(crate) config: Config,
    pub(crate) pins: [PinSlot; 8],
    /// IOState of the input pins as of the last GPIO change that was serviced.
    pub(crate) gpio_last: u8,
    pub(crate) channels: [Option<ChannelState>; 2],
    /// Platform time as of the last interrupt, in milliseconds.
    pub(crate) now_ms: u64,
}

impl<B> Driver<B> {
    pub fn new(bus: B, config: Config) -> Self {
        Self {
            bus,
            config,
            pins: [PinSlot::Free; 8],
            gpio_last: 0x00,
            channels: [None, None],
            now_ms: 0,
        }
    }

    pub(crate) fn has_interrupt_line(&self) -> bool {
        self.config.interrupt_edge.is_some()
    }

    /// Mask of pins currently bound to an input port.
    pub(crate) fn input_mask(&self) -> u8 {
        self.pins
            .iter()
            .enumerate()
            .filter(|(_, slot)| matches!(slot, PinSlot::Input { .. }))
            .fold(0, |m, (i, _)| m | (1 << i))
    }

    /// Whether any GPIO port or channel handle is alive.
    pub(crate) fn has_bound_ports(&self) -> bool {
        self.pins.iter().any(|slot| !matches!(slot, PinSlot::Free))
            || self.channels.iter().any(Option::is_some)
    }

    pub(crate) fn channel_state(&mut self, channel: ChannelId) -> Option<&mut ChannelState> {
        self.channels[channel.index()].as_mut()
    }
}

impl<B: Sc16is752Bus> Driver<B> {
    pub(crate) fn read_register(&mut self, reg: Register) -> Result<u8, B::BusError> {
        debug_assert!(reg.is_general());
        self.bus.read_reg(subaddress(reg, ChannelId::A))
    }

    pub(crate) fn write_register(&mut self, reg: Register, value: u8) -> Result<(), B::BusError> {
        debug_assert!(reg.is_general());
        self.bus.write_reg(subaddress(reg, ChannelId::A), value)
    }

    pub(crate) fn read_channel_register(
        &mut self,
        reg: Register,
        channel: ChannelId,
    ) -> Result<u8, B::BusError> {
        self.bus.read_reg(subaddress(reg, channel))
    }

    pub(crate) fn write_channel_register(
        &mut self,
        reg: Register,
        channel: ChannelId,
        value: u8,
    ) -> Result<(), B::BusError> {
        self.bus.write_reg(subaddress(reg, channel), value)
    }

    /// Pull `buf.len()` bytes out of the receive FIFO of `channel`.
    pub(crate) fn read_rx_fifo(
        &mut self,
        channel: ChannelId,
        buf: &mut [u8],
    ) -> Result<(), B::BusError> {
        if buf.is_empty() {
            return Ok(());
        }
        self.bus.read_burst(subaddress(Register::RHR, channel), buf)
    }

    pub(crate) fn set_bit(&mut self, reg: Register, bit: u8) -> Result<(), B::BusError> {
        self.update_reg(subaddress(reg, ChannelId::A), 1 << bit, 0)
    }

    pub(crate) fn clear_bit(&mut self, reg: Register, bit: u8) -> Result<(), B::BusError> {
        self.update_reg(subaddress(reg, ChannelId::A), 0, 1 << bit)
    }

    pub(crate) fn set_channel_bit(
        &mut self,
        reg: Register,
        channel: ChannelId,
        bit: u8,
    ) -> Result<(), B::BusError> {
        self.update_reg(subaddress(reg, channel), 1 << bit, 0)
    }

    pub(crate) fn clear_channel_bit(
        &mut self,
        reg: Register,
        channel: ChannelId,
        bit: u8,
    ) -> Result<(), B::BusError> {
        self.update_reg(subaddress(reg, channel), 0, 1 << bit)
    }

    /// Read-modify-write.  The write is skipped when the value would not change.
    fn update_reg(
        &mut self,
        subaddr: u8,
        mask_set: u8,
        mask_clear: u8,
    ) -> Result<(), B::BusError> {
        let old = self.bus.read_reg(subaddr)?;
        let new = (old | mask_set) & !mask_clear;
        if new != old {
            self.bus.write_reg(subaddr, new)?;
        }
        Ok(())
    }

    /// Read IOState.
    ///
    /// The chip occasionally returns a spurious all-zero value; a zero is therefore read a
    /// second time and the second value wins.
    pub(crate) fn read_io_state(&mut self) -> Result<u8, B::BusError> {
        let state = self.read_register(Register::IOSTATE)?;
        if state != 0x00 {
            return Ok(state);
        }
        self.read_register(Register::IOSTATE)
    }

    /// Drive pins in `mask_high` high and pins in `mask_low` low with a single IOState
    /// read-modify-write.  Returns the new output latch value.
    pub(crate) fn update_io_state(
        &mut self,
        mask_high: u8,
        mask_low: u8,
    ) -> Result<u8, B::BusError> {
        let old = self.read_io_state()?;
        let new = (old | mask_high) & !mask_low;
        if new != old {
            self.write_register(Register::IOSTATE, new)?;
        }
        Ok(new)
    }
}

/// Releases port slots when pin and channel handles are dropped.
///
/// Implemented by [`Driver`]; only needed to name the bounds of the handle types.
pub trait PortRegistry {
    fn release_pin(&mut self, pin: u8);
    fn release_channel(&mut self, channel: ChannelId);
}

impl<B: Sc16is752Bus> PortRegistry for Driver<B> {
    fn release_pin(&mut self, pin: u8) {
        self.pins[pin as usize] = PinSlot::Free;
    }

    /// Free the channel slot.  An interrupt-driven channel also has its receive interrupts
    /// disabled.
    fn release_channel(&mut self, channel: ChannelId) {
        let state = self.channels[channel.index()].take();
        if let Some(ChannelState {
            rx: RxState::InterruptDriven(_),
            ..
        }) = state
        {
            if self
                .write_channel_register(Register::IER, channel, 0x00)
                .is_err()
            {
                log::warn!("{}: failed to disable interrupts on release", channel);
            }
        }
    }
}
