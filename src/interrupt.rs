//! Interrupt dispatch.
//!
//! The SC16IS752 has a single interrupt output shared by both UART channels and the GPIO pins.
//! Call [`InterruptHandler::handle_interrupt()`] from the routine servicing that line (or from a
//! task woken by it).  The handler asks each channel for its pending interrupt source via IIR
//! and services it until the channel reports none:
//!
//! - receive interrupts drain the hardware FIFO into the software buffer of an interrupt-driven
//!   channel and raise [`ChannelEvent`](crate::ChannelEvent)s,
//! - GPIO change interrupts compare the input levels against the last known state and call the
//!   [`PinChangeHandler`](crate::PinChangeHandler) of every input that changed.
//!
//! All callbacks run with the controller locked.
use heapless::Vec;

use crate::driver::Driver;
use crate::regs::{bits, ChannelId, Register, HW_FIFO_SIZE};
use crate::{Error, PortMutex, Sc16is752Bus};

/// Upper bound of IIR reads per channel and interrupt.
pub const MAX_PASSES: usize = 4;

const MAX_SOURCES: usize = 2 * MAX_PASSES;

/// Interrupt source as reported by IIR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptSource {
    None,
    ReceiverLineStatus,
    RxTimeout,
    ReceiverDataReady,
    TransmitterEmpty,
    ModemStatus,
    GpioChange,
    XoffReceived,
    CtsRtsChange,
    /// Reserved encoding, carries the raw IIR value.
    Unknown(u8),
}

impl InterruptSource {
    pub fn decode(iir: u8) -> Self {
        if iir & bits::IIR_NO_INTERRUPT != 0 {
            return InterruptSource::None;
        }
        match iir & bits::IIR_SOURCE_MASK {
            0x06 => InterruptSource::ReceiverLineStatus,
            0x0c => InterruptSource::RxTimeout,
            0x04 => InterruptSource::ReceiverDataReady,
            0x02 => InterruptSource::TransmitterEmpty,
            0x00 => InterruptSource::ModemStatus,
            0x30 => InterruptSource::GpioChange,
            0x10 => InterruptSource::XoffReceived,
            0x20 => InterruptSource::CtsRtsChange,
            _ => InterruptSource::Unknown(iir),
        }
    }

    pub fn is_receive(&self) -> bool {
        matches!(
            self,
            InterruptSource::ReceiverLineStatus
                | InterruptSource::RxTimeout
                | InterruptSource::ReceiverDataReady
        )
    }
}

/// What one call of [`InterruptHandler::handle_interrupt()`] did.
#[derive(Debug, Default, Clone)]
pub struct InterruptReport {
    /// Every source read from IIR, in service order.
    pub sources: Vec<(ChannelId, InterruptSource), MAX_SOURCES>,
    received: [usize; 2],
    overrun: [bool; 2],
    dropped: [usize; 2],
    /// Mask of input pins whose level changed.
    pub pins_changed: u8,
}

impl InterruptReport {
    /// Bytes moved into the software buffer of `channel`.
    pub fn received(&self, channel: ChannelId) -> usize {
        self.received[channel.index()]
    }

    pub fn overrun(&self, channel: ChannelId) -> bool {
        self.overrun[channel.index()]
    }

    pub fn dropped(&self, channel: ChannelId) -> usize {
        self.dropped[channel.index()]
    }

    /// No interrupt was pending.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.pins_changed == 0
    }
}

impl<B: Sc16is752Bus> Driver<B> {
    pub(crate) fn service_interrupts(
        &mut self,
        now_ms: u64,
        report: &mut InterruptReport,
    ) -> Result<(), B::BusError> {
        self.now_ms = now_ms;
        let mut gpio_serviced = false;

        for channel in ChannelId::ALL {
            for _ in 0..MAX_PASSES {
                let iir = self.read_channel_register(Register::IIR, channel)?;
                let source = InterruptSource::decode(iir);
                if source == InterruptSource::None {
                    break;
                }
                log::trace!("{}: IIR {:#04x} ({:?})", channel, iir, source);
                // capacity covers MAX_PASSES per channel
                let _ = report.sources.push((channel, source));

                match source {
                    s if s.is_receive() => {
                        if !self.is_interrupt_driven(channel) {
                            log::debug!(
                                "{}: {:?} interrupt without an interrupt-driven channel",
                                channel,
                                s
                            );
                            self.quiet_receive(channel)?;
                            continue;
                        }
                        let outcome = self.drain_channel(channel)?;
                        self.report_drain(channel, &outcome, true);
                        let i = channel.index();
                        report.received[i] += outcome.received;
                        report.overrun[i] |= outcome.overrun;
                        report.dropped[i] += outcome.dropped;
                    }
                    InterruptSource::GpioChange => {
                        report.pins_changed |= self.service_gpio()?;
                        gpio_serviced = true;
                    }
                    InterruptSource::ModemStatus => {
                        // reading MSR clears the interrupt
                        self.read_channel_register(Register::MSR, channel)?;
                    }
                    InterruptSource::Unknown(raw) => {
                        log::debug!("{}: ignoring unknown interrupt source {:#04x}", channel, raw);
                        break;
                    }
                    _ => {}
                }
            }
        }

        if self.config.gpio_poll_fallback && !gpio_serviced && self.input_mask() != 0 {
            report.pins_changed |= self.service_gpio()?;
        }
        Ok(())
    }

    /// Disable the receive interrupts of a channel without a software buffer.  The FIFO of a
    /// channel that is not open at all is emptied as well.
    fn quiet_receive(&mut self, channel: ChannelId) -> Result<(), B::BusError> {
        self.write_channel_register(Register::IER, channel, 0x00)?;
        if self.channels[channel.index()].is_some() {
            return Ok(());
        }
        self.read_channel_register(Register::LSR, channel)?;
        let level =
            (self.read_channel_register(Register::RXLVL, channel)? as usize).min(HW_FIFO_SIZE);
        let mut discard = [0u8; HW_FIFO_SIZE];
        self.read_rx_fifo(channel, &mut discard[..level])?;
        if level > 0 {
            log::debug!("{}: discarded {} bytes of a closed channel", channel, level);
        }
        Ok(())
    }
}

/// Dispatcher for the shared interrupt line.
///
/// Obtained from [`crate::Sc16is752::interrupt_handler()`].
pub struct InterruptHandler<'a, M> {
    port: &'a M,
}

impl<'a, B, M> InterruptHandler<'a, M>
where
    B: Sc16is752Bus,
    M: PortMutex<Port = Driver<B>>,
{
    pub(crate) fn new(port: &'a M) -> Self {
        Self { port }
    }

    /// Service every pending interrupt source.
    ///
    /// `now_ms` is the current platform time, used to rate-limit buffer-full reports.
    pub fn handle_interrupt(&self, now_ms: u64) -> Result<InterruptReport, Error<B::BusError>> {
        let mut report = InterruptReport::default();
        self.port
            .lock(|drv| drv.service_interrupts(now_ms, &mut report))?;
        Ok(report)
    }
}
