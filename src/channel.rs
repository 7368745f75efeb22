//! UART channel transport.
//!
//! A [`Channel`] is opened on one of the two UARTs either in [`RxMode::Polled`] mode, where
//! reads go straight to the 64-byte hardware FIFO, or in [`RxMode::InterruptDriven`] mode, where
//! the interrupt dispatcher drains the hardware FIFO into a software [`CircularByteBuffer`] and
//! reads are served from there.
//!
//! All blocking calls sleep through the channel's [`DelayNs`] in steps of
//! [`Timeouts::poll_interval_us`] and fail with [`Error::Timeout`] once the configured timeout
//! is used up.
use crate::driver::{ChannelState, Driver, PortRegistry, RxState};
use crate::fifo::CircularByteBuffer;
use crate::regs::{bits, ChannelId, Register, HW_FIFO_SIZE};
use crate::{Error, PortMutex, Sc16is752Bus};
use embedded_hal::delay::DelayNs;

/// Byte inserted into the software buffer where a hardware overrun lost data.
pub const OVERRUN_MARKER: u8 = 0x00;

/// Minimum time between two "software buffer full" error logs of one channel.
pub const FULL_REPORT_INTERVAL_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataBits {
    Five = 5,
    Six = 6,
    Seven = 7,
    Eight = 8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Number of stop bits.  With five data bits, `Two` yields 1.5 stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StopBits {
    One,
    Two,
}

/// Timeouts of the blocking channel operations, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timeouts {
    pub read_us: u32,
    pub write_us: u32,
    /// Sleep between two checks while waiting.
    pub poll_interval_us: u32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read_us: 1_000_000,
            write_us: 1_000_000,
            poll_interval_us: 1_000,
        }
    }
}

/// Line settings of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineConfig {
    pub baud: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub timeouts: Timeouts,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            baud: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeouts: Timeouts::default(),
        }
    }
}

impl LineConfig {
    /// LCR value for these settings (divisor latch closed).
    pub fn lcr(&self) -> u8 {
        let mut lcr = self.data_bits as u8 - 5;
        if self.stop_bits == StopBits::Two {
            lcr |= bits::LCR_STOP_TWO;
        }
        match self.parity {
            Parity::None => {}
            Parity::Odd => lcr |= bits::LCR_PARITY_ENABLE,
            Parity::Even => lcr |= bits::LCR_PARITY_ENABLE | bits::LCR_PARITY_EVEN,
        }
        lcr
    }

    /// Baud rate divisor for a crystal of `crystal_hz`, rounded to the nearest value.
    ///
    /// `None` if the rate cannot be generated.
    pub fn divisor(&self, crystal_hz: u32) -> Option<u16> {
        if self.baud == 0 {
            return None;
        }
        let clocks = 16 * self.baud as u64;
        let divisor = (crystal_hz as u64 + clocks / 2) / clocks;
        match divisor {
            1..=0xffff => Some(divisor as u16),
            _ => None,
        }
    }
}

/// RS485 half-duplex operation: RTS drives the transceiver's driver-enable input during
/// transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rs485Config {
    /// Drive RTS high instead of low while transmitting.
    pub invert_driver_enable: bool,
}

impl Rs485Config {
    fn efcr(&self) -> u8 {
        let mut efcr = bits::EFCR_RTSCON;
        if self.invert_driver_enable {
            efcr |= bits::EFCR_RTSINVER;
        }
        efcr
    }
}

/// How received data is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RxMode {
    /// Reads poll the hardware receive FIFO.
    Polled,
    /// The interrupt dispatcher drains the hardware FIFO into a software buffer.
    InterruptDriven { buffer_capacity: usize },
}

/// Notifications raised by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelEvent {
    /// The interrupt dispatcher moved `count` bytes into the software buffer.
    DataReceived { channel: ChannelId, count: usize },
    /// The hardware receive FIFO overran; data before the overrun marker is lost.
    BufferOverrun { channel: ChannelId },
    /// `count` received bytes were discarded because the software buffer was full.
    BytesDropped { channel: ChannelId, count: usize },
    /// A blocking read, write or flush ran out of time.
    Timeout { channel: ChannelId },
}

/// Channel event callback.
///
/// Called with the controller locked; it must not access the controller itself.
pub type ChannelEventHandler = fn(ChannelEvent);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DrainOutcome {
    pub(crate) received: usize,
    pub(crate) dropped: usize,
    pub(crate) overrun: bool,
}

impl<B: Sc16is752Bus> Driver<B> {
    pub(crate) fn open_channel(
        &mut self,
        channel: ChannelId,
        line: &LineConfig,
        rs485: Option<Rs485Config>,
        rx: RxMode,
    ) -> Result<(), Error<B::BusError>> {
        if self.channels[channel.index()].is_some() {
            return Err(Error::ChannelAlreadyOpen);
        }
        let divisor = line
            .divisor(self.config.crystal_hz)
            .ok_or(Error::UnsupportedBaudRate(line.baud))?;
        let (rx, ier) = match rx {
            RxMode::Polled => (RxState::Polled, 0x00),
            RxMode::InterruptDriven { buffer_capacity } => {
                if !self.has_interrupt_line() {
                    return Err(Error::InterruptNotConfigured);
                }
                if buffer_capacity == 0 {
                    return Err(Error::InvalidBufferCapacity);
                }
                (
                    RxState::InterruptDriven(CircularByteBuffer::new(buffer_capacity)),
                    bits::IER_RHR | bits::IER_RLS,
                )
            }
        };

        self.write_channel_register(
            Register::FCR,
            channel,
            bits::FCR_FIFO_ENABLE | bits::FCR_RESET_RX | bits::FCR_RESET_TX,
        )?;
        self.write_line_settings(channel, line.lcr(), divisor)?;
        let efcr = rs485.map(|c| c.efcr()).unwrap_or(0x00);
        self.write_channel_register(Register::EFCR, channel, efcr)?;
        self.write_channel_register(Register::IER, channel, ier)?;

        log::debug!(
            "{}: open at {} baud (divisor {}), LCR {:#04x}, rs485: {}",
            channel,
            line.baud,
            divisor,
            line.lcr(),
            rs485.is_some()
        );
        self.channels[channel.index()] = Some(ChannelState::new(rx));
        Ok(())
    }

    /// Write the divisor latch and LCR.  The divisor is always rewritten together with the line
    /// settings.
    pub(crate) fn write_line_settings(
        &mut self,
        channel: ChannelId,
        lcr: u8,
        divisor: u16,
    ) -> Result<(), B::BusError> {
        self.write_channel_register(Register::LCR, channel, lcr | bits::LCR_DLAB)?;
        self.write_channel_register(Register::DLL, channel, divisor as u8)?;
        self.write_channel_register(Register::DLH, channel, (divisor >> 8) as u8)?;
        self.write_channel_register(Register::LCR, channel, lcr)
    }

    pub(crate) fn is_interrupt_driven(&self, channel: ChannelId) -> bool {
        matches!(
            self.channels[channel.index()],
            Some(ChannelState {
                rx: RxState::InterruptDriven(_),
                ..
            })
        )
    }

    pub(crate) fn buffered(&self, channel: ChannelId) -> usize {
        match &self.channels[channel.index()] {
            Some(ChannelState {
                rx: RxState::InterruptDriven(buffer),
                ..
            }) => buffer.len(),
            _ => 0,
        }
    }

    fn with_buffer<R>(
        &mut self,
        channel: ChannelId,
        f: impl FnOnce(&mut CircularByteBuffer) -> R,
    ) -> Option<R> {
        match self.channel_state(channel) {
            Some(ChannelState {
                rx: RxState::InterruptDriven(buffer),
                ..
            }) => Some(f(buffer)),
            _ => None,
        }
    }

    /// Move everything from the hardware receive FIFO into the software buffer.
    ///
    /// Also checks LSR for an overrun.  An overrun places [`OVERRUN_MARKER`] in front of the
    /// bytes of this drain.
    pub(crate) fn drain_channel(
        &mut self,
        channel: ChannelId,
    ) -> Result<DrainOutcome, B::BusError> {
        let mut outcome = DrainOutcome::default();
        if !self.is_interrupt_driven(channel) {
            return Ok(outcome);
        }

        let lsr = self.read_channel_register(Register::LSR, channel)?;
        let level =
            (self.read_channel_register(Register::RXLVL, channel)? as usize).min(HW_FIFO_SIZE);
        let mut data = [0u8; HW_FIFO_SIZE];
        self.read_rx_fifo(channel, &mut data[..level])?;

        let now = self.now_ms;
        let Some(ChannelState {
            rx: RxState::InterruptDriven(buffer),
            overrun_pending,
            dropped_bytes,
            full_streak,
            last_full_report,
            ..
        }) = self.channels[channel.index()].as_mut()
        else {
            return Ok(outcome);
        };

        let mut push = |byte: u8, outcome: &mut DrainOutcome| match buffer.write(byte) {
            Ok(()) => *full_streak = 0,
            Err(_) => {
                *full_streak = full_streak.saturating_add(1);
                *dropped_bytes = dropped_bytes.saturating_add(1);
                outcome.dropped += 1;
            }
        };

        if lsr & bits::LSR_OVERRUN != 0 {
            log::warn!("{}: receive FIFO overrun, data lost", channel);
            *overrun_pending = true;
            outcome.overrun = true;
            push(OVERRUN_MARKER, &mut outcome);
        }
        for &byte in &data[..level] {
            push(byte, &mut outcome);
        }
        outcome.received = level - outcome.dropped.min(level);

        if outcome.dropped > 0 {
            let due = last_full_report
                .map_or(true, |t| now.saturating_sub(t) >= FULL_REPORT_INTERVAL_MS);
            if due {
                log::error!(
                    "{}: software receive buffer full, {} bytes dropped so far ({} in a row)",
                    channel,
                    dropped_bytes,
                    full_streak
                );
                *last_full_report = Some(now);
            }
        }
        Ok(outcome)
    }

    fn notify(&self, channel: ChannelId, event: ChannelEvent) {
        if let Some(handler) = self.channels[channel.index()]
            .as_ref()
            .and_then(|s| s.handler)
        {
            handler(event);
        }
    }

    /// Pass the result of a drain to the channel's event handler.
    pub(crate) fn report_drain(
        &mut self,
        channel: ChannelId,
        outcome: &DrainOutcome,
        data_received: bool,
    ) {
        if outcome.overrun {
            self.notify(channel, ChannelEvent::BufferOverrun { channel });
        }
        if outcome.dropped > 0 {
            self.notify(
                channel,
                ChannelEvent::BytesDropped {
                    channel,
                    count: outcome.dropped,
                },
            );
        }
        if data_received && outcome.received > 0 {
            self.notify(
                channel,
                ChannelEvent::DataReceived {
                    channel,
                    count: outcome.received,
                },
            );
        }
    }

    fn drain_for_read(&mut self, channel: ChannelId) -> Result<(), B::BusError> {
        let outcome = self.drain_channel(channel)?;
        self.report_drain(channel, &outcome, false);
        Ok(())
    }
}

/// Remaining time budget of one blocking call.
struct Deadline {
    remaining_us: u32,
    step_us: u32,
}

impl Deadline {
    fn new(timeout_us: u32, step_us: u32) -> Self {
        Self {
            remaining_us: timeout_us,
            step_us: step_us.max(1),
        }
    }

    /// Sleep one poll step, or fail if the budget is used up.
    fn sleep<D: DelayNs, E>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        if self.remaining_us == 0 {
            return Err(Error::Timeout);
        }
        let step = self.step_us.min(self.remaining_us);
        delay.delay_us(step);
        self.remaining_us -= step;
        Ok(())
    }
}

/// An open UART channel.
///
/// Obtained from [`crate::Sc16is752::open_channel()`].  Dropping the channel releases it and
/// disables the receive interrupts of an interrupt-driven channel, ignoring bus errors.  Use
/// [`Channel::close()`] to see them.
pub struct Channel<'a, M, D>
where
    M: PortMutex,
    M::Port: PortRegistry,
{
    port: &'a M,
    id: ChannelId,
    line: LineConfig,
    interrupt_driven: bool,
    delay: D,
}

impl<'a, B, M, D> Channel<'a, M, D>
where
    B: Sc16is752Bus,
    M: PortMutex<Port = Driver<B>>,
    D: DelayNs,
{
    pub(crate) fn new(port: &'a M, id: ChannelId, line: LineConfig, rx: RxMode, delay: D) -> Self {
        Self {
            port,
            id,
            line,
            interrupt_driven: matches!(rx, RxMode::InterruptDriven { .. }),
            delay,
        }
    }

    /// Sleep one poll step.  An expired deadline is also raised as [`ChannelEvent::Timeout`].
    fn wait(&mut self, deadline: &mut Deadline) -> Result<(), Error<B::BusError>> {
        let res = deadline.sleep(&mut self.delay);
        if res.is_err() {
            let channel = self.id;
            self.port
                .lock(|drv| drv.notify(channel, ChannelEvent::Timeout { channel }));
        }
        res
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn line_config(&self) -> &LineConfig {
        &self.line
    }

    pub fn is_interrupt_driven(&self) -> bool {
        self.interrupt_driven
    }

    /// Bytes waiting in the hardware FIFO plus the software buffer.
    pub fn bytes_to_read(&mut self) -> Result<usize, Error<B::BusError>> {
        let id = self.id;
        self.port.lock(|drv| {
            let hw = drv.read_channel_register(Register::RXLVL, id)? as usize;
            Ok(hw + drv.buffered(id))
        })
    }

    /// Free space in the hardware transmit FIFO.
    pub fn bytes_to_write(&mut self) -> Result<usize, Error<B::BusError>> {
        let id = self.id;
        let space = self
            .port
            .lock(|drv| drv.read_channel_register(Register::TXLVL, id))?;
        Ok(space as usize)
    }

    /// Read up to `buf.len()` bytes.
    ///
    /// Waits until at least one byte is available and returns what is there without waiting
    /// for more.  Fails with [`Error::Timeout`] if nothing arrives within the read timeout.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error<B::BusError>> {
        if buf.is_empty() {
            return Ok(0);
        }
        let id = self.id;
        let timeouts = self.line.timeouts;
        let mut deadline = Deadline::new(timeouts.read_us, timeouts.poll_interval_us);

        if !self.interrupt_driven {
            let available = loop {
                let level = self
                    .port
                    .lock(|drv| drv.read_channel_register(Register::RXLVL, id))?;
                if level > 0 {
                    break level as usize;
                }
                self.wait(&mut deadline)?;
            };
            let n = available.min(buf.len()).min(HW_FIFO_SIZE);
            self.port.lock(|drv| drv.read_rx_fifo(id, &mut buf[..n]))?;
            return Ok(n);
        }

        // bytes may have arrived without a fresh edge when the interrupt is not latched
        self.port.lock(|drv| drv.drain_for_read(id))?;
        let len = buf.len();
        loop {
            let n = self
                .port
                .lock(|drv| drv.with_buffer(id, |buffer| buffer.move_into(buf, len)))
                .unwrap_or(0);
            if n > 0 {
                return Ok(n);
            }
            self.wait(&mut deadline)?;
        }
    }

    /// Read a single byte if one is available, without blocking.
    pub fn read_byte(&mut self) -> Result<Option<u8>, Error<B::BusError>> {
        let id = self.id;
        if !self.interrupt_driven {
            return self.port.lock(|drv| {
                if drv.read_channel_register(Register::RXLVL, id)? == 0 {
                    return Ok(None);
                }
                let mut byte = [0u8];
                drv.read_rx_fifo(id, &mut byte)?;
                Ok(Some(byte[0]))
            });
        }

        self.port.lock(|drv| {
            drv.drain_for_read(id)?;
            Ok(drv.with_buffer(id, |buffer| buffer.read().ok()).flatten())
        })
    }

    /// Transmit all of `data`.
    ///
    /// Either every byte is handed to the transmit FIFO or the call fails with
    /// [`Error::Timeout`]; the write timeout covers the whole call.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, Error<B::BusError>> {
        if data.is_empty() {
            return Ok(0);
        }
        let id = self.id;
        let timeouts = self.line.timeouts;
        let mut deadline = Deadline::new(timeouts.write_us, timeouts.poll_interval_us);

        loop {
            let lsr = self
                .port
                .lock(|drv| drv.read_channel_register(Register::LSR, id))?;
            if lsr & bits::LSR_THR_EMPTY != 0 {
                break;
            }
            self.wait(&mut deadline)?;
        }

        let mut space = 0;
        for &byte in data {
            while space == 0 {
                space = self
                    .port
                    .lock(|drv| drv.read_channel_register(Register::TXLVL, id))?;
                if space == 0 {
                    self.wait(&mut deadline)?;
                }
            }
            self.port
                .lock(|drv| drv.write_channel_register(Register::THR, id, byte))?;
            space -= 1;
        }
        Ok(data.len())
    }

    /// Wait until the transmitter has shifted out every byte.
    pub fn flush(&mut self) -> Result<(), Error<B::BusError>> {
        let id = self.id;
        let timeouts = self.line.timeouts;
        let mut deadline = Deadline::new(timeouts.write_us, timeouts.poll_interval_us);
        loop {
            let lsr = self
                .port
                .lock(|drv| drv.read_channel_register(Register::LSR, id))?;
            if lsr & bits::LSR_TX_EMPTY != 0 {
                return Ok(());
            }
            self.wait(&mut deadline)?;
        }
    }

    /// Discard everything received so far, in the hardware FIFO and in the software buffer.
    pub fn clear_receive_buffer(&mut self) -> Result<(), Error<B::BusError>> {
        let id = self.id;
        self.port.lock(|drv| {
            drv.write_channel_register(
                Register::FCR,
                id,
                bits::FCR_FIFO_ENABLE | bits::FCR_RESET_RX,
            )?;
            drv.with_buffer(id, |buffer| buffer.clear());
            Ok(())
        })
    }

    fn apply_line(&mut self, line: LineConfig) -> Result<(), Error<B::BusError>> {
        let id = self.id;
        let divisor = self
            .port
            .lock(|drv| line.divisor(drv.config.crystal_hz))
            .ok_or(Error::UnsupportedBaudRate(line.baud))?;
        self.port
            .lock(|drv| drv.write_line_settings(id, line.lcr(), divisor))?;
        self.line = line;
        Ok(())
    }

    pub fn set_baud_rate(&mut self, baud: u32) -> Result<(), Error<B::BusError>> {
        self.apply_line(LineConfig { baud, ..self.line })
    }

    pub fn set_parity(&mut self, parity: Parity) -> Result<(), Error<B::BusError>> {
        self.apply_line(LineConfig { parity, ..self.line })
    }

    pub fn set_stop_bits(&mut self, stop_bits: StopBits) -> Result<(), Error<B::BusError>> {
        self.apply_line(LineConfig {
            stop_bits,
            ..self.line
        })
    }

    pub fn set_data_bits(&mut self, data_bits: DataBits) -> Result<(), Error<B::BusError>> {
        self.apply_line(LineConfig {
            data_bits,
            ..self.line
        })
    }

    pub fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.line.timeouts = timeouts;
    }

    /// Baud rate actually generated with the current divisor.
    pub fn actual_baud(&self) -> u32 {
        let crystal = self.port.lock(|drv| drv.config.crystal_hz);
        match self.line.divisor(crystal) {
            Some(divisor) => crystal / (16 * divisor as u32),
            None => 0,
        }
    }

    /// Internally connect the transmitter output to the receiver input.
    pub fn set_loopback(&mut self, enable: bool) -> Result<(), Error<B::BusError>> {
        let id = self.id;
        self.port.lock(|drv| {
            if enable {
                drv.set_channel_bit(Register::MCR, id, bits::MCR_LOOPBACK_BIT)
            } else {
                drv.clear_channel_bit(Register::MCR, id, bits::MCR_LOOPBACK_BIT)
            }
        })?;
        Ok(())
    }

    /// Whether an overrun was detected since the last call.
    pub fn take_overrun(&mut self) -> bool {
        let id = self.id;
        self.port.lock(|drv| {
            drv.channel_state(id)
                .map(|s| core::mem::replace(&mut s.overrun_pending, false))
                .unwrap_or(false)
        })
    }

    /// Total number of received bytes discarded because the software buffer was full.
    pub fn dropped_bytes(&self) -> u32 {
        let id = self.id;
        self.port
            .lock(|drv| drv.channel_state(id).map(|s| s.dropped_bytes).unwrap_or(0))
    }

    pub fn set_event_handler(&mut self, handler: Option<ChannelEventHandler>) {
        let id = self.id;
        self.port.lock(|drv| {
            if let Some(state) = drv.channel_state(id) {
                state.handler = handler;
            }
        });
    }

    /// Disable the channel's interrupts and release it.
    pub fn close(self) -> Result<(), Error<B::BusError>> {
        let id = self.id;
        self.port.lock(|drv| {
            let res = drv.write_channel_register(Register::IER, id, 0x00);
            if res.is_ok() {
                drv.channels[id.index()] = None;
            }
            res
        })?;
        Ok(())
    }
}

impl<'a, M, D> Drop for Channel<'a, M, D>
where
    M: PortMutex,
    M::Port: PortRegistry,
{
    fn drop(&mut self) {
        let id = self.id;
        self.port.lock(|drv| drv.release_channel(id));
    }
}

impl<'a, B, M, D> embedded_io::ErrorType for Channel<'a, M, D>
where
    B: Sc16is752Bus,
    B::BusError: core::fmt::Debug,
    M: PortMutex<Port = Driver<B>>,
{
    type Error = Error<B::BusError>;
}

impl<'a, B, M, D> embedded_io::Read for Channel<'a, M, D>
where
    B: Sc16is752Bus,
    B::BusError: core::fmt::Debug,
    M: PortMutex<Port = Driver<B>>,
    D: DelayNs,
{
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        Channel::read(self, buf)
    }
}

impl<'a, B, M, D> embedded_io::ReadReady for Channel<'a, M, D>
where
    B: Sc16is752Bus,
    B::BusError: core::fmt::Debug,
    M: PortMutex<Port = Driver<B>>,
    D: DelayNs,
{
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.bytes_to_read()? > 0)
    }
}

impl<'a, B, M, D> embedded_io::Write for Channel<'a, M, D>
where
    B: Sc16is752Bus,
    B::BusError: core::fmt::Debug,
    M: PortMutex<Port = Driver<B>>,
    D: DelayNs,
{
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Channel::write(self, buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Channel::flush(self)
    }
}

impl<'a, B, M, D> embedded_io::WriteReady for Channel<'a, M, D>
where
    B: Sc16is752Bus,
    B::BusError: core::fmt::Debug,
    M: PortMutex<Port = Driver<B>>,
    D: DelayNs,
{
    fn write_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.bytes_to_write()? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, InterruptEdge, Sc16is752};
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c as mock_i2c;
    use std::sync::Mutex;

    const ADDR: u8 = 0x48;

    fn irq_config() -> Config {
        Config {
            interrupt_edge: Some(InterruptEdge::Falling),
            ..Config::default()
        }
    }

    fn fast_line() -> LineConfig {
        LineConfig {
            timeouts: Timeouts {
                read_us: 200,
                write_us: 200,
                poll_interval_us: 100,
            },
            ..LineConfig::default()
        }
    }

    /// Register writes issued by `open` for 9600 8N1 on a 14.7456MHz crystal.
    fn open_sequence(ch: u8, efcr: u8, ier: u8) -> Vec<mock_i2c::Transaction> {
        vec![
            mock_i2c::Transaction::write(ADDR, vec![0x10 | ch, 0x07]),
            mock_i2c::Transaction::write(ADDR, vec![0x18 | ch, 0x83]),
            mock_i2c::Transaction::write(ADDR, vec![0x00 | ch, 0x60]),
            mock_i2c::Transaction::write(ADDR, vec![0x08 | ch, 0x00]),
            mock_i2c::Transaction::write(ADDR, vec![0x18 | ch, 0x03]),
            mock_i2c::Transaction::write(ADDR, vec![0x78 | ch, efcr]),
            mock_i2c::Transaction::write(ADDR, vec![0x08 | ch, ier]),
        ]
    }

    #[test]
    fn line_settings() {
        let line = LineConfig {
            data_bits: DataBits::Seven,
            parity: Parity::Even,
            stop_bits: StopBits::Two,
            ..LineConfig::default()
        };
        assert_eq!(line.lcr(), 0x1e);
        assert_eq!(LineConfig::default().lcr(), 0x03);
        assert_eq!(line.divisor(1_843_200), Some(12));
        assert_eq!(LineConfig { baud: 115_200, ..line }.divisor(14_745_600), Some(8));
        assert_eq!(LineConfig { baud: 0, ..line }.divisor(14_745_600), None);
        assert_eq!(LineConfig { baud: 1, ..line }.divisor(14_745_600), None);
    }

    #[test]
    fn open_polled_and_reject_second_open() {
        let mut bus = mock_i2c::Mock::new(&open_sequence(0x00, 0x00, 0x00));

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, Config::default());
        let ch = sc
            .open_channel(ChannelId::A, LineConfig::default(), RxMode::Polled, NoopDelay::new())
            .unwrap();
        assert!(!ch.is_interrupt_driven());
        assert_eq!(ch.actual_baud(), 9600);

        let again = sc.open_channel(
            ChannelId::A,
            LineConfig::default(),
            RxMode::Polled,
            NoopDelay::new(),
        );
        assert!(matches!(again, Err(Error::ChannelAlreadyOpen)));
        let rs485 = sc.open_channel_rs485(
            ChannelId::A,
            LineConfig::default(),
            Rs485Config::default(),
            RxMode::Polled,
            NoopDelay::new(),
        );
        assert!(matches!(rs485, Err(Error::ChannelAlreadyOpen)));

        bus.done();
    }

    #[test]
    fn reopen_after_drop() {
        let mut expectations = open_sequence(0x02, 0x00, 0x00);
        expectations.extend(open_sequence(0x02, 0x00, 0x00));
        let mut bus = mock_i2c::Mock::new(&expectations);

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, Config::default());
        let ch = sc
            .open_channel(ChannelId::B, LineConfig::default(), RxMode::Polled, NoopDelay::new())
            .unwrap();
        drop(ch);
        let _ch = sc
            .open_named("Channel B", LineConfig::default(), RxMode::Polled, NoopDelay::new())
            .unwrap();

        bus.done();
    }

    #[test]
    fn open_rejects_bad_configuration() {
        let expectations: [mock_i2c::Transaction; 0] = [];
        let mut bus = mock_i2c::Mock::new(&expectations);

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, Config::default());
        let res = sc.open_channel(
            ChannelId::A,
            LineConfig::default(),
            RxMode::InterruptDriven { buffer_capacity: 64 },
            NoopDelay::new(),
        );
        assert!(matches!(res, Err(Error::InterruptNotConfigured)));

        let res = sc.open_channel(
            ChannelId::A,
            LineConfig {
                baud: 1,
                ..LineConfig::default()
            },
            RxMode::Polled,
            NoopDelay::new(),
        );
        assert!(matches!(res, Err(Error::UnsupportedBaudRate(1))));

        let res = sc.open_named(
            "Channel C",
            LineConfig::default(),
            RxMode::Polled,
            NoopDelay::new(),
        );
        assert!(matches!(res, Err(Error::UnknownChannel)));

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, irq_config());
        let res = sc.open_channel(
            ChannelId::B,
            LineConfig::default(),
            RxMode::InterruptDriven { buffer_capacity: 0 },
            NoopDelay::new(),
        );
        assert!(matches!(res, Err(Error::InvalidBufferCapacity)));

        bus.done();
    }

    #[test]
    fn named_channel_in_use() {
        let mut bus = mock_i2c::Mock::new(&open_sequence(0x00, 0x00, 0x00));

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, Config::default());
        let _ch = sc
            .open_named("Channel A", LineConfig::default(), RxMode::Polled, NoopDelay::new())
            .unwrap();
        let res = sc.open_named(
            "Channel A",
            LineConfig::default(),
            RxMode::Polled,
            NoopDelay::new(),
        );
        assert!(matches!(res, Err(Error::PortInUse)));

        bus.done();
    }

    #[test]
    fn open_rs485() {
        let mut expectations = open_sequence(0x00, 0x10, 0x00);
        expectations.extend(open_sequence(0x02, 0x30, 0x00));
        let mut bus = mock_i2c::Mock::new(&expectations);

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, Config::default());
        let _a = sc
            .open_channel_rs485(
                ChannelId::A,
                LineConfig::default(),
                Rs485Config::default(),
                RxMode::Polled,
                NoopDelay::new(),
            )
            .unwrap();
        let _b = sc
            .open_channel_rs485(
                ChannelId::B,
                LineConfig::default(),
                Rs485Config {
                    invert_driver_enable: true,
                },
                RxMode::Polled,
                NoopDelay::new(),
            )
            .unwrap();

        bus.done();
    }

    #[test]
    fn polled_read_waits_for_data() {
        let mut expectations = open_sequence(0x00, 0x00, 0x00);
        expectations.extend([
            mock_i2c::Transaction::write_read(ADDR, vec![0x48], vec![0x00]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x48], vec![0x03]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x00], vec![b'a', b'b', b'c']),
            // second read only has room for two bytes
            mock_i2c::Transaction::write_read(ADDR, vec![0x48], vec![0x05]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x00], vec![b'd', b'e']),
        ]);
        let mut bus = mock_i2c::Mock::new(&expectations);

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, Config::default());
        let mut ch = sc
            .open_channel(ChannelId::A, fast_line(), RxMode::Polled, NoopDelay::new())
            .unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(ch.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(ch.read(&mut buf[..2]).unwrap(), 2);
        assert_eq!(&buf[..2], b"de");

        bus.done();
    }

    #[test]
    fn polled_read_times_out() {
        let mut expectations = open_sequence(0x00, 0x00, 0x00);
        expectations.extend([
            mock_i2c::Transaction::write_read(ADDR, vec![0x48], vec![0x00]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x48], vec![0x00]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x48], vec![0x00]),
            // non-blocking variant
            mock_i2c::Transaction::write_read(ADDR, vec![0x48], vec![0x00]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x48], vec![0x01]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x00], vec![0x7e]),
        ]);
        let mut bus = mock_i2c::Mock::new(&expectations);

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, Config::default());
        let mut ch = sc
            .open_channel(ChannelId::A, fast_line(), RxMode::Polled, NoopDelay::new())
            .unwrap();

        let mut buf = [0u8; 8];
        assert!(matches!(ch.read(&mut buf), Err(Error::Timeout)));
        assert_eq!(ch.read_byte().unwrap(), None);
        assert_eq!(ch.read_byte().unwrap(), Some(0x7e));

        bus.done();
    }

    #[test]
    fn interrupt_read_drains_hardware_fifo_first() {
        let mut expectations = open_sequence(0x02, 0x00, 0x05);
        expectations.extend([
            mock_i2c::Transaction::write_read(ADDR, vec![0x4a], vec![0x02]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x2a], vec![0x60]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x4a], vec![0x02]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x02], vec![0x41, 0x42]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x4a], vec![0x00]),
            // empty drain, then the buffer stays empty until the deadline
            mock_i2c::Transaction::write_read(ADDR, vec![0x2a], vec![0x60]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x4a], vec![0x00]),
            // drop disables the receive interrupts
            mock_i2c::Transaction::write(ADDR, vec![0x0a, 0x00]),
        ]);
        let mut bus = mock_i2c::Mock::new(&expectations);

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, irq_config());
        let mut ch = sc
            .open_channel(
                ChannelId::B,
                fast_line(),
                RxMode::InterruptDriven { buffer_capacity: 16 },
                NoopDelay::new(),
            )
            .unwrap();

        assert_eq!(ch.bytes_to_read().unwrap(), 2);
        let mut buf = [0u8; 4];
        assert_eq!(ch.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[0x41, 0x42]);
        assert_eq!(ch.bytes_to_read().unwrap(), 0);
        assert!(matches!(ch.read(&mut buf), Err(Error::Timeout)));
        drop(ch);

        bus.done();
    }

    static OVERRUN_EVENTS: Mutex<Vec<ChannelEvent>> = Mutex::new(Vec::new());

    fn record_overrun(event: ChannelEvent) {
        OVERRUN_EVENTS.lock().unwrap().push(event);
    }

    #[test]
    fn overrun_places_marker_at_drain_position() {
        let mut expectations = open_sequence(0x00, 0x00, 0x05);
        expectations.extend([
            // first drain, no overrun
            mock_i2c::Transaction::write_read(ADDR, vec![0x28], vec![0x60]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x48], vec![0x02]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x00], vec![0x01, 0x02]),
            // second drain reports an overrun
            mock_i2c::Transaction::write_read(ADDR, vec![0x28], vec![0x63]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x48], vec![0x01]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x00], vec![0x03]),
            mock_i2c::Transaction::write(ADDR, vec![0x08, 0x00]),
        ]);
        let mut bus = mock_i2c::Mock::new(&expectations);

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, irq_config());
        let mut ch = sc
            .open_channel(
                ChannelId::A,
                fast_line(),
                RxMode::InterruptDriven { buffer_capacity: 16 },
                NoopDelay::new(),
            )
            .unwrap();
        ch.set_event_handler(Some(record_overrun));

        assert_eq!(ch.read_byte().unwrap(), Some(0x01));
        assert!(!ch.take_overrun());

        let mut buf = [0xffu8; 8];
        assert_eq!(ch.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[0x02, OVERRUN_MARKER, 0x03]);
        assert!(ch.take_overrun());
        assert!(!ch.take_overrun());
        assert_eq!(
            *OVERRUN_EVENTS.lock().unwrap(),
            vec![ChannelEvent::BufferOverrun {
                channel: ChannelId::A
            }]
        );
        drop(ch);

        bus.done();
    }

    #[test]
    fn full_software_buffer_counts_dropped_bytes() {
        let mut expectations = open_sequence(0x00, 0x00, 0x05);
        expectations.extend([
            mock_i2c::Transaction::write_read(ADDR, vec![0x28], vec![0x60]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x48], vec![0x05]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x00], vec![1, 2, 3, 4, 5]),
            mock_i2c::Transaction::write(ADDR, vec![0x08, 0x00]),
        ]);
        let mut bus = mock_i2c::Mock::new(&expectations);

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, irq_config());
        let mut ch = sc
            .open_channel(
                ChannelId::A,
                fast_line(),
                RxMode::InterruptDriven { buffer_capacity: 2 },
                NoopDelay::new(),
            )
            .unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(ch.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[1, 2]);
        assert_eq!(ch.dropped_bytes(), 3);
        drop(ch);

        bus.done();
    }

    #[test]
    fn dropping_interrupt_channel_disables_its_interrupts() {
        let mut expectations = open_sequence(0x00, 0x00, 0x05);
        expectations.push(mock_i2c::Transaction::write(ADDR, vec![0x08, 0x00]));
        // closed explicitly, drop writes nothing more
        expectations.extend(open_sequence(0x02, 0x00, 0x05));
        expectations.push(mock_i2c::Transaction::write(ADDR, vec![0x0a, 0x00]));
        let mut bus = mock_i2c::Mock::new(&expectations);

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, irq_config());
        let a = sc
            .open_channel(
                ChannelId::A,
                fast_line(),
                RxMode::InterruptDriven { buffer_capacity: 8 },
                NoopDelay::new(),
            )
            .unwrap();
        drop(a);
        let b = sc
            .open_channel(
                ChannelId::B,
                fast_line(),
                RxMode::InterruptDriven { buffer_capacity: 8 },
                NoopDelay::new(),
            )
            .unwrap();
        b.close().unwrap();

        bus.done();
    }

    static TIMEOUT_EVENTS: Mutex<Vec<ChannelEvent>> = Mutex::new(Vec::new());

    fn record_timeout(event: ChannelEvent) {
        TIMEOUT_EVENTS.lock().unwrap().push(event);
    }

    #[test]
    fn timeouts_raise_event() {
        let mut expectations = open_sequence(0x02, 0x00, 0x00);
        expectations.extend([
            // THR never empties
            mock_i2c::Transaction::write_read(ADDR, vec![0x2a], vec![0x00]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x2a], vec![0x00]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x2a], vec![0x00]),
            // transmitter never drains
            mock_i2c::Transaction::write_read(ADDR, vec![0x2a], vec![0x20]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x2a], vec![0x20]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x2a], vec![0x20]),
        ]);
        let mut bus = mock_i2c::Mock::new(&expectations);

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, Config::default());
        let mut ch = sc
            .open_channel(ChannelId::B, fast_line(), RxMode::Polled, NoopDelay::new())
            .unwrap();
        ch.set_event_handler(Some(record_timeout));

        assert!(matches!(ch.write(b"x"), Err(Error::Timeout)));
        assert!(matches!(ch.flush(), Err(Error::Timeout)));
        assert_eq!(
            *TIMEOUT_EVENTS.lock().unwrap(),
            vec![
                ChannelEvent::Timeout {
                    channel: ChannelId::B
                };
                2
            ]
        );

        bus.done();
    }

    #[test]
    fn write_waits_for_fifo_space() {
        let mut expectations = open_sequence(0x00, 0x00, 0x00);
        expectations.extend([
            mock_i2c::Transaction::write_read(ADDR, vec![0x28], vec![0x00]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x28], vec![0x60]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x40], vec![0x02]),
            mock_i2c::Transaction::write(ADDR, vec![0x00, b'x']),
            mock_i2c::Transaction::write(ADDR, vec![0x00, b'y']),
            mock_i2c::Transaction::write_read(ADDR, vec![0x40], vec![0x00]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x40], vec![0x40]),
            mock_i2c::Transaction::write(ADDR, vec![0x00, b'z']),
            // flush
            mock_i2c::Transaction::write_read(ADDR, vec![0x28], vec![0x20]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x28], vec![0x60]),
        ]);
        let mut bus = mock_i2c::Mock::new(&expectations);

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, Config::default());
        let mut ch = sc
            .open_channel(ChannelId::A, fast_line(), RxMode::Polled, NoopDelay::new())
            .unwrap();

        assert_eq!(ch.write(b"xyz").unwrap(), 3);
        ch.flush().unwrap();

        bus.done();
    }

    #[test]
    fn write_timeout_is_not_partial() {
        let mut expectations = open_sequence(0x00, 0x00, 0x00);
        expectations.extend([
            mock_i2c::Transaction::write_read(ADDR, vec![0x28], vec![0x60]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x40], vec![0x01]),
            mock_i2c::Transaction::write(ADDR, vec![0x00, b'x']),
            mock_i2c::Transaction::write_read(ADDR, vec![0x40], vec![0x00]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x40], vec![0x00]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x40], vec![0x00]),
        ]);
        let mut bus = mock_i2c::Mock::new(&expectations);

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, Config::default());
        let mut ch = sc
            .open_channel(ChannelId::A, fast_line(), RxMode::Polled, NoopDelay::new())
            .unwrap();

        assert!(matches!(ch.write(b"xy"), Err(Error::Timeout)));

        bus.done();
    }

    #[test]
    fn line_changes_rewrite_divisor() {
        let mut expectations = open_sequence(0x00, 0x00, 0x00);
        expectations.extend([
            // 115200 baud
            mock_i2c::Transaction::write(ADDR, vec![0x18, 0x83]),
            mock_i2c::Transaction::write(ADDR, vec![0x00, 0x08]),
            mock_i2c::Transaction::write(ADDR, vec![0x08, 0x00]),
            mock_i2c::Transaction::write(ADDR, vec![0x18, 0x03]),
            // even parity
            mock_i2c::Transaction::write(ADDR, vec![0x18, 0x9b]),
            mock_i2c::Transaction::write(ADDR, vec![0x00, 0x08]),
            mock_i2c::Transaction::write(ADDR, vec![0x08, 0x00]),
            mock_i2c::Transaction::write(ADDR, vec![0x18, 0x1b]),
            // loopback on
            mock_i2c::Transaction::write_read(ADDR, vec![0x20], vec![0x00]),
            mock_i2c::Transaction::write(ADDR, vec![0x20, 0x10]),
            // clear receive buffer
            mock_i2c::Transaction::write(ADDR, vec![0x10, 0x03]),
            // close
            mock_i2c::Transaction::write(ADDR, vec![0x08, 0x00]),
        ]);
        let mut bus = mock_i2c::Mock::new(&expectations);

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, Config::default());
        let mut ch = sc
            .open_channel(ChannelId::A, LineConfig::default(), RxMode::Polled, NoopDelay::new())
            .unwrap();

        ch.set_baud_rate(115_200).unwrap();
        ch.set_parity(Parity::Even).unwrap();
        assert!(matches!(
            ch.set_baud_rate(0),
            Err(Error::UnsupportedBaudRate(0))
        ));
        assert_eq!(ch.line_config().baud, 115_200);
        assert_eq!(ch.line_config().parity, Parity::Even);
        ch.set_loopback(true).unwrap();
        ch.clear_receive_buffer().unwrap();
        ch.close().unwrap();

        bus.done();
    }

    #[test]
    fn embedded_io_traits() {
        use embedded_io::{Read, ReadReady, Write, WriteReady};

        let mut expectations = open_sequence(0x00, 0x00, 0x00);
        expectations.extend([
            mock_i2c::Transaction::write_read(ADDR, vec![0x48], vec![0x01]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x48], vec![0x01]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x00], vec![0x55]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x40], vec![0x00]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x28], vec![0x60]),
            mock_i2c::Transaction::write_read(ADDR, vec![0x40], vec![0x40]),
            mock_i2c::Transaction::write(ADDR, vec![0x00, 0xaa]),
        ]);
        let mut bus = mock_i2c::Mock::new(&expectations);

        let sc = Sc16is752::new_i2c(bus.clone(), ADDR, Config::default());
        let mut ch = sc
            .open_channel(ChannelId::A, fast_line(), RxMode::Polled, NoopDelay::new())
            .unwrap();

        assert!(ch.read_ready().unwrap());
        let mut buf = [0u8; 1];
        assert_eq!(Read::read(&mut ch, &mut buf).unwrap(), 1);
        assert_eq!(buf[0], 0x55);
        assert!(!ch.write_ready().unwrap());
        assert_eq!(Write::write(&mut ch, &[0xaa]).unwrap(), 1);

        bus.done();
    }
}
