//! Register map of the SC16IS752.
//!
//! Datasheet: https://www.nxp.com/docs/en/data-sheet/SC16IS752_SC16IS762.pdf
//!
//! Every register is addressed by a sub-address byte: bits 6..3 select the register, bits 2..1
//! select the UART channel.  The GPIO registers (IODir..IOControl) are shared by both channels
//! and always use the channel A encoding.

/// One of the two UART channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChannelId {
    A = 0,
    B = 1,
}

impl ChannelId {
    pub const ALL: [ChannelId; 2] = [ChannelId::A, ChannelId::B];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Logical port name, `"Channel A"` or `"Channel B"`.
    pub fn name(self) -> &'static str {
        match self {
            ChannelId::A => "Channel A",
            ChannelId::B => "Channel B",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ChannelId::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl core::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Logical register number (bits 6..3 of the sub-address).
///
/// Several registers share an address and are told apart by access direction or by the
/// state of LCR, which is why this is not an enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Register(u8);

impl Register {
    /// RHR: receive holding register (read)
    pub const RHR: Self = Self(0x00);
    /// THR: transmit holding register (write)
    pub const THR: Self = Self(0x00);
    /// IER: interrupt enable
    pub const IER: Self = Self(0x01);
    /// FCR: FIFO control (write)
    pub const FCR: Self = Self(0x02);
    /// IIR: interrupt identification (read)
    pub const IIR: Self = Self(0x02);
    /// LCR: line control
    pub const LCR: Self = Self(0x03);
    /// MCR: modem control
    pub const MCR: Self = Self(0x04);
    /// LSR: line status
    pub const LSR: Self = Self(0x05);
    /// MSR: modem status
    pub const MSR: Self = Self(0x06);
    /// SPR: scratch pad
    pub const SPR: Self = Self(0x07);
    /// TXLVL: free space in the transmit FIFO
    pub const TXLVL: Self = Self(0x08);
    /// RXLVL: bytes waiting in the receive FIFO
    pub const RXLVL: Self = Self(0x09);
    /// IODir: GPIO direction, 1=output
    pub const IODIR: Self = Self(0x0a);
    /// IOState: GPIO pin levels (read) / output latches (write)
    pub const IOSTATE: Self = Self(0x0b);
    /// IOIntEna: GPIO interrupt-on-change enable
    pub const IOINTENA: Self = Self(0x0c);
    /// IOControl: GPIO latch, modem-pin multiplexing and software reset
    pub const IOCONTROL: Self = Self(0x0e);
    /// EFCR: extra features control (RS485 auto direction)
    pub const EFCR: Self = Self(0x0f);
    /// DLL: divisor latch LSB (while LCR[7] is set)
    pub const DLL: Self = Self(0x00);
    /// DLH: divisor latch MSB (while LCR[7] is set)
    pub const DLH: Self = Self(0x01);

    pub const fn number(self) -> u8 {
        self.0
    }

    /// Whether this register belongs to the controller rather than one channel.
    pub const fn is_general(self) -> bool {
        self.0 >= 0x0a && self.0 <= 0x0e
    }
}

/// Sub-address byte for `reg` on `channel`.
pub const fn subaddress(reg: Register, channel: ChannelId) -> u8 {
    (reg.0 << 3) | ((channel as u8) << 1)
}

/// Size of each hardware FIFO in bytes.
pub const HW_FIFO_SIZE: usize = 64;

pub(crate) mod bits {
    pub const IER_RHR: u8 = 0x01;
    pub const IER_RLS: u8 = 0x04;

    pub const FCR_FIFO_ENABLE: u8 = 0x01;
    pub const FCR_RESET_RX: u8 = 0x02;
    pub const FCR_RESET_TX: u8 = 0x04;

    pub const IIR_NO_INTERRUPT: u8 = 0x01;
    pub const IIR_SOURCE_MASK: u8 = 0x3f;

    pub const LCR_STOP_TWO: u8 = 0x04;
    pub const LCR_PARITY_ENABLE: u8 = 0x08;
    pub const LCR_PARITY_EVEN: u8 = 0x10;
    pub const LCR_DLAB: u8 = 0x80;

    pub const MCR_LOOPBACK_BIT: u8 = 4;

    pub const LSR_OVERRUN: u8 = 0x02;
    pub const LSR_THR_EMPTY: u8 = 0x20;
    pub const LSR_TX_EMPTY: u8 = 0x40;

    pub const EFCR_RTSCON: u8 = 0x10;
    pub const EFCR_RTSINVER: u8 = 0x20;

    pub const IOCONTROL_LATCH_BIT: u8 = 0;
    pub const IOCONTROL_SRESET: u8 = 0x08;
}
