//! Driver for the NXP SC16IS752 dual UART with I2C/SPI interface.
//!
//! The chip provides two UART channels with 64-byte FIFOs and eight GPIO pins behind a single
//! I2C or SPI connection and a shared interrupt output.
//!
//! ```no_run
//! use sc16is752::{ChannelId, Config, InterruptEdge, LineConfig, ResistorMode, RxMode};
//! # let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[] as &[embedded_hal_mock::eh1::i2c::Transaction]);
//! # let delay = embedded_hal_mock::eh1::delay::NoopDelay::new();
//!
//! let config = Config {
//!     interrupt_edge: Some(InterruptEdge::Falling),
//!     ..Config::default()
//! };
//! let sc = sc16is752::Sc16is752::new_i2c(i2c, 0x48, config);
//!
//! let mut uart = sc
//!     .open_channel(
//!         ChannelId::A,
//!         LineConfig::default(),
//!         RxMode::InterruptDriven { buffer_capacity: 256 },
//!         delay,
//!     )
//!     .unwrap();
//! let button = sc.gpio_input(0, ResistorMode::Disabled).unwrap();
//! let mut led = sc.gpio_output(1, false).unwrap();
//!
//! // from the IRQ handler
//! sc.interrupt_handler().handle_interrupt(0).unwrap();
//!
//! let mut buf = [0u8; 32];
//! let n = uart.read(&mut buf).unwrap();
//! uart.write(&buf[..n]).unwrap();
//! led.set_state(button.state()).unwrap();
//! ```
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

mod bus;
mod channel;
mod controller;
mod driver;
mod error;
mod fifo;
mod gpio;
mod interrupt;
mod mutex;
pub mod regs;

pub use bus::{i2c_address, AddressPin, I2cBus, I2cInterface, Sc16is752Bus, SpiBus, SpiInterface};
pub use channel::{
    Channel, ChannelEvent, ChannelEventHandler, DataBits, LineConfig, Parity, Rs485Config,
    RxMode, StopBits, Timeouts, FULL_REPORT_INTERVAL_MS, OVERRUN_MARKER,
};
pub use controller::{Config, InterruptEdge, Sc16is752, DEFAULT_CRYSTAL_HZ};
pub use driver::{Driver, PortRegistry};
pub use error::Error;
pub use fifo::{BufferEmpty, BufferFull, CircularByteBuffer};
pub use gpio::{
    mode, read_multiple, write_multiple, GpioPin, InputPort, OutputPort, PinChange,
    PinChangeHandler, ResistorMode, PIN_COUNT,
};
pub use interrupt::{InterruptHandler, InterruptReport, InterruptSource, MAX_PASSES};
pub use mutex::PortMutex;
pub use regs::ChannelId;
