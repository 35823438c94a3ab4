//! This crate provides a blocking interface for driving small SPI-attached display panels from raw
//! GPIO lines and an SPI byte channel.
//!
//! It is built on top of `embedded-hal` 1.0 and `embedded-graphics`, so the same driver runs on a
//! microcontroller HAL or, with the `linux` feature, from Linux userspace through the GPIO
//! character device and spidev.
//!
//! ## Core types
//!
//! - [`session::PanelSession`]: owns one panel's lines, transport and delay, and walks it through
//!   reset, initialisation, frame updates and sleep. Every operation checks the panel's
//!   [`session::PowerState`] first, and the hardware is released when the session is dropped.
//!
//! - [`hw::LineSet`] and [`hw::Transport`]: abstract the GPIO lines (data/command, reset, busy and
//!   an optional chip select) and the write-only SPI channel. [`hw::PinLines`] and
//!   [`hw::HalTransport`] implement them over any `embedded-hal` pins and SPI device.
//!
//! - [`session::PanelModel`]: everything that differs between panels, i.e. size, init table,
//!   reset timing, busy polarity and chip-select handling. Each supported display has its own
//!   module providing a default model:
//!   - [`epd2in9`]: Waveshare 2.9" 128x296 e-paper.
//!   - [`gc9a01`]: GC9A01A 240x240 round TFT.
//!
//! Additionally, the crate provides:
//!
//! - `buffer` module: framebuffers in each panel's wire encoding, which implement
//!   `embedded-graphics::DrawTarget` through [`buffer::Framebuffer::mono_canvas`] and
//!   [`buffer::Framebuffer::rgb_canvas`].
//! - `init` module: table-driven power-on sequences.
//! - `linux` module (feature `linux`): acquiring lines and opening spidev devices.
//!
//! ## Features
//!
//! - `log`: log through the `log` crate.
//! - `defmt`: log through `defmt`.
//! - `linux`: the Linux host backend. Enables `log`.
#![no_std]

extern crate alloc;
#[cfg(feature = "linux")]
extern crate std;

pub mod buffer;
pub mod comms;
pub mod epd2in9;
pub mod error;
pub mod gc9a01;
pub mod hw;
pub mod init;
#[cfg(feature = "linux")]
pub mod linux;
pub mod session;
pub mod window;

mod log;

pub use buffer::{Framebuffer, PixelEncoding};
pub use error::{Error, ErrorKind};
pub use session::{PanelModel, PanelSession, PowerState};
pub use window::RefreshWindow;
