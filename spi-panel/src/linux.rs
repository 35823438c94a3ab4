//! Linux host backend: GPIO lines from a character device and SPI through spidev.
//!
//! ```no_run
//! use embedded_hal::digital::PinState;
//! use spi_panel::{
//!     epd2in9,
//!     hw::{LineRole, LineSpec},
//!     linux,
//! };
//!
//! let lines = [
//!     LineSpec::output(LineRole::DataCommand, 25, PinState::Low),
//!     LineSpec::output(LineRole::Reset, 17, PinState::High),
//!     LineSpec::input(LineRole::Busy, 24),
//! ];
//! let mut panel = linux::open_panel(
//!     "/dev/gpiochip0",
//!     &lines,
//!     "/dev/spidev0.0",
//!     &epd2in9::spi_config(),
//!     epd2in9::config(),
//!     "epd2in9",
//! )?;
//! panel.start()?;
//! # Ok::<(), spi_panel::Error>(())
//! ```
use std::{
    io::Write as _,
    string::{String, ToString},
};

use embedded_hal::{
    digital::PinState,
    spi::{Mode, Phase, Polarity},
};
use linux_embedded_hal::{
    gpio_cdev::{Chip, LineRequestFlags},
    spidev::{SpiModeFlags, Spidev, SpidevOptions},
    CdevPin, Delay,
};

use crate::{
    error::{Error, IoError, ResourceError},
    hw::{validate_lines, Direction, LineSpec, PinLines, SpiConfig, Transport},
    log::{debug, trace},
    session::{PanelModel, PanelSession},
};

/// Lines acquired from a GPIO character device.
pub type CdevLines = PinLines<CdevPin, CdevPin>;

/// A panel driven from Linux userspace.
pub type LinuxPanel = PanelSession<CdevLines, SpidevTransport, Delay>;

/// Requests every line in `lines` from the GPIO chip at `chip_path`, labelled with `consumer`.
///
/// Output lines are driven to their initial level as part of the request. If any line can't be
/// acquired, the ones already requested are released before returning.
pub fn acquire_lines(chip_path: &str, lines: &[LineSpec], consumer: &str) -> Result<CdevLines, Error> {
    validate_lines(lines)?;
    let mut chip = Chip::new(chip_path).map_err(|e| ResourceError::ChipUnavailable {
        chip: chip_path.to_string(),
        reason: e.to_string(),
    })?;

    let mut acquired = PinLines::empty();
    for spec in lines {
        let unavailable = |reason: String| ResourceError::LineUnavailable {
            role: spec.role,
            offset: spec.offset,
            reason,
        };
        let line = chip
            .get_line(spec.offset)
            .map_err(|e| unavailable(e.to_string()))?;
        let (flags, default) = match spec.direction {
            Direction::Output => {
                let level = if spec.active_low { !spec.initial } else { spec.initial };
                (LineRequestFlags::OUTPUT, u8::from(level == PinState::High))
            }
            Direction::Input => (LineRequestFlags::INPUT, 0),
        };
        let handle = line
            .request(flags, default, consumer)
            .map_err(|e| unavailable(e.to_string()))?;
        let pin = CdevPin::new(handle).map_err(|e| unavailable(e.to_string()))?;
        match spec.direction {
            Direction::Output => acquired.insert_output(spec.role, pin, spec.active_low)?,
            Direction::Input => acquired.insert_input(spec.role, pin, spec.active_low)?,
        }
        trace!("Acquired line {} as {:?}", spec.offset, spec.role);
    }
    debug!("Acquired {} lines from {}", lines.len(), chip_path);
    Ok(acquired)
}

/// A [Transport] writing to a spidev character device.
pub struct SpidevTransport {
    spi: Option<Spidev>,
    max_transfer: usize,
}

impl SpidevTransport {
    /// Opens and configures the device. The settings can't be changed afterwards.
    pub fn open(path: &str, config: &SpiConfig) -> Result<Self, Error> {
        let mut spi = Spidev::open(path).map_err(|e| IoError::Open {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        let options = SpidevOptions::new()
            .bits_per_word(config.bits_per_word)
            .max_speed_hz(config.clock_hz)
            .mode(mode_flags(config.mode))
            .build();
        spi.configure(&options).map_err(|e| IoError::Configure {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        debug!("Opened {} at {} Hz", path, config.clock_hz);
        Ok(SpidevTransport {
            spi: Some(spi),
            max_transfer: config.max_transfer.max(1),
        })
    }
}

impl Transport for SpidevTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let spi = self.spi.as_mut().ok_or(IoError::Closed)?;
        let mut sent = 0;
        for chunk in bytes.chunks(self.max_transfer) {
            let written = spi.write(chunk).map_err(|e| IoError::Os(e.to_string()))?;
            sent += written;
            if written != chunk.len() {
                return Err(IoError::ShortWrite {
                    expected: bytes.len(),
                    written: sent,
                }
                .into());
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        self.spi = None;
    }
}

fn mode_flags(mode: Mode) -> SpiModeFlags {
    match (mode.polarity, mode.phase) {
        (Polarity::IdleLow, Phase::CaptureOnFirstTransition) => SpiModeFlags::SPI_MODE_0,
        (Polarity::IdleLow, Phase::CaptureOnSecondTransition) => SpiModeFlags::SPI_MODE_1,
        (Polarity::IdleHigh, Phase::CaptureOnFirstTransition) => SpiModeFlags::SPI_MODE_2,
        (Polarity::IdleHigh, Phase::CaptureOnSecondTransition) => SpiModeFlags::SPI_MODE_3,
    }
}

/// Acquires the lines, opens the SPI device and creates a session for `model`.
pub fn open_panel(
    chip_path: &str,
    lines: &[LineSpec],
    spi_path: &str,
    spi: &SpiConfig,
    model: PanelModel,
    consumer: &str,
) -> Result<LinuxPanel, Error> {
    let lines = acquire_lines(chip_path, lines, consumer)?;
    let transport = SpidevTransport::open(spi_path, spi)?;
    PanelSession::new(lines, transport, Delay, model)
}
