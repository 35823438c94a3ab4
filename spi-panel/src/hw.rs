use embedded_hal::{
    digital::{InputPin, OutputPin, PinState},
    spi::{Mode, SpiDevice},
};

use crate::{
    error::{pin_error, spi_error, Error, IoError, ResourceError},
    log::trace,
};

/// The job a GPIO line does for the panel.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineRole {
    /// Data/command select. Low while an opcode is written, high for parameters and pixels.
    DataCommand,
    /// Hardware reset, held high while the panel runs.
    Reset,
    /// Input asserted by the panel while it is processing.
    Busy,
    /// Optional chip-select driven by the driver rather than the SPI controller.
    ChipSelect,
}

impl LineRole {
    /// The direction every line with this role must have.
    pub fn direction(&self) -> Direction {
        match self {
            LineRole::Busy => Direction::Input,
            _ => Direction::Output,
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Describes how one line should be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpec {
    pub role: LineRole,
    /// Line offset on the GPIO chip.
    pub offset: u32,
    pub direction: Direction,
    /// Logical level driven as soon as an output line is acquired. Ignored for inputs.
    pub initial: PinState,
    /// Inverts the physical level of the line relative to the logical level used by the driver.
    pub active_low: bool,
}

impl LineSpec {
    pub const fn output(role: LineRole, offset: u32, initial: PinState) -> Self {
        LineSpec {
            role,
            offset,
            direction: Direction::Output,
            initial,
            active_low: false,
        }
    }

    pub const fn input(role: LineRole, offset: u32) -> Self {
        LineSpec {
            role,
            offset,
            direction: Direction::Input,
            initial: PinState::Low,
            active_low: false,
        }
    }

    pub const fn active_low(mut self) -> Self {
        self.active_low = true;
        self
    }
}

/// Checks that a set of line specs can be acquired together: no role or offset appears twice,
/// and every line has the direction its role needs.
pub fn validate_lines(lines: &[LineSpec]) -> Result<(), Error> {
    for (i, spec) in lines.iter().enumerate() {
        if spec.direction != spec.role.direction() {
            return Err(ResourceError::WrongDirection(spec.role).into());
        }
        let clash = lines[..i]
            .iter()
            .any(|other| other.offset == spec.offset || other.role == spec.role);
        if clash {
            return Err(ResourceError::DuplicateLine {
                role: spec.role,
                offset: spec.offset,
            }
            .into());
        }
    }
    Ok(())
}

/// The set of GPIO lines owned by one panel.
///
/// Levels are logical: `PinState::High` on an active-low line drives it physically low.
pub trait LineSet {
    /// Drives an output line. Fails if the role isn't held as an output.
    fn set(&mut self, role: LineRole, level: PinState) -> Result<(), Error>;

    /// Reads an input line. Fails if the role isn't held as an input.
    fn get(&mut self, role: LineRole) -> Result<PinState, Error>;

    /// Whether a line is currently held for the role.
    fn has(&self, role: LineRole) -> bool;

    /// Releases every line. Safe to call more than once.
    fn release(&mut self);
}

/// Write-only SPI byte channel, configured once when it is opened.
pub trait Transport {
    /// Writes all of `bytes`, blocking until done. Anything less than a full write is an error.
    fn write(&mut self, bytes: &[u8]) -> Result<(), Error>;

    /// Closes the channel. Safe to call more than once.
    fn close(&mut self);
}

/// Default upper bound for one SPI transfer. Matches the default `bufsiz` of Linux spidev.
pub const DEFAULT_MAX_TRANSFER: usize = 4096;

/// SPI bus settings, fixed for the lifetime of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiConfig {
    pub clock_hz: u32,
    pub mode: Mode,
    pub bits_per_word: u8,
    /// Writes longer than this are split into consecutive transfers.
    pub max_transfer: usize,
}

impl SpiConfig {
    pub const fn new(clock_hz: u32, mode: Mode) -> Self {
        SpiConfig {
            clock_hz,
            mode,
            bits_per_word: 8,
            max_transfer: DEFAULT_MAX_TRANSFER,
        }
    }
}

struct Line<P> {
    pin: P,
    active_low: bool,
}

impl<P> Line<P> {
    fn physical(&self, level: PinState) -> PinState {
        if self.active_low {
            !level
        } else {
            level
        }
    }
}

/// A [LineSet] built from `embedded-hal` pins.
///
/// Works with any HAL's output and input pin types, including `linux-embedded-hal`'s `CdevPin`.
pub struct PinLines<Out, In> {
    dc: Option<Line<Out>>,
    reset: Option<Line<Out>>,
    chip_select: Option<Line<Out>>,
    busy: Option<Line<In>>,
}

impl<Out: OutputPin, In: InputPin> PinLines<Out, In> {
    /// Creates a line set with the two lines every panel needs.
    pub fn new(dc: Out, reset: Out) -> Self {
        let mut lines = Self::empty();
        lines.dc = Some(Line {
            pin: dc,
            active_low: false,
        });
        lines.reset = Some(Line {
            pin: reset,
            active_low: false,
        });
        lines
    }

    /// Creates a line set holding no lines. Use [PinLines::insert_output] and
    /// [PinLines::insert_input] to populate it.
    pub fn empty() -> Self {
        PinLines {
            dc: None,
            reset: None,
            chip_select: None,
            busy: None,
        }
    }

    /// Whether any line is still held.
    pub fn holds_any(&self) -> bool {
        self.dc.is_some()
            || self.reset.is_some()
            || self.chip_select.is_some()
            || self.busy.is_some()
    }

    pub fn with_busy(mut self, busy: In) -> Self {
        self.busy = Some(Line {
            pin: busy,
            active_low: false,
        });
        self
    }

    pub fn with_chip_select(mut self, chip_select: Out) -> Self {
        self.chip_select = Some(Line {
            pin: chip_select,
            active_low: false,
        });
        self
    }

    /// Adds an output line, replacing any line already held for the role.
    pub fn insert_output(
        &mut self,
        role: LineRole,
        pin: Out,
        active_low: bool,
    ) -> Result<(), Error> {
        let line = Some(Line { pin, active_low });
        match role {
            LineRole::DataCommand => self.dc = line,
            LineRole::Reset => self.reset = line,
            LineRole::ChipSelect => self.chip_select = line,
            LineRole::Busy => return Err(ResourceError::WrongDirection(role).into()),
        }
        Ok(())
    }

    /// Adds an input line, replacing any line already held for the role.
    pub fn insert_input(&mut self, role: LineRole, pin: In, active_low: bool) -> Result<(), Error> {
        match role {
            LineRole::Busy => {
                self.busy = Some(Line { pin, active_low });
                Ok(())
            }
            _ => Err(ResourceError::WrongDirection(role).into()),
        }
    }

    fn output(&mut self, role: LineRole) -> Result<&mut Line<Out>, Error> {
        let line = match role {
            LineRole::DataCommand => &mut self.dc,
            LineRole::Reset => &mut self.reset,
            LineRole::ChipSelect => &mut self.chip_select,
            LineRole::Busy => return Err(ResourceError::WrongDirection(role).into()),
        };
        line.as_mut()
            .ok_or_else(|| ResourceError::NotAcquired(role).into())
    }
}

impl<Out: OutputPin, In: InputPin> LineSet for PinLines<Out, In> {
    fn set(&mut self, role: LineRole, level: PinState) -> Result<(), Error> {
        let line = self.output(role)?;
        let physical = line.physical(level);
        line.pin.set_state(physical).map_err(pin_error(role))
    }

    fn get(&mut self, role: LineRole) -> Result<PinState, Error> {
        if role != LineRole::Busy {
            return Err(ResourceError::WrongDirection(role).into());
        }
        let line = self
            .busy
            .as_mut()
            .ok_or(ResourceError::NotAcquired(role))?;
        let high = line.pin.is_high().map_err(pin_error(role))?;
        Ok(line.physical(PinState::from(high)))
    }

    fn has(&self, role: LineRole) -> bool {
        match role {
            LineRole::DataCommand => self.dc.is_some(),
            LineRole::Reset => self.reset.is_some(),
            LineRole::ChipSelect => self.chip_select.is_some(),
            LineRole::Busy => self.busy.is_some(),
        }
    }

    fn release(&mut self) {
        if self.holds_any() {
            trace!("Releasing GPIO lines");
        }
        self.dc = None;
        self.reset = None;
        self.chip_select = None;
        self.busy = None;
    }
}

/// A [Transport] over any `embedded-hal` [SpiDevice].
///
/// The bus settings are whatever the device was built with; `embedded-hal` offers no way to
/// change them afterwards.
pub struct HalTransport<S> {
    spi: Option<S>,
    max_transfer: usize,
}

impl<S: SpiDevice> HalTransport<S> {
    pub fn new(spi: S) -> Self {
        HalTransport {
            spi: Some(spi),
            max_transfer: DEFAULT_MAX_TRANSFER,
        }
    }

    /// Splits writes into transfers of at most `max_transfer` bytes.
    pub fn with_max_transfer(mut self, max_transfer: usize) -> Self {
        self.max_transfer = max_transfer.max(1);
        self
    }
}

impl<S: SpiDevice> Transport for HalTransport<S> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let spi = self.spi.as_mut().ok_or(IoError::Closed)?;
        for chunk in bytes.chunks(self.max_transfer) {
            spi.write(chunk).map_err(spi_error)?;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.spi = None;
    }
}
