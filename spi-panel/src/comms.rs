use core::time::Duration;

use embedded_hal::{delay::DelayNs, digital::PinState};

use crate::{
    error::Error,
    hw::{LineRole, LineSet, Transport},
    log::{trace, warn_log},
};

/// Smallest interval used between busy polls, so a zero interval can't spin forever.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Provides the ability to send <command> then <data> style communications.
pub trait CommandDataSend {
    /// Drives DC to command level, then writes the single opcode byte.
    fn send_command(&mut self, opcode: u8) -> Result<(), Error>;

    /// Drives DC to data level, then writes `data`. Does nothing if `data` is empty.
    fn send_data(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Marks the end of the current command and its parameters.
    fn end_command(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Sends a command followed by its parameters.
    fn send(&mut self, opcode: u8, data: &[u8]) -> Result<(), Error> {
        self.send_command(opcode)?;
        self.send_data(data)?;
        self.end_command()
    }
}

/// How the busy line is interpreted, and how long to wait for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyConfig {
    /// The logical level the panel drives while it is busy. Ready is the opposite level.
    pub polarity: PinState,
    /// Sleep between polls. Intervals under 1ms are rounded up.
    pub poll_interval: Duration,
    /// Total time slept before giving up.
    pub timeout: Duration,
}

impl BusyConfig {
    pub const fn active_high(poll_interval: Duration, timeout: Duration) -> Self {
        BusyConfig {
            polarity: PinState::High,
            poll_interval,
            timeout,
        }
    }

    pub const fn active_low(poll_interval: Duration, timeout: Duration) -> Self {
        BusyConfig {
            polarity: PinState::Low,
            poll_interval,
            timeout,
        }
    }
}

/// Provides "wait" support for hardware with a busy state.
pub trait BusyWait {
    /// Whether there is a busy line to wait on.
    fn has_busy_line(&self) -> bool;

    /// Reads the busy line once.
    fn is_busy(&mut self, polarity: PinState) -> Result<bool, Error>;

    /// Polls the busy line until the panel reports ready, sleeping `poll_interval` between polls.
    ///
    /// The line is always read at least once. Time is counted in intervals slept, so this fails
    /// with [Error::Timeout] no later than `timeout + poll_interval` after it starts.
    fn wait_ready<D: DelayNs>(
        &mut self,
        delay: &mut D,
        config: &BusyConfig,
        stage: &'static str,
    ) -> Result<(), Error> {
        let interval = config.poll_interval.max(MIN_POLL_INTERVAL);
        let mut waited = Duration::ZERO;
        loop {
            if !self.is_busy(config.polarity)? {
                trace!("Panel ready after {} ms ({})", waited.as_millis() as u32, stage);
                return Ok(());
            }
            if waited >= config.timeout {
                warn_log!(
                    "Panel still busy after {} ms ({})",
                    waited.as_millis() as u32,
                    stage
                );
                return Err(Error::Timeout { stage, waited });
            }
            sleep(delay, interval);
            waited += interval;
        }
    }
}

/// Blocks for `duration`, at microsecond resolution.
pub(crate) fn sleep<D: DelayNs>(delay: &mut D, duration: Duration) {
    if duration.is_zero() {
        return;
    }
    delay.delay_us(u32::try_from(duration.as_micros()).unwrap_or(u32::MAX));
}

/// How the chip-select line is driven.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipSelectMode {
    /// No chip-select line is driven. The SPI controller handles it, or the panel ignores it.
    Unmanaged,
    /// Asserted before each opcode and released after its parameters. Held for the whole of a
    /// pixel stream.
    PerCommand,
    /// Asserted once when the panel is reset and released on teardown.
    Held,
}

/// Frames commands, parameters and pixel streams over a [LineSet] and a [Transport].
///
/// Chip select is asserted by driving its line low (logically), following the usual panel
/// convention. Use an active-low [crate::hw::LineSpec] if the wiring inverts it.
pub struct Interface<L, T> {
    lines: L,
    transport: T,
    chip_select: ChipSelectMode,
    selected: bool,
}

impl<L: LineSet, T: Transport> Interface<L, T> {
    pub fn new(lines: L, transport: T, chip_select: ChipSelectMode) -> Self {
        Interface {
            lines,
            transport,
            chip_select,
            selected: false,
        }
    }

    pub fn chip_select_mode(&self) -> ChipSelectMode {
        self.chip_select
    }

    pub fn lines(&mut self) -> &mut L {
        &mut self.lines
    }

    /// Asserts chip select if the mode holds it for the whole session.
    pub fn engage(&mut self) -> Result<(), Error> {
        if self.chip_select == ChipSelectMode::Held {
            self.select()?;
        }
        Ok(())
    }

    /// Starts a pixel stream: chip select asserted and DC at data level until [Self::end_stream].
    pub fn begin_stream(&mut self) -> Result<(), Error> {
        if self.chip_select != ChipSelectMode::Unmanaged {
            self.select()?;
        }
        self.lines.set(LineRole::DataCommand, PinState::High)
    }

    /// Writes pixel bytes into a stream opened with [Self::begin_stream].
    pub fn stream(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.transport.write(bytes)
    }

    pub fn end_stream(&mut self) -> Result<(), Error> {
        if self.chip_select == ChipSelectMode::PerCommand {
            self.deselect()?;
        }
        Ok(())
    }

    /// Releases chip select (best effort), every GPIO line and the transport. Safe to call more
    /// than once.
    pub fn release(&mut self) {
        if self.selected {
            let _ = self.deselect();
        }
        self.lines.release();
        self.transport.close();
    }

    fn select(&mut self) -> Result<(), Error> {
        if !self.selected {
            self.lines.set(LineRole::ChipSelect, PinState::Low)?;
            self.selected = true;
        }
        Ok(())
    }

    fn deselect(&mut self) -> Result<(), Error> {
        if self.selected {
            self.selected = false;
            self.lines.set(LineRole::ChipSelect, PinState::High)?;
        }
        Ok(())
    }
}

impl<L: LineSet, T: Transport> CommandDataSend for Interface<L, T> {
    fn send_command(&mut self, opcode: u8) -> Result<(), Error> {
        trace!("Sending command: {:#x}", opcode);
        if self.chip_select != ChipSelectMode::Unmanaged {
            self.select()?;
        }
        self.lines.set(LineRole::DataCommand, PinState::Low)?;
        self.transport.write(&[opcode])
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.is_empty() {
            return Ok(());
        }
        self.lines.set(LineRole::DataCommand, PinState::High)?;
        self.transport.write(data)
    }

    fn end_command(&mut self) -> Result<(), Error> {
        if self.chip_select == ChipSelectMode::PerCommand {
            self.deselect()?;
        }
        Ok(())
    }
}

impl<L: LineSet, T: Transport> BusyWait for Interface<L, T> {
    fn has_busy_line(&self) -> bool {
        self.lines.has(LineRole::Busy)
    }

    fn is_busy(&mut self, polarity: PinState) -> Result<bool, Error> {
        Ok(self.lines.get(LineRole::Busy)? == polarity)
    }
}
