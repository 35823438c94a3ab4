//! The panel power-state machine.
//!
//! A [PanelSession] owns a panel's lines, transport and delay, and walks it through
//! `Uninitialized -> Reset -> Initialized -> {Refreshing, Streaming} -> Sleeping`. Every operation
//! checks the current state before any hardware traffic, returning [Error::State] if it doesn't
//! apply. After an I/O failure the state is left where the failure happened: release the session
//! and open the hardware again.

use core::time::Duration;

use embedded_hal::{delay::DelayNs, digital::PinState};

use crate::{
    buffer::{Framebuffer, PixelEncoding, SolidFill, RGB565_WHITE},
    comms::{sleep, BusyConfig, BusyWait as _, ChipSelectMode, CommandDataSend as _, Interface},
    error::{ConfigError, Error, ResourceError},
    hw::{LineRole, LineSet, Transport},
    init::InitTable,
    log::debug,
    window::RefreshWindow,
};

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// Lines and transport are open, nothing has been sent.
    Uninitialized,
    /// The reset pulse has completed.
    Reset,
    /// The init table has been applied and the panel accepts frames.
    Initialized,
    /// An e-paper refresh is in progress.
    Refreshing,
    /// A TFT pixel stream is in progress.
    Streaming,
    /// The panel is asleep. Only a reset wakes it.
    Sleeping,
}

/// Timing of the hardware reset pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetPulse {
    /// If set, reset is driven high for this long before the pulse.
    pub lead: Option<Duration>,
    /// How long reset is held low.
    pub low: Duration,
    /// Wait after releasing reset before the panel accepts commands.
    pub settle: Duration,
}

/// Opcodes an e-paper panel uses outside its init table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EPaperCommands {
    pub old_data: u8,
    pub new_data: u8,
    pub refresh: u8,
    pub power_off: u8,
    pub deep_sleep: u8,
    /// Parameter the panel requires with `deep_sleep` to accept it.
    pub deep_sleep_check: u8,
}

/// Configuration of a bistable e-paper panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EPaperConfig {
    /// Width in pixels, a multiple of 8.
    pub width: u16,
    pub height: u16,
    /// Sent after every reset.
    pub init: InitTable,
    pub reset: ResetPulse,
    /// Busy line polarity and the bounds of every wait on it.
    pub busy: BusyConfig,
    pub chip_select: ChipSelectMode,
    pub commands: EPaperCommands,
}

/// Opcodes a TFT panel uses outside its init table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TftCommands {
    pub column_address: u8,
    pub row_address: u8,
    pub memory_write: u8,
    pub display_off: u8,
    pub sleep_in: u8,
}

/// Configuration of an active-matrix TFT panel taking RGB565 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TftConfig {
    pub width: u16,
    pub height: u16,
    /// Sent after every reset. Must not busy-wait, as the panel has no busy line.
    pub init: InitTable,
    pub reset: ResetPulse,
    pub chip_select: ChipSelectMode,
    pub commands: TftCommands,
    /// Wait after `sleep_in` before the panel may be powered down.
    pub sleep_settle: Duration,
}

/// Everything that differs between supported panel families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelModel {
    /// Bistable panel refreshed from two full frames, with a busy handshake.
    EPaper(EPaperConfig),
    /// Active-matrix panel written through address windows, without a busy handshake.
    Tft(TftConfig),
}

impl PanelModel {
    pub fn width(&self) -> u16 {
        match self {
            PanelModel::EPaper(config) => config.width,
            PanelModel::Tft(config) => config.width,
        }
    }

    pub fn height(&self) -> u16 {
        match self {
            PanelModel::EPaper(config) => config.height,
            PanelModel::Tft(config) => config.height,
        }
    }

    pub fn encoding(&self) -> PixelEncoding {
        match self {
            PanelModel::EPaper(_) => PixelEncoding::Mono1bpp,
            PanelModel::Tft(_) => PixelEncoding::Rgb565,
        }
    }

    pub fn chip_select(&self) -> ChipSelectMode {
        match self {
            PanelModel::EPaper(config) => config.chip_select,
            PanelModel::Tft(config) => config.chip_select,
        }
    }

    fn init_table(&self) -> &InitTable {
        match self {
            PanelModel::EPaper(config) => &config.init,
            PanelModel::Tft(config) => &config.init,
        }
    }

    fn reset_pulse(&self) -> &ResetPulse {
        match self {
            PanelModel::EPaper(config) => &config.reset,
            PanelModel::Tft(config) => &config.reset,
        }
    }

    fn busy(&self) -> Option<&BusyConfig> {
        match self {
            PanelModel::EPaper(config) => Some(&config.busy),
            PanelModel::Tft(_) => None,
        }
    }
}

/// One panel, from acquisition to release.
///
/// ```no_run
/// # fn demo<L, T, D>(lines: L, transport: T, delay: D) -> Result<(), spi_panel::Error>
/// # where L: spi_panel::hw::LineSet, T: spi_panel::hw::Transport, D: embedded_hal::delay::DelayNs {
/// use spi_panel::{buffer::Framebuffer, epd2in9, session::PanelSession};
///
/// let mut panel = PanelSession::new(lines, transport, delay, epd2in9::config())?;
/// panel.start()?;
/// panel.clear()?;
/// let stripes = Framebuffer::mono_from_fn(128, 296, |row, _col| (row / 16) % 2 == 0)?;
/// panel.display(&stripes)?;
/// panel.sleep()?;
/// panel.release();
/// # Ok(())
/// # }
/// ```
pub struct PanelSession<L: LineSet, T: Transport, D: DelayNs> {
    interface: Interface<L, T>,
    delay: D,
    model: PanelModel,
    state: PowerState,
    /// The last frame sent to an e-paper panel, used as the old frame of the next refresh.
    previous: Option<Framebuffer>,
}

impl<L: LineSet, T: Transport, D: DelayNs> PanelSession<L, T, D> {
    /// Creates a session from already-acquired lines and an open transport.
    ///
    /// Fails if a line the model needs isn't held: data/command and reset always, busy for
    /// e-paper panels, chip select unless it is [ChipSelectMode::Unmanaged]. The lines are
    /// released and the transport closed before the error is returned.
    pub fn new(
        mut lines: L,
        mut transport: T,
        delay: D,
        model: PanelModel,
    ) -> Result<Self, Error> {
        let mut required = [Some(LineRole::DataCommand), Some(LineRole::Reset), None, None];
        if model.busy().is_some() {
            required[2] = Some(LineRole::Busy);
        }
        if model.chip_select() != ChipSelectMode::Unmanaged {
            required[3] = Some(LineRole::ChipSelect);
        }
        if let Some(missing) = required.into_iter().flatten().find(|role| !lines.has(*role)) {
            lines.release();
            transport.close();
            return Err(ResourceError::NotAcquired(missing).into());
        }

        Ok(PanelSession {
            interface: Interface::new(lines, transport, model.chip_select()),
            delay,
            model,
            state: PowerState::Uninitialized,
            previous: None,
        })
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    pub fn model(&self) -> &PanelModel {
        &self.model
    }

    pub fn width(&self) -> u16 {
        self.model.width()
    }

    pub fn height(&self) -> u16 {
        self.model.height()
    }

    /// A blank frame in this panel's size and encoding.
    pub fn new_framebuffer(&self) -> Result<Framebuffer, Error> {
        match self.model.encoding() {
            PixelEncoding::Mono1bpp => Framebuffer::white(self.width(), self.height()),
            PixelEncoding::Rgb565 => Ok(Framebuffer::rgb565_filled(
                self.width(),
                self.height(),
                RGB565_WHITE,
            )),
        }
    }

    /// Pulses the reset line. Valid before the first init, or to wake a sleeping panel.
    pub fn reset(&mut self) -> Result<(), Error> {
        self.require("reset", &[PowerState::Uninitialized, PowerState::Sleeping])?;
        let pulse = *self.model.reset_pulse();
        let lines = self.interface.lines();
        if let Some(lead) = pulse.lead {
            lines.set(LineRole::Reset, PinState::High)?;
            sleep(&mut self.delay, lead);
        }
        lines.set(LineRole::Reset, PinState::Low)?;
        sleep(&mut self.delay, pulse.low);
        lines.set(LineRole::Reset, PinState::High)?;
        sleep(&mut self.delay, pulse.settle);
        self.interface.engage()?;
        self.transition(PowerState::Reset);
        Ok(())
    }

    /// Applies the model's init table.
    pub fn init(&mut self) -> Result<(), Error> {
        self.require("init", &[PowerState::Reset])?;
        let busy = self.model.busy().filter(|_| self.interface.has_busy_line());
        self.model
            .init_table()
            .apply(&mut self.interface, &mut self.delay, busy)?;
        self.previous = None;
        self.transition(PowerState::Initialized);
        Ok(())
    }

    /// Resets then initializes the panel.
    pub fn start(&mut self) -> Result<(), Error> {
        self.reset()?;
        self.init()
    }

    /// Sends one raw command with parameters, for experimentation or model-specific settings.
    pub fn send(&mut self, opcode: u8, params: &[u8]) -> Result<(), Error> {
        self.require("send", &[PowerState::Initialized])?;
        self.interface.send(opcode, params)
    }

    /// Refreshes an e-paper panel from the frame currently shown and the frame to show.
    ///
    /// Blocks until the panel reports the refresh done, or fails with [Error::Timeout].
    pub fn refresh(&mut self, old: &Framebuffer, new: &Framebuffer) -> Result<(), Error> {
        let PanelModel::EPaper(config) = &self.model else {
            return Err(ConfigError::UnsupportedOperation("refresh").into());
        };
        let (width, height) = (config.width, config.height);
        let commands = config.commands;
        let busy = config.busy;
        self.require("refresh", &[PowerState::Initialized])?;
        old.check_format(PixelEncoding::Mono1bpp, width, height)?;
        new.check_format(PixelEncoding::Mono1bpp, width, height)?;

        self.transition(PowerState::Refreshing);
        self.interface.send(commands.old_data, old.data())?;
        self.interface.send(commands.new_data, new.data())?;
        self.interface.send(commands.refresh, &[])?;
        self.interface.wait_ready(&mut self.delay, &busy, "refresh")?;
        self.previous = Some(new.clone());
        self.transition(PowerState::Initialized);
        Ok(())
    }

    /// Shows `new` on an e-paper panel, using the last frame sent as the old frame. That is all
    /// white after init or [Self::clear].
    pub fn display(&mut self, new: &Framebuffer) -> Result<(), Error> {
        if !matches!(self.model, PanelModel::EPaper(_)) {
            return Err(ConfigError::UnsupportedOperation("display").into());
        }
        let old = match self.previous.take() {
            Some(previous) => previous,
            None => self.new_framebuffer()?,
        };
        let result = self.refresh(&old, new);
        if result.is_err() {
            self.previous = Some(old);
        }
        result
    }

    /// Blanks the panel to white.
    pub fn clear(&mut self) -> Result<(), Error> {
        match self.model {
            PanelModel::EPaper(_) => {
                let white = self.new_framebuffer()?;
                self.refresh(&white, &white)
            }
            PanelModel::Tft(_) => self.fill(RGB565_WHITE),
        }
    }

    /// Writes RGB565 pixels into a window of a TFT panel's memory.
    ///
    /// The window and byte count are checked before anything is sent; `bytes` must hold exactly
    /// two bytes per pixel in the window.
    pub fn write_window(&mut self, window: RefreshWindow, bytes: &[u8]) -> Result<(), Error> {
        let commands = self.begin_window("write_window", window)?;
        let expected = window.pixel_count() * 2;
        if bytes.len() != expected {
            return Err(ConfigError::PixelCount {
                window,
                pixels: window.pixel_count(),
                expected,
                actual: bytes.len(),
            }
            .into());
        }
        self.open_window(&commands, window)?;
        self.interface.stream(bytes)?;
        self.close_window()
    }

    /// Fills a window of a TFT panel with one colour, without building a frame.
    pub fn fill_window(&mut self, window: RefreshWindow, color: u16) -> Result<(), Error> {
        let commands = self.begin_window("fill_window", window)?;
        self.open_window(&commands, window)?;
        let mut fill = SolidFill::new(color, window.pixel_count());
        while let Some(chunk) = fill.next_chunk() {
            self.interface.stream(chunk)?;
        }
        self.close_window()
    }

    /// Fills the whole of a TFT panel with one colour.
    pub fn fill(&mut self, color: u16) -> Result<(), Error> {
        self.fill_window(RefreshWindow::full(self.width(), self.height()), color)
    }

    /// Writes a full RGB565 frame to a TFT panel.
    pub fn draw(&mut self, framebuffer: &Framebuffer) -> Result<(), Error> {
        framebuffer.check_format(PixelEncoding::Rgb565, self.width(), self.height())?;
        self.write_window(
            RefreshWindow::full(self.width(), self.height()),
            framebuffer.data(),
        )
    }

    /// Puts the panel into its lowest power state. Only [Self::reset] wakes it again.
    pub fn sleep(&mut self) -> Result<(), Error> {
        self.require("sleep", &[PowerState::Initialized])?;
        match &self.model {
            PanelModel::EPaper(config) => {
                let commands = config.commands;
                let busy = config.busy;
                self.interface.send(commands.power_off, &[])?;
                self.interface
                    .wait_ready(&mut self.delay, &busy, "power off")?;
                self.interface
                    .send(commands.deep_sleep, &[commands.deep_sleep_check])?;
            }
            PanelModel::Tft(config) => {
                let commands = config.commands;
                let settle = config.sleep_settle;
                self.interface.send(commands.display_off, &[])?;
                self.interface.send(commands.sleep_in, &[])?;
                sleep(&mut self.delay, settle);
            }
        }
        self.transition(PowerState::Sleeping);
        Ok(())
    }

    /// Releases every line and closes the transport. Safe to call more than once; also runs on
    /// drop.
    pub fn release(&mut self) {
        self.interface.release();
        self.previous = None;
        self.state = PowerState::Uninitialized;
    }

    fn require(&self, operation: &'static str, allowed: &[PowerState]) -> Result<(), Error> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::State {
                operation,
                state: self.state,
            })
        }
    }

    fn transition(&mut self, next: PowerState) {
        debug!("Panel state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Checks a window operation can run, returning the TFT opcodes it needs.
    fn begin_window(
        &self,
        operation: &'static str,
        window: RefreshWindow,
    ) -> Result<TftCommands, Error> {
        let PanelModel::Tft(config) = &self.model else {
            return Err(ConfigError::UnsupportedOperation(operation).into());
        };
        self.require(operation, &[PowerState::Initialized])?;
        window.validate(config.width, config.height)?;
        Ok(config.commands)
    }

    fn open_window(&mut self, commands: &TftCommands, window: RefreshWindow) -> Result<(), Error> {
        self.transition(PowerState::Streaming);
        self.interface
            .send(commands.column_address, &window.column_params())?;
        self.interface
            .send(commands.row_address, &window.row_params())?;
        self.interface.send_command(commands.memory_write)?;
        self.interface.begin_stream()
    }

    fn close_window(&mut self) -> Result<(), Error> {
        self.interface.end_stream()?;
        self.transition(PowerState::Initialized);
        Ok(())
    }
}

impl<L: LineSet, T: Transport, D: DelayNs> Drop for PanelSession<L, T, D> {
    fn drop(&mut self) {
        self.release();
    }
}
