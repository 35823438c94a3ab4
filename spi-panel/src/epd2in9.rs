//! Waveshare 2.9" e-paper panel (128x296, UC8151 command set).
//!
//! The panel is refreshed from two full frames, the one currently shown and the one to show, and
//! signals completion on its busy line. Use [config] with a
//! [PanelSession](crate::session::PanelSession).
use core::time::Duration;

use embedded_hal::spi::{Mode, MODE_0};

use crate::{
    comms::{BusyConfig, ChipSelectMode},
    hw::SpiConfig,
    init::{CommandEntry, InitTable},
    session::{EPaperCommands, EPaperConfig, PanelModel, ResetPulse},
};

/// The height of the display (portrait orientation).
pub const DISPLAY_HEIGHT: u16 = 296;
/// The width of the display (portrait orientation).
pub const DISPLAY_WIDTH: u16 = 128;
pub const RECOMMENDED_SPI_HZ: u32 = 4_000_000; // 4 MHz
/// Data is captured on the rising edge with the clock idling low.
pub const RECOMMENDED_SPI_MODE: Mode = MODE_0;
/// The panel keeps its busy line high while it is working.
pub const BUSY: BusyConfig =
    BusyConfig::active_high(Duration::from_millis(20), Duration::from_secs(10));
pub const RESET_PULSE: ResetPulse = ResetPulse {
    lead: Some(Duration::from_millis(10)),
    low: Duration::from_millis(10),
    settle: Duration::from_millis(120),
};
/// Must accompany [Command::DeepSleep] or the panel ignores it.
pub const DEEP_SLEEP_CHECK: u8 = 0xA5;

/// Low-level commands for the panel. Most callers only need the session operations, but commands
/// can be sent directly with [PanelSession::send](crate::session::PanelSession::send) for
/// experimentation.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Resolution, scan direction and LUT source.
    PanelSetting = 0x00,
    PowerSetting = 0x01,
    /// Powers the driving circuits down. The panel is busy until it completes.
    PowerOff = 0x02,
    /// Powers the driving circuits up. The panel is busy until it completes.
    PowerOn = 0x04,
    /// Configures the soft start of the voltage booster.
    BoosterSoftStart = 0x06,
    /// Enters deep sleep. Requires [DEEP_SLEEP_CHECK], then a hardware reset and reinitialisation
    /// to wake up.
    DeepSleep = 0x07,
    /// Writes the "old" frame, i.e. the one currently shown.
    DataStartTransmission1 = 0x10,
    /// Drives the panel from the old frame to the new one. The panel is busy until it completes.
    DisplayRefresh = 0x12,
    /// Writes the "new" frame, i.e. the one to show.
    DataStartTransmission2 = 0x13,
    /// Frame rate control.
    PllControl = 0x30,
    /// Border output and the interval between data and VCOM.
    VcomAndDataIntervalSetting = 0x50,
    /// Width (2 bytes) then height (2 bytes), big-endian.
    ResolutionSetting = 0x61,
    VcmDcSetting = 0x82,
}

const RESOLUTION: [u8; 4] = [
    (DISPLAY_WIDTH >> 8) as u8,
    DISPLAY_WIDTH as u8,
    (DISPLAY_HEIGHT >> 8) as u8,
    DISPLAY_HEIGHT as u8,
];

static INIT_ENTRIES: [CommandEntry; 7] = [
    CommandEntry::new(Command::BoosterSoftStart as u8, &[0x17, 0x17, 0x17]),
    CommandEntry::new(Command::PowerOn as u8, &[]).with_busy_wait("power on"),
    // 128x296 resolution, LUT from OTP, black/white.
    CommandEntry::new(Command::PanelSetting as u8, &[0x0F]),
    CommandEntry::new(Command::VcomAndDataIntervalSetting as u8, &[0xF7]),
    // 50Hz
    CommandEntry::new(Command::PllControl as u8, &[0x3C]),
    CommandEntry::new(Command::ResolutionSetting as u8, &RESOLUTION),
    CommandEntry::new(Command::VcmDcSetting as u8, &[0x12]),
];

/// The default power-on sequence.
pub fn init_table() -> InitTable {
    InitTable::from_static(&INIT_ENTRIES)
}

pub const COMMANDS: EPaperCommands = EPaperCommands {
    old_data: Command::DataStartTransmission1 as u8,
    new_data: Command::DataStartTransmission2 as u8,
    refresh: Command::DisplayRefresh as u8,
    power_off: Command::PowerOff as u8,
    deep_sleep: Command::DeepSleep as u8,
    deep_sleep_check: DEEP_SLEEP_CHECK,
};

/// The recommended SPI settings.
pub const fn spi_config() -> SpiConfig {
    SpiConfig::new(RECOMMENDED_SPI_HZ, RECOMMENDED_SPI_MODE)
}

/// The default configuration. Chip select is left to the SPI controller.
pub fn epaper_config() -> EPaperConfig {
    EPaperConfig {
        width: DISPLAY_WIDTH,
        height: DISPLAY_HEIGHT,
        init: init_table(),
        reset: RESET_PULSE,
        busy: BUSY,
        chip_select: ChipSelectMode::Unmanaged,
        commands: COMMANDS,
    }
}

pub fn config() -> PanelModel {
    PanelModel::EPaper(epaper_config())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_params() {
        assert_eq!(RESOLUTION, [0x00, 0x80, 0x01, 0x28]);
    }

    #[test]
    fn test_only_power_on_waits_for_busy() {
        let table = init_table();
        let waits: alloc::vec::Vec<(u8, &str)> = table
            .entries()
            .iter()
            .filter_map(|entry| entry.busy_wait.map(|stage| (entry.opcode, stage)))
            .collect();
        assert_eq!(waits, [(0x04, "power on")]);
        table.validate(false).unwrap_err();
    }

    #[test]
    fn test_config_matches_panel() {
        let model = config();
        assert_eq!(model.width(), 128);
        assert_eq!(model.height(), 296);
        assert_eq!(model.chip_select(), ChipSelectMode::Unmanaged);
        assert_eq!(spi_config().clock_hz, 4_000_000);
    }
}
