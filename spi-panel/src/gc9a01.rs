//! GC9A01A round TFT panel (240x240, RGB565).
//!
//! The panel has no busy line. Pixels are written by opening a column/row window and streaming
//! big-endian RGB565 data into it. Use [config] with a
//! [PanelSession](crate::session::PanelSession).
use core::time::Duration;

use bitflags::bitflags;
use embedded_hal::spi::{Mode, MODE_0};

use crate::{
    comms::ChipSelectMode,
    hw::SpiConfig,
    init::{CommandEntry, InitTable},
    session::{PanelModel, ResetPulse, TftCommands, TftConfig},
};

pub const DISPLAY_HEIGHT: u16 = 240;
pub const DISPLAY_WIDTH: u16 = 240;
/// Comfortably below the 50 MHz the controller accepts.
pub const RECOMMENDED_SPI_HZ: u32 = 24_000_000;
pub const RECOMMENDED_SPI_MODE: Mode = MODE_0;
pub const RESET_PULSE: ResetPulse = ResetPulse {
    lead: None,
    low: Duration::from_millis(50),
    settle: Duration::from_millis(50),
};
/// The controller needs this long after sleep in/out before the next sleep command.
pub const SLEEP_SETTLE: Duration = Duration::from_millis(120);

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SleepIn = 0x10,
    /// Leaves sleep. Wait [SLEEP_SETTLE] before sending more commands.
    SleepOut = 0x11,
    InversionOn = 0x21,
    GammaSet = 0x26,
    DisplayOff = 0x28,
    DisplayOn = 0x29,
    /// Start and end column of the write window, each big-endian.
    ColumnAddressSet = 0x2A,
    /// Start and end row of the write window, each big-endian.
    RowAddressSet = 0x2B,
    /// Begins a pixel stream into the current window.
    MemoryWrite = 0x2C,
    /// Scan order and colour order, see [MemoryAccess].
    MemoryAccessControl = 0x36,
    PixelFormatSet = 0x3A,
    FrameRateControl = 0xB1,
    DisplayFunctionControl = 0xB6,
    PowerControl1 = 0xC0,
    PowerControl2 = 0xC1,
    VcomControl1 = 0xC5,
    VcomControl2 = 0xC7,
    PositiveGamma = 0xE0,
    NegativeGamma = 0xE1,
    /// Disables the 3-gamma function.
    Enable3G = 0xF2,
}

bitflags! {
    /// The parameter of [Command::MemoryAccessControl].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemoryAccess: u8 {
        const RowAddressOrder = 0x80;
        const ColumnAddressOrder = 0x40;
        /// Swaps rows and columns, for landscape orientations.
        const RowColumnExchange = 0x20;
        const VerticalRefreshOrder = 0x10;
        /// Blue-green-red colour order instead of red-green-blue.
        const BgrOrder = 0x08;
        const HorizontalRefreshOrder = 0x04;
    }
}

/// Landscape, BGR colour order.
pub const DEFAULT_MEMORY_ACCESS: MemoryAccess =
    MemoryAccess::RowColumnExchange.union(MemoryAccess::BgrOrder);

const DEFAULT_MADCTL: [u8; 1] = [DEFAULT_MEMORY_ACCESS.bits()];

/// 16 bits per pixel on both the RGB and MCU interfaces.
const PIXEL_FORMAT_RGB565: u8 = 0x55;

const MADCTL_ENTRY: usize = 11;

static INIT_ENTRIES: [CommandEntry; 22] = [
    // Undocumented vendor registers.
    CommandEntry::new(0xEF, &[0x03, 0x80, 0x02]),
    CommandEntry::new(0xCF, &[0x00, 0xC1, 0x30]),
    CommandEntry::new(0xED, &[0x64, 0x03, 0x12, 0x81]),
    CommandEntry::new(0xE8, &[0x85, 0x00, 0x78]),
    CommandEntry::new(0xCB, &[0x39, 0x2C, 0x00, 0x34, 0x02]),
    CommandEntry::new(0xF7, &[0x20]),
    CommandEntry::new(0xEA, &[0x00, 0x00]),
    CommandEntry::new(Command::PowerControl1 as u8, &[0x23]),
    CommandEntry::new(Command::PowerControl2 as u8, &[0x10]),
    CommandEntry::new(Command::VcomControl1 as u8, &[0x3E, 0x28]),
    CommandEntry::new(Command::VcomControl2 as u8, &[0x86]),
    CommandEntry::new(Command::MemoryAccessControl as u8, &DEFAULT_MADCTL),
    CommandEntry::new(Command::PixelFormatSet as u8, &[PIXEL_FORMAT_RGB565]),
    CommandEntry::new(Command::FrameRateControl as u8, &[0x00, 0x18]),
    CommandEntry::new(Command::DisplayFunctionControl as u8, &[0x08, 0x82, 0x27]),
    CommandEntry::new(Command::Enable3G as u8, &[0x00]),
    CommandEntry::new(Command::GammaSet as u8, &[0x01]),
    CommandEntry::new(
        Command::PositiveGamma as u8,
        &[
            0x0F, 0x31, 0x2B, 0x0C, 0x0E, 0x08, 0x4E, 0xF1, 0x37, 0x07, 0x10, 0x03, 0x0E, 0x09,
            0x00,
        ],
    ),
    CommandEntry::new(
        Command::NegativeGamma as u8,
        &[
            0x00, 0x0E, 0x14, 0x03, 0x11, 0x07, 0x31, 0xC1, 0x48, 0x08, 0x0F, 0x0C, 0x31, 0x36,
            0x0F,
        ],
    ),
    CommandEntry::new(Command::InversionOn as u8, &[]),
    CommandEntry::new(Command::SleepOut as u8, &[]).with_delay(SLEEP_SETTLE),
    CommandEntry::new(Command::DisplayOn as u8, &[]).with_delay(Duration::from_millis(20)),
];

/// The default power-on sequence, landscape with BGR colour order.
pub fn init_table() -> InitTable {
    InitTable::from_static(&INIT_ENTRIES)
}

/// The default power-on sequence with a different scan and colour order.
pub fn init_table_with(memory_access: MemoryAccess) -> InitTable {
    let mut entries = INIT_ENTRIES.to_vec();
    entries[MADCTL_ENTRY] =
        CommandEntry::owned(Command::MemoryAccessControl as u8, [memory_access.bits()].to_vec());
    InitTable::from(entries)
}

pub const COMMANDS: TftCommands = TftCommands {
    column_address: Command::ColumnAddressSet as u8,
    row_address: Command::RowAddressSet as u8,
    memory_write: Command::MemoryWrite as u8,
    display_off: Command::DisplayOff as u8,
    sleep_in: Command::SleepIn as u8,
};

pub const fn spi_config() -> SpiConfig {
    SpiConfig::new(RECOMMENDED_SPI_HZ, RECOMMENDED_SPI_MODE)
}

/// The default configuration, with chip select driven around every command.
pub fn tft_config() -> TftConfig {
    TftConfig {
        width: DISPLAY_WIDTH,
        height: DISPLAY_HEIGHT,
        init: init_table(),
        reset: RESET_PULSE,
        chip_select: ChipSelectMode::PerCommand,
        commands: COMMANDS,
        sleep_settle: SLEEP_SETTLE,
    }
}

pub fn config() -> PanelModel {
    PanelModel::Tft(tft_config())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_memory_access() {
        assert_eq!(DEFAULT_MEMORY_ACCESS.bits(), 0x28);
        assert_eq!(
            INIT_ENTRIES[MADCTL_ENTRY].opcode,
            Command::MemoryAccessControl as u8
        );
    }

    #[test]
    fn test_init_table_with_replaces_only_memory_access() {
        let portrait = MemoryAccess::ColumnAddressOrder | MemoryAccess::BgrOrder;
        let table = init_table_with(portrait);
        let default = init_table();

        assert_eq!(table.len(), default.len());
        for (i, (custom, original)) in table.entries().iter().zip(default.entries()).enumerate() {
            if i == MADCTL_ENTRY {
                assert_eq!(&*custom.params, &[0x48u8]);
            } else {
                assert_eq!(custom, original);
            }
        }
    }

    #[test]
    fn test_init_table_needs_no_busy_line() {
        init_table().validate(false).unwrap();
        let last = init_table().entries().last().cloned().unwrap();
        assert_eq!(last.opcode, Command::DisplayOn as u8);
        assert_eq!(last.post_delay, Duration::from_millis(20));
    }
}
