//! Drives a Waveshare 2.9" e-paper panel from a Raspberry Pi.
//!
//! Wiring (BCM numbering): DC on GPIO25, RST on GPIO17, BUSY on GPIO24, CS on CE0. Run with
//! `RUST_LOG=debug` to see each step.

use std::{thread, time::Duration};

use anyhow::Context;
use embedded_graphics::{
    mono_font::{ascii::FONT_10X20, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{Circle, PrimitiveStyle},
    text::{Alignment, Text},
};
use embedded_hal::digital::PinState;
use log::info;
use spi_panel::{
    epd2in9,
    hw::{LineRole, LineSpec},
    linux, Framebuffer,
};

const GPIO_CHIP: &str = "/dev/gpiochip0";
const SPI_DEVICE: &str = "/dev/spidev0.0";

const LINES: [LineSpec; 3] = [
    LineSpec::output(LineRole::DataCommand, 25, PinState::Low),
    LineSpec::output(LineRole::Reset, 17, PinState::High),
    // The panel needs a pull-up on BUSY; the Waveshare HAT provides one.
    LineSpec::input(LineRole::Busy, 24),
];

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut epd = linux::open_panel(
        GPIO_CHIP,
        &LINES,
        SPI_DEVICE,
        &epd2in9::spi_config(),
        epd2in9::config(),
        "epd2in9-sample",
    )
    .context("opening the panel")?;

    info!("Initializing EPD");
    epd.start().context("initializing the panel")?;

    info!("Clearing");
    epd.clear().context("clearing the panel")?;

    info!("Displaying stripes");
    let stripes = Framebuffer::mono_from_fn(
        epd2in9::DISPLAY_WIDTH,
        epd2in9::DISPLAY_HEIGHT,
        |row, _col| (row / 16) % 2 == 0,
    )?;
    epd.display(&stripes).context("displaying stripes")?;
    thread::sleep(Duration::from_secs(4));

    info!("Displaying text");
    let mut buffer = epd.new_framebuffer()?;
    {
        let mut canvas = buffer.mono_canvas()?;
        let center = canvas.bounding_box().center();
        Circle::with_center(center, 100)
            .into_styled(PrimitiveStyle::with_stroke(BinaryColor::Off, 4))
            .draw(&mut canvas)?;
        Text::with_alignment(
            "Hello!",
            center + Point::new(0, 6),
            MonoTextStyle::new(&FONT_10X20, BinaryColor::Off),
            Alignment::Center,
        )
        .draw(&mut canvas)?;
    }
    epd.display(&buffer).context("displaying text")?;

    info!("Sleeping");
    epd.sleep().context("putting the panel to sleep")?;
    epd.release();
    info!("EPD sample complete");
    Ok(())
}
