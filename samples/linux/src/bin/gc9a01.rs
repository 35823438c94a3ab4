//! Drives a GC9A01A round TFT panel from a Raspberry Pi.
//!
//! Wiring (BCM numbering): CS on GPIO7, DC on GPIO5, RST on GPIO6. Chip select is driven as a
//! plain GPIO line, so the spidev device's own CE line must not be wired to the panel.

use std::{thread, time::Duration};

use anyhow::Context;
use embedded_graphics::{
    pixelcolor::Rgb565,
    prelude::*,
    primitives::{Circle, PrimitiveStyle},
};
use embedded_hal::digital::PinState;
use log::info;
use spi_panel::{
    buffer::{rgb565, RGB565_BLUE, RGB565_GREEN, RGB565_RED, RGB565_WHITE},
    gc9a01,
    hw::{LineRole, LineSpec},
    linux, RefreshWindow,
};

const GPIO_CHIP: &str = "/dev/gpiochip0";
const SPI_DEVICE: &str = "/dev/spidev0.0";

const LINES: [LineSpec; 3] = [
    LineSpec::output(LineRole::ChipSelect, 7, PinState::High),
    LineSpec::output(LineRole::DataCommand, 5, PinState::Low),
    LineSpec::output(LineRole::Reset, 6, PinState::High),
];

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut tft = linux::open_panel(
        GPIO_CHIP,
        &LINES,
        SPI_DEVICE,
        &gc9a01::spi_config(),
        gc9a01::config(),
        "gc9a01-sample",
    )
    .context("opening the panel")?;
    tft.start().context("initializing the panel")?;

    info!("Filling screen red, green, blue");
    for color in [RGB565_RED, RGB565_GREEN, RGB565_BLUE] {
        tft.fill(color).context("filling the panel")?;
        thread::sleep(Duration::from_secs(2));
    }

    info!("Drawing a gradient square");
    let window = RefreshWindow::new(70, 70, 169, 169);
    let mut pixels = Vec::with_capacity(window.pixel_count() * 2);
    for row in 0..window.height() {
        for col in 0..window.width() {
            let color = rgb565((col * 255 / 99) as u8, (row * 255 / 99) as u8, 0x80);
            pixels.extend_from_slice(&color.to_be_bytes());
        }
    }
    tft.write_window(window, &pixels)
        .context("writing the window")?;
    thread::sleep(Duration::from_secs(2));

    info!("Drawing a frame");
    let mut frame = tft.new_framebuffer()?;
    {
        let mut canvas = frame.rgb_canvas()?;
        let center = canvas.bounding_box().center();
        Circle::with_center(center, 200)
            .into_styled(PrimitiveStyle::with_fill(Rgb565::MAGENTA))
            .draw(&mut canvas)?;
        Circle::with_center(center, 80)
            .into_styled(PrimitiveStyle::with_fill(Rgb565::YELLOW))
            .draw(&mut canvas)?;
    }
    tft.draw(&frame).context("drawing the frame")?;
    thread::sleep(Duration::from_secs(2));

    tft.fill(RGB565_WHITE).context("filling the panel")?;
    tft.sleep().context("putting the panel to sleep")?;
    info!("Done. Display should be white before sleeping.");
    Ok(())
}
