//! Drives the e-paper panel and the round TFT together from one SPI bus.
//!
//! The e-paper refresh blocks for seconds, so it runs on a worker thread and reports each refresh
//! back to main over a channel, while main keeps animating the TFT. Every panel operation holds
//! the bus guard, so transfers to the two panels never interleave. Wiring is the same as in the
//! `epd2in9` and `gc9a01` samples.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Mutex, MutexGuard, PoisonError,
    },
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context};
use embedded_graphics::{
    mono_font::{ascii::FONT_10X20, MonoTextStyle},
    pixelcolor::{BinaryColor, Rgb565},
    prelude::*,
    primitives::{Circle, PrimitiveStyle},
    text::Text,
};
use embedded_hal::digital::PinState;
use log::{info, warn};
use spi_panel::{
    buffer::{Framebuffer, RGB565_BLACK},
    epd2in9, gc9a01,
    hw::{LineRole, LineSpec},
    linux, Error,
};

const GPIO_CHIP: &str = "/dev/gpiochip0";
const SPI_DEVICE: &str = "/dev/spidev0.0";

const EPD_LINES: [LineSpec; 3] = [
    LineSpec::output(LineRole::DataCommand, 25, PinState::Low),
    LineSpec::output(LineRole::Reset, 17, PinState::High),
    LineSpec::input(LineRole::Busy, 24),
];

const TFT_LINES: [LineSpec; 3] = [
    LineSpec::output(LineRole::ChipSelect, 7, PinState::High),
    LineSpec::output(LineRole::DataCommand, 5, PinState::Low),
    LineSpec::output(LineRole::Reset, 6, PinState::High),
];

const SYMBOLS: [&str; 5] = ["*", "+", "o", "#", "@"];
const TFT_FRAMES: u32 = 500;

/// Held for every panel operation on the shared bus.
type Bus = Arc<Mutex<()>>;

fn lock(bus: &Mutex<()>) -> MutexGuard<'_, ()> {
    bus.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sent by the e-paper worker after each refresh.
enum Report {
    Refreshed(u32),
    Failed(u32, Error),
}

/// Xorshift, enough to scatter shapes around the panels.
struct Scatter(u32);

impl Scatter {
    fn next(&mut self, bound: u32) -> u32 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 17;
        self.0 ^= self.0 << 5;
        self.0 % bound
    }
}

fn epd_loop(
    bus: Bus,
    running: Arc<AtomicBool>,
    reports: mpsc::Sender<Report>,
) -> anyhow::Result<()> {
    let mut epd = linux::open_panel(
        GPIO_CHIP,
        &EPD_LINES,
        SPI_DEVICE,
        &epd2in9::spi_config(),
        epd2in9::config(),
        "dual-epd",
    )
    .context("opening the e-paper panel")?;
    {
        let _bus = lock(&bus);
        epd.start().context("initializing the e-paper panel")?;
        epd.clear().context("clearing the e-paper panel")?;
    }

    let style = MonoTextStyle::new(&FONT_10X20, BinaryColor::Off);
    let mut scatter = Scatter(0x2545_F491);
    let mut round = 0;
    while running.load(Ordering::Relaxed) {
        round += 1;
        let mut frame = epd.new_framebuffer()?;
        let position = Point::new(
            scatter.next(u32::from(epd2in9::DISPLAY_WIDTH) - 10) as i32,
            scatter.next(u32::from(epd2in9::DISPLAY_HEIGHT) - 20) as i32 + 16,
        );
        let symbol = SYMBOLS[scatter.next(SYMBOLS.len() as u32) as usize];
        Text::new(symbol, position, style).draw(&mut frame.mono_canvas()?)?;

        let result = {
            let _bus = lock(&bus);
            epd.display(&frame)
        };
        match result {
            Ok(()) => {
                if reports.send(Report::Refreshed(round)).is_err() {
                    break;
                }
            }
            Err(e) => {
                // The panel is left mid-refresh; dropping the session releases it.
                let _ = reports.send(Report::Failed(round, e));
                return Ok(());
            }
        }
        thread::sleep(Duration::from_millis(100));
    }

    let _bus = lock(&bus);
    epd.sleep().context("putting the e-paper panel to sleep")?;
    Ok(())
}

fn log_reports(reports: &mpsc::Receiver<Report>) {
    for report in reports.try_iter() {
        match report {
            Report::Refreshed(round) => info!("E-paper refresh {} done", round),
            Report::Failed(round, e) => warn!("E-paper refresh {} failed: {}", round, e),
        }
    }
}

fn tft_loop(bus: &Mutex<()>, reports: &mpsc::Receiver<Report>) -> anyhow::Result<()> {
    let mut tft = linux::open_panel(
        GPIO_CHIP,
        &TFT_LINES,
        SPI_DEVICE,
        &gc9a01::spi_config(),
        gc9a01::config(),
        "dual-tft",
    )
    .context("opening the TFT panel")?;
    {
        let _bus = lock(bus);
        tft.start().context("initializing the TFT panel")?;
        tft.fill(RGB565_BLACK).context("blanking the TFT panel")?;
    }

    let mut frame = Framebuffer::rgb565_filled(
        gc9a01::DISPLAY_WIDTH,
        gc9a01::DISPLAY_HEIGHT,
        RGB565_BLACK,
    );
    let mut scatter = Scatter(0x9E37_79B9);
    for _ in 0..TFT_FRAMES {
        let center = Point::new(scatter.next(200) as i32 + 20, scatter.next(200) as i32 + 20);
        let color = Rgb565::new(
            scatter.next(32) as u8,
            scatter.next(64) as u8,
            scatter.next(32) as u8,
        );
        Circle::with_center(center, 24)
            .into_styled(PrimitiveStyle::with_fill(color))
            .draw(&mut frame.rgb_canvas()?)?;
        {
            let _bus = lock(bus);
            tft.draw(&frame).context("drawing a frame")?;
        }
        log_reports(reports);
        thread::sleep(Duration::from_millis(10));
    }

    let _bus = lock(bus);
    tft.sleep().context("putting the TFT panel to sleep")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let bus: Bus = Arc::new(Mutex::new(()));
    let running = Arc::new(AtomicBool::new(true));
    let (sender, reports) = mpsc::channel();

    let worker = {
        let bus = Arc::clone(&bus);
        let running = Arc::clone(&running);
        thread::spawn(move || epd_loop(bus, running, sender))
    };
    info!("Dual display running");

    let tft_result = tft_loop(&bus, &reports);
    running.store(false, Ordering::Relaxed);
    let epd_result = worker
        .join()
        .map_err(|_| anyhow!("e-paper worker panicked"))?;
    log_reports(&reports);

    tft_result?;
    epd_result?;
    info!("Stopped");
    Ok(())
}
