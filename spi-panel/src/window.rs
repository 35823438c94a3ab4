use embedded_graphics::{prelude::Point, primitives::Rectangle};

use crate::error::{ConfigError, Error};

/// A rectangle of panel memory, with inclusive bounds on both axes.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshWindow {
    pub x0: u16,
    pub y0: u16,
    pub x1: u16,
    pub y1: u16,
}

impl RefreshWindow {
    pub const fn new(x0: u16, y0: u16, x1: u16, y1: u16) -> Self {
        RefreshWindow { x0, y0, x1, y1 }
    }

    /// The window covering a whole `width` x `height` panel.
    pub const fn full(width: u16, height: u16) -> Self {
        RefreshWindow {
            x0: 0,
            y0: 0,
            x1: width.saturating_sub(1),
            y1: height.saturating_sub(1),
        }
    }

    pub const fn width(&self) -> u16 {
        self.x1 - self.x0 + 1
    }

    pub const fn height(&self) -> u16 {
        self.y1 - self.y0 + 1
    }

    /// Number of pixels in the window. Only meaningful for a window that passed [Self::validate].
    pub const fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// Checks `x0 <= x1 < width` and `y0 <= y1 < height`.
    pub fn validate(&self, width: u16, height: u16) -> Result<(), Error> {
        if self.x0 <= self.x1 && self.x1 < width && self.y0 <= self.y1 && self.y1 < height {
            Ok(())
        } else {
            Err(ConfigError::WindowOutOfBounds {
                window: *self,
                width,
                height,
            }
            .into())
        }
    }

    /// Parameters for a column address command: start and end, each big-endian.
    pub fn column_params(&self) -> [u8; 4] {
        span_params(self.x0, self.x1)
    }

    /// Parameters for a row address command: start and end, each big-endian.
    pub fn row_params(&self) -> [u8; 4] {
        span_params(self.y0, self.y1)
    }
}

fn span_params(start: u16, end: u16) -> [u8; 4] {
    let [start_high, start_low] = start.to_be_bytes();
    let [end_high, end_low] = end.to_be_bytes();
    [start_high, start_low, end_high, end_low]
}

impl TryFrom<Rectangle> for RefreshWindow {
    type Error = Error;

    /// Converts a non-empty rectangle in the positive quadrant. Bounds against a panel are
    /// checked later, by [RefreshWindow::validate].
    fn try_from(rect: Rectangle) -> Result<Self, Self::Error> {
        let out_of_range = || -> Error { ConfigError::InvalidRectangle(rect).into() };
        let Some(bottom_right) = rect.bottom_right() else {
            return Err(out_of_range());
        };
        let Point { x: x0, y: y0 } = rect.top_left;
        let Point { x: x1, y: y1 } = bottom_right;
        let convert = |v: i32| u16::try_from(v).map_err(|_| out_of_range());
        Ok(RefreshWindow::new(
            convert(x0)?,
            convert(y0)?,
            convert(x1)?,
            convert(y1)?,
        ))
    }
}
