use alloc::{vec, vec::Vec};
use core::convert::Infallible;

use embedded_graphics::{
    pixelcolor::{BinaryColor, IntoStorage, Rgb565},
    prelude::{Dimensions, DrawTarget, Point, Size},
    primitives::Rectangle,
    Pixel,
};

use crate::error::{ConfigError, Error};

/// How pixels are laid out on the wire.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelEncoding {
    /// 1 bit per pixel, row-major, MSB first. A set bit is white, a clear bit is black.
    Mono1bpp,
    /// 2 bytes per pixel, row-major, big-endian 5-6-5 red/green/blue.
    Rgb565,
}

impl PixelEncoding {
    pub const fn bits_per_pixel(&self) -> usize {
        match self {
            PixelEncoding::Mono1bpp => 1,
            PixelEncoding::Rgb565 => 16,
        }
    }

    /// Number of bytes needed for a `width` x `height` frame: `ceil(width*height*bpp/8)`.
    pub const fn byte_len(&self, width: u16, height: u16) -> usize {
        (width as usize * height as usize * self.bits_per_pixel()).div_ceil(8)
    }

    fn check_dimensions(&self, width: u16) -> Result<(), Error> {
        if *self == PixelEncoding::Mono1bpp && width % 8 != 0 {
            return Err(ConfigError::UnalignedWidth(width).into());
        }
        Ok(())
    }
}

/// Packs 8-bit red, green and blue channels into an RGB565 value.
pub const fn rgb565(red: u8, green: u8, blue: u8) -> u16 {
    ((red as u16 & 0xF8) << 8) | ((green as u16 & 0xFC) << 3) | (blue as u16 >> 3)
}

pub const RGB565_BLACK: u16 = 0x0000;
pub const RGB565_WHITE: u16 = 0xFFFF;
pub const RGB565_RED: u16 = 0xF800;
pub const RGB565_GREEN: u16 = 0x07E0;
pub const RGB565_BLUE: u16 = 0x001F;

/// A frame of pixels in a panel's wire encoding.
///
/// The data length always matches the dimensions and encoding exactly.
#[derive(Clone, PartialEq, Eq)]
pub struct Framebuffer {
    width: u16,
    height: u16,
    encoding: PixelEncoding,
    data: Vec<u8>,
}

impl core::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("encoding", &self.encoding)
            .field("len", &self.data.len())
            .finish()
    }
}

impl Framebuffer {
    /// Wraps already-encoded bytes. The length must match the dimensions exactly; nothing is
    /// truncated or padded.
    pub fn from_bytes(
        width: u16,
        height: u16,
        encoding: PixelEncoding,
        data: Vec<u8>,
    ) -> Result<Self, Error> {
        encoding.check_dimensions(width)?;
        let expected = encoding.byte_len(width, height);
        if data.len() != expected {
            return Err(ConfigError::FramebufferSize {
                width,
                height,
                expected,
                actual: data.len(),
            }
            .into());
        }
        Ok(Framebuffer {
            width,
            height,
            encoding,
            data,
        })
    }

    /// An all-white 1-bit frame.
    pub fn white(width: u16, height: u16) -> Result<Self, Error> {
        Self::mono_filled(width, height, false)
    }

    /// A 1-bit frame with every pixel black or every pixel white.
    pub fn mono_filled(width: u16, height: u16, black: bool) -> Result<Self, Error> {
        let encoding = PixelEncoding::Mono1bpp;
        encoding.check_dimensions(width)?;
        let byte = if black { 0x00 } else { 0xFF };
        Ok(Framebuffer {
            width,
            height,
            encoding,
            data: vec![byte; encoding.byte_len(width, height)],
        })
    }

    /// A 16-bit frame filled with one colour.
    pub fn rgb565_filled(width: u16, height: u16, color: u16) -> Self {
        let [high, low] = color.to_be_bytes();
        let mut data = Vec::with_capacity(PixelEncoding::Rgb565.byte_len(width, height));
        for _ in 0..(width as usize * height as usize) {
            data.push(high);
            data.push(low);
        }
        Framebuffer {
            width,
            height,
            encoding: PixelEncoding::Rgb565,
            data,
        }
    }

    /// Builds a 1-bit frame from a predicate returning whether the pixel at `(row, col)` is black.
    ///
    /// ```
    /// use spi_panel::buffer::Framebuffer;
    ///
    /// // Alternate 16-pixel tall black and white bands.
    /// let stripes = Framebuffer::mono_from_fn(128, 296, |row, _col| (row / 16) % 2 == 0).unwrap();
    /// assert_eq!(stripes.data().len(), 128 * 296 / 8);
    /// assert_eq!(stripes.data()[0], 0x00);
    /// ```
    pub fn mono_from_fn<F>(width: u16, height: u16, mut is_black: F) -> Result<Self, Error>
    where
        F: FnMut(u16, u16) -> bool,
    {
        let mut buffer = Self::white(width, height)?;
        for row in 0..height {
            for col in 0..width {
                if is_black(row, col) {
                    let (byte_index, mask) = buffer.bit_position(row, col);
                    buffer.data[byte_index] &= !mask;
                }
            }
        }
        Ok(buffer)
    }

    /// Builds a 16-bit frame from the RGB565 colour of each `(row, col)`.
    pub fn rgb565_from_fn<F>(width: u16, height: u16, mut color: F) -> Self
    where
        F: FnMut(u16, u16) -> u16,
    {
        let mut data = Vec::with_capacity(PixelEncoding::Rgb565.byte_len(width, height));
        for row in 0..height {
            for col in 0..width {
                data.extend_from_slice(&color(row, col).to_be_bytes());
            }
        }
        Framebuffer {
            width,
            height,
            encoding: PixelEncoding::Rgb565,
            data,
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn encoding(&self) -> PixelEncoding {
        self.encoding
    }

    /// The encoded bytes, ready to stream to the panel.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Whether the pixel is black. `None` if out of bounds or the frame isn't 1-bit.
    pub fn is_black(&self, row: u16, col: u16) -> Option<bool> {
        if self.encoding != PixelEncoding::Mono1bpp || row >= self.height || col >= self.width {
            return None;
        }
        let (byte_index, mask) = self.bit_position(row, col);
        Some(self.data[byte_index] & mask == 0)
    }

    /// The RGB565 colour of a pixel. `None` if out of bounds or the frame isn't 16-bit.
    pub fn rgb565_at(&self, row: u16, col: u16) -> Option<u16> {
        if self.encoding != PixelEncoding::Rgb565 || row >= self.height || col >= self.width {
            return None;
        }
        let i = (row as usize * self.width as usize + col as usize) * 2;
        Some(u16::from_be_bytes([self.data[i], self.data[i + 1]]))
    }

    /// A `DrawTarget` over a 1-bit frame. `BinaryColor::On` is white, `Off` is black.
    pub fn mono_canvas(&mut self) -> Result<MonoCanvas<'_>, Error> {
        self.expect_encoding(PixelEncoding::Mono1bpp)?;
        Ok(MonoCanvas { buffer: self })
    }

    /// A `DrawTarget` over a 16-bit frame.
    pub fn rgb_canvas(&mut self) -> Result<RgbCanvas<'_>, Error> {
        self.expect_encoding(PixelEncoding::Rgb565)?;
        Ok(RgbCanvas { buffer: self })
    }

    /// Checks that this frame can be sent to a `width` x `height` panel using `encoding`.
    pub fn check_format(&self, encoding: PixelEncoding, width: u16, height: u16) -> Result<(), Error> {
        self.expect_encoding(encoding)?;
        if self.width != width || self.height != height {
            return Err(ConfigError::DimensionMismatch {
                expected_width: width,
                expected_height: height,
                width: self.width,
                height: self.height,
            }
            .into());
        }
        Ok(())
    }

    fn expect_encoding(&self, expected: PixelEncoding) -> Result<(), Error> {
        if self.encoding != expected {
            return Err(ConfigError::EncodingMismatch {
                expected,
                actual: self.encoding,
            }
            .into());
        }
        Ok(())
    }

    fn bit_position(&self, row: u16, col: u16) -> (usize, u8) {
        let bit_index = row as usize * self.width as usize + col as usize;
        (bit_index / 8, 0x80 >> (bit_index % 8))
    }

    fn bounds(&self) -> Rectangle {
        Rectangle::new(
            Point::zero(),
            Size::new(self.width as u32, self.height as u32),
        )
    }

    fn contains(&self, point: Point) -> bool {
        point.x >= 0
            && point.y >= 0
            && point.x < self.width as i32
            && point.y < self.height as i32
    }
}

/// Draws `embedded-graphics` content into a 1-bit [Framebuffer].
pub struct MonoCanvas<'a> {
    buffer: &'a mut Framebuffer,
}

impl MonoCanvas<'_> {
    fn set(&mut self, point: Point, color: BinaryColor) {
        let (byte_index, mask) = self.buffer.bit_position(point.y as u16, point.x as u16);
        if color == BinaryColor::On {
            self.buffer.data[byte_index] |= mask;
        } else {
            self.buffer.data[byte_index] &= !mask;
        }
    }
}

impl Dimensions for MonoCanvas<'_> {
    fn bounding_box(&self) -> Rectangle {
        self.buffer.bounds()
    }
}

impl DrawTarget for MonoCanvas<'_> {
    type Color = BinaryColor;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels.into_iter() {
            if !self.buffer.contains(point) {
                continue; // Skip out-of-bounds pixels
            }
            self.set(point, color);
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let area = self.bounding_box().intersection(area);
        let Some(bottom_right) = area.bottom_right() else {
            return Ok(()); // Nothing to fill
        };
        let fill_byte = if color == BinaryColor::On { 0xFF } else { 0x00 };
        let bytes_per_row = self.buffer.width as usize / 8;

        for y in area.top_left.y..=bottom_right.y {
            let mut x = area.top_left.x;
            while x <= bottom_right.x {
                // Whole bytes can be written at once when aligned and fully covered.
                if x % 8 == 0 && x + 7 <= bottom_right.x {
                    self.buffer.data[y as usize * bytes_per_row + x as usize / 8] = fill_byte;
                    x += 8;
                } else {
                    self.set(Point::new(x, y), color);
                    x += 1;
                }
            }
        }
        Ok(())
    }
}

/// Draws `embedded-graphics` content into a 16-bit [Framebuffer].
pub struct RgbCanvas<'a> {
    buffer: &'a mut Framebuffer,
}

impl Dimensions for RgbCanvas<'_> {
    fn bounding_box(&self) -> Rectangle {
        self.buffer.bounds()
    }
}

impl DrawTarget for RgbCanvas<'_> {
    type Color = Rgb565;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels.into_iter() {
            if !self.buffer.contains(point) {
                continue;
            }
            let i = (point.y as usize * self.buffer.width as usize + point.x as usize) * 2;
            let [high, low] = color.into_storage().to_be_bytes();
            self.buffer.data[i] = high;
            self.buffer.data[i + 1] = low;
        }
        Ok(())
    }
}

/// Size of the repeated chunk used by [SolidFill].
pub const FILL_CHUNK_BYTES: usize = 512;

/// Produces the bytes of a solid-colour RGB565 fill without allocating a whole frame.
///
/// One chunk of repeated colour is reused until the requested pixel count is exhausted; the
/// final chunk is shortened so exactly `pixels * 2` bytes come out in total.
pub struct SolidFill {
    chunk: [u8; FILL_CHUNK_BYTES],
    remaining: usize,
}

impl SolidFill {
    pub fn new(color: u16, pixels: usize) -> Self {
        let mut chunk = [0; FILL_CHUNK_BYTES];
        let [high, low] = color.to_be_bytes();
        for pair in chunk.chunks_exact_mut(2) {
            pair[0] = high;
            pair[1] = low;
        }
        SolidFill {
            chunk,
            remaining: pixels,
        }
    }

    /// Pixels not yet handed out.
    pub fn remaining_pixels(&self) -> usize {
        self.remaining
    }

    /// The next run of bytes, or `None` once every pixel has been produced.
    pub fn next_chunk(&mut self) -> Option<&[u8]> {
        if self.remaining == 0 {
            return None;
        }
        let pixels = self.remaining.min(FILL_CHUNK_BYTES / 2);
        self.remaining -= pixels;
        Some(&self.chunk[..pixels * 2])
    }
}
