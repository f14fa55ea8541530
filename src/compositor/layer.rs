//! A positioned pixel surface composited into the screen.
//!
//! A `Layer` does not own its pixels: the caller provides the buffer
//! (static storage or a leaked allocation) and keeps mutating it through
//! the layer for as long as the layer lives. Position may be negative or
//! run off the screen; the compositor clips per pixel.
//!
//! Pixels are packed 0xAARRGGBB. An `Option` color key means 0x00000000
//! is a perfectly usable key value.

use core::convert::Infallible;

use embedded_graphics::prelude::{OriginDimensions, Size};
use embedded_graphics::{draw_target::DrawTarget, pixelcolor::Rgb888, prelude::RgbColor, Pixel};

use crate::compositor::font::{self, GLYPH_HEIGHT, GLYPH_WIDTH};

pub struct Layer<'a> {
    buffer: &'a mut [u32],
    x: i32,
    y: i32,
    width: usize,
    height: usize,
    transparent: Option<u32>,
    active: bool,
    dynamic: bool,
}

impl<'a> Layer<'a> {
    /// Wrap a caller-provided buffer. The buffer must cover the declared
    /// shape; that is a construction-time requirement, not a runtime
    /// error path.
    pub fn new(buffer: &'a mut [u32], width: usize, height: usize) -> Self {
        assert!(buffer.len() >= width * height, "layer buffer too small");
        Self {
            buffer,
            x: 0,
            y: 0,
            width,
            height,
            transparent: None,
            active: true,
            dynamic: false,
        }
    }

    /// Builder: place the layer at a screen position.
    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Builder: pixels equal to `key` are skipped during composition.
    pub fn with_transparent_key(mut self, key: u32) -> Self {
        self.transparent = Some(key);
        self
    }

    /// Builder: recomposite this layer every frame instead of caching it
    /// in the static plane.
    pub fn animated(mut self) -> Self {
        self.dynamic = true;
        self
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn transparent_key(&self) -> Option<u32> {
        self.transparent
    }

    pub fn move_to(&mut self, x: i32, y: i32) {
        self.x = x;
        self.y = y;
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn pixels(&self) -> &[u32] {
        &self.buffer[..self.width * self.height]
    }

    /// Overwrite every pixel, including with a keyed-transparent value.
    pub fn fill(&mut self, color: u32) {
        for pixel in self.buffer[..self.width * self.height].iter_mut() {
            *pixel = color;
        }
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, color: u32) {
        if x < self.width && y < self.height {
            self.buffer[y * self.width + x] = color;
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        if x < self.width && y < self.height {
            Some(self.buffer[y * self.width + x])
        } else {
            None
        }
    }

    /// Draw one 8x8 glyph. With a background color the whole cell is
    /// overwritten, so redrawing text does not need a separate clear pass;
    /// with `None` the glyph's off bits leave the layer untouched.
    pub fn draw_char(&mut self, x: i32, y: i32, ch: u8, fg: u32, bg: Option<u32>) {
        let glyph = font::glyph(ch);
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                let px = x + col as i32;
                let py = y + row as i32;
                if px < 0 || py < 0 || px as usize >= self.width || py as usize >= self.height {
                    continue;
                }
                if bits & (1 << col) != 0 {
                    self.buffer[py as usize * self.width + px as usize] = fg;
                } else if let Some(bg) = bg {
                    self.buffer[py as usize * self.width + px as usize] = bg;
                }
            }
        }
    }

    pub fn draw_string(&mut self, x: i32, y: i32, text: &str, fg: u32, bg: Option<u32>) {
        let mut cx = x;
        for byte in text.bytes() {
            self.draw_char(cx, y, byte, fg, bg);
            cx += GLYPH_WIDTH as i32;
        }
    }

    /// Cell height of a line of text drawn with [`Self::draw_string`].
    pub fn line_height() -> i32 {
        GLYPH_HEIGHT as i32
    }
}

// Layers are embedded-graphics draw targets, so demo surfaces can use the
// primitive and text APIs directly.
impl DrawTarget for Layer<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0
                || point.y < 0
                || point.x as usize >= self.width
                || point.y as usize >= self.height
            {
                continue;
            }
            let argb = 0xFF00_0000
                | ((color.r() as u32) << 16)
                | ((color.g() as u32) << 8)
                | color.b() as u32;
            self.buffer[point.y as usize * self.width + point.x as usize] = argb;
        }
        Ok(())
    }
}

impl OriginDimensions for Layer<'_> {
    fn size(&self) -> Size {
        Size::new(self.width as u32, self.height as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::prelude::*;
    use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};

    #[test]
    fn fill_overwrites_every_pixel_including_key_values() {
        let mut buf = [0xFFFF_FFFFu32; 16];
        let mut layer = Layer::new(&mut buf, 4, 4).with_transparent_key(0);
        layer.fill(0);
        assert!(layer.pixels().iter().all(|&p| p == 0));
    }

    #[test]
    fn draw_char_with_background_overwrites_the_cell() {
        let mut buf = [0u32; 64];
        let mut layer = Layer::new(&mut buf, 8, 8);
        layer.draw_char(0, 0, b'_', 0xFF00FF00, Some(0xFF111111));

        // '_' lights the bottom row only; everything else is background.
        assert_eq!(layer.pixel(0, 7), Some(0xFF00FF00));
        assert_eq!(layer.pixel(0, 0), Some(0xFF111111));
    }

    #[test]
    fn draw_char_without_background_leaves_off_bits_alone() {
        let mut buf = [0xFFAB_CDEFu32; 64];
        let mut layer = Layer::new(&mut buf, 8, 8);
        layer.draw_char(0, 0, b'_', 0xFF00FF00, None);
        assert_eq!(layer.pixel(0, 0), Some(0xFFAB_CDEF));
    }

    #[test]
    fn glyphs_clip_at_layer_edges() {
        let mut buf = [0u32; 16];
        let mut layer = Layer::new(&mut buf, 4, 4);
        // Partially off the left and bottom; must not wrap or panic.
        layer.draw_char(-4, 2, b'#', 0xFFFFFFFF, Some(0xFF000000));
    }

    #[test]
    fn embedded_graphics_primitives_land_in_the_buffer() {
        let mut buf = [0u32; 64];
        let mut layer = Layer::new(&mut buf, 8, 8);
        Rectangle::new(Point::new(0, 0), Size::new(2, 2))
            .into_styled(PrimitiveStyle::with_fill(Rgb888::new(0x10, 0x20, 0x30)))
            .draw(&mut layer)
            .unwrap();

        assert_eq!(layer.pixel(0, 0), Some(0xFF102030));
        assert_eq!(layer.pixel(2, 2), Some(0));
    }

    #[test]
    #[should_panic(expected = "layer buffer too small")]
    fn undersized_buffers_are_rejected_at_construction() {
        let mut buf = [0u32; 8];
        let _ = Layer::new(&mut buf, 4, 4);
    }
}
