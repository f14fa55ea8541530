//! Late-bound device framebuffer.
//!
//! Composition happens in a plain `width * height` pixel array; the real
//! scanout geometry (address, pitch, depth) arrives from the bootloader and
//! is bound here. The pitch may exceed `width * 4` bytes, so the flip
//! always walks rows.

use bootloader_api::info::FrameBuffer;

/// A view of the device scanout buffer plus its geometry.
pub struct FramebufferTarget<'a> {
    buffer: &'a mut [u8],
    width: usize,
    height: usize,
    /// Bytes per scan line; never assumed to equal `width * 4`.
    pitch: usize,
}

impl<'a> FramebufferTarget<'a> {
    /// Adopt a raw scanout buffer. Only 32-bpp modes are supported; the
    /// buffer must cover `height` full rows at `pitch`.
    pub fn new(
        buffer: &'a mut [u8],
        width: usize,
        height: usize,
        pitch: usize,
        bytes_per_pixel: usize,
    ) -> Result<Self, &'static str> {
        if bytes_per_pixel != 4 {
            return Err("framebuffer is not 32 bpp");
        }
        if pitch < width * 4 {
            return Err("framebuffer pitch smaller than a row");
        }
        if buffer.len() < pitch * height {
            return Err("framebuffer smaller than its declared geometry");
        }
        Ok(Self {
            buffer,
            width,
            height,
            pitch,
        })
    }

    /// Adopt the bootloader-provided framebuffer.
    pub fn from_boot_info(framebuffer: &'a mut FrameBuffer) -> Result<Self, &'static str> {
        let info = framebuffer.info();
        Self::new(
            framebuffer.buffer_mut(),
            info.width,
            info.height,
            info.stride * info.bytes_per_pixel,
            info.bytes_per_pixel,
        )
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Raw geometry for code that must write the device without holding
    /// this view (the crash painter).
    pub fn geometry(&self) -> (usize, usize, usize, usize) {
        (
            self.buffer.as_ptr() as usize,
            self.width,
            self.height,
            self.pitch,
        )
    }

    /// Copy a composed frame to the device, row by row.
    pub fn present(&mut self, back: &[u32]) {
        for y in 0..self.height {
            let row_start = y * self.pitch;
            let src = &back[y * self.width..(y + 1) * self.width];
            for (x, pixel) in src.iter().enumerate() {
                let offset = row_start + x * 4;
                self.buffer[offset..offset + 4].copy_from_slice(&pixel.to_le_bytes());
            }
        }
    }
}
