//! Pick render targets and the pooled pixel storage read back from them.

use crate::error::{RenderError, RenderResult};
use crate::readback::ReadbackMode;
use crate::renderer::PickRenderer;

const BYTES_PER_PIXEL: usize = 4;

/// A rectangle of pixels, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Creates a new rectangle.
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole `width` x `height` target.
    #[must_use]
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Number of bytes an RGBA8 copy of this rectangle takes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    /// Checks that the rectangle lies inside a `width` x `height` target.
    pub fn check_fits(&self, width: u32, height: u32) -> RenderResult<()> {
        let fits = self.x.checked_add(self.width).is_some_and(|r| r <= width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= height);
        if fits {
            Ok(())
        } else {
            Err(RenderError::RectOutOfBounds {
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
                target_width: width,
                target_height: height,
            })
        }
    }
}

/// RGBA8 pixels, rows stored top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Creates a buffer filled with zeros.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; PixelRect::full(width, height).byte_len()],
        }
    }

    /// Buffer width.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Buffer height.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Resizes in place. The existing allocation is reused when it is large enough.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.data.resize(PixelRect::full(width, height).byte_len(), 0);
    }

    /// Sets every pixel to `pixel`.
    pub fn fill(&mut self, pixel: [u8; 4]) {
        for chunk in self.data.chunks_exact_mut(BYTES_PER_PIXEL) {
            chunk.copy_from_slice(&pixel);
        }
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL
    }

    /// The pixel at (`x`, `y`), or `None` outside the buffer.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = self.offset(x, y);
        let mut pixel = [0; 4];
        pixel.copy_from_slice(&self.data[offset..offset + BYTES_PER_PIXEL]);
        Some(pixel)
    }

    /// Writes the pixel at (`x`, `y`). Out-of-bounds writes are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: [u8; 4]) {
        if x < self.width && y < self.height {
            let offset = self.offset(x, y);
            self.data[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&pixel);
        }
    }

    /// Copies `rect` into `out`, tightly packed.
    #[allow(clippy::cast_possible_truncation)]
    pub fn copy_rect(&self, rect: PixelRect, out: &mut [u8]) -> RenderResult<()> {
        rect.check_fits(self.width, self.height)?;
        if out.len() != rect.byte_len() {
            return Err(RenderError::SizeMismatch {
                expected: rect.byte_len(),
                actual: out.len(),
            });
        }
        let row_len = rect.width as usize * BYTES_PER_PIXEL;
        for (row, dst) in out.chunks_exact_mut(row_len.max(1)).enumerate() {
            let start = self.offset(rect.x, rect.y + row as u32);
            dst.copy_from_slice(&self.data[start..start + row_len]);
        }
        Ok(())
    }

    /// Replaces the whole buffer with `bytes`.
    pub fn copy_from(&mut self, bytes: &[u8]) -> RenderResult<()> {
        if bytes.len() != self.data.len() {
            return Err(RenderError::SizeMismatch {
                expected: self.data.len(),
                actual: bytes.len(),
            });
        }
        self.data.copy_from_slice(bytes);
        Ok(())
    }

    /// Raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Raw bytes, mutable.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// A renderer target paired with the buffer its pixels are read into.
///
/// Created once and reused for every pick. When the requested size changes
/// the target is resized through the renderer instead of being recreated.
#[derive(Debug)]
pub struct PixelStorage<T> {
    target: T,
    buffer: PixelBuffer,
}

impl<T> PixelStorage<T> {
    /// Creates storage with a new `width` x `height` target.
    pub fn new<R>(renderer: &mut R, width: u32, height: u32) -> RenderResult<Self>
    where
        R: PickRenderer<Target = T>,
    {
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyTarget { width, height });
        }
        log::debug!("creating pick target {width}x{height}");
        Ok(Self {
            target: renderer.create_target(width, height)?,
            buffer: PixelBuffer::new(width, height),
        })
    }

    /// Current (width, height).
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.buffer.width(), self.buffer.height())
    }

    /// Resizes the target and buffer if the size differs.
    pub fn ensure_size<R>(&mut self, renderer: &mut R, width: u32, height: u32) -> RenderResult<()>
    where
        R: PickRenderer<Target = T>,
    {
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyTarget { width, height });
        }
        if self.size() == (width, height) {
            return Ok(());
        }
        log::debug!(
            "resizing pick target {}x{} -> {width}x{height}",
            self.buffer.width(),
            self.buffer.height()
        );
        renderer.resize_target(&mut self.target, width, height)?;
        self.buffer.resize(width, height);
        Ok(())
    }

    /// The render target, mutable.
    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// The last pixels read back.
    #[must_use]
    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    /// Reads the whole target into the buffer using `mode`.
    pub async fn read<R>(&mut self, renderer: &mut R, mode: ReadbackMode) -> RenderResult<&PixelBuffer>
    where
        R: PickRenderer<Target = T>,
    {
        let (width, height) = self.size();
        let rect = PixelRect::full(width, height);
        match mode {
            ReadbackMode::Blocking => {
                renderer.read_pixels(&self.target, rect, self.buffer.as_bytes_mut())?;
            }
            ReadbackMode::Deferred => {
                let bytes = renderer.read_pixels_deferred(&self.target, rect)?.await?;
                self.buffer.copy_from(&bytes)?;
            }
        }
        Ok(&self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_offsets_are_top_down() {
        let mut buffer = PixelBuffer::new(3, 2);
        buffer.set_pixel(2, 1, [1, 2, 3, 4]);
        assert_eq!(buffer.pixel(2, 1), Some([1, 2, 3, 4]));
        assert_eq!(&buffer.as_bytes()[(3 + 2) * 4..(3 + 2) * 4 + 4], &[1, 2, 3, 4]);
        assert_eq!(buffer.pixel(3, 0), None);
    }

    #[test]
    fn test_copy_rect() {
        let mut buffer = PixelBuffer::new(4, 4);
        buffer.set_pixel(1, 2, [9, 9, 9, 9]);
        buffer.set_pixel(2, 2, [7, 7, 7, 7]);
        let mut out = [0u8; 8];
        buffer.copy_rect(PixelRect::new(1, 2, 2, 1), &mut out).unwrap();
        assert_eq!(out, [9, 9, 9, 9, 7, 7, 7, 7]);

        assert!(matches!(
            buffer.copy_rect(PixelRect::new(3, 3, 2, 1), &mut out),
            Err(RenderError::RectOutOfBounds { .. })
        ));
        assert!(matches!(
            buffer.copy_rect(PixelRect::new(0, 0, 1, 1), &mut out),
            Err(RenderError::SizeMismatch { expected: 4, actual: 8 })
        ));
    }

    #[test]
    fn test_resize_and_fill() {
        let mut buffer = PixelBuffer::new(1, 1);
        buffer.resize(2, 3);
        assert_eq!(buffer.as_bytes().len(), 24);
        buffer.fill([0, 0, 0, 255]);
        assert_eq!(buffer.pixel(1, 2), Some([0, 0, 0, 255]));
    }

    #[test]
    fn test_rect_overflow_is_rejected() {
        assert!(PixelRect::new(u32::MAX, 0, 2, 1).check_fits(10, 10).is_err());
        assert!(PixelRect::full(10, 10).check_fits(10, 10).is_ok());
    }
}
