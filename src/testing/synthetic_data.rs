//! Synthetic capture payloads
//!
//! Frame stream buffers are BGRA with a gradient that changes per frame, so
//! consecutive frames differ and channel swaps are detectable. Still payloads
//! are real JPEG bytes so the decode path runs end to end.

use crate::types::{PixelBuffer, PixelFormat};
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;

/// Shape of the frames produced by the simulated frame pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticFrameSpec {
    pub width: u32,
    pub height: u32,
    /// Extra bytes at the end of every row, as hardware buffers often carry.
    pub row_padding: usize,
}

impl Default for SyntheticFrameSpec {
    fn default() -> Self {
        Self {
            width: 64,
            height: 48,
            row_padding: 0,
        }
    }
}

/// Create a BGRA frame for the given frame number.
pub fn synthetic_pixel_buffer(frame_number: u64, spec: SyntheticFrameSpec) -> PixelBuffer {
    let bytes_per_row = spec.width as usize * 4 + spec.row_padding;
    let mut data = vec![0u8; bytes_per_row * spec.height as usize];

    let base = (frame_number % 256) as u8;
    for y in 0..spec.height {
        for x in 0..spec.width {
            let idx = y as usize * bytes_per_row + x as usize * 4;
            data[idx] = base.wrapping_add(((x + y) % 256) as u8); // B
            data[idx + 1] = base.wrapping_add((y % 256) as u8); // G
            data[idx + 2] = base.wrapping_add((x % 256) as u8); // R
            data[idx + 3] = 0xFF;
        }
    }

    PixelBuffer {
        width: spec.width,
        height: spec.height,
        bytes_per_row,
        format: PixelFormat::Bgra8,
        data: Bytes::from(data),
    }
}

/// Encode a gradient still as JPEG, the format photo outputs hand back.
pub fn synthetic_jpeg(width: u32, height: u32) -> Result<Bytes, image::ImageError> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Jpeg)?;
    Ok(Bytes::from(out.into_inner()))
}
