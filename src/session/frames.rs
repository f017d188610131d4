//! Frame stream handling: buffer conversion and observer notification.

use crate::types::{CapturedImage, PixelBuffer, PixelFormat};
use image::RgbaImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;

/// Receives every converted frame, on the primary context.
pub trait FrameObserver: Send + Sync {
    fn captured(&self, image: CapturedImage);
}

impl<F> FrameObserver for F
where
    F: Fn(CapturedImage) + Send + Sync,
{
    fn captured(&self, image: CapturedImage) {
        self(image)
    }
}

/// Observer that forwards frames into a tokio channel.
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<CapturedImage>,
}

impl FrameObserver for ChannelObserver {
    fn captured(&self, image: CapturedImage) {
        if self.sender.send(image).is_err() {
            log::trace!("Frame receiver dropped; discarding frame");
        }
    }
}

/// Observer + receiver pair. Keep the observer alive for as long as frames
/// should flow; the controller only holds it weakly.
pub fn frame_channel() -> (Arc<ChannelObserver>, mpsc::UnboundedReceiver<CapturedImage>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Arc::new(ChannelObserver { sender }), receiver)
}

/// Converts raw stream buffers into RGBA images.
///
/// One converter lives for the whole session and is reused for every frame.
#[derive(Debug, Default)]
pub struct FrameConverter {
    converted: u64,
    last_size: Option<(u32, u32)>,
}

impl FrameConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when the buffer's geometry does not add up.
    pub fn convert(&mut self, buffer: &PixelBuffer) -> Option<RgbaImage> {
        let width = buffer.width as usize;
        let height = buffer.height as usize;
        let bpp = buffer.format.bytes_per_pixel();
        let row_bytes = width.checked_mul(bpp)?;

        if width == 0 || height == 0 || buffer.bytes_per_row < row_bytes {
            return None;
        }
        let required = buffer
            .bytes_per_row
            .checked_mul(height - 1)?
            .checked_add(row_bytes)?;
        if buffer.data.len() < required {
            return None;
        }

        let mut rgba = Vec::with_capacity(row_bytes * height);
        for row in buffer.data.chunks(buffer.bytes_per_row).take(height) {
            let pixels = &row[..row_bytes];
            match buffer.format {
                PixelFormat::Bgra8 => {
                    for px in pixels.chunks_exact(4) {
                        rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
                    }
                }
                PixelFormat::Rgba8 => rgba.extend_from_slice(pixels),
            }
        }

        if self.last_size != Some((buffer.width, buffer.height)) {
            log::debug!("Frame stream size now {}x{}", buffer.width, buffer.height);
            self.last_size = Some((buffer.width, buffer.height));
        }
        self.converted += 1;
        RgbaImage::from_raw(buffer.width, buffer.height, rgba)
    }

    pub fn converted(&self) -> u64 {
        self.converted
    }
}

/// Converter, observer slot and counters for one controller.
pub(crate) struct FrameRouter {
    converter: Mutex<FrameConverter>,
    observer: Mutex<Option<Weak<dyn FrameObserver>>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl FrameRouter {
    pub fn new() -> Self {
        Self {
            converter: Mutex::new(FrameConverter::new()),
            observer: Mutex::new(None),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn convert(&self, buffer: &PixelBuffer) -> Option<RgbaImage> {
        let converted = self
            .converter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .convert(buffer);
        if converted.is_none() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            log::trace!(
                "Dropping unconvertible frame {}x{} stride {} ({} bytes)",
                buffer.width,
                buffer.height,
                buffer.bytes_per_row,
                buffer.data.len()
            );
        }
        converted
    }

    /// Replaces any previous observer.
    pub fn set_observer(&self, observer: Option<Weak<dyn FrameObserver>>) {
        *self.observer.lock().unwrap_or_else(|e| e.into_inner()) = observer;
    }

    pub fn observer(&self) -> Option<Weak<dyn FrameObserver>> {
        self.observer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{synthetic_pixel_buffer, SyntheticFrameSpec};

    #[test]
    fn test_bgra_to_rgba() {
        let buffer = PixelBuffer::packed(1, 1, PixelFormat::Bgra8, vec![10u8, 20, 30, 255]);
        let image = FrameConverter::new().convert(&buffer).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [30, 20, 10, 255]);
    }

    #[test]
    fn test_row_padding_is_skipped() {
        let spec = SyntheticFrameSpec {
            width: 5,
            height: 4,
            row_padding: 12,
        };
        let buffer = synthetic_pixel_buffer(3, spec);
        let image = FrameConverter::new().convert(&buffer).unwrap();
        assert_eq!(image.dimensions(), (5, 4));

        // Last pixel of the last row comes from before the padding
        let idx = 3 * buffer.bytes_per_row + 4 * 4;
        let expected = [buffer.data[idx + 2], buffer.data[idx + 1], buffer.data[idx]];
        assert_eq!(&image.get_pixel(4, 3).0[..3], &expected);
    }

    #[test]
    fn test_short_buffer_rejected() {
        let mut converter = FrameConverter::new();
        let buffer = PixelBuffer::packed(4, 4, PixelFormat::Bgra8, vec![0u8; 10]);
        assert!(converter.convert(&buffer).is_none());

        let empty = PixelBuffer::packed(0, 4, PixelFormat::Bgra8, Vec::<u8>::new());
        assert!(converter.convert(&empty).is_none());
        assert_eq!(converter.converted(), 0);
    }

    #[test]
    fn test_router_counts_drops() {
        let router = FrameRouter::new();
        let bad = PixelBuffer::packed(2, 2, PixelFormat::Bgra8, vec![0u8; 3]);
        assert!(router.convert(&bad).is_none());
        assert_eq!(router.dropped(), 1);
    }

    #[test]
    fn test_closure_observer() {
        let seen = Arc::new(AtomicU64::new(0));
        let counter = seen.clone();
        let observer = move |_image: CapturedImage| {
            counter.fetch_add(1, Ordering::SeqCst);
        };
        let image = CapturedImage::new(
            image::DynamicImage::new_rgba8(2, 2),
            crate::types::CameraPosition::Front,
        );
        observer.captured(image);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
