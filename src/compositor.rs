//! Compositing captured frames into the destination buffer

use image::imageops::{self, FilterType};
use image::RgbaImage;
use log::{debug, trace};

use crate::capture::CapturedFrame;
use crate::geometry::{PixelRect, Rect};
use crate::{Error, Result};

/// Limits applied when allocating the destination buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    /// Largest allowed width or height in device pixels
    pub max_dimension: u32,
    /// Largest allowed width * height in device pixels
    pub max_pixels: u64,
}

/// Source and destination pixels of one performed copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blit {
    /// Region read from the frame raster
    pub source: PixelRect,
    /// Region written in the destination buffer
    pub destination: PixelRect,
}

/// Owner of the destination buffer for one session
#[derive(Debug)]
pub struct Compositor {
    selection: Rect,
    scale: f64,
    buffer: RgbaImage,
}

impl Compositor {
    /// Allocate a buffer for `selection` at `scale` device pixels per CSS pixel.
    ///
    /// `scale` must already account for the memory-limit policy; this fails
    /// with `BufferAllocationError` instead of shrinking further.
    pub fn new(selection: Rect, scale: f64, limits: BufferLimits) -> Result<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(Error::BufferAllocationError(format!("invalid scale {}", scale)));
        }
        let dims = Rect::new(0.0, 0.0, selection.width, selection.height).scale(scale);
        if dims.is_empty() {
            return Err(Error::BufferAllocationError(format!(
                "selection {}x{} at scale {} has no pixels",
                selection.width, selection.height, scale
            )));
        }
        if dims.width > limits.max_dimension || dims.height > limits.max_dimension {
            return Err(Error::BufferAllocationError(format!(
                "{}x{} exceeds the maximum dimension {}",
                dims.width, dims.height, limits.max_dimension
            )));
        }
        let pixels = u64::from(dims.width) * u64::from(dims.height);
        let fits_memory = pixels
            .checked_mul(4)
            .and_then(|bytes| usize::try_from(bytes).ok())
            .is_some();
        if pixels > limits.max_pixels || !fits_memory {
            return Err(Error::BufferAllocationError(format!(
                "{}x{} ({} pixels) exceeds the pixel limit {}",
                dims.width, dims.height, pixels, limits.max_pixels
            )));
        }

        debug!("allocating {}x{} destination buffer (scale {})", dims.width, dims.height, scale);
        Ok(Self {
            selection,
            scale,
            buffer: RgbaImage::new(dims.width, dims.height),
        })
    }

    pub fn selection(&self) -> &Rect {
        &self.selection
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    pub fn buffer(&self) -> &RgbaImage {
        &self.buffer
    }

    /// Where `frame` would land, without copying anything.
    ///
    /// A frame only contributes its own tile cell. When the host clamped the
    /// scroll, the rest of the frame repeats pixels a neighbouring tile owns
    /// and is left out, so every destination pixel is written once.
    ///
    /// `None` when the frame does not overlap the selection, for example
    /// because the host clamped its scroll short of the requested tile.
    pub fn plan_blit(&self, frame: &CapturedFrame) -> Option<Blit> {
        let overlap = frame
            .document_rect()
            .intersect(&frame.tile_rect())
            .intersect(&self.selection);
        if overlap.is_empty() {
            return None;
        }

        let (frame_w, frame_h) = frame.image.dimensions();
        let mut source = overlap
            .translate(-frame.actual_scroll.x, -frame.actual_scroll.y)
            .scale(frame.pixel_ratio)
            .clamp_to(frame_w, frame_h);

        let (buf_w, buf_h) = self.buffer.dimensions();
        let mut destination = overlap
            .translate(-self.selection.left, -self.selection.top)
            .scale(self.scale)
            .clamp_to(buf_w, buf_h);

        // At the frame's own ratio the copy is 1:1; a size mismatch is only
        // rounding or a short raster, so trim both sides to the common extent.
        if frame.pixel_ratio == self.scale {
            let width = source.width.min(destination.width);
            let height = source.height.min(destination.height);
            source.width = width;
            source.height = height;
            destination.width = width;
            destination.height = height;
        }

        if source.is_empty() || destination.is_empty() {
            return None;
        }
        Some(Blit { source, destination })
    }

    /// Copy the part of `frame` that overlaps the selection into the buffer.
    ///
    /// Pixels are replaced, not blended. When the session scale differs from
    /// the frame's pixel ratio the source region is resampled to the
    /// destination size first.
    pub fn blit(&mut self, frame: &CapturedFrame) -> Option<Blit> {
        let blit = self.plan_blit(frame)?;
        let Blit { source, destination } = blit;

        let region = imageops::crop_imm(&frame.image, source.x, source.y, source.width, source.height).to_image();
        let region = if (source.width, source.height) == (destination.width, destination.height) {
            region
        } else {
            trace!(
                "resampling {}x{} -> {}x{}",
                source.width,
                source.height,
                destination.width,
                destination.height
            );
            imageops::resize(&region, destination.width, destination.height, FilterType::Triangle)
        };
        imageops::replace(&mut self.buffer, &region, i64::from(destination.x), i64::from(destination.y));

        Some(blit)
    }

    /// Hand over the composited buffer.
    pub fn into_image(self) -> RgbaImage {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use image::Rgba;

    const LIMITS: BufferLimits = BufferLimits {
        max_dimension: 16000,
        max_pixels: 16384 * 16384,
    };

    fn frame(scroll: Point, w: u32, h: u32, ratio: f64, fill: Rgba<u8>) -> CapturedFrame {
        CapturedFrame {
            image: RgbaImage::from_pixel(w, h, fill),
            requested_scroll: scroll,
            actual_scroll: scroll,
            viewport_width: f64::from(w) / ratio,
            viewport_height: f64::from(h) / ratio,
            pixel_ratio: ratio,
        }
    }

    #[test]
    fn buffer_is_sized_by_scale() {
        let c = Compositor::new(Rect::new(10.0, 10.0, 300.0, 200.0), 2.0, LIMITS).unwrap();
        assert_eq!(c.dimensions(), (600, 400));
    }

    #[test]
    fn oversize_buffer_is_rejected() {
        let err = Compositor::new(Rect::new(0.0, 0.0, 9000.0, 10.0), 2.0, LIMITS).unwrap_err();
        assert!(matches!(err, Error::BufferAllocationError(_)));

        let tight = BufferLimits { max_dimension: 16000, max_pixels: 1000 };
        let err = Compositor::new(Rect::new(0.0, 0.0, 100.0, 100.0), 1.0, tight).unwrap_err();
        assert!(matches!(err, Error::BufferAllocationError(_)));
    }

    #[test]
    fn empty_selection_is_rejected() {
        let err = Compositor::new(Rect::new(0.0, 0.0, 0.0, 100.0), 1.0, LIMITS).unwrap_err();
        assert!(matches!(err, Error::BufferAllocationError(_)));
    }

    #[test]
    fn disjoint_frame_is_skipped() {
        let mut c = Compositor::new(Rect::new(0.0, 0.0, 100.0, 100.0), 1.0, LIMITS).unwrap();
        let f = frame(Point::new(500.0, 0.0), 100, 100, 1.0, Rgba([1, 2, 3, 255]));
        assert!(c.blit(&f).is_none());
        assert_eq!(*c.buffer().get_pixel(0, 0), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn overlap_is_placed_relative_to_selection() {
        // Selection starts mid-viewport; only its top-left 60x50 is visible.
        let mut c = Compositor::new(Rect::new(40.0, 50.0, 200.0, 200.0), 1.0, LIMITS).unwrap();
        let red = Rgba([255, 0, 0, 255]);
        let blit = c.blit(&frame(Point::new(0.0, 0.0), 100, 100, 1.0, red)).unwrap();
        assert_eq!(blit.source, PixelRect { x: 40, y: 50, width: 60, height: 50 });
        assert_eq!(blit.destination, PixelRect { x: 0, y: 0, width: 60, height: 50 });
        assert_eq!(*c.buffer().get_pixel(59, 49), red);
        assert_eq!(*c.buffer().get_pixel(60, 49), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn high_dpi_frame_copies_device_pixels() {
        let mut c = Compositor::new(Rect::new(0.0, 50.0, 100.0, 100.0), 2.0, LIMITS).unwrap();
        let blue = Rgba([0, 0, 255, 255]);
        let blit = c.blit(&frame(Point::new(0.0, 100.0), 200, 200, 2.0, blue)).unwrap();
        assert_eq!(blit.source, PixelRect { x: 0, y: 0, width: 200, height: 100 });
        assert_eq!(blit.destination, PixelRect { x: 0, y: 100, width: 200, height: 100 });
        assert_eq!(*c.buffer().get_pixel(199, 199), blue);
    }

    #[test]
    fn downscaled_session_resamples_source() {
        let mut c = Compositor::new(Rect::new(0.0, 0.0, 100.0, 100.0), 1.0, LIMITS).unwrap();
        let green = Rgba([0, 255, 0, 255]);
        let blit = c.blit(&frame(Point::new(0.0, 0.0), 400, 400, 4.0, green)).unwrap();
        assert_eq!(blit.source.width, 400);
        assert_eq!(blit.destination.width, 100);
        assert_eq!(*c.buffer().get_pixel(99, 99), green);
    }

    #[test]
    fn source_is_clamped_to_short_raster() {
        // Host returned one row less than the viewport promises.
        let mut c = Compositor::new(Rect::new(0.0, 0.0, 100.0, 100.0), 1.0, LIMITS).unwrap();
        let mut f = frame(Point::new(0.0, 0.0), 100, 99, 1.0, Rgba([9, 9, 9, 255]));
        f.viewport_height = 100.0;
        let blit = c.blit(&f).unwrap();
        assert_eq!(blit.source.height, 99);
        assert_eq!(blit.destination.height, 99);
        assert_eq!(*c.buffer().get_pixel(0, 98), Rgba([9, 9, 9, 255]));
        assert_eq!(*c.buffer().get_pixel(0, 99), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn fractional_scroll_copies_without_stretching() {
        // Source rows [0, 89.5) round to 90, destination rows [10.5, 100) to 89.
        let mut c = Compositor::new(Rect::new(0.0, 0.0, 100.0, 100.0), 1.0, LIMITS).unwrap();
        let mut f = frame(Point::new(0.0, 10.5), 100, 100, 1.0, Rgba([0, 0, 0, 255]));
        for (x, y, px) in f.image.enumerate_pixels_mut() {
            *px = Rgba([x as u8, y as u8, 0, 255]);
        }
        let blit = c.blit(&f).unwrap();
        assert_eq!(blit.source.height, blit.destination.height);
        assert_eq!(blit.destination, PixelRect { x: 0, y: 11, width: 100, height: 89 });
        // Rows are copied, not resampled.
        assert_eq!(*c.buffer().get_pixel(3, 11), Rgba([3, 0, 0, 255]));
        assert_eq!(*c.buffer().get_pixel(3, 99), Rgba([3, 88, 0, 255]));
    }

    #[test]
    fn clamped_frame_contributes_only_its_tile_cell() {
        // Tile asked for y=600 but the page only scrolls to 400.
        let mut c = Compositor::new(Rect::new(0.0, 0.0, 100.0, 1200.0), 1.0, LIMITS).unwrap();
        let mut f = frame(Point::new(0.0, 400.0), 100, 600, 1.0, Rgba([5, 5, 5, 255]));
        f.requested_scroll = Point::new(0.0, 600.0);
        let blit = c.blit(&f).unwrap();
        assert_eq!(blit.source, PixelRect { x: 0, y: 200, width: 100, height: 400 });
        assert_eq!(blit.destination, PixelRect { x: 0, y: 600, width: 100, height: 400 });
        assert_eq!(*c.buffer().get_pixel(0, 599), Rgba([0, 0, 0, 0]));
    }
}
