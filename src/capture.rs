//! Frame capture: scroll to a tile, let the page settle, rasterize, decode

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbaImage;
use log::debug;

use crate::geometry::{Point, Rect};
use crate::host::Host;
use crate::planner::Tile;
use crate::{Error, Result};

/// Shared flag used to dismiss a running session.
///
/// Cloning yields another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cancellation and deadline check run at every suspend point of a session
#[derive(Debug, Clone)]
pub struct Checkpoint {
    cancel: CancelToken,
    deadline: Option<(Instant, u64)>,
}

impl Checkpoint {
    /// `timeout_ms == 0` disables the deadline.
    pub fn new(cancel: CancelToken, timeout_ms: u64) -> Self {
        let deadline = (timeout_ms > 0).then(|| (Instant::now() + Duration::from_millis(timeout_ms), timeout_ms));
        Self { cancel, deadline }
    }

    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some((deadline, ms)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::Timeout(ms));
            }
        }
        Ok(())
    }
}

/// One decoded viewport raster and the geometry it was taken at
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub image: RgbaImage,
    /// Scroll offset the tile asked for
    pub requested_scroll: Point,
    /// Scroll offset the host actually reached, which may differ from the
    /// requested tile position near the document edges
    pub actual_scroll: Point,
    pub viewport_width: f64,
    pub viewport_height: f64,
    /// Device pixels per CSS pixel in `image`
    pub pixel_ratio: f64,
}

impl CapturedFrame {
    /// The document-space area this frame shows.
    pub fn document_rect(&self) -> Rect {
        Rect::new(self.actual_scroll.x, self.actual_scroll.y, self.viewport_width, self.viewport_height)
    }

    /// The document-space area this frame is responsible for: the planned
    /// tile cell, whatever scroll the host actually reached.
    pub fn tile_rect(&self) -> Rect {
        Rect::new(
            self.requested_scroll.x,
            self.requested_scroll.y,
            self.viewport_width,
            self.viewport_height,
        )
    }
}

/// Decode an encoded raster returned by a host.
pub fn decode_frame(bytes: &[u8]) -> Result<RgbaImage> {
    if bytes.is_empty() {
        return Err(Error::CaptureUnavailable("host returned an empty raster".into()));
    }
    let img = image::load_from_memory(bytes).map_err(|e| Error::DecodeError(e.to_string()))?;
    Ok(img.to_rgba8())
}

/// Adapter moving the host viewport and collecting frames
pub struct FrameCapturer<'h, H: Host + ?Sized> {
    host: &'h mut H,
    settle_delay: Duration,
    checkpoint: Checkpoint,
}

impl<'h, H: Host + ?Sized> FrameCapturer<'h, H> {
    pub fn new(host: &'h mut H, settle_delay: Duration, checkpoint: Checkpoint) -> Self {
        Self {
            host,
            settle_delay,
            checkpoint,
        }
    }

    /// Capture the viewport scrolled to `tile`.
    ///
    /// The returned frame carries the scroll offset re-read after scrolling,
    /// not the requested one. The settle delay is a fixed wait for layout and
    /// paint to catch up; it is not a completion signal.
    pub fn capture(&mut self, tile: &Tile) -> Result<CapturedFrame> {
        self.checkpoint.check()?;
        self.host.set_scroll(tile.x, tile.y)?;

        if !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }
        self.checkpoint.check()?;

        let actual_scroll = self.host.scroll_position()?;
        let viewport = self.host.viewport()?;

        let raw = self.host.request_viewport_raster().map_err(|e| match e {
            Error::CaptureUnavailable(_) | Error::Cancelled | Error::Timeout(_) => e,
            other => Error::CaptureUnavailable(other.to_string()),
        })?;
        self.checkpoint.check()?;

        let image = decode_frame(&raw)?;
        self.checkpoint.check()?;

        debug!(
            "tile {} requested ({}, {}) landed at ({}, {}), raster {}x{}",
            tile.index,
            tile.x,
            tile.y,
            actual_scroll.x,
            actual_scroll.y,
            image.width(),
            image.height()
        );

        Ok(CapturedFrame {
            image,
            requested_scroll: Point::new(tile.x, tile.y),
            actual_scroll,
            viewport_width: viewport.inner_width,
            viewport_height: viewport.inner_height,
            pixel_ratio: viewport.pixel_ratio(),
        })
    }
}
