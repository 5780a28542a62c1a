//! Deterministic in-memory page used by tests, benches and the offline CLI mode
//!
//! Every device pixel of the synthetic document has a colour derived from its
//! device-space document coordinates (see [`SyntheticPage::expected_pixel`]),
//! so a stitched image can be checked pixel by pixel against the page.

use std::collections::HashMap;
use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};
use log::debug;

use super::{DocumentState, ElementHandle, Host, Visibility};
use crate::geometry::{Point, ViewportState};
use crate::{Error, Result};

/// Colour painted by a visible fixed element
pub const FIXED_ELEMENT_COLOR: Rgba<u8> = Rgba([255, 0, 255, 255]);

/// Fault injected into a specific raster request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFault {
    /// The host call fails
    Error,
    /// The host call succeeds with no data
    Empty,
    /// The host returns bytes that are not an image
    Corrupt,
}

/// A fixed-position banner pinned to the top of the viewport
#[derive(Debug, Clone)]
struct FixedElement {
    id: String,
    height: f64,
    /// Inline `visibility` value
    visibility: String,
}

impl FixedElement {
    fn is_visible(&self) -> bool {
        self.visibility != "hidden"
    }
}

type RasterHook = Box<dyn FnMut(usize) + Send>;

/// Synthetic document with a scrollable viewport
pub struct SyntheticPage {
    document_width: f64,
    document_height: f64,
    viewport_width: f64,
    viewport_height: f64,
    device_pixel_ratio: f64,
    scroll: Point,
    overflow: String,
    scroll_behavior: String,
    fixed: Vec<FixedElement>,
    faults: HashMap<usize, RasterFault>,
    raster_calls: usize,
    scroll_requests: Vec<Point>,
    on_raster: Option<RasterHook>,
}

impl std::fmt::Debug for SyntheticPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntheticPage")
            .field("document", &(self.document_width, self.document_height))
            .field("viewport", &(self.viewport_width, self.viewport_height))
            .field("device_pixel_ratio", &self.device_pixel_ratio)
            .field("scroll", &self.scroll)
            .field("raster_calls", &self.raster_calls)
            .finish()
    }
}

impl SyntheticPage {
    /// A `document_width` x `document_height` page shown through a
    /// `viewport_width` x `viewport_height` viewport at scroll (0, 0).
    pub fn new(document_width: f64, document_height: f64, viewport_width: f64, viewport_height: f64) -> Self {
        Self {
            document_width,
            document_height,
            viewport_width,
            viewport_height,
            device_pixel_ratio: 1.0,
            scroll: Point::default(),
            overflow: String::new(),
            scroll_behavior: String::new(),
            fixed: Vec::new(),
            faults: HashMap::new(),
            raster_calls: 0,
            scroll_requests: Vec::new(),
            on_raster: None,
        }
    }

    pub fn with_device_pixel_ratio(mut self, ratio: f64) -> Self {
        self.device_pixel_ratio = ratio;
        self
    }

    pub fn with_scroll(mut self, x: f64, y: f64) -> Self {
        self.scroll = self.clamp_scroll(x, y);
        self
    }

    /// Add a fixed banner of `height` CSS pixels at the top of the viewport.
    pub fn with_fixed_element(mut self, id: &str, height: f64) -> Self {
        self.fixed.push(FixedElement {
            id: id.to_string(),
            height,
            visibility: String::new(),
        });
        self
    }

    /// Add a fixed banner that is already hidden by the page itself.
    pub fn with_hidden_fixed_element(mut self, id: &str, height: f64) -> Self {
        self.fixed.push(FixedElement {
            id: id.to_string(),
            height,
            visibility: "hidden".to_string(),
        });
        self
    }

    /// Inject a fault into the raster request with zero-based index `call`.
    pub fn with_raster_fault(mut self, call: usize, fault: RasterFault) -> Self {
        self.faults.insert(call, fault);
        self
    }

    /// Run `hook` with the zero-based call index before each raster request.
    pub fn with_raster_hook<F>(mut self, hook: F) -> Self
    where
        F: FnMut(usize) + Send + 'static,
    {
        self.on_raster = Some(Box::new(hook));
        self
    }

    pub fn raster_calls(&self) -> usize {
        self.raster_calls
    }

    /// Every scroll target requested so far, before clamping
    pub fn scroll_requests(&self) -> &[Point] {
        &self.scroll_requests
    }

    pub fn current_scroll(&self) -> Point {
        self.scroll
    }

    pub fn overflow(&self) -> &str {
        &self.overflow
    }

    pub fn scroll_behavior(&self) -> &str {
        &self.scroll_behavior
    }

    /// Inline visibility of the fixed element `id`, if it exists
    pub fn element_visibility(&self, id: &str) -> Option<&str> {
        self.fixed.iter().find(|e| e.id == id).map(|e| e.visibility.as_str())
    }

    /// Colour of the document pixel at device coordinates `(x, y)`.
    ///
    /// Unique for coordinates below 4096 on both axes.
    pub fn expected_pixel(x: u32, y: u32) -> Rgba<u8> {
        Rgba([
            (x & 0xff) as u8,
            (y & 0xff) as u8,
            (((x >> 8) & 0x0f) | (((y >> 8) & 0x0f) << 4)) as u8,
            255,
        ])
    }

    /// Render the whole document at the page's device pixel ratio.
    pub fn render_document(&self) -> RgbaImage {
        let width = (self.document_width * self.device_pixel_ratio).round() as u32;
        let height = (self.document_height * self.device_pixel_ratio).round() as u32;
        RgbaImage::from_fn(width, height, Self::expected_pixel)
    }

    fn clamp_scroll(&self, x: f64, y: f64) -> Point {
        let max_x = (self.document_width - self.viewport_width).max(0.0);
        let max_y = (self.document_height - self.viewport_height).max(0.0);
        Point::new(x.clamp(0.0, max_x), y.clamp(0.0, max_y))
    }

    fn render_viewport(&self) -> RgbaImage {
        let ratio = self.device_pixel_ratio;
        let width = (self.viewport_width * ratio).round() as u32;
        let height = (self.viewport_height * ratio).round() as u32;
        let origin_x = (self.scroll.x * ratio).round() as u32;
        let origin_y = (self.scroll.y * ratio).round() as u32;
        let banner = self
            .fixed
            .iter()
            .filter(|e| e.is_visible())
            .map(|e| (e.height * ratio).round() as u32)
            .max()
            .unwrap_or(0);

        RgbaImage::from_fn(width, height, |x, y| {
            if y < banner {
                FIXED_ELEMENT_COLOR
            } else {
                Self::expected_pixel(origin_x + x, origin_y + y)
            }
        })
    }
}

impl Host for SyntheticPage {
    fn viewport(&mut self) -> Result<ViewportState> {
        Ok(ViewportState {
            scroll_x: self.scroll.x,
            scroll_y: self.scroll.y,
            inner_width: self.viewport_width,
            inner_height: self.viewport_height,
            device_pixel_ratio: self.device_pixel_ratio,
        })
    }

    fn set_scroll(&mut self, x: f64, y: f64) -> Result<()> {
        self.scroll_requests.push(Point::new(x, y));
        self.scroll = self.clamp_scroll(x, y);
        Ok(())
    }

    fn scroll_position(&mut self) -> Result<Point> {
        Ok(self.scroll)
    }

    fn request_viewport_raster(&mut self) -> Result<Vec<u8>> {
        let call = self.raster_calls;
        self.raster_calls += 1;
        if let Some(hook) = self.on_raster.as_mut() {
            hook(call);
        }

        match self.faults.get(&call) {
            Some(RasterFault::Error) => {
                return Err(Error::CaptureUnavailable(format!("synthetic raster failure on call {}", call)))
            }
            Some(RasterFault::Empty) => return Ok(Vec::new()),
            Some(RasterFault::Corrupt) => return Ok(b"not an image".to_vec()),
            None => {}
        }

        let frame = self.render_viewport();
        let mut bytes = Vec::new();
        frame
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| Error::CaptureUnavailable(format!("synthetic raster encode failed: {}", e)))?;
        debug!("synthetic raster {} at {:?}: {} bytes", call, self.scroll, bytes.len());
        Ok(bytes)
    }

    fn fixed_visible_elements(&mut self) -> Result<Vec<ElementHandle>> {
        Ok(self
            .fixed
            .iter()
            .filter(|e| e.is_visible())
            .map(|e| ElementHandle {
                id: e.id.clone(),
                original_visibility: e.visibility.clone(),
            })
            .collect())
    }

    fn set_visibility(&mut self, element: &ElementHandle, visibility: Visibility) -> Result<()> {
        let el = self
            .fixed
            .iter_mut()
            .find(|e| e.id == element.id)
            .ok_or_else(|| Error::Other(format!("unknown element '{}'", element.id)))?;
        el.visibility = match visibility {
            Visibility::Hidden => "hidden".to_string(),
            Visibility::Restore => element.original_visibility.clone(),
        };
        Ok(())
    }

    fn document_state(&mut self) -> Result<DocumentState> {
        Ok(DocumentState {
            scroll: self.scroll,
            overflow: self.overflow.clone(),
            scroll_behavior: self.scroll_behavior.clone(),
        })
    }

    fn apply_capture_style(&mut self) -> Result<()> {
        self.overflow = "hidden".to_string();
        self.scroll_behavior = "auto".to_string();
        Ok(())
    }

    fn restore_document(&mut self, state: &DocumentState) -> Result<()> {
        self.overflow = state.overflow.clone();
        self.scroll_behavior = state.scroll_behavior.clone();
        self.scroll = self.clamp_scroll(state.scroll.x, state.scroll.y);
        Ok(())
    }
}
