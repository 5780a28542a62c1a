//! RFox Region Capture
//!
//! Captures an arbitrary rectangle of a web page, including regions larger
//! than the viewport, as one flattened image. The selection is split into
//! viewport-sized tiles; the page is scrolled to each tile, the visible
//! viewport is rasterized, and the overlapping part of every frame is copied
//! into a destination buffer sized for the selection.
//!
//! # Features
//!
//! - **Host adapters**: any page surface implementing [`host::Host`]; a
//!   deterministic [`host::SyntheticPage`] is always available
//! - **CDP Backend** (`cdp` feature): drives headless Chrome through the
//!   Chrome DevTools Protocol
//! - **Async facade** (`async_api`): runs sessions on a worker thread
//!
//! # Example
//!
//! ```
//! use rfcapture::geometry::Rect;
//! use rfcapture::host::SyntheticPage;
//! use rfcapture::output::MemorySink;
//! use rfcapture::{CaptureConfig, CaptureSession};
//!
//! # fn main() -> rfcapture::Result<()> {
//! let mut page = SyntheticPage::new(800.0, 3000.0, 800.0, 600.0);
//! let config = CaptureConfig { settle_delay_ms: 0, ..Default::default() };
//!
//! let mut session = CaptureSession::new(Rect::new(0.0, 100.0, 640.0, 1500.0), config)?;
//! let output = session.run(&mut page, &mut MemorySink::new())?;
//! assert_eq!((output.image.width, output.image.height), (640, 1500));
//! assert_eq!(output.tiles, 3);
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

pub mod capture;
pub mod compositor;
pub mod geometry;
pub mod host;
pub mod output;
pub mod planner;
pub mod selection;
pub mod session;

#[cfg(feature = "cdp")]
pub mod cdp;

// Async-friendly capture API (worker-thread backed)
pub mod async_api;

pub use capture::CancelToken;
pub use session::{CaptureOutput, CaptureSession, SessionState};

/// Capture configuration
///
/// Defaults are conservative: a 150ms settle delay after every scroll, a
/// 16000px cap on either output dimension, JPEG quality 90, and a two
/// minute ceiling on a whole session.
///
/// Every field is optional when loading from JSON; missing fields keep their
/// defaults.
///
/// # Examples
///
/// ```
/// let cfg = rfcapture::CaptureConfig::from_json_str(r#"{ "jpeg_quality": 75 }"#).unwrap();
/// assert_eq!(cfg.jpeg_quality, 75);
/// assert_eq!(cfg.max_dimension, 16000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Wait after each scroll before rasterizing, in milliseconds
    pub settle_delay_ms: u64,
    /// Largest output width or height in device pixels
    pub max_dimension: u32,
    /// Largest output area in device pixels
    pub max_pixels: u64,
    /// JPEG quality, 1-100
    pub jpeg_quality: u8,
    /// Smallest accepted selection width and height, in CSS pixels
    pub min_selection: f64,
    /// Ceiling for a whole session in milliseconds (0 => disabled)
    pub session_timeout_ms: u64,
    /// Hide visible fixed/sticky elements so they don't repeat in every tile
    pub hide_fixed_elements: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 150,
            max_dimension: 16000,
            max_pixels: 16384 * 16384,
            jpeg_quality: 90,
            min_selection: 20.0,
            session_timeout_ms: 120_000,
            hide_fixed_elements: true,
        }
    }
}

impl CaptureConfig {
    /// Parse a (possibly partial) JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: CaptureConfig =
            serde_json::from_str(json).map_err(|e| Error::ConfigError(format!("invalid config JSON: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_dimension == 0 {
            return Err(Error::ConfigError("max_dimension must be positive".into()));
        }
        if self.max_pixels == 0 {
            return Err(Error::ConfigError("max_pixels must be positive".into()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::ConfigError(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if !(self.min_selection.is_finite() && self.min_selection >= 0.0) {
            return Err(Error::ConfigError(format!(
                "min_selection must be a non-negative number, got {}",
                self.min_selection
            )));
        }
        Ok(())
    }

    pub fn buffer_limits(&self) -> compositor::BufferLimits {
        compositor::BufferLimits {
            max_dimension: self.max_dimension,
            max_pixels: self.max_pixels,
        }
    }
}
