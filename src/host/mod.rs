//! Host surface: the page primitives the capture engine drives
//!
//! A host owns one document viewport. The engine scrolls it, asks it to
//! rasterize what is visible, and temporarily hides fixed/sticky elements
//! that would otherwise repeat in every tile. Backends implement [`Host`];
//! [`SyntheticPage`] is a deterministic in-memory implementation for tests
//! and offline runs.

pub mod synthetic;

pub use synthetic::SyntheticPage;

use crate::geometry::{Point, ViewportState};
use crate::Result;

/// A fixed or sticky element hidden for the duration of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    /// Backend-specific identifier
    pub id: String,
    /// The element's inline `visibility` value before the session touched it
    pub original_visibility: String,
}

/// Visibility change requested by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Force the element hidden
    Hidden,
    /// Put back `ElementHandle::original_visibility`
    Restore,
}

/// Document-level state altered by a session and restored afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentState {
    pub scroll: Point,
    /// Inline `overflow` of the root element
    pub overflow: String,
    /// Inline `scroll-behavior` of the root element
    pub scroll_behavior: String,
}

/// Page primitives required by a capture session.
///
/// Calls are made from a single thread in a strict sequence; a session holds
/// `&mut` access for its whole lifetime so nothing else can move the viewport.
pub trait Host {
    /// Current scroll offset, viewport size and device pixel ratio
    fn viewport(&mut self) -> Result<ViewportState>;

    /// Request a scroll to `(x, y)`. Hosts may clamp to the content bounds.
    fn set_scroll(&mut self, x: f64, y: f64) -> Result<()>;

    /// Actual scroll offset after any clamping
    fn scroll_position(&mut self) -> Result<Point>;

    /// Encoded raster (PNG or JPEG) of the visible viewport at native scale.
    ///
    /// Errors and empty responses are both treated as capture unavailable.
    fn request_viewport_raster(&mut self) -> Result<Vec<u8>>;

    /// Elements with fixed or sticky positioning that are currently visible
    fn fixed_visible_elements(&mut self) -> Result<Vec<ElementHandle>>;

    /// Hide an element or restore its original visibility
    fn set_visibility(&mut self, element: &ElementHandle, visibility: Visibility) -> Result<()>;

    /// Snapshot the document state a session is about to change
    fn document_state(&mut self) -> Result<DocumentState>;

    /// Hide scrollbars and disable smooth scrolling for the session
    fn apply_capture_style(&mut self) -> Result<()>;

    /// Put back a snapshot taken by `document_state`
    fn restore_document(&mut self, state: &DocumentState) -> Result<()>;
}
