//! Geometry primitives shared by the planner, capturer and compositor
//!
//! Three coordinate spaces are in play:
//! - *document* space: CSS pixels relative to the full scrollable page
//! - *viewport* space: document space minus the current scroll offset
//! - *device* space: CSS pixels multiplied by a pixel ratio, used to address
//!   raster and destination buffers
//!
//! Document and viewport geometry is `f64` because hosts report fractional
//! scroll offsets and pixel ratios. Device geometry is integral (`PixelRect`).

use serde::{Deserialize, Serialize};

/// A point in document or viewport space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }

    /// Build a normalized rectangle spanning two corner points in any order.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            left: a.x.min(b.x),
            top: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn origin(&self) -> Point {
        Point::new(self.left, self.top)
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// True when the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Axis-aligned intersection.
    ///
    /// Disjoint rectangles yield a zero-area rectangle rather than an error;
    /// check `is_empty` before acting on the result.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Rect {
            left,
            top,
            width: (right - left).max(0.0),
            height: (bottom - top).max(0.0),
        }
    }

    /// Shift the rectangle by `(dx, dy)`.
    pub fn translate(&self, dx: f64, dy: f64) -> Rect {
        Rect {
            left: self.left + dx,
            top: self.top + dy,
            ..*self
        }
    }

    /// Convert to device pixels.
    ///
    /// Every edge is scaled and rounded independently and the extent is the
    /// difference of the rounded edges, so two rectangles sharing an edge in
    /// CSS space share it exactly in device space too. Negative edges clamp
    /// to zero.
    pub fn scale(&self, factor: f64) -> PixelRect {
        let snap = |v: f64| (v * factor).round().max(0.0);
        let x0 = snap(self.left);
        let y0 = snap(self.top);
        let x1 = snap(self.right()).max(x0);
        let y1 = snap(self.bottom()).max(y0);
        PixelRect {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        }
    }

    /// True when every field is a finite number.
    pub fn is_finite(&self) -> bool {
        self.left.is_finite() && self.top.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

/// Integral rectangle addressing pixels in a raster or destination buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clip to a `width` x `height` buffer anchored at the origin.
    pub fn clamp_to(&self, width: u32, height: u32) -> PixelRect {
        let x = self.x.min(width);
        let y = self.y.min(height);
        PixelRect {
            x,
            y,
            width: self.width.min(width - x),
            height: self.height.min(height - y),
        }
    }
}

/// Snapshot of the host viewport
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub inner_width: f64,
    pub inner_height: f64,
    pub device_pixel_ratio: f64,
}

impl ViewportState {
    pub fn scroll(&self) -> Point {
        Point::new(self.scroll_x, self.scroll_y)
    }

    /// The visible area in document space.
    pub fn document_rect(&self) -> Rect {
        Rect::new(self.scroll_x, self.scroll_y, self.inner_width, self.inner_height)
    }

    /// Device pixel ratio, treating missing or nonsensical values as 1.
    pub fn pixel_ratio(&self) -> f64 {
        if self.device_pixel_ratio.is_finite() && self.device_pixel_ratio > 0.0 {
            self.device_pixel_ratio
        } else {
            1.0
        }
    }
}

/// Document point to viewport point for the given scroll offset.
pub fn to_viewport(doc: Point, scroll: Point) -> Point {
    Point::new(doc.x - scroll.x, doc.y - scroll.y)
}

/// Viewport point to document point for the given scroll offset.
pub fn to_document(viewport: Point, scroll: Point) -> Point {
    Point::new(viewport.x + scroll.x, viewport.y + scroll.y)
}

/// Scale factor for the destination buffer.
///
/// Starts at `device_pixel_ratio`; when the scaled selection would exceed
/// `max_dimension` on either axis the ratio is shrunk uniformly so the larger
/// axis meets the cap exactly.
pub fn effective_scale(selection: &Rect, device_pixel_ratio: f64, max_dimension: u32) -> f64 {
    let max = f64::from(max_dimension);
    let scaled_w = selection.width * device_pixel_ratio;
    let scaled_h = selection.height * device_pixel_ratio;
    if scaled_w > max || scaled_h > max {
        let shrink = (max / scaled_w).min(max / scaled_h);
        device_pixel_ratio * shrink
    } else {
        device_pixel_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_overlapping_and_disjoint() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let b = Rect::new(50.0, 60.0, 100.0, 100.0);
        assert_eq!(a.intersect(&b), Rect::new(50.0, 60.0, 50.0, 40.0));

        let far = Rect::new(500.0, 500.0, 10.0, 10.0);
        let none = a.intersect(&far);
        assert!(none.is_empty());
        assert_eq!(none.area(), 0.0);
    }

    #[test]
    fn touching_edges_do_not_intersect() {
        let a = Rect::new(0.0, 0.0, 600.0, 600.0);
        let b = Rect::new(0.0, 600.0, 600.0, 600.0);
        assert!(a.intersect(&b).is_empty());
    }

    #[test]
    fn viewport_document_conversion_inverts() {
        let scroll = Point::new(120.0, 3400.5);
        let doc = Point::new(300.0, 3500.0);
        let vp = to_viewport(doc, scroll);
        assert_eq!(vp, Point::new(180.0, 99.5));
        assert_eq!(to_document(vp, scroll), doc);
    }

    #[test]
    fn scale_rounds_edges_not_extents() {
        // 1/3 px boundaries at 1.5x: both halves must meet without a gap.
        let left = Rect::new(0.0, 0.0, 100.333, 10.0).scale(1.5);
        let right = Rect::new(100.333, 0.0, 99.667, 10.0).scale(1.5);
        assert_eq!(left.x + left.width, right.x);
        assert_eq!(left.width + right.width, 300);
    }

    #[test]
    fn scale_clamps_negative_edges() {
        let r = Rect::new(-10.0, -10.0, 20.0, 20.0).scale(2.0);
        assert_eq!(r, PixelRect { x: 0, y: 0, width: 20, height: 20 });
    }

    #[test]
    fn pixel_rect_clamp() {
        let r = PixelRect { x: 90, y: 10, width: 20, height: 20 };
        assert_eq!(r.clamp_to(100, 25), PixelRect { x: 90, y: 10, width: 10, height: 15 });
        assert!(PixelRect { x: 200, y: 0, width: 5, height: 5 }.clamp_to(100, 100).is_empty());
    }

    #[test]
    fn effective_scale_keeps_ratio_under_cap() {
        let sel = Rect::new(0.0, 0.0, 2000.0, 2000.0);
        assert_eq!(effective_scale(&sel, 8.0, 16000), 8.0);
        assert_eq!(effective_scale(&sel, 2.0, 16000), 2.0);
    }

    #[test]
    fn effective_scale_meets_cap_exactly() {
        let sel = Rect::new(0.0, 0.0, 4000.0, 1000.0);
        let s = effective_scale(&sel, 8.0, 16000);
        assert!((s - 4.0).abs() < 1e-9);
        let dims = Rect::new(0.0, 0.0, sel.width, sel.height).scale(s);
        assert_eq!(dims.width, 16000);
        assert_eq!(dims.height, 4000);
    }

    #[test]
    fn viewport_pixel_ratio_defaults_to_one() {
        let mut v = ViewportState {
            scroll_x: 0.0,
            scroll_y: 0.0,
            inner_width: 800.0,
            inner_height: 600.0,
            device_pixel_ratio: 0.0,
        };
        assert_eq!(v.pixel_ratio(), 1.0);
        v.device_pixel_ratio = 2.0;
        assert_eq!(v.pixel_ratio(), 2.0);
    }
}
