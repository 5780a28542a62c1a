//! Tile planning: the scroll targets needed to expose a selection

use crate::geometry::Rect;
use crate::{Error, Result};

/// One planned viewport-sized capture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    /// Position in capture order
    pub index: usize,
    pub row: usize,
    pub column: usize,
    /// Requested scroll offset (document space)
    pub x: f64,
    pub y: f64,
}

/// Row-major grid of tiles covering a selection
///
/// Tiles are computed on demand from their index, so planning costs the same
/// for a huge selection as for a small one.
#[derive(Debug, Clone, PartialEq)]
pub struct TilePlan {
    pub rows: usize,
    pub columns: usize,
    origin_x: f64,
    origin_y: f64,
    stride_x: f64,
    stride_y: f64,
}

impl TilePlan {
    /// Number of tiles, saturating at `usize::MAX`.
    pub fn len(&self) -> usize {
        self.rows.saturating_mul(self.columns)
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.columns == 0
    }

    /// The tile at capture position `index`.
    pub fn tile(&self, index: usize) -> Option<Tile> {
        if index >= self.len() {
            return None;
        }
        let row = index / self.columns;
        let column = index % self.columns;
        // Offsets are computed from the index, not accumulated, so float
        // error cannot add or drop a stride.
        Some(Tile {
            index,
            row,
            column,
            x: self.origin_x + column as f64 * self.stride_x,
            y: self.origin_y + row as f64 * self.stride_y,
        })
    }

    pub fn iter(&self) -> Tiles<'_> {
        Tiles {
            plan: self,
            next: 0,
            end: self.len(),
        }
    }
}

impl<'a> IntoIterator for &'a TilePlan {
    type Item = Tile;
    type IntoIter = Tiles<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the tiles of a [`TilePlan`] in capture order
#[derive(Debug, Clone)]
pub struct Tiles<'a> {
    plan: &'a TilePlan,
    next: usize,
    end: usize,
}

impl Iterator for Tiles<'_> {
    type Item = Tile;

    fn next(&mut self) -> Option<Tile> {
        if self.next >= self.end {
            return None;
        }
        let tile = self.plan.tile(self.next);
        self.next += 1;
        tile
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.next;
        (remaining, Some(remaining))
    }

    fn nth(&mut self, n: usize) -> Option<Tile> {
        self.next = self.next.saturating_add(n).min(self.end);
        self.next()
    }
}

impl ExactSizeIterator for Tiles<'_> {}

/// Number of strides of `step` starting at 0 that stay below `extent`.
fn strides(extent: f64, step: f64) -> usize {
    if extent <= 0.0 {
        return 0;
    }
    (extent / step).ceil() as usize
}

/// Plan the scroll targets covering `selection` with a `viewport_width` x
/// `viewport_height` viewport.
///
/// Targets start at the selection's top-left corner and advance by whole
/// viewports while the running coordinate is still inside the selection, so a
/// selection that is an exact multiple of the viewport gets no trailing tile.
/// Tiles are ordered row by row.
pub fn plan_tiles(selection: &Rect, viewport_width: f64, viewport_height: f64) -> Result<TilePlan> {
    if !(viewport_width.is_finite() && viewport_width > 0.0 && viewport_height.is_finite() && viewport_height > 0.0) {
        return Err(Error::ConfigError(format!(
            "viewport must have a positive size, got {}x{}",
            viewport_width, viewport_height
        )));
    }
    if !selection.is_finite() {
        return Err(Error::InvalidSelection(format!("non-finite selection {:?}", selection)));
    }

    Ok(TilePlan {
        rows: strides(selection.height, viewport_height),
        columns: strides(selection.width, viewport_width),
        origin_x: selection.left,
        origin_y: selection.top,
        stride_x: viewport_width,
        stride_y: viewport_height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_viewport_selection_is_one_tile() {
        let plan = plan_tiles(&Rect::new(10.0, 20.0, 300.0, 200.0), 800.0, 600.0).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.tile(0), Some(Tile { index: 0, row: 0, column: 0, x: 10.0, y: 20.0 }));
        assert_eq!(plan.tile(1), None);
    }

    #[test]
    fn exact_multiples_have_no_trailing_tile() {
        let plan = plan_tiles(&Rect::new(0.0, 0.0, 1600.0, 1200.0), 800.0, 600.0).unwrap();
        assert_eq!((plan.columns, plan.rows), (2, 2));
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn fractional_spans_round_up() {
        // 2.5 viewports wide, 1.1 tall
        let plan = plan_tiles(&Rect::new(0.0, 0.0, 2000.0, 660.0), 800.0, 600.0).unwrap();
        assert_eq!((plan.columns, plan.rows), (3, 2));
        assert_eq!(plan.len(), 6);
    }

    #[test]
    fn tiles_are_row_major() {
        let plan = plan_tiles(&Rect::new(100.0, 50.0, 1000.0, 1000.0), 600.0, 600.0).unwrap();
        let coords: Vec<(f64, f64)> = plan.iter().map(|t| (t.x, t.y)).collect();
        assert_eq!(coords, vec![(100.0, 50.0), (700.0, 50.0), (100.0, 650.0), (700.0, 650.0)]);
        for (i, t) in plan.iter().enumerate() {
            assert_eq!(t.index, i);
        }
    }

    #[test]
    fn tall_selection_strides_by_viewport_height() {
        let plan = plan_tiles(&Rect::new(0.0, 0.0, 800.0, 1200.0), 800.0, 600.0).unwrap();
        let ys: Vec<f64> = plan.iter().map(|t| t.y).collect();
        assert_eq!(ys, vec![0.0, 600.0]);
    }

    #[test]
    fn empty_selection_plans_nothing() {
        let plan = plan_tiles(&Rect::new(0.0, 0.0, 0.0, 500.0), 800.0, 600.0).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn zero_viewport_is_rejected() {
        let err = plan_tiles(&Rect::new(0.0, 0.0, 100.0, 100.0), 0.0, 600.0).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn huge_selection_plans_without_materializing_tiles() {
        let plan = plan_tiles(&Rect::new(0.0, 0.0, 1e9, 1e9), 800.0, 600.0).unwrap();
        assert_eq!(plan.columns, 1_250_000);
        assert_eq!(plan.rows, 1_666_667);
        assert_eq!(plan.len(), 1_250_000 * 1_666_667);

        let last = plan.tile(plan.len() - 1).unwrap();
        assert_eq!((last.row, last.column), (1_666_666, 1_249_999));
        assert_eq!((last.x, last.y), (999_999_200.0, 999_999_600.0));

        let mut tiles = plan.iter();
        assert_eq!(tiles.len(), plan.len());
        assert_eq!(tiles.next().map(|t| (t.x, t.y)), Some((0.0, 0.0)));
        assert_eq!(tiles.next().map(|t| (t.x, t.y)), Some((800.0, 0.0)));
    }
}
