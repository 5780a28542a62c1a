//! Selection editing as an explicit state machine
//!
//! Pure input logic for drawing, moving and resizing the selection rectangle
//! with a pointer. Pointer positions arrive in viewport (client) coordinates
//! and the selection is kept in document coordinates, so scrolling while a
//! selection is visible does not move it on the page. Rendering the overlay is
//! left to the embedder.

use crate::geometry::{to_document, Point, Rect, ViewportState};
use crate::{Error, Result};

/// Size of the selection offered when the user clicks without dragging
pub const DEFAULT_SELECTION_SIZE: (f64, f64) = (400.0, 300.0);

/// Resize handle on the selection border
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    N,
    S,
    E,
    W,
    NE,
    NW,
    SE,
    SW,
}

impl Handle {
    pub const ALL: [Handle; 8] = [
        Handle::NW,
        Handle::N,
        Handle::NE,
        Handle::W,
        Handle::E,
        Handle::SW,
        Handle::S,
        Handle::SE,
    ];

    fn moves_left(self) -> bool {
        matches!(self, Handle::W | Handle::NW | Handle::SW)
    }

    fn moves_right(self) -> bool {
        matches!(self, Handle::E | Handle::NE | Handle::SE)
    }

    fn moves_top(self) -> bool {
        matches!(self, Handle::N | Handle::NE | Handle::NW)
    }

    fn moves_bottom(self) -> bool {
        matches!(self, Handle::S | Handle::SE | Handle::SW)
    }

    /// The handle on the opposite side horizontally.
    pub fn mirror_horizontal(self) -> Handle {
        match self {
            Handle::E => Handle::W,
            Handle::W => Handle::E,
            Handle::NE => Handle::NW,
            Handle::NW => Handle::NE,
            Handle::SE => Handle::SW,
            Handle::SW => Handle::SE,
            other => other,
        }
    }

    /// The handle on the opposite side vertically.
    pub fn mirror_vertical(self) -> Handle {
        match self {
            Handle::N => Handle::S,
            Handle::S => Handle::N,
            Handle::NE => Handle::SE,
            Handle::SE => Handle::NE,
            Handle::NW => Handle::SW,
            Handle::SW => Handle::NW,
            other => other,
        }
    }
}

/// What the pointer went down on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerTarget {
    /// Empty page area outside the selection
    Backdrop,
    /// Inside the current selection
    Selection,
    /// One of the resize handles
    Handle(Handle),
    /// The confirm/cancel buttons; ignored
    Controls,
}

/// Current pointer interaction. Exactly one applies at a time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interaction {
    Idle,
    /// Drawing a new selection from `anchor` (document space)
    Drawing { anchor: Point },
    /// Moving the selection; `last` is the previous client position
    Dragging { last: Point },
    /// Resizing with `handle`; `last` is the previous client position
    Resizing { handle: Handle, last: Point },
}

/// Selection rectangle plus the interaction editing it
#[derive(Debug, Clone)]
pub struct SelectionTool {
    rect: Rect,
    shown: bool,
    interaction: Interaction,
    min_size: f64,
}

impl SelectionTool {
    /// New tool enforcing `min_size` on confirmation and on release.
    pub fn new(min_size: f64) -> Self {
        Self {
            rect: Rect::default(),
            shown: false,
            interaction: Interaction::Idle,
            min_size,
        }
    }

    pub fn interaction(&self) -> Interaction {
        self.interaction
    }

    /// The selection, once one has been drawn
    pub fn selection(&self) -> Option<Rect> {
        self.shown.then_some(self.rect)
    }

    /// The selection in viewport coordinates, for drawing the overlay
    pub fn viewport_rect(&self, viewport: &ViewportState) -> Option<Rect> {
        self.selection()
            .map(|r| r.translate(-viewport.scroll_x, -viewport.scroll_y))
    }

    pub fn pointer_down(&mut self, target: PointerTarget, client: Point, viewport: &ViewportState) {
        self.interaction = match target {
            PointerTarget::Controls => return,
            PointerTarget::Handle(handle) if self.shown => Interaction::Resizing { handle, last: client },
            PointerTarget::Selection if self.shown => Interaction::Dragging { last: client },
            _ => {
                let anchor = to_document(client, viewport.scroll());
                self.rect = Rect::new(anchor.x, anchor.y, 0.0, 0.0);
                Interaction::Drawing { anchor }
            }
        };
    }

    pub fn pointer_move(&mut self, client: Point, viewport: &ViewportState) {
        match self.interaction {
            Interaction::Idle => {}
            Interaction::Drawing { anchor } => {
                let current = to_document(client, viewport.scroll());
                self.rect = Rect::from_corners(anchor, current);
                self.shown = true;
            }
            Interaction::Dragging { last } => {
                self.rect = self.rect.translate(client.x - last.x, client.y - last.y);
                self.interaction = Interaction::Dragging { last: client };
            }
            Interaction::Resizing { handle, last } => {
                let handle = self.resize(handle, client.x - last.x, client.y - last.y);
                self.interaction = Interaction::Resizing { handle, last: client };
            }
        }
    }

    /// Finish the interaction.
    ///
    /// A click without any drag offers a default-sized selection centred in
    /// the viewport.
    pub fn pointer_up(&mut self, viewport: &ViewportState) {
        let was_drawing = matches!(self.interaction, Interaction::Drawing { .. });
        self.interaction = Interaction::Idle;
        if was_drawing && !self.shown {
            let (w, h) = DEFAULT_SELECTION_SIZE;
            self.rect = Rect::new(
                viewport.scroll_x + (viewport.inner_width - w) / 2.0,
                viewport.scroll_y + (viewport.inner_height - h) / 2.0,
                w,
                h,
            );
            self.shown = true;
        }
    }

    /// The selection to capture, if it meets the minimum size.
    pub fn confirm(&self) -> Result<Rect> {
        let rect = self
            .selection()
            .ok_or_else(|| Error::InvalidSelection("nothing selected".into()))?;
        if rect.width < self.min_size || rect.height < self.min_size {
            return Err(Error::InvalidSelection(format!(
                "{}x{} is smaller than the minimum {}x{}",
                rect.width, rect.height, self.min_size, self.min_size
            )));
        }
        Ok(rect)
    }

    /// Apply a resize delta; returns the handle now being dragged, which
    /// flips when the selection is dragged past its opposite edge.
    fn resize(&mut self, mut handle: Handle, dx: f64, dy: f64) -> Handle {
        let r = &mut self.rect;
        if handle.moves_right() {
            r.width += dx;
        }
        if handle.moves_bottom() {
            r.height += dy;
        }
        if handle.moves_left() {
            r.left += dx;
            r.width -= dx;
        }
        if handle.moves_top() {
            r.top += dy;
            r.height -= dy;
        }

        if r.width < 0.0 {
            r.left += r.width;
            r.width = -r.width;
            handle = handle.mirror_horizontal();
        }
        if r.height < 0.0 {
            r.top += r.height;
            r.height = -r.height;
            handle = handle.mirror_vertical();
        }
        handle
    }
}

impl Default for SelectionTool {
    fn default() -> Self {
        Self::new(20.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport(scroll_y: f64) -> ViewportState {
        ViewportState {
            scroll_x: 0.0,
            scroll_y,
            inner_width: 1000.0,
            inner_height: 800.0,
            device_pixel_ratio: 1.0,
        }
    }

    #[test]
    fn drawing_is_in_document_space() {
        let mut tool = SelectionTool::default();
        let vp = viewport(500.0);
        tool.pointer_down(PointerTarget::Backdrop, Point::new(300.0, 200.0), &vp);
        tool.pointer_move(Point::new(100.0, 400.0), &vp);
        tool.pointer_up(&vp);
        assert_eq!(tool.selection(), Some(Rect::new(100.0, 700.0, 200.0, 200.0)));
        assert_eq!(tool.interaction(), Interaction::Idle);
        assert_eq!(tool.viewport_rect(&vp), Some(Rect::new(100.0, 200.0, 200.0, 200.0)));
    }

    #[test]
    fn click_without_drag_offers_default() {
        let mut tool = SelectionTool::default();
        let vp = viewport(100.0);
        tool.pointer_down(PointerTarget::Backdrop, Point::new(10.0, 10.0), &vp);
        tool.pointer_up(&vp);
        assert_eq!(tool.selection(), Some(Rect::new(300.0, 350.0, 400.0, 300.0)));
    }

    #[test]
    fn dragging_moves_by_pointer_delta() {
        let mut tool = SelectionTool::default();
        let vp = viewport(0.0);
        tool.pointer_down(PointerTarget::Backdrop, Point::new(0.0, 0.0), &vp);
        tool.pointer_move(Point::new(100.0, 100.0), &vp);
        tool.pointer_up(&vp);

        tool.pointer_down(PointerTarget::Selection, Point::new(50.0, 50.0), &vp);
        tool.pointer_move(Point::new(60.0, 45.0), &vp);
        tool.pointer_move(Point::new(70.0, 40.0), &vp);
        tool.pointer_up(&vp);
        assert_eq!(tool.selection(), Some(Rect::new(20.0, -10.0, 100.0, 100.0)));
    }

    #[test]
    fn resizing_past_opposite_edge_flips_handle() {
        let mut tool = SelectionTool::default();
        let vp = viewport(0.0);
        tool.pointer_down(PointerTarget::Backdrop, Point::new(100.0, 100.0), &vp);
        tool.pointer_move(Point::new(200.0, 200.0), &vp);
        tool.pointer_up(&vp);

        tool.pointer_down(PointerTarget::Handle(Handle::W), Point::new(100.0, 150.0), &vp);
        tool.pointer_move(Point::new(250.0, 150.0), &vp);
        assert_eq!(tool.selection(), Some(Rect::new(200.0, 100.0, 50.0, 100.0)));
        assert_eq!(
            tool.interaction(),
            Interaction::Resizing { handle: Handle::E, last: Point::new(250.0, 150.0) }
        );

        // Now acting as the east edge
        tool.pointer_move(Point::new(300.0, 150.0), &vp);
        assert_eq!(tool.selection(), Some(Rect::new(200.0, 100.0, 100.0, 100.0)));
    }

    #[test]
    fn controls_do_not_start_an_interaction() {
        let mut tool = SelectionTool::default();
        tool.pointer_down(PointerTarget::Controls, Point::new(1.0, 1.0), &viewport(0.0));
        assert_eq!(tool.interaction(), Interaction::Idle);
    }

    #[test]
    fn confirm_enforces_minimum() {
        let mut tool = SelectionTool::default();
        assert!(tool.confirm().is_err());
        let vp = viewport(0.0);
        tool.pointer_down(PointerTarget::Backdrop, Point::new(0.0, 0.0), &vp);
        tool.pointer_move(Point::new(10.0, 50.0), &vp);
        tool.pointer_up(&vp);
        assert!(matches!(tool.confirm(), Err(Error::InvalidSelection(_))));
    }
}
