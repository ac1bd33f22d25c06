//! Scroll and zoom state of the widget viewport.

pub mod scroller;
pub mod zoomer;

pub use scroller::Scroller;
pub use zoomer::Zoomer;

use crate::layout::Boundaries;

/// Scroll offset plus zoom, used to map touches back into layout space.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportTransform {
    scroller: Scroller,
    zoomer: Zoomer,
}

impl ViewportTransform {
    pub fn new(boundaries: Boundaries, min_scale: f32, max_scale: f32) -> Self {
        Self {
            scroller: Scroller::new(boundaries),
            zoomer: Zoomer::new(min_scale, max_scale),
        }
    }

    pub fn scroller(&self) -> &Scroller {
        &self.scroller
    }

    pub fn scroller_mut(&mut self) -> &mut Scroller {
        &mut self.scroller
    }

    pub fn zoomer(&self) -> &Zoomer {
        &self.zoomer
    }

    pub fn zoomer_mut(&mut self) -> &mut Zoomer {
        &mut self.zoomer
    }

    pub fn offset(&self) -> (i32, i32) {
        (self.scroller.offset_x(), self.scroller.offset_y())
    }

    /// Converts a point on screen into layout coordinates by undoing the zoom
    /// around its focus and then the scroll offset.
    pub fn screen_to_layout(&self, x: f32, y: f32) -> (f32, f32) {
        let scale = self.zoomer.scale();
        let (focus_x, focus_y) = self.zoomer.focus();
        let unzoomed_x = (x - focus_x) / scale + focus_x;
        let unzoomed_y = (y - focus_y) / scale + focus_y;
        let (offset_x, offset_y) = self.offset();
        (unzoomed_x - offset_x as f32, unzoomed_y - offset_y as f32)
    }

    pub fn reset(&mut self) {
        self.scroller.reset();
        self.zoomer.reset();
    }
}
