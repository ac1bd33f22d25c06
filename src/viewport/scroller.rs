use crate::layout::Boundaries;

/// Tracks how far the content has been scrolled and keeps the scroll inside
/// the range a layout reports.
///
/// The scroll position is the opposite of the offset applied to items: an
/// item drawn at `x` ends up at `x + offset_x()` on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Scroller {
    boundaries: Boundaries,
    scroll_x: i32,
    scroll_y: i32,
}

impl Scroller {
    pub fn new(boundaries: Boundaries) -> Self {
        Self {
            boundaries,
            scroll_x: 0,
            scroll_y: 0,
        }
    }

    pub fn boundaries(&self) -> Boundaries {
        self.boundaries
    }

    /// Replaces the range, pulling the current scroll back inside it.
    pub fn set_boundaries(&mut self, boundaries: Boundaries) {
        self.boundaries = boundaries;
        self.scroll_to(self.scroll_x, self.scroll_y);
    }

    pub fn scroll_x(&self) -> i32 {
        self.scroll_x
    }

    pub fn scroll_y(&self) -> i32 {
        self.scroll_y
    }

    pub fn offset_x(&self) -> i32 {
        -self.scroll_x
    }

    pub fn offset_y(&self) -> i32 {
        -self.scroll_y
    }

    /// Moves the scroll by a drag distance. Each axis only moves when the
    /// destination is inside the range; otherwise that axis stays put.
    ///
    /// Returns true if either axis moved.
    pub fn scroll_by(&mut self, distance_x: f32, distance_y: f32) -> bool {
        let dx = axis_delta(
            self.scroll_x,
            distance_x,
            self.boundaries.min_x,
            self.boundaries.max_x,
        );
        let dy = axis_delta(
            self.scroll_y,
            distance_y,
            self.boundaries.min_y,
            self.boundaries.max_y,
        );
        self.scroll_x += dx;
        self.scroll_y += dy;
        dx != 0 || dy != 0
    }

    /// Jumps to a scroll position, clamped into the range.
    pub fn scroll_to(&mut self, x: i32, y: i32) {
        self.scroll_x = clamp_axis(x, self.boundaries.min_x, self.boundaries.max_x);
        self.scroll_y = clamp_axis(y, self.boundaries.min_y, self.boundaries.max_y);
    }

    pub fn reset(&mut self) {
        self.scroll_x = 0;
        self.scroll_y = 0;
    }
}

fn axis_delta(current: i32, distance: f32, min: i32, max: i32) -> i32 {
    let next = (current as f32 + distance) as i32;
    if next >= min && next <= max {
        distance as i32
    } else {
        0
    }
}

/// Layouts narrower than the viewport report `max < min`; `min` wins then.
fn clamp_axis(value: i32, min: i32, max: i32) -> i32 {
    value.min(max).max(min)
}
