/// Tracks the zoom applied around a focal point.
#[derive(Debug, Clone, PartialEq)]
pub struct Zoomer {
    min_scale: f32,
    max_scale: f32,
    scale: f32,
    focus_x: f32,
    focus_y: f32,
}

impl Zoomer {
    pub fn new(min_scale: f32, max_scale: f32) -> Self {
        Self {
            min_scale,
            max_scale,
            scale: 1.0,
            focus_x: 0.0,
            focus_y: 0.0,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn focus(&self) -> (f32, f32) {
        (self.focus_x, self.focus_y)
    }

    /// Applies one pinch step: multiplies the scale and moves the focus.
    pub fn on_scale(&mut self, factor: f32, focus_x: f32, focus_y: f32) {
        self.scale = (self.scale * factor).clamp(self.min_scale, self.max_scale);
        self.focus_x = focus_x;
        self.focus_y = focus_y;
    }

    pub fn reset(&mut self) {
        self.scale = 1.0;
        self.focus_x = 0.0;
        self.focus_y = 0.0;
    }
}
