use crate::catalog::DEFAULT_READY_CAPACITY;
use crate::layout::{LayoutConfig, LayoutError, LayoutKind};

/// Configuration for a [`crate::NoxView`].
#[derive(Debug, Clone, PartialEq)]
pub struct NoxConfig {
    /// Edge length of every item, in pixels.
    pub item_size: f32,
    /// Gap between neighbouring items, in pixels.
    pub item_margin: f32,
    pub layout_kind: LayoutKind,
    pub min_scale: f32,
    pub max_scale: f32,
    /// Whether loaded images are masked to a circle.
    pub circular: bool,
    /// Pending ready notifications kept before new ones are dropped.
    pub ready_capacity: usize,
}

impl Default for NoxConfig {
    fn default() -> Self {
        Self {
            item_size: 64.0,
            item_margin: 8.0,
            layout_kind: LayoutKind::Linear,
            min_scale: 0.5,
            max_scale: 3.0,
            circular: true,
            ready_capacity: DEFAULT_READY_CAPACITY,
        }
    }
}

impl NoxConfig {
    pub fn with_item_size(mut self, item_size: f32) -> Self {
        self.item_size = item_size;
        self
    }

    pub fn with_item_margin(mut self, item_margin: f32) -> Self {
        self.item_margin = item_margin;
        self
    }

    pub fn with_layout_kind(mut self, layout_kind: LayoutKind) -> Self {
        self.layout_kind = layout_kind;
        self
    }

    pub fn with_scale_range(mut self, min_scale: f32, max_scale: f32) -> Self {
        self.min_scale = min_scale;
        self.max_scale = max_scale;
        self
    }

    pub fn with_circular(mut self, circular: bool) -> Self {
        self.circular = circular;
        self
    }

    pub fn with_ready_capacity(mut self, ready_capacity: usize) -> Self {
        self.ready_capacity = ready_capacity;
        self
    }

    /// Pixel size requested from the image loader.
    pub fn image_size(&self) -> u32 {
        self.item_size.round() as u32
    }

    /// Checks the values and builds the layout configuration for an empty
    /// viewport.
    pub fn layout_config(&self) -> Result<LayoutConfig, LayoutError> {
        let valid_range = self.min_scale.is_finite()
            && self.max_scale.is_finite()
            && self.min_scale > 0.0
            && self.min_scale <= self.max_scale;
        if !valid_range {
            return Err(LayoutError::InvalidConfig(format!(
                "scale range {}..{} is not valid",
                self.min_scale, self.max_scale
            )));
        }
        LayoutConfig::new(0, 0, 0, self.item_size, self.item_margin)
    }
}
