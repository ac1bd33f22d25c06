use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LayoutError {
    #[error("position {position} is out of range for a layout of {len} items")]
    IndexOutOfRange { position: usize, len: usize },
    #[error("layout positions have not been calculated")]
    NotCalculated,
    #[error("layout was built for {actual} items but {expected} are shown")]
    CountMismatch { expected: usize, actual: usize },
    #[error("invalid layout configuration: {0}")]
    InvalidConfig(String),
}

/// Geometry inputs shared by every layout kind.
///
/// Viewport dimensions are whole pixels; item size and margin are
/// fractional so density-scaled values survive unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    item_count: usize,
    viewport_width: u32,
    viewport_height: u32,
    item_size: f32,
    item_margin: f32,
}

impl LayoutConfig {
    pub fn new(
        item_count: usize,
        viewport_width: u32,
        viewport_height: u32,
        item_size: f32,
        item_margin: f32,
    ) -> Result<Self, LayoutError> {
        if !item_size.is_finite() || item_size <= 0.0 {
            return Err(LayoutError::InvalidConfig(format!(
                "item size must be a positive number, got {}",
                item_size
            )));
        }
        if !item_margin.is_finite() || item_margin < 0.0 {
            return Err(LayoutError::InvalidConfig(format!(
                "item margin must be zero or positive, got {}",
                item_margin
            )));
        }
        Ok(Self {
            item_count,
            viewport_width,
            viewport_height,
            item_size,
            item_margin,
        })
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn viewport_width(&self) -> u32 {
        self.viewport_width
    }

    pub fn viewport_height(&self) -> u32 {
        self.viewport_height
    }

    pub fn item_size(&self) -> f32 {
        self.item_size
    }

    pub fn item_margin(&self) -> f32 {
        self.item_margin
    }

    /// Distance between the origins of two neighbouring items.
    pub fn pitch(&self) -> f32 {
        self.item_size + self.item_margin
    }

    /// Half the viewport width, using integer halving of the pixel width.
    pub(crate) fn half_width(&self) -> f32 {
        (self.viewport_width / 2) as f32
    }

    pub(crate) fn half_height(&self) -> f32 {
        (self.viewport_height / 2) as f32
    }

    pub(crate) fn set_item_count(&mut self, item_count: usize) {
        self.item_count = item_count;
    }

    pub(crate) fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport_width = width;
        self.viewport_height = height;
    }
}
