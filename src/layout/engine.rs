use tracing::trace;

use super::config::{LayoutConfig, LayoutError};
use super::shapes::{compute_positions, Extents, Point};
use super::LayoutKind;

/// Scroll range a viewport may travel so the outermost items can be
/// brought fully into view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Boundaries {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
    /// Extra distance a fling may travel past the range before settling.
    pub overscroll: i32,
}

#[derive(Debug, Clone)]
struct Placement {
    positions: Vec<Point>,
    extents: Option<Extents>,
}

/// Positions of every item for one [`LayoutKind`].
///
/// Positions are only available after [`Layout::calculate`]; resizing
/// drops them again until the next calculation.
#[derive(Debug, Clone)]
pub struct Layout {
    kind: LayoutKind,
    config: LayoutConfig,
    placement: Option<Placement>,
}

impl Layout {
    pub fn new(kind: LayoutKind, config: LayoutConfig) -> Self {
        Self {
            kind,
            config,
            placement: None,
        }
    }

    /// Creates the layout and calculates its positions right away.
    pub fn calculated(kind: LayoutKind, config: LayoutConfig) -> Self {
        let mut layout = Self::new(kind, config);
        layout.calculate();
        layout
    }

    pub fn kind(&self) -> LayoutKind {
        self.kind
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.config.item_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_calculated(&self) -> bool {
        self.placement.is_some()
    }

    /// Computes the position of every item, replacing any previous result.
    pub fn calculate(&mut self) {
        let positions = compute_positions(self.kind, &self.config);
        let extents = Extents::of(&positions);
        trace!(kind = ?self.kind, items = positions.len(), "Calculated layout");
        self.placement = Some(Placement { positions, extents });
    }

    /// Changes the number of items. Positions must be recalculated afterwards.
    pub fn resize(&mut self, item_count: usize) {
        self.config.set_item_count(item_count);
        self.placement = None;
    }

    /// Calculated positions in index order.
    pub fn positions(&self) -> Result<&[Point], LayoutError> {
        self.placement
            .as_ref()
            .map(|p| p.positions.as_slice())
            .ok_or(LayoutError::NotCalculated)
    }

    pub fn position_of(&self, position: usize) -> Result<Point, LayoutError> {
        let positions = self.positions()?;
        positions
            .get(position)
            .copied()
            .ok_or(LayoutError::IndexOutOfRange {
                position,
                len: positions.len(),
            })
    }

    /// Returns true if the item's box, moved by the scroll offset, touches the
    /// viewport. Touching the viewport edge counts as visible.
    pub fn is_visible(
        &self,
        position: usize,
        offset_x: i32,
        offset_y: i32,
    ) -> Result<bool, LayoutError> {
        let point = self.position_of(position)?;
        let size = self.config.item_size();
        let x = point.x + offset_x as f32;
        let y = point.y + offset_y as f32;
        let horizontally = x + size >= 0.0 && x <= self.config.viewport_width() as f32;
        let vertically = y + size >= 0.0 && y <= self.config.viewport_height() as f32;
        Ok(horizontally && vertically)
    }

    /// Positions visible for the given scroll offset, in index order.
    pub fn visible_positions(&self, offset_x: i32, offset_y: i32) -> Vec<usize> {
        (0..self.len())
            .filter(|&i| self.is_visible(i, offset_x, offset_y).unwrap_or(false))
            .collect()
    }

    /// First item, in index order, whose box contains the point given in
    /// layout coordinates.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<usize> {
        let size = self.config.item_size();
        self.positions().ok()?.iter().position(|p| {
            let horizontally = x >= p.x && x <= p.x + size;
            let vertically = y >= p.y && y <= p.y + size;
            horizontally && vertically
        })
    }

    pub fn min_x(&self) -> i32 {
        self.boundaries().min_x
    }

    pub fn max_x(&self) -> i32 {
        self.boundaries().max_x
    }

    pub fn min_y(&self) -> i32 {
        self.boundaries().min_y
    }

    pub fn max_y(&self) -> i32 {
        self.boundaries().max_y
    }

    pub fn overscroll(&self) -> i32 {
        self.config.item_margin() as i32
    }

    /// Scroll boundaries derived from the extreme item positions. An empty or
    /// uncalculated layout only reports its overscroll.
    pub fn boundaries(&self) -> Boundaries {
        let overscroll = self.overscroll();
        let Some(extents) = self.placement.as_ref().and_then(|p| p.extents) else {
            return Boundaries {
                overscroll,
                ..Default::default()
            };
        };
        let size = self.config.item_size();
        let margin = self.config.item_margin();
        let width = self.config.viewport_width() as f32;
        let height = self.config.viewport_height() as f32;
        Boundaries {
            min_x: (extents.min_x - margin) as i32,
            max_x: (extents.max_x + size + margin - width) as i32,
            min_y: (extents.min_y - margin) as i32,
            max_y: (extents.max_y + size + margin - height) as i32,
            overscroll,
        }
    }
}
