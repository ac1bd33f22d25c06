pub mod config;
pub mod engine;
pub mod shapes;

pub use config::{LayoutConfig, LayoutError};
pub use engine::{Boundaries, Layout};
pub use shapes::Point;

/// Every geometry a [`Layout`] can arrange items in.
///
/// The numeric keys are stable and used when the kind comes from
/// configuration rather than code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LayoutKind {
    /// Single row starting at the left edge.
    #[default]
    Linear,
    /// Single row centered horizontally.
    LinearCentered,
    /// Concentric rings holding `6 * ring` items each.
    Circular,
    /// Concentric rings packed as densely as the ring circumference allows.
    FixedCircular,
    /// Archimedean spiral growing out of the center.
    Spiral,
}

impl LayoutKind {
    pub const ALL: [LayoutKind; 5] = [
        LayoutKind::Linear,
        LayoutKind::LinearCentered,
        LayoutKind::Circular,
        LayoutKind::FixedCircular,
        LayoutKind::Spiral,
    ];

    /// Unknown keys fall back to [`LayoutKind::Linear`].
    pub fn from_key(key: u32) -> Self {
        match key {
            1 => Self::LinearCentered,
            2 => Self::Circular,
            3 => Self::FixedCircular,
            4 => Self::Spiral,
            _ => Self::Linear,
        }
    }

    pub fn key(self) -> u32 {
        match self {
            Self::Linear => 0,
            Self::LinearCentered => 1,
            Self::Circular => 2,
            Self::FixedCircular => 3,
            Self::Spiral => 4,
        }
    }
}
