//! Position generators for every layout kind.
//!
//! Each generator is a pure function of the configuration. Shared
//! boundary handling lives in [`Extents`] and is applied by the caller.

use std::f64::consts::TAU;

use super::config::LayoutConfig;
use super::LayoutKind;

/// Number of items the first circular ring holds; ring `k` holds `BASE * k`.
const RING_BASE: usize = 6;

/// Top-left corner of an item.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Smallest and largest coordinates observed while placing items.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Extents {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl Extents {
    /// Returns `None` for an empty slice; the first point seeds every bound.
    pub fn of(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let seed = Self {
            min_x: first.x,
            max_x: first.x,
            min_y: first.y,
            max_y: first.y,
        };
        Some(points.iter().skip(1).fold(seed, |acc, p| Self {
            min_x: acc.min_x.min(p.x),
            max_x: acc.max_x.max(p.x),
            min_y: acc.min_y.min(p.y),
            max_y: acc.max_y.max(p.y),
        }))
    }
}

pub(crate) fn compute_positions(kind: LayoutKind, config: &LayoutConfig) -> Vec<Point> {
    match kind {
        LayoutKind::Linear => linear(config, config.item_margin()),
        LayoutKind::LinearCentered => linear(config, centered_start(config)),
        LayoutKind::Circular => rings(config, |ring| RING_BASE * ring),
        LayoutKind::FixedCircular => rings(config, |ring| packed_ring_capacity(config, ring)),
        LayoutKind::Spiral => spiral(config),
    }
}

fn linear(config: &LayoutConfig, start_x: f32) -> Vec<Point> {
    let y = config.half_height() - config.item_size() / 2.0;
    let pitch = config.pitch();
    (0..config.item_count())
        .map(|i| Point::new(start_x + pitch * i as f32, y))
        .collect()
}

fn centered_start(config: &LayoutConfig) -> f32 {
    let half_pitch = config.item_size() / 2.0 + config.item_margin() / 2.0;
    config.half_width() - config.item_count() as f32 * half_pitch
}

/// Point where an item has to be placed so that the item itself, not its
/// corner, sits in the middle of the viewport.
fn center(config: &LayoutConfig) -> Point {
    let inset = config.item_size() / 2.0 + config.item_margin() / 2.0;
    Point::new(config.half_width() - inset, config.half_height() - inset)
}

/// Ring capacity derived from the ring circumference, so every ring is as
/// full as the item pitch allows.
fn packed_ring_capacity(config: &LayoutConfig, ring: usize) -> usize {
    let pitch = config.pitch();
    let circumference = (TAU * (pitch * ring as f32) as f64) as f32;
    if pitch >= circumference {
        1
    } else {
        (circumference / pitch) as usize
    }
}

fn rings(config: &LayoutConfig, capacity: impl Fn(usize) -> usize) -> Vec<Point> {
    let count = config.item_count();
    let center = center(config);
    let pitch = config.pitch();
    let mut positions = Vec::with_capacity(count);

    let mut ring = 0usize;
    while positions.len() < count {
        if ring == 0 {
            positions.push(center);
            ring += 1;
            continue;
        }

        let remaining = count - positions.len();
        let ring_size = capacity(ring).max(1).min(remaining);
        let radius = (pitch * ring as f32) as f64;
        for slot in 0..ring_size {
            let angle = TAU / ring_size as f64 * slot as f64;
            let x = center.x as f64 + angle.sin() * radius;
            let y = center.y as f64 + angle.cos() * radius;
            positions.push(Point::new(x as f32, y as f32));
        }
        ring += 1;
    }

    positions
}

/// Archimedean spiral where the item index is both the angle in radians and
/// the growth multiplier.
fn spiral(config: &LayoutConfig) -> Vec<Point> {
    let center = center(config);
    let growth = config.item_size() as f64;
    (0..config.item_count())
        .map(|i| {
            let t = i as f64;
            let x = center.x as f64 + growth * t * t.cos();
            let y = center.y as f64 + growth * t * t.sin();
            Point::new(x as f32, y as f32)
        })
        .collect()
}
