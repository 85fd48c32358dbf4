//! Map-space geometry

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in map coordinates
///
/// Serialized as `[min_x, min_y, max_x, max_y]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// An extent containing nothing; extending it by any point yields that point
    pub const fn empty() -> Self {
        Self::new(
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        )
    }

    /// Extent covered by a view of `size` pixels centered on `center`
    ///
    /// Rotation is in radians; a rotated view yields the bounding box of the
    /// rotated viewport.
    pub fn for_view(center: [f64; 2], resolution: f64, rotation: f64, size: [u32; 2]) -> Self {
        let dx = resolution * f64::from(size[0]) / 2.0;
        let dy = resolution * f64::from(size[1]) / 2.0;
        let (sin, cos) = rotation.sin_cos();

        [(-dx, -dy), (dx, -dy), (dx, dy), (-dx, dy)]
            .into_iter()
            .fold(Self::empty(), |extent, (x, y)| {
                extent.extend_xy(
                    center[0] + x * cos - y * sin,
                    center[1] + x * sin + y * cos,
                )
            })
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn is_empty(&self) -> bool {
        self.max_x < self.min_x || self.max_y < self.min_y
    }

    /// Whether the point lies inside or on the boundary
    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        self.min_x <= x && x <= self.max_x && self.min_y <= y && y <= self.max_y
    }

    /// Whether the two extents overlap; touching edges count as overlap
    pub fn intersects(&self, other: &Extent) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Grow the extent to include a point
    pub fn extend_xy(self, x: f64, y: f64) -> Self {
        Self::new(
            self.min_x.min(x),
            self.min_y.min(y),
            self.max_x.max(x),
            self.max_y.max(y),
        )
    }
}

impl From<[f64; 4]> for Extent {
    fn from([min_x, min_y, max_x, max_y]: [f64; 4]) -> Self {
        Self::new(min_x, min_y, max_x, max_y)
    }
}

impl From<Extent> for [f64; 4] {
    fn from(extent: Extent) -> Self {
        [extent.min_x, extent.min_y, extent.max_x, extent.max_y]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_extent() {
        let empty = Extent::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.extend_xy(1.0, 2.0), Extent::new(1.0, 2.0, 1.0, 2.0));
    }

    #[test]
    fn test_intersects_touching_edges() {
        let a = Extent::new(0.0, 0.0, 10.0, 10.0);
        let b = Extent::new(10.0, 0.0, 20.0, 10.0);
        let c = Extent::new(10.5, 0.0, 20.0, 10.0);

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_for_view_unrotated() {
        let extent = Extent::for_view([100.0, 50.0], 2.0, 0.0, [200, 100]);
        assert_eq!(extent, Extent::new(-100.0, -50.0, 300.0, 150.0));
        assert!(extent.contains_xy(100.0, 50.0));
    }

    #[test]
    fn test_for_view_rotated_quarter_turn() {
        let extent = Extent::for_view([0.0, 0.0], 1.0, std::f64::consts::FRAC_PI_2, [200, 100]);
        // Width and height swap under a quarter turn
        assert!((extent.width() - 100.0).abs() < 1e-9);
        assert!((extent.height() - 200.0).abs() < 1e-9);
    }
}
