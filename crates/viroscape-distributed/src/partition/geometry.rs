//! Toroidal grid geometry.

use serde::{Deserialize, Serialize};
use viroscape_core::GridPoint;

/// A square grid of side `dimension` whose lowest coordinate is `-dimension / 2`
/// on both axes. Coordinates wrap around at the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridGeometry {
    dimension: i32,
    origin: i32,
}

impl GridGeometry {
    pub fn new(dimension: i32) -> Self {
        Self {
            dimension,
            origin: -(dimension / 2),
        }
    }

    pub fn dimension(&self) -> i32 {
        self.dimension
    }

    pub fn origin(&self) -> i32 {
        self.origin
    }

    /// Number of grid points.
    pub fn area(&self) -> usize {
        (self.dimension as usize) * (self.dimension as usize)
    }

    fn wrap_axis(&self, v: i32) -> i32 {
        self.origin + (v - self.origin).rem_euclid(self.dimension)
    }

    /// Map any point onto the grid.
    pub fn wrap(&self, point: GridPoint) -> GridPoint {
        GridPoint::new(self.wrap_axis(point.x), self.wrap_axis(point.y))
    }

    /// Zero-based column and row of a wrapped point.
    pub fn offset_of(&self, point: GridPoint) -> (i32, i32) {
        let p = self.wrap(point);
        (p.x - self.origin, p.y - self.origin)
    }

    /// Every distinct point within Chebyshev distance `radius` of `center`.
    ///
    /// On a grid narrower than the window, wrapped duplicates appear once.
    pub fn window(&self, center: GridPoint, radius: i32, include_center: bool) -> Vec<GridPoint> {
        let center = self.wrap(center);
        let mut points = Vec::with_capacity(((2 * radius + 1) * (2 * radius + 1)) as usize);
        for dx in -radius..=radius {
            for dy in -radius..=radius {
                let p = self.wrap(center.offset((dx, dy)));
                if !include_center && p == center {
                    continue;
                }
                if !points.contains(&p) {
                    points.push(p);
                }
            }
        }
        points
    }

    /// Chebyshev distance on the torus.
    pub fn distance(&self, a: GridPoint, b: GridPoint) -> i32 {
        let axis = |u: i32, v: i32| {
            let d = (u - v).rem_euclid(self.dimension);
            d.min(self.dimension - d)
        };
        axis(a.x, b.x).max(axis(a.y, b.y))
    }
}
