//! Assignment of grid points to ranks.
//!
//! The grid is cut into `processes_x * processes_y` equal rectangles. Rank
//! `r` owns the rectangle in column `r / processes_y` and row
//! `r % processes_y`. Two ranks are neighbours when their rectangles lie
//! within the buffer width of each other, wraparound included.

mod geometry;

pub use geometry::GridGeometry;

use std::collections::BTreeSet;
use viroscape_core::params::GridParams;
use viroscape_core::{GridPoint, RankId, SimError, SimResult, SimRng, BUFFER_WIDTH};

/// The rectangle of grid points one rank owns. Bounds are inclusive-exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub min_x: i32,
    pub min_y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn contains(&self, point: GridPoint) -> bool {
        point.x >= self.min_x
            && point.x < self.min_x + self.width
            && point.y >= self.min_y
            && point.y < self.min_y + self.height
    }

    /// Points in column-major order.
    pub fn points(&self) -> impl Iterator<Item = GridPoint> + '_ {
        (self.min_x..self.min_x + self.width)
            .flat_map(move |x| (self.min_y..self.min_y + self.height).map(move |y| GridPoint::new(x, y)))
    }

    pub fn area(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }
}

/// Static partition of the grid over ranks.
#[derive(Debug, Clone)]
pub struct Partition {
    geometry: GridGeometry,
    processes_x: i32,
    processes_y: i32,
    width: i32,
    height: i32,
}

impl Partition {
    /// # Errors
    ///
    /// Fails when the process counts are not positive or do not divide the
    /// grid dimension.
    pub fn new(dimension: i32, processes_x: i32, processes_y: i32) -> SimResult<Self> {
        if dimension <= 0 {
            return Err(SimError::Grid(format!("dimension {} is not positive", dimension)));
        }
        for count in [processes_x, processes_y] {
            if count <= 0 || dimension % count != 0 {
                return Err(SimError::Grid(format!(
                    "{} processes cannot split a grid of dimension {}",
                    count, dimension
                )));
            }
        }
        Ok(Self {
            geometry: GridGeometry::new(dimension),
            processes_x,
            processes_y,
            width: dimension / processes_x,
            height: dimension / processes_y,
        })
    }

    pub fn from_params(grid: &GridParams) -> SimResult<Self> {
        Self::new(grid.dimension, grid.processes_x, grid.processes_y)
    }

    pub fn geometry(&self) -> GridGeometry {
        self.geometry
    }

    pub fn rank_count(&self) -> usize {
        (self.processes_x * self.processes_y) as usize
    }

    pub fn ranks(&self) -> impl Iterator<Item = RankId> {
        (0..self.rank_count() as i32).map(RankId::new)
    }

    pub fn contains_rank(&self, rank: RankId) -> bool {
        rank.as_i32() >= 0 && (rank.as_i32() as usize) < self.rank_count()
    }

    pub fn rect(&self, rank: RankId) -> SimResult<Rect> {
        if !self.contains_rank(rank) {
            return Err(SimError::Grid(format!("{} is outside the process topology", rank)));
        }
        let column = rank.as_i32() / self.processes_y;
        let row = rank.as_i32() % self.processes_y;
        let origin = self.geometry.origin();
        Ok(Rect {
            min_x: origin + column * self.width,
            min_y: origin + row * self.height,
            width: self.width,
            height: self.height,
        })
    }

    /// The rank owning `point`, after wrapping it onto the grid.
    pub fn owner_of(&self, point: GridPoint) -> RankId {
        let (dx, dy) = self.geometry.offset_of(point);
        RankId::new((dx / self.width) * self.processes_y + dy / self.height)
    }

    /// Other ranks that must mirror an agent of `rank` standing at `point`.
    pub fn buffer_recipients(&self, rank: RankId, point: GridPoint) -> BTreeSet<RankId> {
        self.geometry
            .window(point, BUFFER_WIDTH, true)
            .into_iter()
            .map(|p| self.owner_of(p))
            .filter(|owner| *owner != rank)
            .collect()
    }

    /// Every rank that can exchange replicas or agents with `rank`.
    pub fn neighbours(&self, rank: RankId) -> SimResult<BTreeSet<RankId>> {
        let rect = self.rect(rank)?;
        let mut neighbours = BTreeSet::new();
        for point in rect.points() {
            neighbours.extend(self.buffer_recipients(rank, point));
        }
        Ok(neighbours)
    }

    /// A uniformly drawn point inside the rectangle of `rank`.
    pub fn random_point_in(&self, rank: RankId, rng: &mut SimRng) -> SimResult<GridPoint> {
        let rect = self.rect(rank)?;
        let x = rng.uniform_int(rect.min_x as i64, (rect.min_x + rect.width - 1) as i64);
        let y = rng.uniform_int(rect.min_y as i64, (rect.min_y + rect.height - 1) as i64);
        Ok(GridPoint::new(x as i32, y as i32))
    }
}
