//! Partitioning of the area of interest into a grid of tiles.
//!
//! The grid covers the region's bounding box. Each cell is intersected
//! with the region polygon; cells left with no area are skipped.

mod clip;

pub use clip::clip_to_rect;

use crate::error::{PipelineError, Result};
use crate::models::{Bounds, Region, Tile, TileId, TileSize};
use geo::{Area, Polygon};
use tracing::debug;

/// Tolerance for deciding whether an extent is an exact multiple of the tile size.
const GRID_EPSILON: f64 = 1e-9;

/// A tiling of a region. Iterate with [`TileGrid::tiles`].
#[derive(Debug, Clone)]
pub struct TileGrid {
    polygon: Polygon<f64>,
    bounds: Bounds,
    size: TileSize,
    cols: usize,
    rows: usize,
    cells: usize,
}

impl TileGrid {
    /// Lay a grid of `size` cells over `region`.
    pub fn new(region: &Region, size: TileSize) -> Result<Self> {
        size.validate()?;

        let bounds = region.bounds();
        let cols = cell_count(bounds.width(), size.width_deg);
        let rows = cell_count(bounds.height(), size.height_deg);
        let cells = cols.checked_mul(rows).ok_or_else(|| {
            PipelineError::InvalidRegion(format!(
                "tile size {} is too small for the region",
                size
            ))
        })?;

        debug!(
            "Tile grid {}x{} over [{}, {}, {}, {}] with {} cells",
            cols, rows, bounds.west, bounds.south, bounds.east, bounds.north, size
        );

        Ok(Self {
            polygon: region.to_polygon(),
            bounds,
            size,
            cols,
            rows,
            cells,
        })
    }

    pub fn tile_size(&self) -> TileSize {
        self.size
    }

    /// Number of grid columns (west to east).
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of grid rows (south to north).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of cells before clipping; an upper bound on the tile count.
    pub fn len_hint(&self) -> usize {
        self.cells
    }

    /// Unclipped bounds of a cell, clamped to the region's bounding box.
    pub fn cell_bounds(&self, id: TileId) -> Bounds {
        let west = self.bounds.west + id.col as f64 * self.size.width_deg;
        let south = self.bounds.south + id.row as f64 * self.size.height_deg;
        Bounds {
            west,
            south,
            east: (west + self.size.width_deg).min(self.bounds.east),
            north: (south + self.size.height_deg).min(self.bounds.north),
        }
    }

    /// Clip one cell to the region. `None` when the cell holds no region area.
    pub fn tile(&self, id: TileId) -> Option<Tile> {
        if id.col >= self.cols || id.row >= self.rows {
            return None;
        }

        let cell = self.cell_bounds(id);
        let footprint = clip_to_rect(&self.polygon, &cell)?;
        if footprint.unsigned_area() <= GRID_EPSILON * cell.width() * cell.height() {
            return None;
        }

        Some(Tile {
            id,
            cell,
            footprint,
        })
    }

    /// Lazily produce the tiles, west to east, and south to north within
    /// a column. Each call starts over from the first tile.
    pub fn tiles(&self) -> Tiles<'_> {
        Tiles {
            grid: self,
            next: 0,
        }
    }
}

impl<'a> IntoIterator for &'a TileGrid {
    type Item = Tile;
    type IntoIter = Tiles<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.tiles()
    }
}

/// Iterator over the non-empty tiles of a [`TileGrid`].
#[derive(Debug, Clone)]
pub struct Tiles<'a> {
    grid: &'a TileGrid,
    next: usize,
}

impl Iterator for Tiles<'_> {
    type Item = Tile;

    fn next(&mut self) -> Option<Tile> {
        let total = self.grid.len_hint();
        while self.next < total {
            let id = TileId {
                col: self.next / self.grid.rows,
                row: self.next % self.grid.rows,
            };
            self.next += 1;

            match self.grid.tile(id) {
                Some(tile) => return Some(tile),
                None => debug!("Skipping empty tile {}", id),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.grid.len_hint() - self.next))
    }
}

fn cell_count(extent: f64, size: f64) -> usize {
    // `as` saturates, so absurd ratios end up at usize::MAX and fail checked_mul.
    ((extent / size) - GRID_EPSILON).ceil().max(1.0) as usize
}
