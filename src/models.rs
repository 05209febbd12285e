//! Data models for the site-probing pipeline.
//!
//! This module contains the core data structures passed between the
//! stages: the region being searched, its tiles, raster samples and
//! the candidate sites that come out of the detector.

use crate::error::{PipelineError, Result};
use geo::{Area, ChamberlainDuquetteArea, Coord, HaversineLength, LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Area of interest: a closed polygon of (longitude, latitude) pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    vertices: Vec<(f64, f64)>,
}

impl Region {
    /// Build a region, validating its vertices.
    ///
    /// A trailing vertex equal to the first one is accepted and dropped.
    pub fn new(mut vertices: Vec<(f64, f64)>) -> Result<Self> {
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }

        if vertices.len() < 3 {
            return Err(PipelineError::InvalidRegion(format!(
                "need at least 3 vertices, got {}",
                vertices.len()
            )));
        }

        for &(lon, lat) in &vertices {
            if !lon.is_finite() || !lat.is_finite() {
                return Err(PipelineError::InvalidRegion(
                    "coordinates must be finite".to_string(),
                ));
            }
            if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
                return Err(PipelineError::InvalidRegion(format!(
                    "vertex ({}, {}) is outside longitude/latitude range",
                    lon, lat
                )));
            }
        }

        let region = Self { vertices };
        if region.planar_area() <= f64::EPSILON {
            return Err(PipelineError::InvalidRegion(
                "polygon encloses zero area".to_string(),
            ));
        }

        Ok(region)
    }

    /// Vertices without the closing point.
    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    /// The region as a `geo` polygon.
    pub fn to_polygon(&self) -> Polygon<f64> {
        let coords: Vec<Coord<f64>> = self
            .vertices
            .iter()
            .map(|&(x, y)| Coord { x, y })
            .collect();
        Polygon::new(LineString::new(coords), vec![])
    }

    /// Bounding box of the region.
    pub fn bounds(&self) -> Bounds {
        let mut bounds = Bounds {
            west: f64::INFINITY,
            south: f64::INFINITY,
            east: f64::NEG_INFINITY,
            north: f64::NEG_INFINITY,
        };
        for &(lon, lat) in &self.vertices {
            bounds.west = bounds.west.min(lon);
            bounds.east = bounds.east.max(lon);
            bounds.south = bounds.south.min(lat);
            bounds.north = bounds.north.max(lat);
        }
        bounds
    }

    /// Enclosed area in square degrees.
    pub fn planar_area(&self) -> f64 {
        self.to_polygon().unsigned_area()
    }
}

/// Angular size of a tile in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileSize {
    pub width_deg: f64,
    pub height_deg: f64,
}

impl TileSize {
    /// Square tiles.
    pub fn square(size_deg: f64) -> Self {
        Self {
            width_deg: size_deg,
            height_deg: size_deg,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ok = |v: f64| v.is_finite() && v > 0.0;
        if ok(self.width_deg) && ok(self.height_deg) {
            Ok(())
        } else {
            Err(PipelineError::InvalidRegion(format!(
                "tile size must be positive, got {}x{}",
                self.width_deg, self.height_deg
            )))
        }
    }
}

impl fmt::Display for TileSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°x{}°", self.width_deg, self.height_deg)
    }
}

/// Grid index of a tile. Ordered by column, then row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileId {
    pub col: usize,
    pub row: usize,
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

/// Axis-aligned bounds in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Bounds {
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }
}

/// One cell of the tiling grid, clipped to the region.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    /// Grid index.
    pub id: TileId,
    /// Unclipped cell bounds.
    pub cell: Bounds,
    /// The region's intersection with the cell; several pieces when a
    /// concave region crosses the cell more than once.
    pub footprint: MultiPolygon<f64>,
}

impl Tile {
    /// Lower-left corner of the cell; identifies the tile in output files.
    pub fn lower_left(&self) -> (f64, f64) {
        (self.cell.west, self.cell.south)
    }

    /// Clipped area in square degrees.
    pub fn planar_area(&self) -> f64 {
        self.footprint.unsigned_area()
    }

    /// Clipped area on the sphere, in square kilometres.
    pub fn area_km2(&self) -> f64 {
        self.footprint.chamberlain_duquette_unsigned_area() / 1_000_000.0
    }

    /// Boundary length of the footprint on the sphere, in metres.
    pub fn perimeter_m(&self) -> f64 {
        self.footprint
            .iter()
            .map(|p| {
                p.exterior().haversine_length()
                    + p.interiors().iter().map(|r| r.haversine_length()).sum::<f64>()
            })
            .sum()
    }

    /// Perimeter over the square root of the area: 4 for a square, larger
    /// for elongated or fragmented footprints.
    pub fn compactness(&self) -> f64 {
        let area_m2 = self.area_km2() * 1_000_000.0;
        if area_m2 > 0.0 {
            self.perimeter_m() / area_m2.sqrt()
        } else {
            0.0
        }
    }

    /// Whether the footprint is the full cell (not clipped by the region edge).
    pub fn is_full_cell(&self) -> bool {
        let full = self.cell.width() * self.cell.height();
        (self.planar_area() - full).abs() <= full * 1e-9
    }
}

/// Summary statistics of the valid pixels of one band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Number of valid pixels.
    pub count: usize,
}

impl BandStats {
    /// Compute statistics over finite values. Returns `None` if there are none.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for &v in values.iter().filter(|v| v.is_finite()) {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }

        if count == 0 {
            return None;
        }

        Some(Self {
            mean: sum / count as f64,
            min,
            max,
            count,
        })
    }
}

/// Raster values sampled for one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterSample {
    pub tile: TileId,
    /// Per-pixel NDVI values.
    pub ndvi: Vec<f64>,
    /// Per-pixel elevation values in metres.
    pub elevation: Vec<f64>,
}

impl RasterSample {
    pub fn ndvi_stats(&self) -> Option<BandStats> {
        BandStats::from_values(&self.ndvi)
    }

    pub fn elevation_stats(&self) -> Option<BandStats> {
        BandStats::from_values(&self.elevation)
    }
}

/// A fetched tile reduced to its band statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct TileSummary {
    pub tile: Tile,
    pub ndvi: BandStats,
    pub elevation: BandStats,
}

impl TileSummary {
    /// Reduce a sample to statistics. `None` when either band has no valid pixel.
    pub fn from_sample(tile: Tile, sample: &RasterSample) -> Option<Self> {
        Some(Self {
            ndvi: sample.ndvi_stats()?,
            elevation: sample.elevation_stats()?,
            tile,
        })
    }
}

/// A tile flagged by the anomaly detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub tile: Tile,
    pub ndvi: BandStats,
    pub elevation: BandStats,
    /// Mean elevation of the surrounding tiles, in metres.
    pub baseline_elevation: f64,
    /// `elevation.mean - baseline_elevation`.
    pub deviation_m: f64,
    pub area_km2: f64,
    /// Language-model commentary, attached by the advisory stage.
    pub advisory: Option<String>,
}

impl Candidate {
    /// Ranking key: larger deviation magnitude is a stronger anomaly.
    pub fn strength(&self) -> f64 {
        self.deviation_m.abs()
    }
}

/// One row of the candidate CSV file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRow {
    pub longitude: f64,
    pub latitude: f64,
    pub mean_ndvi: f64,
    pub mean_elevation: f64,
    pub area_km2: f64,
    pub advisory: String,
}

impl From<&Candidate> for CandidateRow {
    fn from(candidate: &Candidate) -> Self {
        let (longitude, latitude) = candidate.tile.lower_left();
        Self {
            longitude,
            latitude,
            mean_ndvi: candidate.ndvi.mean,
            mean_elevation: candidate.elevation.mean,
            area_km2: candidate.area_km2,
            advisory: candidate.advisory.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(lon: f64, lat: f64, size: f64) -> Vec<(f64, f64)> {
        vec![
            (lon, lat),
            (lon + size, lat),
            (lon + size, lat + size),
            (lon, lat + size),
        ]
    }

    #[test]
    fn test_region_accepts_closed_ring() {
        let mut ring = square(-64.0, -10.0, 10.0);
        ring.push((-64.0, -10.0));
        let region = Region::new(ring).unwrap();
        assert_eq!(region.vertices().len(), 4);
        assert!((region.planar_area() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_region_rejects_degenerate() {
        assert!(Region::new(vec![(0.0, 0.0), (1.0, 1.0)]).is_err());
        // Collinear points enclose nothing.
        assert!(Region::new(vec![(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]).is_err());
        assert!(Region::new(vec![(0.0, 0.0), (f64::NAN, 1.0), (2.0, 0.0)]).is_err());
        assert!(Region::new(vec![(0.0, 0.0), (200.0, 0.0), (0.0, 1.0)]).is_err());
    }

    #[test]
    fn test_region_bounds() {
        let region = Region::new(vec![(-64.0, -10.0), (-54.0, -5.0), (-60.0, 0.0)]).unwrap();
        let b = region.bounds();
        assert_eq!(b.west, -64.0);
        assert_eq!(b.east, -54.0);
        assert_eq!(b.south, -10.0);
        assert_eq!(b.north, 0.0);
    }

    #[test]
    fn test_tile_size_validation() {
        assert!(TileSize::square(0.5).validate().is_ok());
        assert!(TileSize::square(0.0).validate().is_err());
        assert!(TileSize {
            width_deg: 0.5,
            height_deg: f64::INFINITY
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_tile_id_ordering() {
        let a = TileId { col: 0, row: 5 };
        let b = TileId { col: 1, row: 0 };
        assert!(a < b);
        assert!(TileId { col: 1, row: 1 } > b);
    }

    #[test]
    fn test_band_stats() {
        let stats = BandStats::from_values(&[1.0, f64::NAN, 3.0, 5.0]).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.mean, 3.0);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 5.0);

        assert!(BandStats::from_values(&[]).is_none());
        assert!(BandStats::from_values(&[f64::NAN]).is_none());
    }

    #[test]
    fn test_tile_area_near_equator() {
        let region = Region::new(square(0.0, 0.0, 0.5)).unwrap();
        let tile = Tile {
            id: TileId { col: 0, row: 0 },
            cell: Bounds {
                west: 0.0,
                south: 0.0,
                east: 0.5,
                north: 0.5,
            },
            footprint: MultiPolygon::new(vec![region.to_polygon()]),
        };
        // 0.5° is roughly 55.6 km at the equator.
        let area = tile.area_km2();
        assert!(area > 3000.0 && area < 3150.0, "area was {}", area);
        assert!(tile.is_full_cell());
        assert_eq!(tile.lower_left(), (0.0, 0.0));

        let compactness = tile.compactness();
        assert!((compactness - 4.0).abs() < 0.05, "compactness was {}", compactness);
    }

    #[test]
    fn test_split_footprint_is_less_compact() {
        let piece = |w: f64| {
            Region::new(square(w, 0.0, 0.25)).unwrap().to_polygon()
        };
        let tile = Tile {
            id: TileId { col: 0, row: 0 },
            cell: Bounds {
                west: 0.0,
                south: 0.0,
                east: 1.0,
                north: 0.25,
            },
            footprint: MultiPolygon::new(vec![piece(0.0), piece(0.75)]),
        };
        // Two separate squares: twice the perimeter of each, sqrt(2) the side.
        let expected = 8.0 / 2f64.sqrt();
        assert!((tile.compactness() - expected).abs() < 0.05, "compactness was {}", tile.compactness());
        assert!(!tile.is_full_cell());
    }
}
