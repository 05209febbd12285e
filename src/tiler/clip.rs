//! Intersection of the region polygon with a grid cell.
//!
//! Cells fully inside the region are returned as-is; everything else goes
//! through `geo`'s boolean intersection, which splits a concave region into
//! separate valid pieces instead of bridging them.

use crate::models::Bounds;
use geo::{Area, BooleanOps, Contains, Coord, Intersects, MultiPolygon, Polygon, Rect};

/// The cell as a polygon.
fn cell_polygon(rect: &Bounds) -> Polygon<f64> {
    Rect::new(
        Coord {
            x: rect.west,
            y: rect.south,
        },
        Coord {
            x: rect.east,
            y: rect.north,
        },
    )
    .to_polygon()
}

/// Clip `subject` to `rect`. Returns `None` when no area is left.
pub fn clip_to_rect(subject: &Polygon<f64>, rect: &Bounds) -> Option<MultiPolygon<f64>> {
    let cell = cell_polygon(rect);

    if !subject.intersects(&cell) {
        return None;
    }
    if subject.contains(&cell) {
        return Some(MultiPolygon::new(vec![cell]));
    }

    let pieces: Vec<Polygon<f64>> = subject
        .intersection(&cell)
        .into_iter()
        .filter(|p| p.unsigned_area() > 0.0)
        .collect();

    if pieces.is_empty() {
        None
    } else {
        Some(MultiPolygon::new(pieces))
    }
}
