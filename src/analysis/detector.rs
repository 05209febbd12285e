//! Threshold-based anomaly detection over tile statistics.
//!
//! A tile becomes a candidate when it is sparsely vegetated and its mean
//! elevation stands out from the tiles around it.

use crate::models::{Candidate, TileId, TileSummary};
use std::collections::HashMap;
use tracing::debug;

/// Detection thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Tiles with mean NDVI strictly below this count as low cover.
    pub ndvi_threshold: f64,
    /// Minimum absolute elevation deviation from the baseline, in metres.
    pub elevation_deviation_m: f64,
    /// Minimum clipped tile area in km².
    pub min_area_km2: f64,
}

/// Mean elevation of the fetched neighbours of `id`.
///
/// Falls back to the mean over every other fetched tile when no
/// 8-connected neighbour was fetched; `None` if `id` is the only tile.
pub fn neighborhood_baseline(id: TileId, means: &HashMap<TileId, f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;

    for dc in -1i64..=1 {
        for dr in -1i64..=1 {
            if dc == 0 && dr == 0 {
                continue;
            }
            let col = id.col as i64 + dc;
            let row = id.row as i64 + dr;
            if col < 0 || row < 0 {
                continue;
            }
            let neighbor = TileId {
                col: col as usize,
                row: row as usize,
            };
            if let Some(mean) = means.get(&neighbor) {
                sum += mean;
                count += 1;
            }
        }
    }

    if count == 0 {
        for (other, mean) in means {
            if *other != id {
                sum += mean;
                count += 1;
            }
        }
    }

    (count > 0).then(|| sum / count as f64)
}

/// Evaluate one tile against the thresholds given its baseline elevation.
pub fn evaluate(summary: &TileSummary, baseline: f64, thresholds: &Thresholds) -> Option<Candidate> {
    if !(summary.ndvi.mean < thresholds.ndvi_threshold) {
        return None;
    }

    let deviation = summary.elevation.mean - baseline;
    if !(deviation.abs() > thresholds.elevation_deviation_m) {
        return None;
    }

    let area_km2 = summary.tile.area_km2();
    if area_km2 < thresholds.min_area_km2 {
        debug!(
            "Tile {} anomalous but too small ({:.4} km²)",
            summary.tile.id, area_km2
        );
        return None;
    }

    Some(Candidate {
        tile: summary.tile.clone(),
        ndvi: summary.ndvi,
        elevation: summary.elevation,
        baseline_elevation: baseline,
        deviation_m: deviation,
        area_km2,
        advisory: None,
    })
}

/// Flag candidates among the fetched tiles, in input order.
pub fn detect(summaries: &[TileSummary], thresholds: &Thresholds) -> Vec<Candidate> {
    let means: HashMap<TileId, f64> = summaries
        .iter()
        .map(|s| (s.tile.id, s.elevation.mean))
        .collect();

    summaries
        .iter()
        .filter_map(|summary| {
            let baseline = neighborhood_baseline(summary.tile.id, &means)?;
            evaluate(summary, baseline, thresholds)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BandStats;
    use crate::platform::tests::tile_at;
    use proptest::prelude::*;

    fn stats(mean: f64) -> BandStats {
        BandStats {
            mean,
            min: mean,
            max: mean,
            count: 1,
        }
    }

    fn summary(col: usize, row: usize, ndvi: f64, elevation: f64) -> TileSummary {
        TileSummary {
            tile: tile_at(col, row),
            ndvi: stats(ndvi),
            elevation: stats(elevation),
        }
    }

    fn thresholds() -> Thresholds {
        Thresholds {
            ndvi_threshold: 0.3,
            elevation_deviation_m: 2.0,
            min_area_km2: 0.01,
        }
    }

    #[test]
    fn test_low_ndvi_with_deviation_is_flagged() {
        let candidate = evaluate(&summary(0, 0, 0.1, 105.0), 100.0, &thresholds()).unwrap();
        assert_eq!(candidate.deviation_m, 5.0);
        assert_eq!(candidate.baseline_elevation, 100.0);
        assert!(candidate.area_km2 > 3000.0);
        assert!(candidate.advisory.is_none());
    }

    #[test]
    fn test_vegetated_tile_never_flagged() {
        for elevation in [0.0, 105.0, 5000.0, -300.0] {
            assert!(evaluate(&summary(0, 0, 0.5, elevation), 100.0, &thresholds()).is_none());
        }
    }

    #[test]
    fn test_small_deviation_not_flagged() {
        assert!(evaluate(&summary(0, 0, 0.1, 101.0), 100.0, &thresholds()).is_none());
        // Depressions count as deviations too.
        assert!(evaluate(&summary(0, 0, 0.1, 90.0), 100.0, &thresholds()).is_some());
    }

    #[test]
    fn test_min_area_filter() {
        let strict = Thresholds {
            min_area_km2: 1e6,
            ..thresholds()
        };
        assert!(evaluate(&summary(0, 0, 0.1, 150.0), 100.0, &strict).is_none());
    }

    #[test]
    fn test_neighborhood_baseline() {
        let means: HashMap<TileId, f64> = [
            (TileId { col: 0, row: 0 }, 10.0),
            (TileId { col: 1, row: 0 }, 20.0),
            (TileId { col: 1, row: 1 }, 30.0),
            (TileId { col: 5, row: 5 }, 1000.0),
        ]
        .into_iter()
        .collect();

        assert_eq!(neighborhood_baseline(TileId { col: 0, row: 0 }, &means), Some(25.0));
        // Isolated tile falls back to all other tiles.
        assert_eq!(neighborhood_baseline(TileId { col: 5, row: 5 }, &means), Some(20.0));

        let lonely: HashMap<TileId, f64> = [(TileId { col: 0, row: 0 }, 10.0)].into_iter().collect();
        assert_eq!(neighborhood_baseline(TileId { col: 0, row: 0 }, &lonely), None);
    }

    #[test]
    fn test_detect_flags_raised_bare_tile() {
        let summaries = vec![
            summary(0, 0, 0.6, 100.0),
            summary(0, 1, 0.6, 100.0),
            summary(1, 0, 0.1, 110.0),
            summary(1, 1, 0.6, 100.0),
        ];
        let candidates = detect(&summaries, &thresholds());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].tile.id, TileId { col: 1, row: 0 });
        assert!((candidates[0].deviation_m - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_detect_single_tile_has_no_baseline() {
        assert!(detect(&[summary(0, 0, 0.0, 5000.0)], &thresholds()).is_empty());
    }

    proptest! {
        #[test]
        fn ndvi_at_or_above_threshold_never_flags(
            threshold in -1.0f64..1.0,
            excess in 0.0f64..1.0,
            elevation in -500.0f64..9000.0,
            baseline in -500.0f64..9000.0,
            deviation_limit in 0.0f64..100.0,
        ) {
            let t = Thresholds {
                ndvi_threshold: threshold,
                elevation_deviation_m: deviation_limit,
                min_area_km2: 0.0,
            };
            let s = summary(0, 0, threshold + excess, elevation);
            prop_assert!(evaluate(&s, baseline, &t).is_none());
        }
    }
}
