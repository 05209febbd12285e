//! Survey loop: fetch every tile and reduce it to statistics.
//!
//! Tiles without data are skipped; platform failures stop the survey.

use crate::analysis::RunStats;
use crate::error::{PipelineError, Result};
use crate::models::TileSummary;
use crate::platform::{RasterFetcher, RasterSource};
use crate::tiler::TileGrid;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

/// Progress bar sized to the grid, or a hidden one.
pub fn progress_bar(grid: &TileGrid, show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(grid.len_hint() as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tiles ({eta}) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Fetch all tiles of `grid` in order.
///
/// Returns the summaries of the tiles that had data, plus tile counts.
pub async fn survey<S: RasterSource>(
    fetcher: &RasterFetcher<S>,
    grid: &TileGrid,
    progress: &ProgressBar,
) -> Result<(Vec<TileSummary>, RunStats)> {
    let mut stats = RunStats::default();
    let mut summaries = Vec::new();

    for tile in grid.tiles() {
        stats.tiles_total += 1;
        progress.set_message(format!("tile {}", tile.id));

        let outcome = fetcher
            .fetch(&tile)
            .await
            .and_then(|sample| {
                TileSummary::from_sample(tile.clone(), &sample).ok_or_else(|| {
                    PipelineError::DataUnavailable {
                        tile: tile.id,
                        reason: "no valid pixels".to_string(),
                    }
                })
            });

        match outcome {
            Ok(summary) => {
                debug!(
                    "Tile {}: NDVI {:.3}, elevation {:.1} m",
                    tile.id, summary.ndvi.mean, summary.elevation.mean
                );
                stats.tiles_fetched += 1;
                summaries.push(summary);
            }
            Err(err) if err.is_recoverable() => {
                warn!("Skipping tile: {}", err);
                stats.tiles_skipped += 1;
            }
            Err(err) => {
                progress.abandon_with_message("aborted");
                return Err(err);
            }
        }
        progress.inc(1);
    }

    progress.finish_with_message("survey complete");
    info!(
        "Survey finished: {} tiles fetched, {} skipped",
        stats.tiles_fetched, stats.tiles_skipped
    );

    Ok((summaries, stats))
}
