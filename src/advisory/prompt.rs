//! Prompt text sent to the language model for each candidate.

use crate::models::{Candidate, TileSize};

/// Run-wide facts included in every prompt.
#[derive(Debug, Clone)]
pub struct PromptContext {
    /// Human-readable name of the searched area, e.g. "Amazon basin".
    pub region_name: String,
    pub tile_size: TileSize,
}

/// Build the prompt for the candidate ranked `rank` (1-based).
pub fn build_prompt(rank: usize, candidate: &Candidate, ctx: &PromptContext) -> String {
    let (lon, lat) = candidate.tile.lower_left();

    format!(
        r#"Site {rank}:
  - Location: tile with lower-left corner at longitude {lon:.4}, latitude {lat:.4} ({size} tile)
  - Mean NDVI: {ndvi:.3} (range {ndvi_min:.3} to {ndvi_max:.3})
  - Mean Elevation: {elev:.1} m
  - Elevation deviation from surrounding tiles: {dev:+.1} m
  - Area: {area:.2} km²
  - Compactness: {compactness:.3} (perimeter / √area; 4 for a full square tile)

You are an expert in archaeology and remote sensing. Based on the metrics above for a site within the {region}, assess how plausible it is that this tile contains an archaeological site.

Please:
  1. Explain your reasoning from the vegetation index, elevation, elevation deviation and compactness.
  2. Rate the site's archaeological potential from 1 to 10 (1 = very unlikely, 10 = highly likely).
  3. Summarize the key considerations briefly.
"#,
        rank = rank,
        lon = lon,
        lat = lat,
        size = ctx.tile_size,
        ndvi = candidate.ndvi.mean,
        ndvi_min = candidate.ndvi.min,
        ndvi_max = candidate.ndvi.max,
        elev = candidate.elevation.mean,
        dev = candidate.deviation_m,
        area = candidate.area_km2,
        compactness = candidate.tile.compactness(),
        region = ctx.region_name,
    )
}
