//! Raster sampling from the geospatial platform.
//!
//! A tile is sampled twice: once from the optical collection (NIR and red
//! bands, reduced to NDVI here) and once from the elevation model.

pub mod client;

pub use client::{PlatformClient, PlatformClientConfig};

use crate::error::{PipelineError, Result};
use crate::models::{RasterSample, Tile};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Pixel values per band name; `None` is a nodata pixel.
pub type BandValues = HashMap<String, Vec<Option<f64>>>;

/// What to sample for a tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandRequest {
    /// Dataset identifier, e.g. `USGS/SRTMGL1_003`.
    pub dataset: String,
    pub bands: Vec<String>,
    /// Sampling resolution in metres.
    #[serde(rename = "scale")]
    pub scale_m: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cloud_percent: Option<f64>,
}

/// A source of raster values for tiles.
///
/// Implementations return [`PipelineError::DataUnavailable`] when there is
/// nothing to sample and [`PipelineError::Platform`] for anything that
/// should stop the run.
#[allow(async_fn_in_trait)]
pub trait RasterSource {
    async fn sample_bands(&self, tile: &Tile, request: &BandRequest) -> Result<BandValues>;
}

/// Band names the fetcher reads out of each response.
#[derive(Debug, Clone)]
pub struct BandNames {
    pub nir: String,
    pub red: String,
    pub elevation: String,
}

/// Turns tiles into [`RasterSample`]s using a [`RasterSource`].
pub struct RasterFetcher<S> {
    source: S,
    optical: BandRequest,
    elevation: BandRequest,
    names: BandNames,
}

impl<S: RasterSource> RasterFetcher<S> {
    pub fn new(source: S, optical: BandRequest, elevation: BandRequest, names: BandNames) -> Self {
        Self {
            source,
            optical,
            elevation,
            names,
        }
    }

    /// Fetch NDVI and elevation values for one tile.
    pub async fn fetch(&self, tile: &Tile) -> Result<RasterSample> {
        let optical = self.source.sample_bands(tile, &self.optical).await?;
        let nir = take_band(tile, &optical, &self.names.nir)?;
        let red = take_band(tile, &optical, &self.names.red)?;

        let ndvi = normalized_difference(nir, red);
        if ndvi.is_empty() {
            return Err(unavailable(tile, "no clear optical pixels"));
        }

        let dem = self.source.sample_bands(tile, &self.elevation).await?;
        let elevation: Vec<f64> = take_band(tile, &dem, &self.names.elevation)?
            .iter()
            .flatten()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        if elevation.is_empty() {
            return Err(unavailable(tile, "no elevation coverage"));
        }

        debug!(
            "Tile {}: {} NDVI pixels, {} elevation pixels",
            tile.id,
            ndvi.len(),
            elevation.len()
        );

        Ok(RasterSample {
            tile: tile.id,
            ndvi,
            elevation,
        })
    }
}

/// Per-pixel `(nir - red) / (nir + red)`, dropping nodata and zero denominators.
pub fn normalized_difference(nir: &[Option<f64>], red: &[Option<f64>]) -> Vec<f64> {
    nir.iter()
        .zip(red)
        .filter_map(|pair| match pair {
            (Some(n), Some(r)) if n + r != 0.0 => Some((n - r) / (n + r)),
            _ => None,
        })
        .filter(|v| v.is_finite())
        .collect()
}

fn take_band<'a>(tile: &Tile, values: &'a BandValues, band: &str) -> Result<&'a [Option<f64>]> {
    match values.get(band) {
        Some(v) if !v.is_empty() => Ok(v.as_slice()),
        _ => Err(unavailable(tile, &format!("band {} missing or empty", band))),
    }
}

fn unavailable(tile: &Tile, reason: &str) -> PipelineError {
    PipelineError::DataUnavailable {
        tile: tile.id,
        reason: reason.to_string(),
    }
}
