//! HTTP client for the geospatial platform's sampling endpoint.
//!
//! `POST {base_url}/v1/projects/{project}/sample` with the tile footprint
//! as GeoJSON and the dataset/bands to reduce over it.

use crate::error::{PipelineError, Result};
use crate::models::Tile;
use crate::platform::{BandRequest, BandValues, RasterSource};
use geo::LineString;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Connection settings for the platform.
#[derive(Debug, Clone)]
pub struct PlatformClientConfig {
    pub base_url: String,
    /// Cloud project the requests are billed to.
    pub project: String,
    /// Bearer token.
    pub token: String,
    pub timeout_seconds: u64,
}

/// Request body for the sampling endpoint.
#[derive(Debug, Serialize)]
struct SampleRequest<'a> {
    #[serde(flatten)]
    request: &'a BandRequest,
    geometry: Value,
}

/// Response body: pixel values per band.
#[derive(Debug, Deserialize)]
struct SampleResponse {
    #[serde(default)]
    bands: BandValues,
}

/// Talks to the platform over HTTPS.
pub struct PlatformClient {
    config: PlatformClientConfig,
    http_client: reqwest::Client,
}

impl PlatformClient {
    pub fn new(config: PlatformClientConfig) -> Result<Self> {
        if config.project.trim().is_empty() {
            return Err(PipelineError::Platform(
                "no platform project configured (set EARTHENGINE_PROJECT)".to_string(),
            ));
        }
        if config.token.trim().is_empty() {
            return Err(PipelineError::Platform(
                "no platform token configured (set GEO_PLATFORM_TOKEN)".to_string(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| PipelineError::Platform(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn sample_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/sample",
            self.config.base_url.trim_end_matches('/'),
            self.config.project
        )
    }
}

impl RasterSource for PlatformClient {
    async fn sample_bands(&self, tile: &Tile, request: &BandRequest) -> Result<BandValues> {
        let url = self.sample_url();
        let body = SampleRequest {
            request,
            geometry: footprint_geojson(tile),
        };

        debug!("Sampling {} for tile {}", request.dataset, tile.id);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::Platform(format!(
                        "request timed out after {}s",
                        self.config.timeout_seconds
                    ))
                } else if e.is_connect() {
                    PipelineError::Platform(format!(
                        "cannot connect to platform at {}",
                        self.config.base_url
                    ))
                } else {
                    PipelineError::Platform(format!("failed to send request: {}", e))
                }
            })?;

        let status = response.status();
        if let Some(err) = classify_status(status, tile) {
            let body = response.text().await.unwrap_or_default();
            return Err(match err {
                PipelineError::Platform(msg) => PipelineError::Platform(format!("{}: {}", msg, body)),
                other => other,
            });
        }

        let parsed: SampleResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Platform(format!("malformed sample response: {}", e)))?;

        Ok(parsed.bands)
    }
}

/// Map a non-success status to the error kind it stands for.
fn classify_status(status: StatusCode, tile: &Tile) -> Option<PipelineError> {
    if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
        return Some(PipelineError::DataUnavailable {
            tile: tile.id,
            reason: format!("platform returned {}", status),
        });
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Some(PipelineError::Platform(format!(
            "authentication rejected ({})",
            status
        )));
    }
    if !status.is_success() {
        return Some(PipelineError::Platform(format!("platform API error {}", status)));
    }
    None
}

/// The tile footprint as GeoJSON: a `Polygon` for a single piece,
/// a `MultiPolygon` otherwise.
fn footprint_geojson(tile: &Tile) -> Value {
    let mut polygons: Vec<Vec<Vec<[f64; 2]>>> = tile
        .footprint
        .iter()
        .map(|p| {
            std::iter::once(p.exterior())
                .chain(p.interiors())
                .map(closed_ring)
                .collect()
        })
        .collect();

    if polygons.len() == 1 {
        json!({ "type": "Polygon", "coordinates": polygons.remove(0) })
    } else {
        json!({ "type": "MultiPolygon", "coordinates": polygons })
    }
}

fn closed_ring(ring: &LineString<f64>) -> Vec<[f64; 2]> {
    let mut coords: Vec<[f64; 2]> = ring.coords().map(|c| [c.x, c.y]).collect();
    if coords.first() != coords.last() {
        if let Some(&first) = coords.first() {
            coords.push(first);
        }
    }
    coords
}
