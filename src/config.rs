//! Configuration file handling.
//!
//! This module handles loading, validating and merging configuration
//! from `.siteprobe.toml` files.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".siteprobe.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Area of interest and tiling.
    #[serde(default)]
    pub region: RegionConfig,

    /// Geospatial platform settings.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Anomaly thresholds.
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Language-model settings.
    #[serde(default)]
    pub advisory: AdvisoryConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Candidate file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "site_advice.csv".to_string()
}

/// Area of interest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Name used in prompts.
    #[serde(default = "default_region_name")]
    pub name: String,

    /// Polygon vertices as `[longitude, latitude]` pairs.
    #[serde(default = "default_polygon")]
    pub polygon: Vec<[f64; 2]>,

    #[serde(default = "default_tile_deg")]
    pub tile_width_deg: f64,

    #[serde(default = "default_tile_deg")]
    pub tile_height_deg: f64,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            name: default_region_name(),
            polygon: default_polygon(),
            tile_width_deg: default_tile_deg(),
            tile_height_deg: default_tile_deg(),
        }
    }
}

fn default_region_name() -> String {
    "Amazon basin".to_string()
}

fn default_polygon() -> Vec<[f64; 2]> {
    vec![[-64.0, -10.0], [-54.0, -10.0], [-54.0, 0.0], [-64.0, 0.0]]
}

fn default_tile_deg() -> f64 {
    0.5
}

/// Geospatial platform settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_platform_url")]
    pub base_url: String,

    /// Multispectral collection NDVI is derived from.
    #[serde(default = "default_optical_dataset")]
    pub optical_dataset: String,

    #[serde(default = "default_nir_band")]
    pub nir_band: String,

    #[serde(default = "default_red_band")]
    pub red_band: String,

    #[serde(default = "default_elevation_dataset")]
    pub elevation_dataset: String,

    #[serde(default = "default_elevation_band")]
    pub elevation_band: String,

    /// First day of the imagery window (`YYYY-MM-DD`).
    #[serde(default = "default_start_date")]
    pub start_date: String,

    /// Last day of the imagery window (`YYYY-MM-DD`).
    #[serde(default = "default_end_date")]
    pub end_date: String,

    /// Scenes cloudier than this are excluded.
    #[serde(default = "default_max_cloud_percent")]
    pub max_cloud_percent: f64,

    /// Sampling resolution in metres.
    #[serde(default = "default_scale")]
    pub scale_m: f64,

    /// Request timeout in seconds.
    #[serde(default = "default_platform_timeout")]
    pub timeout_seconds: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_platform_url(),
            optical_dataset: default_optical_dataset(),
            nir_band: default_nir_band(),
            red_band: default_red_band(),
            elevation_dataset: default_elevation_dataset(),
            elevation_band: default_elevation_band(),
            start_date: default_start_date(),
            end_date: default_end_date(),
            max_cloud_percent: default_max_cloud_percent(),
            scale_m: default_scale(),
            timeout_seconds: default_platform_timeout(),
        }
    }
}

fn default_platform_url() -> String {
    "https://earthengine.googleapis.com".to_string()
}

fn default_optical_dataset() -> String {
    "COPERNICUS/S2_SR_HARMONIZED".to_string()
}

fn default_nir_band() -> String {
    "B8".to_string()
}

fn default_red_band() -> String {
    "B4".to_string()
}

fn default_elevation_dataset() -> String {
    "USGS/SRTMGL1_003".to_string()
}

fn default_elevation_band() -> String {
    "elevation".to_string()
}

fn default_start_date() -> String {
    "2024-01-01".to_string()
}

fn default_end_date() -> String {
    "2024-12-31".to_string()
}

fn default_max_cloud_percent() -> f64 {
    10.0
}

fn default_scale() -> f64 {
    1000.0
}

fn default_platform_timeout() -> u64 {
    300
}

/// Anomaly thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Tiles with mean NDVI below this are low-cover.
    #[serde(default = "default_ndvi_threshold")]
    pub ndvi_threshold: f64,

    /// Minimum deviation from the neighbourhood elevation, in metres.
    #[serde(default = "default_elevation_deviation")]
    pub elevation_deviation_m: f64,

    /// Minimum clipped tile area in km².
    #[serde(default = "default_min_area")]
    pub min_area_km2: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            ndvi_threshold: default_ndvi_threshold(),
            elevation_deviation_m: default_elevation_deviation(),
            min_area_km2: default_min_area(),
        }
    }
}

fn default_ndvi_threshold() -> f64 {
    0.3
}

fn default_elevation_deviation() -> f64 {
    2.0
}

fn default_min_area() -> f64 {
    0.01 // 10,000 m²
}

/// Language-model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryConfig {
    #[serde(default = "default_llm_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// How many of the strongest candidates get advice.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,

    /// Requests in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Retries after a rate-limit response.
    #[serde(default = "default_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff")]
    pub retry_backoff_seconds: u64,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_url(),
            model: default_model(),
            top_n: default_top_n(),
            temperature: default_temperature(),
            timeout_seconds: default_llm_timeout(),
            concurrency: default_concurrency(),
            max_retries: default_retries(),
            retry_backoff_seconds: default_backoff(),
        }
    }
}

fn default_llm_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_top_n() -> usize {
    25
}

fn default_temperature() -> f32 {
    0.2
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_concurrency() -> usize {
    1
}

fn default_retries() -> u32 {
    3
}

fn default_backoff() -> u64 {
    5
}

impl PlatformConfig {
    /// The imagery window as dates.
    pub fn date_range(&self) -> Result<(NaiveDate, NaiveDate)> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
        };
        let start = parse(&self.start_date)?;
        let end = parse(&self.end_date)?;
        if start > end {
            bail!("Imagery window starts after it ends ({} > {})", start, end);
        }
        Ok((start, end))
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(size) = args.tile_size {
            self.region.tile_width_deg = size;
            self.region.tile_height_deg = size;
        }
        if let Some(threshold) = args.ndvi_threshold {
            self.detection.ndvi_threshold = threshold;
        }
        if let Some(deviation) = args.elevation_deviation {
            self.detection.elevation_deviation_m = deviation;
        }
        if let Some(top_n) = args.top_n {
            self.advisory.top_n = top_n;
        }
        if let Some(ref model) = args.model {
            self.advisory.model = model.clone();
        }
        if let Some(concurrency) = args.concurrency {
            self.advisory.concurrency = concurrency;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check values that would otherwise fail deep inside a run.
    pub fn validate(&self) -> Result<()> {
        let d = &self.detection;
        if !d.ndvi_threshold.is_finite() || !(-1.0..=1.0).contains(&d.ndvi_threshold) {
            bail!("NDVI threshold must be within [-1, 1]");
        }
        if !d.elevation_deviation_m.is_finite() || d.elevation_deviation_m < 0.0 {
            bail!("Elevation deviation threshold must be a non-negative number");
        }
        if !d.min_area_km2.is_finite() || d.min_area_km2 < 0.0 {
            bail!("Minimum area must be a non-negative number");
        }

        let p = &self.platform;
        check_url("platform.base_url", &p.base_url)?;
        p.date_range()?;
        if !(0.0..=100.0).contains(&p.max_cloud_percent) {
            bail!("max_cloud_percent must be between 0 and 100");
        }
        if !(p.scale_m.is_finite() && p.scale_m > 0.0) {
            bail!("Sampling scale must be positive");
        }
        if p.timeout_seconds == 0 {
            bail!("Platform timeout must be at least 1 second");
        }

        let a = &self.advisory;
        check_url("advisory.base_url", &a.base_url)?;
        if a.top_n == 0 {
            bail!("top_n must be at least 1");
        }
        if a.concurrency == 0 {
            bail!("Concurrency must be at least 1");
        }
        if !(0.0..=2.0).contains(&a.temperature) {
            bail!("Temperature must be between 0.0 and 2.0");
        }
        if a.timeout_seconds == 0 {
            bail!("Advisory timeout must be at least 1 second");
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

fn check_url(field: &str, url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        bail!("{} must start with 'http://' or 'https://'", field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.output, "site_advice.csv");
        assert_eq!(config.region.polygon.len(), 4);
        assert_eq!(config.region.tile_width_deg, 0.5);
        assert_eq!(config.detection.ndvi_threshold, 0.3);
        assert_eq!(config.advisory.top_n, 25);
        assert_eq!(config.advisory.model, "gpt-4o-mini");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "xingu.csv"
verbose = true

[region]
name = "upper Xingu"
polygon = [[-54.0, -13.0], [-52.0, -13.0], [-52.0, -11.0]]
tile_width_deg = 0.25

[detection]
ndvi_threshold = 0.25
elevation_deviation_m = 15.0

[advisory]
top_n = 10
concurrency = 4
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "xingu.csv");
        assert!(config.general.verbose);
        assert_eq!(config.region.name, "upper Xingu");
        assert_eq!(config.region.polygon.len(), 3);
        assert_eq!(config.region.tile_width_deg, 0.25);
        assert_eq!(config.region.tile_height_deg, 0.5);
        assert_eq!(config.detection.ndvi_threshold, 0.25);
        assert_eq!(config.detection.min_area_km2, 0.01);
        assert_eq!(config.advisory.top_n, 10);
        assert_eq!(config.advisory.concurrency, 4);
        assert_eq!(config.platform.optical_dataset, "COPERNICUS/S2_SR_HARMONIZED");
    }

    #[test]
    fn test_date_range() {
        let mut platform = PlatformConfig::default();
        let (start, end) = platform.date_range().unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());

        platform.start_date = "2025-01-01".to_string();
        assert!(platform.date_range().is_err());

        platform.start_date = "01/01/2024".to_string();
        assert!(platform.date_range().is_err());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::default();
        config.advisory.top_n = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detection.ndvi_threshold = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.platform.base_url = "earthengine.googleapis.com".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.platform.max_cloud_percent = 150.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[region]"));
        assert!(toml_str.contains("[detection]"));
        assert!(toml_str.contains("[advisory]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.region.polygon, default_polygon());
    }
}
