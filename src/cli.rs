//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// SiteProbe - find candidate sites from vegetation and elevation anomalies
///
/// Tiles the configured area of interest, samples NDVI and elevation for
/// every tile, flags low-vegetation tiles that stand out from their
/// neighbours, writes them to CSV and asks a language model about the
/// strongest ones.
///
/// Examples:
///   siteprobe
///   siteprobe --tile-size 0.25 --ndvi-threshold 0.2
///   siteprobe --skip-advisory --output candidates.csv
///   siteprobe --dry-run
///   siteprobe --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .siteprobe.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output CSV file for candidate sites
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Tile width and height in degrees
    #[arg(long, value_name = "DEG")]
    pub tile_size: Option<f64>,

    /// Flag tiles whose mean NDVI is below this value
    #[arg(long, value_name = "NDVI", allow_hyphen_values = true)]
    pub ndvi_threshold: Option<f64>,

    /// Flag tiles whose elevation deviates from their neighbours by more than this (metres)
    #[arg(long, value_name = "METRES")]
    pub elevation_deviation: Option<f64>,

    /// Number of strongest candidates to send for advice
    #[arg(long, value_name = "COUNT")]
    pub top_n: Option<usize>,

    /// Language model to ask
    #[arg(short, long, env = "SITEPROBE_MODEL")]
    pub model: Option<String>,

    /// Advisory requests in flight at once
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Cloud project for the geospatial platform
    #[arg(long, env = "EARTHENGINE_PROJECT", hide_env_values = true)]
    pub project: Option<String>,

    /// Access token for the geospatial platform
    #[arg(long, env = "GEO_PLATFORM_TOKEN", hide_env_values = true)]
    pub platform_token: Option<String>,

    /// API key for the language model
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Stop after exporting candidates; no language-model calls
    #[arg(long)]
    pub skip_advisory: bool,

    /// Dry run: print the tile grid without calling any API
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .siteprobe.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(size) = self.tile_size {
            if !(size.is_finite() && size > 0.0) {
                return Err("Tile size must be a positive number of degrees".to_string());
            }
        }

        if let Some(threshold) = self.ndvi_threshold {
            if !(-1.0..=1.0).contains(&threshold) {
                return Err("NDVI threshold must be between -1.0 and 1.0".to_string());
            }
        }

        if let Some(deviation) = self.elevation_deviation {
            if !(deviation.is_finite() && deviation >= 0.0) {
                return Err("Elevation deviation must be a non-negative number".to_string());
            }
        }

        if self.top_n == Some(0) {
            return Err("Top-N must be at least 1".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Whether the language model will be called in this run.
    pub fn wants_advisory(&self) -> bool {
        !self.skip_advisory && !self.dry_run
    }

    /// Default log level from the flags, with `config_verbose` standing in
    /// for `-v`. `--quiet` always wins.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            config: None,
            output: None,
            tile_size: None,
            ndvi_threshold: None,
            elevation_deviation: None,
            top_n: None,
            model: None,
            concurrency: None,
            project: Some("amazon-survey".to_string()),
            platform_token: Some("token".to_string()),
            api_key: Some("sk-test".to_string()),
            skip_advisory: false,
            dry_run: false,
            init_config: false,
            verbose: false,
            quiet: false,
        }
    }

    #[test]
    fn test_defaults_validate() {
        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_validation_bad_values() {
        let mut args = make_args();
        args.tile_size = Some(0.0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.ndvi_threshold = Some(1.5);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.top_n = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.elevation_deviation = Some(-2.0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_wants_advisory() {
        let mut args = make_args();
        assert!(args.wants_advisory());
        args.skip_advisory = true;
        assert!(!args.wants_advisory());
        args.skip_advisory = false;
        args.dry_run = true;
        assert!(!args.wants_advisory());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(false), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(false), tracing::Level::ERROR);
    }

    #[test]
    fn test_config_verbose_raises_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = Args::try_parse_from([
            "siteprobe",
            "--tile-size",
            "0.25",
            "--ndvi-threshold",
            "0.2",
            "--top-n",
            "10",
            "--skip-advisory",
        ])
        .unwrap();
        assert_eq!(args.tile_size, Some(0.25));
        assert_eq!(args.ndvi_threshold, Some(0.2));
        assert_eq!(args.top_n, Some(10));
        assert!(args.skip_advisory);
    }
}
