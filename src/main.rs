//! SiteProbe - candidate-site survey from satellite vegetation and elevation data
//!
//! A CLI tool that tiles an area of interest, samples NDVI and elevation
//! per tile from a geospatial platform, flags low-vegetation tiles whose
//! elevation stands out from their neighbours, exports them to CSV and
//! asks a language model to comment on the strongest ones.
//!
//! Exit codes:
//!   0 - Success (including runs with zero candidates)
//!   1 - Runtime error (configuration, platform failure, export failure)

mod advisory;
mod analysis;
mod cli;
mod config;
mod error;
mod export;
mod models;
mod pipeline;
mod platform;
mod tiler;

use advisory::{ChatClient, PromptContext};
use analysis::{detect, RunStats, Thresholds};
use anyhow::{Context, Result};
use cli::Args;
use config::{Config, CONFIG_FILE};
use models::{Region, TileSize};
use platform::{BandNames, BandRequest, PlatformClient, PlatformClientConfig, RasterFetcher};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tiler::TileGrid;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config comes first so `[general] verbose` can raise the log level
    let (config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(&args, config.general.verbose);

    info!("SiteProbe v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    source.log();

    match run_survey(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Survey failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .siteprobe.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to set the region polygon, thresholds, datasets and model.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` wins over the verbosity flags and config.
fn init_logging(args: &Args, config_verbose: bool) {
    let level = args.log_level(config_verbose);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the whole survey. Returns the process exit code.
async fn run_survey(args: Args, mut config: Config) -> Result<i32> {
    let start_time = Instant::now();

    config.merge_with_args(&args);
    config.validate().context("Invalid configuration")?;

    // Step 1: Tile the region
    let grid = build_grid(&config)?;
    println!("🗺️  Region: {}", config.region.name);
    println!(
        "   Grid: {} x {} cells of {} (up to {} tiles)",
        grid.cols(),
        grid.rows(),
        grid.tile_size(),
        grid.len_hint()
    );

    if args.dry_run {
        return handle_dry_run(&grid);
    }

    // Step 2: Sample every tile
    let client = PlatformClient::new(PlatformClientConfig {
        base_url: config.platform.base_url.clone(),
        project: args.project.clone().unwrap_or_default(),
        token: args.platform_token.clone().unwrap_or_default(),
        timeout_seconds: config.platform.timeout_seconds,
    })?;
    let fetcher = build_fetcher(client, &config)?;

    // Advice needs an API key; check it before sampling
    let chat_client = if args.wants_advisory() {
        Some(build_chat_client(&args, &config)?)
    } else {
        None
    };

    println!("\n🛰️  Sampling tiles...");
    println!(
        "   Optical: {} ({} to {}, ≤{}% cloud)",
        config.platform.optical_dataset,
        config.platform.start_date,
        config.platform.end_date,
        config.platform.max_cloud_percent
    );
    println!("   Elevation: {}", config.platform.elevation_dataset);

    let progress = pipeline::progress_bar(&grid, !args.quiet);
    let (summaries, mut stats) = pipeline::survey(&fetcher, &grid, &progress).await?;

    // Step 3: Detect anomalies and export
    let thresholds = Thresholds {
        ndvi_threshold: config.detection.ndvi_threshold,
        elevation_deviation_m: config.detection.elevation_deviation_m,
        min_area_km2: config.detection.min_area_km2,
    };
    let mut candidates = detect(&summaries, &thresholds);
    stats.candidates = candidates.len();

    let output = PathBuf::from(&config.general.output);
    let written = export::export_candidates(&output, &candidates)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "\n🔎 {} candidate site(s) written to {}",
        written,
        output.display()
    );

    // Step 4: Ask the language model about the strongest candidates
    match chat_client {
        Some(_) if candidates.is_empty() => info!("No candidates, skipping advisory stage"),
        Some(client) => {
            run_advisory(&client, &config, &mut candidates, &grid, &output, &mut stats).await?
        }
        None => println!("   Advisory stage skipped (--skip-advisory)."),
    }

    print_summary(&stats, start_time.elapsed(), &output);
    Ok(0)
}

/// Handle --dry-run: list the tiles that would be sampled, exit.
fn handle_dry_run(grid: &TileGrid) -> Result<i32> {
    println!("\n🔍 Dry run: tiling only (no platform or model calls)...\n");

    let mut count = 0;
    for tile in grid {
        count += 1;
        let (lon, lat) = tile.lower_left();
        let note = if tile.is_full_cell() { "" } else { " (clipped)" };
        debug!("Tile {} footprint area {:.6} deg²", tile.id, tile.planar_area());
        println!(
            "     🟩 {} at ({:.4}, {:.4}), {:.1} km²{}",
            tile.id,
            lon,
            lat,
            tile.area_km2(),
            note
        );
    }

    if count == 0 {
        println!("   The region produced no tiles.");
    } else {
        println!("\n   Total: {} tiles", count);
    }

    println!("\n✅ Dry run complete. No API calls were made.");
    Ok(0)
}

fn build_chat_client(args: &Args, config: &Config) -> Result<ChatClient> {
    let advisory_config = advisory::AdvisoryConfig {
        base_url: config.advisory.base_url.clone(),
        api_key: args.api_key.clone().unwrap_or_default(),
        model_name: config.advisory.model.clone(),
        temperature: config.advisory.temperature,
        timeout_seconds: config.advisory.timeout_seconds,
        max_retries: config.advisory.max_retries,
        retry_backoff: Duration::from_secs(config.advisory.retry_backoff_seconds),
    };
    Ok(ChatClient::new(advisory_config)?)
}

async fn run_advisory(
    client: &ChatClient,
    config: &Config,
    candidates: &mut [models::Candidate],
    grid: &TileGrid,
    output: &Path,
    stats: &mut RunStats,
) -> Result<()> {
    let top = config.advisory.top_n.min(candidates.len());
    println!("\n🤖 Requesting advice on the top {} site(s)...", top);
    println!("   Model: {}", client.model_name());
    println!("   Concurrency: {}", config.advisory.concurrency);

    let ctx = PromptContext {
        region_name: config.region.name.clone(),
        tile_size: grid.tile_size(),
    };
    let outcome = advisory::advise_top(
        client,
        candidates,
        config.advisory.top_n,
        config.advisory.concurrency,
        &ctx,
    )
    .await;
    stats.advised = outcome.advised;
    stats.advisory_failed = outcome.failed;
    if outcome.failed > 0 {
        warn!("{} candidate(s) left without advice", outcome.failed);
    }

    export::rewrite_with_advisories(output, candidates)
        .with_context(|| format!("Failed to update {}", output.display()))?;

    let rows = export::read_rows(output)
        .with_context(|| format!("Failed to read back {}", output.display()))?;
    if rows.len() != candidates.len() {
        anyhow::bail!(
            "{} holds {} rows after the rewrite, expected {}",
            output.display(),
            rows.len(),
            candidates.len()
        );
    }
    debug!(
        "Verified {}: {} rows, {} with advice",
        output.display(),
        rows.len(),
        rows.iter().filter(|r| !r.advisory.is_empty()).count()
    );
    Ok(())
}

fn print_summary(stats: &RunStats, elapsed: Duration, output: &Path) {
    println!("\n📊 Survey Summary:");
    for line in stats.summary_text().lines() {
        println!("   {}", line);
    }
    println!("   Duration: {:.1}s", elapsed.as_secs_f64());
    println!("\n✅ Survey complete! Candidates saved to: {}", output.display());
}

fn build_grid(config: &Config) -> Result<TileGrid> {
    let vertices = config
        .region
        .polygon
        .iter()
        .map(|&[lon, lat]| (lon, lat))
        .collect();
    let region = Region::new(vertices)?;
    let size = TileSize {
        width_deg: config.region.tile_width_deg,
        height_deg: config.region.tile_height_deg,
    };
    Ok(TileGrid::new(&region, size)?)
}

fn build_fetcher(client: PlatformClient, config: &Config) -> Result<RasterFetcher<PlatformClient>> {
    let p = &config.platform;
    let (start, end) = p.date_range()?;

    let optical = BandRequest {
        dataset: p.optical_dataset.clone(),
        bands: vec![p.nir_band.clone(), p.red_band.clone()],
        scale_m: p.scale_m,
        start_date: Some(start),
        end_date: Some(end),
        max_cloud_percent: Some(p.max_cloud_percent),
    };
    let elevation = BandRequest {
        dataset: p.elevation_dataset.clone(),
        bands: vec![p.elevation_band.clone()],
        scale_m: p.scale_m,
        start_date: None,
        end_date: None,
        max_cloud_percent: None,
    };
    let names = BandNames {
        nir: p.nir_band.clone(),
        red: p.red_band.clone(),
        elevation: p.elevation_band.clone(),
    };

    Ok(RasterFetcher::new(client, optical, elevation, names))
}

/// Where the configuration came from; logged once logging is up.
enum ConfigSource {
    File(PathBuf),
    DefaultFile,
    Builtin,
    Unreadable(anyhow::Error),
}

impl ConfigSource {
    fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded config from: {}", path.display()),
            ConfigSource::DefaultFile => info!("Loaded default config from {}", CONFIG_FILE),
            ConfigSource::Builtin => debug!("No config file found, using defaults"),
            ConfigSource::Unreadable(e) => warn!("Failed to load config: {:#}", e),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigSource::File(config_path.clone())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigSource::DefaultFile)),
        Ok(None) => Ok((Config::default(), ConfigSource::Builtin)),
        Err(e) => Ok((Config::default(), ConfigSource::Unreadable(e))),
    }
}
