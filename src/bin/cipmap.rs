use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use cipmap::core::extract::GridSampler;
use cipmap::io::remote::{RemoteImageSource, RemoteService, RemoteTrainer};
use cipmap::io::service::ImageSource;
use cipmap::io::vector::read_polygons;
use cipmap::{run_pipeline, PipelineConfig, ReferenceData, Services};

#[derive(Parser)]
#[command(name = "cipmap")]
#[command(about = "Sentinel-2 classification of chemical industrial parks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full classification and accuracy assessment
    Run {
        /// Configuration file (defaults to the user config directory)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the run report as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        /// Write the opened class map as GeoTIFF
        #[arg(long)]
        class_map: Option<PathBuf>,

        /// Read scenes from a local GeoTIFF manifest instead of the service
        #[arg(long)]
        scenes: Option<PathBuf>,
    },

    /// Print the default configuration as JSON
    DefaultConfig,
}

fn load_config(path: Option<PathBuf>) -> Result<PipelineConfig> {
    let path = match path {
        Some(path) => path,
        None => PipelineConfig::default_path()
            .context("no --config given and no user config directory available")?,
    };
    PipelineConfig::load(&path).with_context(|| format!("failed to load {}", path.display()))
}

#[cfg(feature = "geotiff")]
fn local_scenes(manifest: &std::path::Path) -> Result<Box<dyn ImageSource>> {
    let source = cipmap::io::raster::GeoTiffSceneSource::from_manifest(manifest)
        .with_context(|| format!("failed to read scene manifest {}", manifest.display()))?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "geotiff"))]
fn local_scenes(_manifest: &std::path::Path) -> Result<Box<dyn ImageSource>> {
    anyhow::bail!("--scenes requires the `geotiff` feature")
}

#[cfg(feature = "geotiff")]
fn write_class_map(path: &std::path::Path, output: &cipmap::PipelineOutput) -> Result<()> {
    cipmap::io::raster::write_class_map(path, &output.class_map, &output.geo_transform, None)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(not(feature = "geotiff"))]
fn write_class_map(_path: &std::path::Path, _output: &cipmap::PipelineOutput) -> Result<()> {
    anyhow::bail!("--class-map requires the `geotiff` feature")
}

fn run(
    config: Option<PathBuf>,
    report: Option<PathBuf>,
    class_map: Option<PathBuf>,
    scenes: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config)?;

    let reference = ReferenceData {
        roi: read_polygons(&config.roi)
            .with_context(|| format!("failed to read ROI {}", config.roi.display()))?,
        positive: read_polygons(&config.positive.polygons)
            .context("failed to read positive reference polygons")?,
        negative: read_polygons(&config.negative.polygons)
            .context("failed to read negative reference polygons")?,
    };

    let service = RemoteService::new(config.service.clone()).context("failed to set up service client")?;
    let image_source: Box<dyn ImageSource> = match &scenes {
        Some(manifest) => local_scenes(manifest)?,
        None => Box::new(RemoteImageSource::new(
            service.clone(),
            config.acquisition.cloud_mask.qa_band.clone(),
        )),
    };
    let sampler = GridSampler::new();
    let trainer = RemoteTrainer::new(service);
    let services = Services {
        image_source: image_source.as_ref(),
        sampler: &sampler,
        trainer: &trainer,
    };

    let output = run_pipeline(&config, &services, &reference).context("pipeline failed")?;
    println!("{}", output.report);

    if let Some(path) = report {
        output
            .report
            .write_json(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    if let Some(path) = class_map {
        write_class_map(&path, &output)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        log::info!("Thread pool configured with {} threads", threads);
    }

    match cli.command {
        Command::Run {
            config,
            report,
            class_map,
            scenes,
        } => run(config, report, class_map, scenes),
        Command::DefaultConfig => {
            println!("{}", PipelineConfig::default().to_json()?);
            Ok(())
        }
    }
}
