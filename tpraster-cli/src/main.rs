//! tpraster command-line interface.
//!
//! Turns trigger-primitive tables into fixed-size image datasets.
#![allow(clippy::uninlined_format_args, clippy::cast_precision_loss)]

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tpraster_algorithms::{
    ClosingPolicy, ClusterState, ClusteringMode, ProximityClustering, ProximityPolicy,
    WaveformModel,
};
use tpraster_core::{Cluster, OversizePolicy, TaggedPrimitive};
use tpraster_detector::{DetectorConfig, Geometry, Plane};
use tpraster_io::{
    build_dataset_from_files, ClusterFileWriter, DatasetWriter, PipelineConfig, TpTableReader,
};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    TprasterIo(#[from] tpraster_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] tpraster_core::Error),

    #[error("Detector error: {0}")]
    Detector(#[from] tpraster_detector::Error),

    #[error("Clustering error: {0}")]
    Clustering(#[from] tpraster_core::ClusteringError),

    #[error("all {0} input file(s) failed")]
    AllFilesFailed(usize),
}

/// Waveform reconstruction model.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Model {
    /// Interior vertices at a fixed fraction of the peak height
    FixedFraction,
    /// Interior height fitted so the area matches the ADC integral
    AreaOptimized,
}

impl From<Model> for WaveformModel {
    fn from(model: Model) -> Self {
        match model {
            Model::FixedFraction => WaveformModel::FixedFraction,
            Model::AreaOptimized => WaveformModel::AreaOptimized,
        }
    }
}

/// Buffer closing rule.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Closing {
    /// Close every buffer the incoming TP does not extend
    Unextended,
    /// Keep buffers open while the incoming TP is within the tick limit
    TimeWindow,
}

impl From<Closing> for ClosingPolicy {
    fn from(closing: Closing) -> Self {
        match closing {
            Closing::Unextended => ClosingPolicy::Unextended,
            Closing::TimeWindow => ClosingPolicy::TimeWindow,
        }
    }
}

/// Trigger-primitive clustering and imaging.
#[derive(Parser)]
#[command(name = "tpraster")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand that clusters.
#[derive(Args, Debug)]
struct PipelineArgs {
    /// Pipeline configuration file (JSON); flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Detector geometry (APA, CRP, 50L)
    #[arg(long)]
    geometry: Option<Geometry>,

    /// Tick distance below which TPs are adjacent
    #[arg(long)]
    tick_limit: Option<i64>,

    /// Channel distance below which TPs are adjacent
    #[arg(long)]
    channel_limit: Option<i64>,

    /// Minimum TPs per cluster
    #[arg(long)]
    min_tps: Option<usize>,

    /// When open buffers are closed
    #[arg(long, value_enum)]
    closing: Option<Closing>,

    /// Cap the cluster's time extent (ticks); requires --max-channels
    #[arg(long, requires = "max_channels")]
    max_ticks: Option<i64>,

    /// Cap the cluster's channel extent; requires --max-ticks
    #[arg(long, requires = "max_ticks")]
    max_channels: Option<i64>,
}

impl PipelineArgs {
    fn load(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(geometry) = self.geometry {
            config.detector = DetectorConfig::for_geometry(geometry, config.detector.thresholds)?;
        }
        if let Some(ticks) = self.tick_limit {
            config.clustering.tick_limit = ticks;
        }
        if let Some(channels) = self.channel_limit {
            config.clustering.channel_limit = channels;
        }
        if let Some(min_tps) = self.min_tps {
            config.clustering.min_tps = min_tps;
            config.dataset.min_tps = min_tps;
        }
        if let Some(closing) = self.closing {
            config.clustering.closing = closing.into();
        }
        if let (Some(max_ticks), Some(max_channels)) = (self.max_ticks, self.max_channels) {
            config.clustering.policy = ProximityPolicy::BoundingBox {
                max_ticks,
                max_channels,
            };
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build an image dataset from TP tables
    Build {
        /// Input TP table(s)
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Output file name prefix
        #[arg(long, default_value = "dataset")]
        stem: String,

        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Image width (channels)
        #[arg(long)]
        width: Option<usize>,

        /// Image height (ticks)
        #[arg(long)]
        height: Option<usize>,

        /// Waveform reconstruction model
        #[arg(long, value_enum)]
        model: Option<Model>,

        /// Keep only clusters on this plane (U, V, X)
        #[arg(long)]
        plane: Option<Plane>,

        /// Divide each image by its maximum
        #[arg(long)]
        normalize: bool,

        /// Drop clusters larger than the image instead of clipping them
        #[arg(long)]
        reject_oversize: bool,

        /// Process files and clusters on a single thread
        #[arg(long)]
        sequential: bool,

        /// Also write the dataset to this HDF5 file
        #[cfg(feature = "hdf5")]
        #[arg(long)]
        hdf5: Option<PathBuf>,
    },

    /// Cluster a TP table and dump the clusters as text
    Cluster {
        /// Input TP table
        input: PathBuf,

        /// Cluster dump output path
        #[arg(short, long)]
        output: PathBuf,

        /// Optional per-cluster summary CSV
        #[arg(long)]
        summary: Option<PathBuf>,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Show information about a TP table
    Info {
        /// Input TP table
        input: PathBuf,

        /// Detector geometry used for plane occupancy
        #[arg(long, default_value = "APA")]
        geometry: Geometry,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Build {
            input,
            output,
            stem,
            pipeline,
            width,
            height,
            model,
            plane,
            normalize,
            reject_oversize,
            sequential,
            #[cfg(feature = "hdf5")]
            hdf5,
        } => {
            let mut config = pipeline.load()?;
            if let Some(width) = width {
                config.image.width = width;
            }
            if let Some(height) = height {
                config.image.height = height;
            }
            if let Some(model) = model {
                config.waveform = model.into();
            }
            if plane.is_some() {
                config.dataset.plane = plane;
            }
            if reject_oversize {
                config.image.oversize = OversizePolicy::Reject;
            }
            config.dataset.normalize |= normalize;
            config.dataset.parallel &= !sequential;
            config.validate()?;
            debug!("pipeline configuration: {:?}", config);

            let start = Instant::now();
            let (dataset, report) = build_dataset_from_files(&input, &config)?;
            if report.processed() == 0 && !input.is_empty() {
                return Err(CliError::AllFilesFailed(input.len()));
            }

            let files = DatasetWriter::create(&output, &stem)?.write(&dataset)?;
            info!("images written to {}", files.images.display());
            info!("metadata written to {}", files.metadata.display());

            #[cfg(feature = "hdf5")]
            if let Some(path) = hdf5 {
                tpraster_io::write_dataset_hdf5(
                    &path,
                    &dataset,
                    &tpraster_io::Hdf5WriteOptions::default(),
                )?;
                info!("HDF5 dataset written to {}", path.display());
            }

            let totals = &report.totals;
            println!(
                "Processed {}/{} files in {:.2}s",
                report.processed(),
                input.len(),
                start.elapsed().as_secs_f64()
            );
            for (path, err) in report.failures() {
                println!("  failed: {}: {}", path.display(), err);
            }
            println!("Events: {}", totals.events);
            println!("Clusters: {}", totals.clusters_seen);
            println!("Images: {}", dataset.len());
            println!(
                "Skipped: {} too small, {} other plane, {} oversize",
                totals.skipped_too_small, totals.skipped_plane, totals.skipped_raster
            );
            if totals.time_only_events > 0 {
                println!("Time-only clustering in {} events", totals.time_only_events);
            }
        }

        Commands::Cluster {
            input,
            output,
            summary,
            pipeline,
        } => {
            let config = pipeline.load()?;
            config.validate()?;
            let table = TpTableReader::open(&input)?.read()?;

            let algo = ProximityClustering::new(config.clustering.clone());
            let mut state = ClusterState::default();
            let mut clusters: Vec<Cluster<TaggedPrimitive>> = Vec::new();
            let mut time_only = 0usize;
            let n_events = table.events.len();
            for mut tps in table.into_streams() {
                tps.sort_by_key(|t| t.tp.time_start);
                let found = algo.cluster(&tps, &config.detector.channel_map, &mut state)?;
                if !tps.is_empty() && algo.statistics(&state).mode == ClusteringMode::TimeOnly {
                    time_only += 1;
                }
                clusters.extend(found);
            }

            let mut dump = ClusterFileWriter::create(&output)?;
            dump.write_clusters(&clusters)?;
            dump.flush()?;
            info!("{} clusters written to {}", clusters.len(), output.display());
            if let Some(path) = &summary {
                let mut csv = ClusterFileWriter::create(path)?;
                csv.write_summary_csv(&clusters)?;
                csv.flush()?;
            }

            let stats = algo.statistics(&state);
            println!("Algorithm: {}", algo.name());
            println!("Events: {}", n_events);
            println!("Trigger primitives: {}", stats.tps_processed);
            println!("Clusters: {}", stats.clusters_found);
            println!("Dropped (below min size): {}", stats.buffers_dropped);
            println!("Shared TPs: {}", stats.shared_tps);
            if time_only > 0 {
                warn!("{} events fell back to time-only clustering", time_only);
            }
        }

        Commands::Info { input, geometry } => {
            let detector = DetectorConfig::for_geometry(geometry, Default::default())?;
            let reader = TpTableReader::open(&input)?;
            let file_size = reader.file_size();
            let table = reader.read()?;
            let summary = table.summary(&detector);

            println!("File: {}", input.display());
            println!(
                "Size: {} bytes ({:.2} MB)",
                file_size,
                file_size as f64 / 1_000_000.0
            );
            println!("Columns: {}", table.columns.join(", "));
            println!("Trigger primitives: {}", summary.n_tps);
            println!("Events: {}", summary.n_events);
            if summary.skipped_rows > 0 {
                println!("Skipped rows: {}", summary.skipped_rows);
            }
            if let Some((lo, hi)) = summary.channel_range {
                println!("Channel range: {} - {}", lo, hi);
            }
            if let Some((lo, hi)) = summary.time_range {
                println!("Time range: {} - {}", lo, hi);
            }
            for plane in Plane::ALL {
                println!("Plane {}: {} TPs", plane, summary.plane_count(plane));
            }
            if summary.has_truth {
                println!("Signal TPs: {}", summary.signal_tps);
            }
        }
    }

    Ok(())
}
