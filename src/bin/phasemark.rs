//! Command-line front end: markers, cluster selection and pass input from a trace.
//!
//! Results go to stdout as JSON. Logs go to stderr, filtered by `RUST_LOG`.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::{Args, Parser, Subcommand, ValueEnum};
use phasemark::{
    AnalysisConfig, BlockMap, BoundarySearch, Criterion, GracePeriodSearch, LatestStampSearch,
    LinfaBackend, MarkerEngine, MarkerTable, PassInput, RegionAggregator, RegionId,
    SelectionEngine, StaticInfo, TraceTable, weighted_profiles,
};
use serde::Serialize;
use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "phasemark", version)]
#[command(about = "Phase markers and representative regions from sampled execution traces")]
struct Cli {
    /// JSON file holding an analysis config; flags override its fields
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Warmup, start and end markers of every region
    Markers {
        #[arg(long)]
        trace: PathBuf,
        /// Only these regions, comma separated
        #[arg(long, value_delimiter = ',')]
        regions: Vec<RegionId>,
        #[command(flatten)]
        markers: MarkerArgs,
    },
    /// Cluster regions and pick a representative per cluster
    Select {
        #[arg(long)]
        trace: PathBuf,
        #[arg(long)]
        static_info: PathBuf,
        #[arg(long)]
        min_k: Option<usize>,
        #[arg(long)]
        max_k: Option<usize>,
        #[arg(long, value_enum)]
        criterion: Option<CriterionArg>,
        /// Reduce profiles to this many principal components first
        #[arg(long)]
        dimensions: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        /// Include the clustered matrix in the output
        #[arg(long)]
        keep_transformed: bool,
    },
    /// The nine values the instrumentation pass needs for one region
    PassInput {
        #[arg(long)]
        trace: PathBuf,
        #[arg(long)]
        static_info: PathBuf,
        #[arg(long)]
        region: RegionId,
        #[command(flatten)]
        markers: MarkerArgs,
    },
}

#[derive(Args, Debug)]
struct MarkerArgs {
    /// Regions in the warmup window
    #[arg(long)]
    warmup: Option<u32>,
    /// Fraction of the region length that counts as the grace period
    #[arg(long)]
    grace: Option<f64>,
    /// Planned instructions per region
    #[arg(long)]
    region_length: Option<u64>,
    /// How boundary blocks are picked
    #[arg(long, value_enum, default_value_t = PolicyArg::Grace)]
    policy: PolicyArg,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    /// Rarest block inside the grace period, for every boundary
    Grace,
    /// Block stamped latest, for every boundary
    LatestStamp,
    /// Block stamped latest for warmup and start, rarest late block for the end
    LatestStart,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CriterionArg {
    Silhouette,
    Bic,
}

impl From<CriterionArg> for Criterion {
    fn from(arg: CriterionArg) -> Self {
        match arg {
            CriterionArg::Silhouette => Criterion::Silhouette,
            CriterionArg::Bic => Criterion::Bic,
        }
    }
}

type CliResult<T> = Result<T, Box<dyn Error>>;

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*};
    let filter_layer = tracing_subscriber::EnvFilter::from_default_env();
    let fmt_layer = fmt::layer().with_writer(io::stderr).with_target(false);
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

fn read_trace(path: &Path) -> CliResult<TraceTable> {
    let _span = tracing::info_span!("read_trace", path = %path.display()).entered();
    let table = TraceTable::parse(&fs::read_to_string(path)?)?;
    tracing::info!(rows = table.len(), regions = table.total_regions(), "trace loaded");
    Ok(table)
}

fn read_static_info(path: &Path) -> CliResult<StaticInfo> {
    Ok(StaticInfo::parse(&fs::read_to_string(path)?)?)
}

fn load_config(path: Option<&Path>) -> CliResult<AnalysisConfig> {
    match path {
        Some(path) => Ok(AnalysisConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(AnalysisConfig::default()),
    }
}

fn apply_marker_args(config: &mut AnalysisConfig, args: &MarkerArgs) {
    let markers = &mut config.markers;
    if let Some(warmup) = args.warmup {
        markers.num_warmup_regions = warmup;
    }
    if let Some(grace) = args.grace {
        markers.grace_percentage = grace;
    }
    if let Some(region_length) = args.region_length {
        markers.region_length = region_length;
    }
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

fn mark<W, S, E>(
    engine: &MarkerEngine<'_, '_, W, S, E>,
    regions: &[RegionId],
) -> CliResult<MarkerTable>
where
    W: BoundarySearch,
    S: BoundarySearch,
    E: BoundarySearch,
{
    let table = if regions.is_empty() {
        engine.form_all_markers()?
    } else {
        engine.form_targeted_markers(regions)?
    };
    for skipped in table.skipped() {
        eprintln!("skipped region {}: {}", skipped.region, skipped.error);
    }
    Ok(table)
}

fn markers_for(
    table: &TraceTable,
    config: &AnalysisConfig,
    args: &MarkerArgs,
    regions: &[RegionId],
) -> CliResult<MarkerTable> {
    let blocks = BlockMap::from_table(table);
    let aggregator = RegionAggregator::new(table, &blocks);
    let engine = MarkerEngine::new(&aggregator, config.markers.clone())?;
    match args.policy {
        PolicyArg::Grace => mark(&engine, regions),
        PolicyArg::LatestStamp => mark(&engine.with_search(LatestStampSearch), regions),
        PolicyArg::LatestStart => mark(
            &engine.with_searches(LatestStampSearch, LatestStampSearch, GracePeriodSearch),
            regions,
        ),
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Markers {
            trace,
            regions,
            markers,
        } => {
            apply_marker_args(&mut config, &markers);
            let table = read_trace(&trace)?;
            print_json(&markers_for(&table, &config, &markers, &regions)?)
        }
        Command::Select {
            trace,
            static_info,
            min_k,
            max_k,
            criterion,
            dimensions,
            seed,
            keep_transformed,
        } => {
            let selection = &mut config.selection;
            if let Some(min_k) = min_k {
                selection.min_clusters = min_k;
            }
            if let Some(max_k) = max_k {
                selection.max_clusters = max_k;
            }
            if let Some(criterion) = criterion {
                selection.criterion = criterion.into();
            }
            if dimensions.is_some() {
                selection.reduced_dimensions = dimensions;
            }
            if let Some(seed) = seed {
                selection.seed = seed;
            }
            selection.keep_transformed |= keep_transformed;

            let table = read_trace(&trace)?;
            let info = read_static_info(&static_info)?;
            let blocks = BlockMap::from_table(&table);
            let aggregator = RegionAggregator::new(&table, &blocks);
            let profiles = weighted_profiles(&aggregator, &info)?;

            let backend = LinfaBackend::default();
            let selection = SelectionEngine::new(backend, config.selection).select(&profiles)?;
            print_json(&selection)
        }
        Command::PassInput {
            trace,
            static_info,
            region,
            markers,
        } => {
            apply_marker_args(&mut config, &markers);
            let table = read_trace(&trace)?;
            let info = read_static_info(&static_info)?;
            let marker_table = markers_for(&table, &config, &markers, &[region])?;
            print_json(&PassInput::for_region(&marker_table, &info, region)?)
        }
    }
}

fn main() -> ExitCode {
    init_logging();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
