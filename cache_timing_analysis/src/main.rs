use anyhow::{Context, Result};
use cache_timing_analysis::latency::DEFAULT_L3_UPPER_SIGMAS;
use cache_timing_analysis::occupancy::DEFAULT_WINDOW_RADIUS;
use cache_timing_analysis::{AnalysisConfig, discover_occupancy_inputs, run_analysis};
use cache_timing_results::MAX_SET_INDEX;
use cache_timing_results::archive::{EXTENSION, EXTENSION_ZSTD};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cache_timing_analysis")]
#[command(version)]
#[command(about = "Latency bounds, prefetcher evidence and set occupancy from cache timing measurements", long_about = None)]
struct Cli {
    /// Directory containing timing.csv, next_line.csv, strides/ and occupancy/
    #[arg(long, value_name = "DIR", default_value = "results")]
    results: PathBuf,

    /// Output directory of the figures
    #[arg(long, value_name = "DIR", default_value = "figs")]
    figs: PathBuf,

    /// Occupancy measurements (default: <results>/occupancy)
    #[arg(long, value_name = "DIR")]
    occupancy_dir: Option<PathBuf>,

    /// Do not write any figure
    #[arg(long)]
    no_plot: bool,

    /// Compile the figures with LuaLaTeX
    #[arg(long)]
    pdf: bool,

    /// Run the next line prefetcher analysis
    #[arg(long)]
    next_line: bool,

    /// Run the stride prefetcher analysis
    #[arg(long)]
    strides: bool,

    /// Strides to load from <results>/strides (default: all the measured strides)
    #[arg(long, value_name = "STRIDE", value_delimiter = ',')]
    stride: Vec<u32>,

    /// Skip the occupancy heatmaps
    #[arg(long)]
    no_occupancy: bool,

    /// Standard deviations above the L3 mean for the L3 upper bound
    #[arg(long, value_name = "K", default_value_t = DEFAULT_L3_UPPER_SIGMAS)]
    l3_sigma: f64,

    /// Sets shown on each side of the target set
    #[arg(long, value_name = "SETS", default_value_t = DEFAULT_WINDOW_RADIUS)]
    radius: u64,

    /// Last valid set index
    #[arg(long, value_name = "SET", default_value_t = MAX_SET_INDEX)]
    max_set: u64,

    /// Store the results (.msgpack, or .msgpack.zst to compress)
    #[arg(long, value_name = "FILE")]
    save: Option<PathBuf>,

    /// Debug output
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(save) = &cli.save {
        let name = save.to_string_lossy();
        if !name.ends_with(EXTENSION) && !name.ends_with(EXTENSION_ZSTD) {
            tracing::warn!(
                path = %save.display(),
                "archive name should end in .{} or .{}",
                EXTENSION,
                EXTENSION_ZSTD
            );
        }
    }

    let mut config = AnalysisConfig::from_dirs(&cli.results, cli.figs);
    config.plot = !cli.no_plot;
    config.compile_pdf = cli.pdf;
    config.l3_upper_sigmas = cli.l3_sigma;
    config.window_radius = cli.radius;
    config.max_set_index = cli.max_set;
    config.analyses.next_line = cli.next_line;
    config.analyses.strides = cli.strides;
    config.analyses.occupancy = !cli.no_occupancy;
    if !cli.stride.is_empty() {
        config.strides = cli.stride;
    }

    if config.analyses.occupancy {
        let dir = cli
            .occupancy_dir
            .unwrap_or_else(|| cli.results.join("occupancy"));
        config.occupancy_inputs = discover_occupancy_inputs(&dir)
            .with_context(|| format!("Failed to list occupancy files in {}", dir.display()))?;
        if config.occupancy_inputs.is_empty() {
            tracing::warn!(dir = %dir.display(), "no occupancy measurement found");
        }
    }

    let mut renderer = config.renderer();
    let results = run_analysis(&config, renderer.as_mut()).context("Analysis failed")?;

    if let Some(save) = &cli.save {
        results
            .write(save)
            .with_context(|| format!("Failed to save results to {}", save.display()))?;
        tracing::info!(path = %save.display(), "saved results");
    }
    Ok(())
}
