//! DivScan CLI

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use dv_core::Detection;
use dv_divergence::{Divergence, JsDivergence, KlDivergence, KlMode};
use dv_estimators::{CovMode, DensityEstimator, GaussianEstimator, KernelDensityEstimator};
use dv_search::{DenseProposals, IntervalSearch, PointwiseProposals, ProposalGenerator};
use dv_tensor::{preproc, DataTensor, Normalization};

#[derive(Parser)]
#[command(name = "divscan")]
#[command(about = "DivScan - maximally divergent interval detection")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect maximally divergent intervals in a time series
    Detect {
        /// Input series (JSON: array of per-time-step attribute rows, or
        /// an object with a "rows" field)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for detections (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Divergence measure
        #[arg(long, value_enum, default_value = "kl")]
        divergence: DivergenceArg,

        /// Directional mode of the KL divergence
        #[arg(long, value_enum, default_value = "unbiased")]
        kl_mode: KlModeArg,

        /// Density estimator
        #[arg(long, value_enum, default_value = "gaussian")]
        estimator: EstimatorArg,

        /// Kernel variance for the KDE estimator
        #[arg(long, default_value = "1.0")]
        kernel_sigma_sq: f64,

        /// Proposal generator
        #[arg(long, value_enum, default_value = "dense")]
        proposals: ProposalsArg,

        /// Minimum window length (time steps)
        #[arg(long, default_value = "5")]
        min_size: usize,

        /// Maximum window length (time steps); omit for no limit
        #[arg(long)]
        max_size: Option<usize>,

        /// Threshold (in standard deviations) for pointwise proposals
        #[arg(long, default_value = "1.5")]
        sd_th: f64,

        /// Use median absolute deviation for the pointwise threshold
        #[arg(long)]
        mad: bool,

        /// IoU above which two detections count as overlapping
        #[arg(long, default_value = "0.0")]
        overlap_th: f64,

        /// Maximum number of detections to report
        #[arg(long, default_value = "10")]
        num_detections: usize,

        /// Per-attribute normalization applied before the search
        #[arg(long, value_enum, default_value = "none")]
        normalize: NormalizeArg,

        /// Threads (0 = auto)
        #[arg(long, default_value = "0")]
        threads: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DivergenceArg {
    /// Kullback-Leibler divergence
    Kl,
    /// Jensen-Shannon divergence
    Js,
}

#[derive(Clone, Copy, ValueEnum)]
enum KlModeArg {
    /// Window relative to background
    IOmega,
    /// Background relative to window
    OmegaI,
    /// Sum of both directions
    Sym,
    /// Standardized against the chi-squared null
    Unbiased,
}

impl From<KlModeArg> for KlMode {
    fn from(arg: KlModeArg) -> Self {
        match arg {
            KlModeArg::IOmega => KlMode::IOmega,
            KlModeArg::OmegaI => KlMode::OmegaI,
            KlModeArg::Sym => KlMode::Sym,
            KlModeArg::Unbiased => KlMode::Unbiased,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum EstimatorArg {
    /// Gaussian, separate covariance per partition
    Gaussian,
    /// Gaussian, one covariance shared by both partitions
    GaussianGlobal,
    /// Gaussian with identity covariance
    GaussianId,
    /// Kernel density estimation
    Kde,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProposalsArg {
    /// Every window within the size bounds
    Dense,
    /// Windows anchored at pointwise-anomalous time steps
    Pointwise,
}

#[derive(Clone, Copy, ValueEnum)]
enum NormalizeArg {
    /// No normalization
    None,
    /// Scale each attribute by its maximum absolute value
    Max,
    /// Scale each attribute by its standard deviation
    Sd,
}

impl From<NormalizeArg> for Normalization {
    fn from(arg: NormalizeArg) -> Self {
        match arg {
            NormalizeArg::None => Normalization::None,
            NormalizeArg::Max => Normalization::Max,
            NormalizeArg::Sd => Normalization::Sd,
        }
    }
}

/// Accepted input shapes: a bare array of rows, or an object wrapping it.
#[derive(Deserialize)]
#[serde(untagged)]
enum InputSeries {
    Rows(Vec<Vec<f64>>),
    Wrapped { rows: Vec<Vec<f64>> },
}

impl InputSeries {
    fn into_rows(self) -> Vec<Vec<f64>> {
        match self {
            InputSeries::Rows(rows) => rows,
            InputSeries::Wrapped { rows } => rows,
        }
    }
}

#[derive(Serialize)]
struct DetectReport {
    detections: Vec<Detection>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Detect {
            input,
            output,
            divergence,
            kl_mode,
            estimator,
            kernel_sigma_sq,
            proposals,
            min_size,
            max_size,
            sd_th,
            mad,
            overlap_th,
            num_detections,
            normalize,
            threads,
        } => {
            if threads > 0 {
                rayon::ThreadPoolBuilder::new().num_threads(threads).build_global()?;
            }

            tracing::info!(path = %input.display(), "loading series");
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let rows = serde_json::from_str::<InputSeries>(&text)
                .context("parsing input series")?
                .into_rows();
            let mut data = DataTensor::from_rows(&rows)?;
            tracing::info!(
                samples = data.num_samples(),
                attributes = data.num_attrib(),
                "series loaded"
            );

            preproc::normalize(&mut data, normalize.into())?;

            let est: Box<dyn DensityEstimator> = match estimator {
                EstimatorArg::Gaussian => Box::new(GaussianEstimator::new(CovMode::Full)),
                EstimatorArg::GaussianGlobal => Box::new(GaussianEstimator::new(CovMode::Shared)),
                EstimatorArg::GaussianId => Box::new(GaussianEstimator::new(CovMode::Identity)),
                EstimatorArg::Kde => Box::new(KernelDensityEstimator::new(kernel_sigma_sq)?),
            };

            let measure: Box<dyn Divergence> = match divergence {
                DivergenceArg::Kl => Box::new(KlDivergence::new(est, kl_mode.into())),
                DivergenceArg::Js => Box::new(JsDivergence::new(est)),
            };

            let generator = match proposals {
                ProposalsArg::Dense => {
                    ProposalGenerator::Dense(DenseProposals::new(min_size, max_size))
                }
                ProposalsArg::Pointwise => ProposalGenerator::Pointwise(
                    PointwiseProposals::new(min_size, max_size)
                        .with_sd_threshold(sd_th)
                        .with_mad(mad),
                ),
            };

            let mut search = IntervalSearch::new(measure)
                .with_proposals(generator)
                .with_overlap_threshold(overlap_th)
                .with_max_detections(num_detections);

            let detections = search.run(Arc::new(data))?;
            tracing::info!(count = detections.len(), "search complete");

            let report = DetectReport { detections };
            let json = serde_json::to_string_pretty(&report)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                }
                None => println!("{}", json),
            }
        }
    }

    Ok(())
}
