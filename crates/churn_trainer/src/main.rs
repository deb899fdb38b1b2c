//! Churn pipeline CLI
//!
//! `churn train` runs the full training pipeline and records the run;
//! `churn predict` scores one customer record against a recorded run;
//! `churn tune` cross-validates a grid of tree counts and depths.

use anyhow::{Context, Result};
use churn_core::serving::record_from_json;
use churn_core::{FileTracker, PipelineConfig, ServingContext};
use churn_trainer::{run_pipeline, run_tuning};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "churn")]
#[command(author = "Churn Pipeline Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train and serve the Telco customer churn model", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Root directory of the tracking store
    #[arg(long, global = true)]
    tracking_dir: Option<PathBuf>,

    /// Experiment name
    #[arg(long, global = true)]
    experiment: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate, encode and train on a CSV file, recording a new run
    Train(TrainArgs),
    /// Predict churn for one customer record
    Predict(PredictArgs),
    /// Grid-search tree count and depth by k-fold cross-validation
    Tune(TuneArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Input CSV dataset path
    #[arg(short, long)]
    input: PathBuf,

    /// Target column
    #[arg(long)]
    target: Option<String>,

    /// Decision threshold on the churn probability
    #[arg(long)]
    threshold: Option<f64>,

    /// Fraction of rows held out for evaluation
    #[arg(long)]
    test_size: Option<f64>,

    /// Write the preprocessed dataset to this CSV path
    #[arg(long)]
    processed_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PredictArgs {
    /// Customer record as a JSON object
    #[arg(long, conflicts_with = "record_file", required_unless_present = "record_file")]
    record: Option<String>,

    /// File holding the customer record as a JSON object
    #[arg(long)]
    record_file: Option<PathBuf>,

    /// Run directory to load; defaults to the latest finished run
    #[arg(long)]
    run: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TuneArgs {
    /// Input CSV dataset path
    #[arg(short, long)]
    input: PathBuf,

    /// Target column
    #[arg(long)]
    target: Option<String>,

    /// Cross-validation folds
    #[arg(long)]
    folds: Option<usize>,

    /// Tree counts to try, comma separated
    #[arg(long, value_delimiter = ',')]
    n_estimators: Option<Vec<usize>>,

    /// Tree depths to try, comma separated
    #[arg(long, value_delimiter = ',')]
    max_depth: Option<Vec<usize>>,
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.apply_env_overrides()?;
    if let Some(dir) = &cli.tracking_dir {
        config.tracking.root = dir.clone();
    }
    if let Some(experiment) = &cli.experiment {
        config.tracking.experiment = experiment.clone();
    }
    Ok(config)
}

fn init_logging(verbose: bool, default_level: &str) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

fn train(mut config: PipelineConfig, args: TrainArgs) -> Result<()> {
    if let Some(target) = args.target {
        config.data.target = target;
    }
    if let Some(threshold) = args.threshold {
        config.training.threshold = threshold;
    }
    if let Some(test_size) = args.test_size {
        config.training.test_size = test_size;
    }

    info!("Churn Pipeline Trainer v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════");
    info!("  Experiment: {}", config.tracking.experiment);
    info!("  Tracking store: {}", config.tracking.root.display());
    info!("  Target: {}", config.data.target);
    info!("  Threshold: {}", config.training.threshold);
    info!("  Test size: {}", config.training.test_size);

    let outcome = run_pipeline(&config, &args.input, args.processed_out.as_deref())?;

    info!("  Run: {} ({})", outcome.run_id, outcome.run_dir.display());
    info!("  Features: {}", outcome.feature_count);
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn predict(config: PipelineConfig, args: PredictArgs) -> Result<()> {
    let json = match (args.record, args.record_file) {
        (Some(json), _) => json,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => anyhow::bail!("either --record or --record-file is required"),
    };
    let record = record_from_json(&json).context("Record must be a JSON object")?;

    let context = match args.run {
        Some(run_dir) => ServingContext::load(&run_dir),
        None => {
            let tracker = FileTracker::new(&config.tracking.root);
            ServingContext::from_latest(&tracker, &config.tracking.experiment)
        }
    }
    .context("Failed to load model")?
    .with_required_fields(config.serving.required_fields.clone());

    let prediction = context.predict(&record)?;
    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}

fn tune(mut config: PipelineConfig, args: TuneArgs) -> Result<()> {
    if let Some(target) = args.target {
        config.data.target = target;
    }
    if let Some(folds) = args.folds {
        config.tuning.folds = folds;
    }
    if let Some(grid) = args.n_estimators {
        config.tuning.n_estimators = grid;
    }
    if let Some(grid) = args.max_depth {
        config.tuning.max_depth = grid;
    }

    info!("Churn Pipeline Tuner v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════");
    info!("  n_estimators: {:?}", config.tuning.n_estimators);
    info!("  max_depth: {:?}", config.tuning.max_depth);
    info!("  Folds: {}", config.tuning.folds);

    let outcome = run_tuning(&config, &args.input)?;

    info!("  Run: {} ({})", outcome.run_id, outcome.run_dir.display());
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(cli.verbose, &config.logging.level)?;

    match cli.command {
        Command::Train(args) => train(config, args),
        Command::Predict(args) => predict(config, args),
        Command::Tune(args) => tune(config, args),
    }
}
