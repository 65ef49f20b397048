//! manifold-flow CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mf_flows::{Flow, Pie, PieConfig, build_pie};
use mf_prob::BaseDistribution;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};

mod batch;

use batch::{dmatrix_to_nested, dvector_to_vec, load_batch, parse_context_row};

#[derive(Parser)]
#[command(name = "manifold-flow")]
#[command(about = "manifold-flow - PIE manifold-learning normalizing flows")]
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
    /// Print version information
    Version,

    /// Build a model from a config and report its dimensions and size
    Describe {
        /// Model config (pie JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Draw samples in data space
    Sample {
        /// Model config (pie JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Number of samples
        #[arg(short, long, default_value = "1")]
        n: usize,

        /// RNG seed for the latent draws
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Also draw the (epsilon-scale) orthogonal latents
        #[arg(long)]
        sample_orthogonal: bool,

        /// Context row shared by all samples, comma-separated
        #[arg(long)]
        context: Option<String>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Per-sample log-density of a batch
    LogProb {
        /// Model config (pie JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Input batch JSON (`{"x": [[...]], "context": [[...]]}`)
        #[arg(short, long)]
        input: PathBuf,

        /// Project onto the manifold before scoring (slice of PIE)
        #[arg(long)]
        slice: bool,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Map a batch to manifold and orthogonal latents
    Encode {
        /// Model config (pie JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Input batch JSON (`{"x": [[...]], "context": [[...]]}`)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Project a batch onto the learned manifold
    Project {
        /// Model config (pie JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Input batch JSON (`{"x": [[...]], "context": [[...]]}`)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Version => {
            println!("manifold-flow {}", mf_core::VERSION);
            Ok(())
        }
        Commands::Describe { config, output } => cmd_describe(&config, output.as_deref()),
        Commands::Sample { config, n, seed, sample_orthogonal, context, output } => {
            cmd_sample(&config, n, seed, sample_orthogonal, context.as_deref(), output.as_deref())
        }
        Commands::LogProb { config, input, slice, output } => {
            cmd_log_prob(&config, &input, slice, output.as_deref())
        }
        Commands::Encode { config, input, output } => {
            cmd_encode(&config, &input, output.as_deref())
        }
        Commands::Project { config, input, output } => {
            cmd_project(&config, &input, output.as_deref())
        }
    }
}

fn load_model(path: &Path) -> Result<(PieConfig, Pie)> {
    tracing::info!(path = %path.display(), "loading model config");
    let config = PieConfig::from_path(path)
        .with_context(|| format!("invalid model config {}", path.display()))?;
    let pie = build_pie(&config)?;
    tracing::info!(
        data_dim = pie.total_data_dim(),
        latent_dim = pie.total_latent_dim(),
        parameters = pie.parameter_count().total,
        "model built"
    );
    Ok((config, pie))
}

fn cmd_describe(config_path: &Path, output: Option<&Path>) -> Result<()> {
    let (config, pie) = load_model(config_path)?;
    let params = pie.parameter_count();
    let orthogonal = pie.orthogonal_latent_distribution();

    let output_json = serde_json::json!({
        "schema_version": config.schema_version,
        "data_shape": pie.data_shape(),
        "latent_shape": pie.latent_shape(),
        "total_data_dim": pie.total_data_dim(),
        "total_latent_dim": pie.total_latent_dim(),
        "orthogonal_dim": orthogonal.dim(),
        "epsilon": pie.epsilon(),
        "orthogonal_clip": orthogonal.clip(),
        "apply_context_to_outer": pie.applies_context_to_outer(),
        "context_features": config.context_features,
        "outer": config.outer,
        "inner": config.inner,
        "parameters": {
            "total": params.total,
            "trainable": params.trainable,
        },
        "size_mb": params.size_bytes_f32() as f64 / 1.0e6,
    });

    write_json(output, output_json)
}

fn cmd_sample(
    config_path: &Path,
    n: usize,
    seed: u64,
    sample_orthogonal: bool,
    context: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    if n == 0 {
        anyhow::bail!("--n must be > 0");
    }
    let (_, pie) = load_model(config_path)?;
    let context = context.map(parse_context_row).transpose()?;

    let mut rng = StdRng::seed_from_u64(seed);
    let x = pie.sample(None, n, context.as_ref(), sample_orthogonal, &mut rng)?;
    tracing::info!(n, sample_orthogonal, "sampling complete");

    let output_json = serde_json::json!({
        "n": n,
        "seed": seed,
        "sample_orthogonal": sample_orthogonal,
        "x": dmatrix_to_nested(&x),
    });

    write_json(output, output_json)
}

fn cmd_log_prob(
    config_path: &Path,
    input: &Path,
    slice: bool,
    output: Option<&Path>,
) -> Result<()> {
    let (_, pie) = load_model(config_path)?;
    let batch = load_batch(input)?;

    let out = pie.forward(&batch.x, slice, batch.context.as_ref())?;
    tracing::info!(rows = batch.x.nrows(), slice, "log-prob complete");

    let output_json = serde_json::json!({
        "slice_of_pie": slice,
        "log_prob": dvector_to_vec(&out.log_prob),
        "u": dmatrix_to_nested(&out.u),
        "x": dmatrix_to_nested(&out.x),
    });

    write_json(output, output_json)
}

fn cmd_encode(config_path: &Path, input: &Path, output: Option<&Path>) -> Result<()> {
    let (_, pie) = load_model(config_path)?;
    let batch = load_batch(input)?;

    let enc = pie.encoding(&batch.x, batch.context.as_ref())?;

    let output_json = serde_json::json!({
        "u": dmatrix_to_nested(&enc.u),
        "h_orthogonal": dmatrix_to_nested(&enc.h_orthogonal),
        "log_det_inner": dvector_to_vec(&enc.log_det_inner),
        "log_det_outer": dvector_to_vec(&enc.log_det_outer),
    });

    write_json(output, output_json)
}

fn cmd_project(config_path: &Path, input: &Path, output: Option<&Path>) -> Result<()> {
    let (_, pie) = load_model(config_path)?;
    let batch = load_batch(input)?;

    let projected = pie.project(&batch.x, batch.context.as_ref())?;
    let residual: Vec<f64> = (&batch.x - &projected).row_iter().map(|r| r.norm()).collect();

    let output_json = serde_json::json!({
        "x": dmatrix_to_nested(&projected),
        "residual_norm": residual,
    });

    write_json(output, output_json)
}

fn write_json(output: Option<&Path>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
