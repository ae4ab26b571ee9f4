use harmonic_residuals::config::PipelineConfig;
use harmonic_residuals::pipeline::{
    run_assemble, run_extract, run_extract_model, run_pipeline, run_score, PipelinePaths, Stage,
};
use harmonic_residuals::types::IsolationTier;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "harmonic-residuals")]
#[command(about = "Harmonic residual dataset builder: real piano notes vs. model renders")]
struct Cli {
    /// JSON config file (missing fields take defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Worker threads (default: available parallelism)
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score note isolation and assign tiers and harmonic masks
    Score {
        #[arg(long, default_value = "notes.json")]
        input: PathBuf,
        #[arg(long, default_value = "scored_notes.json")]
        output: PathBuf,
    },
    /// Extract harmonic features from scored notes
    Extract {
        #[arg(long, default_value = "scored_notes.json")]
        input: PathBuf,
        #[arg(long, default_value = "harmonics.json")]
        output: PathBuf,
        /// Minimum isolation tier to extract
        #[arg(long, value_parser = ["gold", "silver", "bronze"])]
        min_tier: Option<String>,
        /// Use FFT extraction for gold notes too
        #[arg(long)]
        no_precise_gold: bool,
    },
    /// Extract features from model renders matching the real observations
    ExtractModel {
        /// Real feature records, used to pick (pitch, velocity bucket) keys
        #[arg(long, default_value = "harmonics.json")]
        input: PathBuf,
        /// Directory of rendered `{midi}_{bucket}.wav` files
        #[arg(long)]
        renders_dir: PathBuf,
        #[arg(long, default_value = "model_harmonics.json")]
        output: PathBuf,
    },
    /// Compute residuals and write the training dataset
    Assemble {
        #[arg(long, default_value = "harmonics.json")]
        real: PathBuf,
        #[arg(long, default_value = "model_harmonics.json")]
        model: PathBuf,
        #[arg(long, default_value = "ml_data")]
        output_dir: PathBuf,
        /// SNR threshold in dB
        #[arg(long)]
        snr_threshold: Option<f64>,
        /// Disable SNR-based filtering (not recommended)
        #[arg(long)]
        no_snr_filter: bool,
    },
    /// Run the stages in order through the standard files of a work directory
    Run {
        #[arg(long, default_value = ".")]
        work_dir: PathBuf,
        /// Rendered model notes (default: <work-dir>/ml_data/renders)
        #[arg(long)]
        renders_dir: Option<PathBuf>,
        /// First stage to run (1-4 or its name)
        #[arg(long, default_value = "score")]
        from_stage: Stage,
        /// Last stage to run (1-4 or its name)
        #[arg(long, default_value = "assemble")]
        through_stage: Stage,
        /// Log the planned stages without executing them
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match PipelineConfig::load(path) {
            Some(c) => c,
            None => bail!("Could not load config {:?}", path),
        },
        None => PipelineConfig::default(),
    };
    if let Some(w) = cli.workers {
        config.workers = w.max(1);
    }

    info!("═══════════════════════════════════════════════");
    info!("  HARMONIC RESIDUALS v{}", env!("CARGO_PKG_VERSION"));
    info!("  Workers: {}", config.workers);
    info!("═══════════════════════════════════════════════");

    match cli.command {
        Command::Score { input, output } => {
            run_score(&input, &output, &config).with_context(|| format!("scoring {:?} into {:?}", input, output))?;
        }

        Command::Extract {
            input,
            output,
            min_tier,
            no_precise_gold,
        } => {
            if let Some(t) = min_tier {
                config.min_tier = t.parse::<IsolationTier>().map_err(anyhow::Error::msg)?;
            }
            if no_precise_gold {
                config.precise_gold = false;
            }
            run_extract(&input, &output, &config)
                .with_context(|| format!("extracting {:?} into {:?}", input, output))?;
        }

        Command::ExtractModel {
            input,
            renders_dir,
            output,
        } => {
            run_extract_model(&input, &renders_dir, &output, &config)
                .with_context(|| format!("extracting renders in {:?} into {:?}", renders_dir, output))?;
        }

        Command::Assemble {
            real,
            model,
            output_dir,
            snr_threshold,
            no_snr_filter,
        } => {
            if let Some(t) = snr_threshold {
                config.snr_threshold_db = t;
            }
            if no_snr_filter {
                config.snr_filter = false;
            }
            run_assemble(&real, &model, &output_dir, &config)
                .with_context(|| format!("assembling dataset into {:?}", output_dir))?;
        }

        Command::Run {
            work_dir,
            renders_dir,
            from_stage,
            through_stage,
            dry_run,
        } => {
            let paths = PipelinePaths::in_dir(&work_dir, renders_dir);
            run_pipeline(&paths, &config, from_stage, through_stage, dry_run)
                .with_context(|| format!("running {}..={} in {:?}", from_stage, through_stage, work_dir))?;
        }
    }

    Ok(())
}
