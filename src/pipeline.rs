//! Stage runners and the end-to-end orchestrator.
//!
//! Each stage reads the previous stage's JSON from disk and writes its own,
//! so a run can resume from any stage once the earlier files exist:
//!
//!   1 score          notes.json          → scored_notes.json
//!   2 extract        scored_notes.json   → harmonics.json
//!   3 extract-model  harmonics.json      → model_harmonics.json (+ renders)
//!   4 assemble       both feature files  → ml_data/training_data.npz

use crate::audio_cache::AudioCache;
use crate::config::PipelineConfig;
use crate::dataset_writer::write_dataset;
use crate::error::{PipelineError, Result};
use crate::features::{
    collect_model_keys, extract_all, extract_model_features, log_coverage, ExtractionStats, ModelExtractionStats,
};
use crate::isolation::{score_notes, ScoringSummary};
use crate::record_io;
use crate::residuals::{assemble_dataset, log_summary, target_coverage, AssemblyStats};
use log::{info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

// ─── Stages ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Score,
    Extract,
    ExtractModel,
    Assemble,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Score, Stage::Extract, Stage::ExtractModel, Stage::Assemble];

    /// 1-based stage number.
    pub fn number(self) -> usize {
        self as usize + 1
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Score => "score",
            Stage::Extract => "extract",
            Stage::ExtractModel => "extract-model",
            Stage::Assemble => "assemble",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Stage::Score => "Score isolation",
            Stage::Extract => "Extract harmonics",
            Stage::ExtractModel => "Extract model features",
            Stage::Assemble => "Compute residuals",
        }
    }

    /// The file this stage cannot start without.
    pub fn input(self, paths: &PipelinePaths) -> &Path {
        match self {
            Stage::Score => &paths.notes,
            Stage::Extract => &paths.scored,
            Stage::ExtractModel | Stage::Assemble => &paths.real,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts a stage name or its number.
impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Stage::ALL
            .into_iter()
            .find(|st| st.name() == s || st.number().to_string() == s)
            .ok_or_else(|| format!("unknown stage {:?} (1-4 or score/extract/extract-model/assemble)", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Run,
    BeforeFrom,
    AfterThrough,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageStatus::Run => "RUN",
            StageStatus::BeforeFrom => "SKIP (before --from-stage)",
            StageStatus::AfterThrough => "SKIP (beyond --through-stage)",
        })
    }
}

/// Status of every stage for a `from..=through` run.
pub fn plan(from: Stage, through: Stage) -> Result<Vec<(Stage, StageStatus)>> {
    if from > through {
        return Err(PipelineError::InvalidInput(format!(
            "--from-stage {} comes after --through-stage {}",
            from, through
        )));
    }
    Ok(Stage::ALL
        .into_iter()
        .map(|st| {
            let status = if st < from {
                StageStatus::BeforeFrom
            } else if st > through {
                StageStatus::AfterThrough
            } else {
                StageStatus::Run
            };
            (st, status)
        })
        .collect())
}

// ─── File layout ────────────────────────────────────────────────────────────

/// Standard stage files under one work directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePaths {
    pub notes: PathBuf,
    pub scored: PathBuf,
    pub real: PathBuf,
    pub model: PathBuf,
    pub renders_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl PipelinePaths {
    /// Renders default to `<work>/ml_data/renders`.
    pub fn in_dir(work: &Path, renders_dir: Option<PathBuf>) -> Self {
        let output_dir = work.join("ml_data");
        Self {
            notes: work.join("notes.json"),
            scored: work.join("scored_notes.json"),
            real: work.join("harmonics.json"),
            model: work.join("model_harmonics.json"),
            renders_dir: renders_dir.unwrap_or_else(|| output_dir.join("renders")),
            output_dir,
        }
    }
}

// ─── Stage runners ──────────────────────────────────────────────────────────

pub fn run_score(input: &Path, output: &Path, config: &PipelineConfig) -> Result<ScoringSummary> {
    let mut notes = record_io::load_notes(input)?;
    let summary = score_notes(&mut notes, config.workers);
    summary.log();
    record_io::save_notes(output, &notes)?;
    Ok(summary)
}

pub fn run_extract(input: &Path, output: &Path, config: &PipelineConfig) -> Result<ExtractionStats> {
    let notes = record_io::load_notes(input)?;
    let (records, stats) = extract_all(&notes, config, &AudioCache::new());
    if stats.failed_files > 0 {
        warn!(
            "{} of {} files failed to load; {} notes skipped",
            stats.failed_files, stats.files, stats.skipped_notes
        );
    }
    if stats.empty_slices > 0 {
        warn!("{} notes had no audio in range", stats.empty_slices);
    }
    log_coverage(&records);
    record_io::save_records(output, &records)?;
    Ok(stats)
}

pub fn run_extract_model(
    input: &Path,
    renders_dir: &Path,
    output: &Path,
    config: &PipelineConfig,
) -> Result<ModelExtractionStats> {
    let real = record_io::load_records(input)?;
    let keys = collect_model_keys(&real);
    info!("{} unique (pitch, velocity bucket) keys", keys.len());
    let (model, stats) = extract_model_features(&keys, renders_dir, &AudioCache::new(), config.workers);
    log_coverage(model.values());
    record_io::save_model_records(output, &model)?;
    Ok(stats)
}

pub fn run_assemble(real: &Path, model: &Path, output_dir: &Path, config: &PipelineConfig) -> Result<AssemblyStats> {
    let real_records = record_io::load_records(real)?;
    let model_records = record_io::load_model_records(model)?;
    info!("Real observations: {}", real_records.len());
    info!("Model note/vel combos: {}", model_records.len());
    match config.snr_gate() {
        Some(t) => info!("SNR filtering at {:.1} dB", t),
        None => warn!("SNR filtering DISABLED"),
    }

    let (dataset, stats) = assemble_dataset(&real_records, &model_records, config);
    let coverage = target_coverage(&dataset);
    log_summary(&dataset, &stats, &coverage);
    write_dataset(output_dir, &dataset, &stats, &coverage)?;
    Ok(stats)
}

fn run_stage(stage: Stage, paths: &PipelinePaths, config: &PipelineConfig) -> Result<()> {
    match stage {
        Stage::Score => run_score(&paths.notes, &paths.scored, config).map(drop),
        Stage::Extract => run_extract(&paths.scored, &paths.real, config).map(drop),
        Stage::ExtractModel => run_extract_model(&paths.real, &paths.renders_dir, &paths.model, config).map(drop),
        Stage::Assemble => run_assemble(&paths.real, &paths.model, &paths.output_dir, config).map(drop),
    }
}

// ─── Orchestrator ───────────────────────────────────────────────────────────

/// Run stages `from..=through` in order. With `dry_run` the plan is logged
/// and nothing is read or written. Returns the stages that ran.
pub fn run_pipeline(
    paths: &PipelinePaths,
    config: &PipelineConfig,
    from: Stage,
    through: Stage,
    dry_run: bool,
) -> Result<Vec<Stage>> {
    let stages = plan(from, through)?;

    if dry_run {
        info!("DRY RUN: stages that would execute:");
        for (st, status) in &stages {
            info!("  Stage {}: {} [{}]", st.number(), st.title(), status);
        }
        return Ok(Vec::new());
    }

    let first_input = from.input(paths);
    if !first_input.exists() {
        return Err(PipelineError::InvalidInput(format!(
            "stage {} needs {:?}; run the earlier stages first",
            from, first_input
        )));
    }

    std::fs::create_dir_all(&paths.output_dir)?;
    config.save(&paths.output_dir.join("pipeline_config.json"))?;

    let total = Instant::now();
    let mut ran = Vec::new();
    for (st, status) in stages {
        if status != StageStatus::Run {
            if status == StageStatus::BeforeFrom {
                info!("Stage {}: {} [SKIPPED]", st.number(), st.title());
            }
            continue;
        }
        info!("═══ Stage {}: {} ═══", st.number(), st.title());
        let started = Instant::now();
        run_stage(st, paths, config)?;
        info!("  Stage {} took {:.1}s", st.number(), started.elapsed().as_secs_f64());
        ran.push(st);
    }
    info!("Pipeline complete in {:.1}s", total.elapsed().as_secs_f64());
    Ok(ran)
}
