//! Real-vs-model residual targets and training dataset assembly.
//!
//! Target layout (11 values, fixed order):
//!   [0..5]  frequency offset in cents, H2–H6
//!   [5..10] decay ratio (real / model sustain-to-early ratio), H2–H6
//!   [10]    displacement-scale correction from the H2 level difference

use crate::config::PipelineConfig;
use crate::types::*;
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;

pub const N_TARGETS: usize = 11;
/// Harmonics covered by the per-harmonic target blocks (H2..H6).
pub const TARGET_HARMONICS: usize = 5;
pub const FREQ_OFFSET: usize = 0;
pub const DECAY_OFFSET: usize = FREQ_OFFSET + TARGET_HARMONICS;
pub const DS_INDEX: usize = DECAY_OFFSET + TARGET_HARMONICS;
/// Only H2 and H3 sit reliably above the noise floor; higher targets are
/// always masked.
pub const MAX_RELIABLE_HARMONICS: usize = 2;

pub const PIANO_MIDI_LOW: u8 = 21;
pub const PIANO_MIDI_HIGH: u8 = 108;

/// Linear amplitudes at or below this are not used in decay ratios.
const MIN_DECAY_AMP: f64 = 1e-12;

pub fn target_name(i: usize) -> String {
    match i {
        i if i < DECAY_OFFSET => format!("freq_H{}", i - FREQ_OFFSET + 2),
        i if i < DS_INDEX => format!("decay_H{}", i - DECAY_OFFSET + 2),
        _ => "ds_corr".to_string(),
    }
}

/// Flags per harmonic in H2-based indexing (0 = H2, ..., 6 = H8).
pub type AnomalyFlags = [bool; N_HARMONICS - 1];

/// Flag harmonics louder than the harmonic below them. A monotonic
/// saturating nonlinearity cannot produce that pattern, so it points at a
/// resonance or crosstalk artifact. Index `h` is flagged when the dB level
/// at harmonic array index `h+1` exceeds the level at `h`; H2 (index 0) is
/// never compared against H1. Missing values never flag.
pub fn detect_anomalous_harmonics(real_db: &HarmonicSeries) -> AnomalyFlags {
    let mut flags = [false; N_HARMONICS - 1];
    for h in 1..N_HARMONICS - 1 {
        if let (Some(upper), Some(lower)) = (real_db.get(h + 1), real_db.get(h)) {
            if upper > lower {
                flags[h] = true;
            }
        }
    }
    flags
}

/// Fixed-length target vector with per-entry validity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualTargetVector {
    pub targets: [f64; N_TARGETS],
    pub mask: [bool; N_TARGETS],
}

impl Default for ResidualTargetVector {
    fn default() -> Self {
        Self {
            targets: [0.0; N_TARGETS],
            mask: [false; N_TARGETS],
        }
    }
}

impl ResidualTargetVector {
    fn set(&mut self, i: usize, value: f64) {
        self.targets[i] = value;
        self.mask[i] = true;
    }

    pub fn get(&self, i: usize) -> Option<f64> {
        self.mask.get(i).copied().filter(|&v| v).map(|_| self.targets[i])
    }

    pub fn is_fully_masked(&self) -> bool {
        !self.mask.iter().any(|&m| m)
    }
}

/// Targets rejected by each gate for one or more observations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateRejections {
    pub snr: usize,
    pub anomaly: usize,
}

/// Outcome of the SNR and anomaly gates for one harmonic array index.
fn gate(
    h_idx: usize,
    snr: Option<&SnrProfile>,
    snr_gate: Option<f64>,
    anomalous: &AnomalyFlags,
    rejected: &mut GateRejections,
) -> bool {
    if let Some(threshold) = snr_gate {
        if !snr.is_some_and(|p| p.passes(h_idx, threshold)) {
            rejected.snr += 1;
            return false;
        }
    }
    if anomalous[h_idx - 1] {
        rejected.anomaly += 1;
        return false;
    }
    true
}

/// Residual targets for one matched (real, model) pair. `snr_gate` is the
/// threshold in dB, or `None` with SNR filtering disabled. A real record
/// without an SNR profile fails every SNR gate.
pub fn compute_note_residual(
    real: &HarmonicFeatureRecord,
    model: &HarmonicFeatureRecord,
    snr_gate: Option<f64>,
) -> ResidualTargetVector {
    compute_note_residual_counted(real, model, snr_gate, &mut GateRejections::default())
}

fn compute_note_residual_counted(
    real: &HarmonicFeatureRecord,
    model: &HarmonicFeatureRecord,
    snr_gate: Option<f64>,
    rejected: &mut GateRejections,
) -> ResidualTargetVector {
    let mut out = ResidualTargetVector::default();
    let snr = real.snr_db.as_ref();

    let primary = [WindowKind::EarlySustain, WindowKind::Sustain]
        .into_iter()
        .find_map(|kind| Some((real.windows.get(kind)?, model.windows.get(kind)?)));
    let Some((real_win, model_win)) = primary else {
        return out;
    };

    let anomalous = detect_anomalous_harmonics(&real_win.amps_db_rel_h1);

    // Frequency offsets
    for h in 0..MAX_RELIABLE_HARMONICS {
        let h_idx = h + 1;
        let (Some(rf), Some(mf)) = (real_win.freqs_hz.get(h_idx), model_win.freqs_hz.get(h_idx)) else {
            continue;
        };
        if rf <= 0.0 || mf <= 0.0 || !gate(h_idx, snr, snr_gate, &anomalous, rejected) {
            continue;
        }
        out.set(FREQ_OFFSET + h, 1200.0 * (rf / mf).log2());
    }

    // Decay ratios: sustain over early sustain, both sides
    let decay_windows = (
        real.windows.early_sustain.as_ref(),
        real.windows.sustain.as_ref(),
        model.windows.early_sustain.as_ref(),
        model.windows.sustain.as_ref(),
    );
    if let (Some(re_w), Some(rs_w), Some(me_w), Some(ms_w)) = decay_windows {
        for h in 0..MAX_RELIABLE_HARMONICS {
            let h_idx = h + 1;
            let amps = [re_w, rs_w, me_w, ms_w].map(|w| w.amps_linear.get(h_idx).filter(|&a| a > MIN_DECAY_AMP));
            let [Some(re), Some(rs), Some(me), Some(ms)] = amps else {
                continue;
            };
            if !gate(h_idx, snr, snr_gate, &anomalous, rejected) {
                continue;
            }
            out.set(DECAY_OFFSET + h, (rs / re) / (ms / me));
        }
    }

    // Displacement scale from the H2-relative-to-H1 level difference.
    // 2^(+Δ/6): a louder real H2 asks for a larger displacement.
    if let (Some(real_h2), Some(model_h2)) = (real_win.amps_db_rel_h1.get(1), model_win.amps_db_rel_h1.get(1)) {
        if gate(1, snr, snr_gate, &anomalous, rejected) {
            let delta = real_h2 - model_h2;
            out.set(DS_INDEX, 2f64.powf(delta / 6.0));
        }
    }

    out
}

// ─── Dataset ────────────────────────────────────────────────────────────────

/// One emitted training row.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRow {
    pub id: String,
    /// [pitch, velocity], each normalized to [0, 1].
    pub inputs: [f32; 2],
    /// Zero where the mask is false.
    pub targets: [f32; N_TARGETS],
    pub mask: [bool; N_TARGETS],
    pub weight: f32,
}

/// Ordered rows; a row with an all-false mask is never stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingDataset {
    rows: Vec<DatasetRow>,
}

impl TrainingDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row. Returns false (and stores nothing) for an all-false mask.
    pub fn push(&mut self, row: DatasetRow) -> bool {
        if !row.mask.iter().any(|&m| m) {
            return false;
        }
        self.rows.push(row);
        true
    }

    pub fn rows(&self) -> &[DatasetRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn normalize_inputs(midi: u8, velocity: u8) -> [f32; 2] {
    let span = (PIANO_MIDI_HIGH - PIANO_MIDI_LOW) as f64;
    [
        ((midi as f64 - PIANO_MIDI_LOW as f64) / span) as f32,
        (velocity as f64 / 127.0) as f32,
    ]
}

fn build_row(real: &HarmonicFeatureRecord, residual: &ResidualTargetVector) -> DatasetRow {
    let targets = std::array::from_fn(|i| {
        if residual.mask[i] {
            residual.targets[i] as f32
        } else {
            0.0
        }
    });
    DatasetRow {
        id: real.id.clone(),
        inputs: normalize_inputs(real.midi_note, real.velocity_midi),
        targets,
        mask: residual.mask,
        weight: real.isolation_tier.weight() as f32,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssemblyStats {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub fully_masked: usize,
    pub emitted: usize,
    pub h2_valid: usize,
    pub h3_valid: usize,
    pub snr_rejections: usize,
    pub anomaly_rejections: usize,
}

/// Pair every real record with the model record of its (pitch, velocity
/// bucket) key and emit one row per observation with any valid target.
pub fn assemble_dataset(
    real: &[HarmonicFeatureRecord],
    model: &BTreeMap<String, HarmonicFeatureRecord>,
    config: &PipelineConfig,
) -> (TrainingDataset, AssemblyStats) {
    let snr_gate = config.snr_gate();
    let mut dataset = TrainingDataset::new();
    let mut stats = AssemblyStats::default();
    let mut rejected = GateRejections::default();

    for record in real {
        stats.total += 1;
        let key = model_key(record.midi_note, bucket_velocity(record.velocity_midi));
        let Some(model_record) = model.get(&key) else {
            debug!("{}: no model record for {}", record.id, key);
            stats.unmatched += 1;
            continue;
        };
        stats.matched += 1;

        let residual = compute_note_residual_counted(record, model_record, snr_gate, &mut rejected);
        stats.h2_valid += residual.mask[FREQ_OFFSET] as usize;
        stats.h3_valid += residual.mask[FREQ_OFFSET + 1] as usize;

        if dataset.push(build_row(record, &residual)) {
            stats.emitted += 1;
        } else {
            stats.fully_masked += 1;
        }
    }

    stats.snr_rejections = rejected.snr;
    stats.anomaly_rejections = rejected.anomaly;
    (dataset, stats)
}

// ─── Coverage report ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetCoverage {
    pub name: String,
    pub valid: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Per-target count, mean, population std and range over valid entries.
pub fn target_coverage(dataset: &TrainingDataset) -> Vec<TargetCoverage> {
    (0..N_TARGETS)
        .map(|i| {
            let vals: Vec<f64> = dataset
                .rows()
                .iter()
                .filter(|r| r.mask[i])
                .map(|r| r.targets[i] as f64)
                .collect();
            let n = vals.len();
            if n == 0 {
                return TargetCoverage {
                    name: target_name(i),
                    valid: 0,
                    mean: None,
                    std: None,
                    min: None,
                    max: None,
                };
            }
            let mean = vals.iter().sum::<f64>() / n as f64;
            let var = vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
            TargetCoverage {
                name: target_name(i),
                valid: n,
                mean: Some(mean),
                std: Some(var.sqrt()),
                min: vals.iter().copied().reduce(f64::min),
                max: vals.iter().copied().reduce(f64::max),
            }
        })
        .collect()
}

pub fn log_summary(dataset: &TrainingDataset, stats: &AssemblyStats, coverage: &[TargetCoverage]) {
    let n = dataset.len();
    info!("Dataset: {} observations", n);
    info!("  Total notes examined:  {}", stats.total);
    info!("  Model-matched:         {}", stats.matched);
    info!("  Unmatched:             {}", stats.unmatched);
    info!("  Fully masked:          {}", stats.fully_masked);
    info!("  H2 targets valid:      {}/{}", stats.h2_valid, stats.matched);
    info!("  H3 targets valid:      {}/{}", stats.h3_valid, stats.matched);
    info!("  SNR rejections:        {}", stats.snr_rejections);
    info!("  Anomaly rejections:    {}", stats.anomaly_rejections);

    if n > 0 {
        let span = (PIANO_MIDI_HIGH - PIANO_MIDI_LOW) as f32;
        let midi: Vec<f32> = dataset.rows().iter().map(|r| r.inputs[0] * span + PIANO_MIDI_LOW as f32).collect();
        let vel: Vec<f32> = dataset.rows().iter().map(|r| r.inputs[1] * 127.0).collect();
        let range = |v: &[f32]| v.iter().fold((f32::MAX, f32::MIN), |(lo, hi), &x| (lo.min(x), hi.max(x)));
        let (mlo, mhi) = range(&midi);
        let (vlo, vhi) = range(&vel);
        info!("  MIDI range: {:.0} - {:.0}", mlo, mhi);
        info!("  Velocity range: {:.0} - {:.0}", vlo, vhi);

        for tier in [IsolationTier::Gold, IsolationTier::Silver, IsolationTier::Bronze] {
            let w = tier.weight() as f32;
            let count = dataset.rows().iter().filter(|r| (r.weight - w).abs() < 0.01).count();
            info!("  {}: {}", tier, count);
        }
    }

    info!("Target coverage:");
    for c in coverage {
        match (c.mean, c.std, c.min, c.max) {
            (Some(mean), Some(std), Some(min), Some(max)) => info!(
                "  {:>12}: {:>5}/{} valid  mean={:+7.2}  std={:6.2}  range=[{:+7.2}, {:+7.2}]",
                c.name, c.valid, n, mean, std, min, max
            ),
            _ => info!("  {:>12}:     0/{} valid  (fully masked)", c.name, n),
        }
    }
}
