//! Multi-window harmonic feature extraction.
//!
//! One [`HarmonicFeatureRecord`] per qualifying note: harmonics in the
//! attack, early-sustain and sustain windows, an H1 decay profile, attack
//! overshoot, spectral centroids and the early-sustain SNR profile.

use crate::audio_cache::{AudioCache, DecodedAudio};
use crate::config::PipelineConfig;
use crate::dsp::{
    amps_to_db, compute_rms, extract_harmonics_fft, extract_harmonics_narrowband, HarmonicPeaks, MIN_SPECTRUM_SAMPLES,
};
use crate::noise_floor::measure_note_snr;
use crate::types::*;
use crate::worker_pool::run_sharded;
use linreg::linear_regression;
use log::{debug, info, trace, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Length of each decay sub-window, starting at the sample time.
const DECAY_WINDOW_S: f64 = 0.100;
/// Decay samples closer than this to the note end are unusable.
const DECAY_END_GUARD_S: f64 = 0.050;
const MIN_DECAY_SAMPLES: usize = 64;
/// Amplitudes at or below this are treated as silence.
const NEGLIGIBLE_AMP: f64 = 1e-15;

const OVERSHOOT_MIN_DURATION_S: f64 = 0.250;
const OVERSHOOT_PEAK_S: (f64, f64) = (0.0, 0.010);
const OVERSHOOT_SUSTAIN_S: (f64, f64) = (0.100, 0.200);

/// `[int(a·sr), int(b·sr))` clamped to `len`; empty when inverted.
fn sample_range(a_s: f64, b_s: f64, sample_rate: f64, len: usize) -> std::ops::Range<usize> {
    let start = ((a_s * sample_rate).max(0.0) as usize).min(len);
    let end = ((b_s * sample_rate).max(0.0) as usize).min(len);
    start..end.max(start)
}

fn measure(segment: &[f64], sample_rate: f64, f0: f64, n: usize, precise: bool) -> HarmonicPeaks {
    if precise {
        extract_harmonics_narrowband(segment, sample_rate, f0, n)
    } else {
        extract_harmonics_fft(segment, sample_rate, f0, n)
    }
}

/// Harmonics of one window, or `None` if the note is too short for it or
/// the clipped segment has fewer than 128 samples.
fn extract_window(
    note_audio: &[f64],
    sample_rate: f64,
    f0: f64,
    duration_s: f64,
    kind: WindowKind,
    mask: &[bool; N_HARMONICS],
    precise: bool,
) -> Option<WindowHarmonics> {
    let (start_s, end_s, min_duration_s) = kind.span();
    if duration_s < min_duration_s {
        return None;
    }
    let end_s = end_s.min(duration_s);
    if start_s >= end_s {
        return None;
    }
    let segment = &note_audio[sample_range(start_s, end_s, sample_rate, note_audio.len())];
    if segment.len() < MIN_SPECTRUM_SAMPLES {
        return None;
    }

    let peaks = measure(segment, sample_rate, f0, N_HARMONICS, precise);
    let db = amps_to_db(&peaks.amps, None);

    let mut amps_linear = HarmonicSeries::from_values(&peaks.amps);
    let mut amps_db_rel_h1 = HarmonicSeries::from_values(&db);
    let mut freqs_hz = HarmonicSeries::from_values(&peaks.freqs);
    amps_linear.apply_mask(mask);
    amps_db_rel_h1.apply_mask(mask);
    freqs_hz.apply_mask(mask);

    Some(WindowHarmonics {
        amps_linear,
        amps_db_rel_h1,
        freqs_hz,
    })
}

/// H1 amplitude at each of [`DECAY_TIMES_S`] and the fitted decay rate.
fn extract_decay(note_audio: &[f64], sample_rate: f64, f0: f64, duration_s: f64, precise: bool) -> DecayProfile {
    let mut h1_amps = [None; DECAY_TIMES_S.len()];
    for (slot, &t) in h1_amps.iter_mut().zip(DECAY_TIMES_S.iter()) {
        if t >= duration_s - DECAY_END_GUARD_S {
            continue;
        }
        let range = sample_range(t, t + DECAY_WINDOW_S, sample_rate, note_audio.len());
        if range.len() < MIN_DECAY_SAMPLES {
            continue;
        }
        let peaks = measure(&note_audio[range], sample_rate, f0, 1, precise);
        *slot = peaks.amps.first().copied();
    }

    let (xs, ys): (Vec<f64>, Vec<f64>) = DECAY_TIMES_S
        .iter()
        .zip(&h1_amps)
        .filter_map(|(&t, &a)| a.filter(|&a| a > NEGLIGIBLE_AMP).map(|a| (t, a.log10())))
        .unzip();

    let decay_rate_db_s = if xs.len() >= 3 {
        linear_regression::<_, _, f64>(&xs, &ys)
            .ok()
            .map(|(slope, _intercept): (f64, f64)| -20.0 * slope)
    } else {
        None
    };

    DecayProfile {
        times_s: DECAY_TIMES_S,
        h1_amps,
        decay_rate_db_s,
    }
}

/// Peak RMS (first 10 ms) over sustain RMS (100–200 ms), in dB.
fn extract_overshoot(note_audio: &[f64], sample_rate: f64, duration_s: f64) -> Option<f64> {
    if duration_s < OVERSHOOT_MIN_DURATION_S {
        return None;
    }
    let peak = sample_range(OVERSHOOT_PEAK_S.0, OVERSHOOT_PEAK_S.1, sample_rate, note_audio.len());
    let sustain = sample_range(OVERSHOOT_SUSTAIN_S.0, OVERSHOOT_SUSTAIN_S.1, sample_rate, note_audio.len());
    if peak.is_empty() || sustain.is_empty() {
        return None;
    }
    let peak_rms = compute_rms(&note_audio[peak]);
    let sustain_rms = compute_rms(&note_audio[sustain]);
    Some(20.0 * (peak_rms / sustain_rms).log10())
}

/// Amplitude-weighted mean frequency over valid, non-negligible harmonics.
pub fn spectral_centroid(window: Option<&WindowHarmonics>) -> Option<f64> {
    let w = window?;
    let (weighted, total) = (0..N_HARMONICS)
        .filter_map(|h| {
            let f = w.freqs_hz.get(h)?;
            let a = w.amps_linear.get(h).filter(|&a| a > NEGLIGIBLE_AMP)?;
            Some((f * a, a))
        })
        .fold((0.0, 0.0), |(fw, t), (fa, a)| (fw + fa, t + a));
    (total > 0.0).then(|| weighted / total)
}

/// Extract the feature record of one note from its full recording.
/// Returns `None` when the note's audio slice is empty.
pub fn extract_note_features(
    audio: &[f64],
    sample_rate: f64,
    note: &NoteEvent,
    precise: bool,
) -> Option<HarmonicFeatureRecord> {
    let duration_s = note.duration_s();
    let f0 = note.fundamental_hz();

    let onset = (note.onset_s * sample_rate).max(0.0) as usize;
    let offset = ((note.offset_s * sample_rate).max(0.0) as usize).min(audio.len());
    if onset >= audio.len() || onset >= offset {
        return None;
    }
    let note_audio = &audio[onset..offset];

    let mut windows = AnalysisWindows::default();
    for kind in WindowKind::ALL {
        let w = extract_window(note_audio, sample_rate, f0, duration_s, kind, &note.harmonic_mask, precise);
        if w.is_none() {
            trace!("{}: {} window absent", note.id, kind.name());
        }
        windows.set(kind, w);
    }

    let decay = extract_decay(note_audio, sample_rate, f0, duration_s, precise);
    let overshoot_db = extract_overshoot(note_audio, sample_rate, duration_s);
    let centroid_attack = spectral_centroid(windows.attack.as_ref());
    let centroid_sustain = spectral_centroid(windows.sustain.as_ref());

    Some(HarmonicFeatureRecord {
        id: note.id.clone(),
        midi_note: note.midi_note,
        velocity_midi: note.velocity_midi,
        isolation_tier: note.isolation_tier,
        isolation_score: note.isolation_score,
        source_file: Some(note.source_file.clone()),
        f0,
        duration_s,
        windows,
        decay,
        overshoot_db,
        centroid_attack,
        centroid_sustain,
        snr_db: None,
    })
}

// ─── Real recordings ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub eligible: usize,
    pub files: usize,
    pub failed_files: usize,
    /// Notes skipped because their recording failed to decode.
    pub skipped_notes: usize,
    /// Notes whose audio slice was empty (onset past end of audio).
    pub empty_slices: usize,
    pub extracted: usize,
}

struct FileExtraction {
    records: Vec<HarmonicFeatureRecord>,
    failed: bool,
    skipped: usize,
    empty: usize,
}

fn extract_file(path: &str, notes: &[&NoteEvent], config: &PipelineConfig, cache: &AudioCache) -> FileExtraction {
    let audio: std::sync::Arc<DecodedAudio> = match cache.get_or_load(Path::new(path)) {
        Ok(a) => a,
        Err(e) => {
            warn!("{}; skipping {} notes", e, notes.len());
            cache.release(Path::new(path));
            return FileExtraction {
                records: Vec::new(),
                failed: true,
                skipped: notes.len(),
                empty: 0,
            };
        }
    };
    let sr = audio.sample_rate_f64();

    let mut records = Vec::with_capacity(notes.len());
    let mut empty = 0;
    for note in notes {
        let precise = config.precise_gold && note.isolation_tier == IsolationTier::Gold;
        match extract_note_features(&audio.samples, sr, note, precise) {
            Some(mut record) => {
                record.snr_db = Some(measure_note_snr(&audio.samples, sr, record.f0, note.onset_s));
                records.push(record);
            }
            None => {
                trace!("{}: empty audio slice", note.id);
                empty += 1;
            }
        }
    }
    debug!("{}: extracted {}/{} notes", path, records.len(), notes.len());
    // Each recording is one shard, so nothing else will ask for it.
    cache.release(Path::new(path));
    FileExtraction {
        records,
        failed: false,
        skipped: 0,
        empty,
    }
}

/// Extract features for every note at or above `config.min_tier`, one
/// worker shard per recording. Records come back grouped by recording
/// (sorted by path) and in input order within a recording.
pub fn extract_all(
    notes: &[NoteEvent],
    config: &PipelineConfig,
    cache: &AudioCache,
) -> (Vec<HarmonicFeatureRecord>, ExtractionStats) {
    let mut by_file: BTreeMap<&str, Vec<&NoteEvent>> = BTreeMap::new();
    let mut stats = ExtractionStats::default();
    for note in notes.iter().filter(|n| n.isolation_tier.at_least(config.min_tier)) {
        by_file.entry(note.source_file.as_str()).or_default().push(note);
        stats.eligible += 1;
    }
    stats.files = by_file.len();
    info!(
        "Extracting harmonics for {} notes (>= {}) across {} files",
        stats.eligible, config.min_tier, stats.files
    );

    let shards: Vec<(&str, Vec<&NoteEvent>)> = by_file.into_iter().collect();
    let results = run_sharded(shards, config.workers, |(path, file_notes)| {
        extract_file(path, &file_notes, config, cache)
    });

    let mut records = Vec::with_capacity(stats.eligible);
    for r in results {
        stats.failed_files += r.failed as usize;
        stats.skipped_notes += r.skipped;
        stats.empty_slices += r.empty;
        records.extend(r.records);
    }
    stats.extracted = records.len();
    (records, stats)
}

/// Log tier counts and per-window, decay and overshoot coverage.
pub fn log_coverage<'a>(records: impl IntoIterator<Item = &'a HarmonicFeatureRecord>) {
    let records: Vec<&HarmonicFeatureRecord> = records.into_iter().collect();
    let n = records.len();
    info!("Extracted features for {} notes", n);

    for tier in [IsolationTier::Gold, IsolationTier::Silver, IsolationTier::Bronze] {
        let count = records.iter().filter(|r| r.isolation_tier == tier).count();
        info!("  {}: {}", tier, count);
    }
    for kind in WindowKind::ALL {
        let count = records.iter().filter(|r| r.windows.get(kind).is_some()).count();
        info!("  {} window: {}/{} notes", kind.name(), count, n);
    }
    let decay = records.iter().filter(|r| r.decay.decay_rate_db_s.is_some()).count();
    info!("  Decay rate: {}/{} notes", decay, n);
    let overshoot = records.iter().filter(|r| r.overshoot_db.is_some()).count();
    info!("  Overshoot: {}/{} notes", overshoot, n);
}

// ─── Model renders ──────────────────────────────────────────────────────────

/// Unique (midi, velocity bucket) pairs that real observations need a model
/// render for.
pub fn collect_model_keys(records: &[HarmonicFeatureRecord]) -> BTreeSet<(u8, u8)> {
    records
        .iter()
        .map(|r| (r.midi_note, bucket_velocity(r.velocity_midi)))
        .collect()
}

/// Path of the externally rendered note for a key.
pub fn render_path(renders_dir: &Path, midi: u8, velocity_bucket: u8) -> PathBuf {
    renders_dir.join(format!("{}.wav", model_key(midi, velocity_bucket)))
}

/// Feature record of a whole model render: the render is treated as one
/// clean, gold note spanning the file, measured with the FFT extractor.
pub fn extract_model_record(audio: &DecodedAudio, midi: u8, velocity_bucket: u8) -> Option<HarmonicFeatureRecord> {
    let key = model_key(midi, velocity_bucket);
    let note = NoteEvent {
        id: key.clone(),
        onset_s: 0.0,
        offset_s: audio.duration_s(),
        midi_note: midi,
        measured_f0: None,
        amplitude: 1.0,
        velocity_midi: velocity_bucket,
        source_file: key,
        source_type: SourceType::Polyphonic,
        isolation_score: 1.0,
        isolation_tier: IsolationTier::Gold,
        harmonic_mask: [true; N_HARMONICS],
        sub_scores: None,
    };
    let mut record = extract_note_features(&audio.samples, audio.sample_rate_f64(), &note, false)?;
    record.source_file = None;
    Some(record)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelExtractionStats {
    pub requested: usize,
    pub extracted: usize,
    pub missing: usize,
}

/// Extract model records for every key from `renders_dir/{midi}_{bucket}.wav`.
/// Missing or undecodable renders are warned about and skipped.
pub fn extract_model_features(
    keys: &BTreeSet<(u8, u8)>,
    renders_dir: &Path,
    cache: &AudioCache,
    workers: usize,
) -> (BTreeMap<String, HarmonicFeatureRecord>, ModelExtractionStats) {
    let shards: Vec<(u8, u8)> = keys.iter().copied().collect();
    let results = run_sharded(shards, workers, |(midi, bucket)| {
        let path = render_path(renders_dir, midi, bucket);
        let record = match cache.get_or_load(&path) {
            Ok(audio) => extract_model_record(&audio, midi, bucket),
            Err(e) => {
                warn!("Model render {}: {}", model_key(midi, bucket), e);
                None
            }
        };
        cache.release(&path);
        record
    });

    let mut stats = ModelExtractionStats {
        requested: keys.len(),
        ..Default::default()
    };
    let mut out = BTreeMap::new();
    for record in results {
        match record {
            Some(r) => {
                out.insert(model_key(r.midi_note, r.velocity_midi), r);
            }
            None => stats.missing += 1,
        }
    }
    stats.extracted = out.len();
    info!(
        "Model features: {}/{} keys extracted, {} missing",
        stats.extracted, stats.requested, stats.missing
    );
    (out, stats)
}
