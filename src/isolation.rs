use crate::error::{PipelineError, Result};
use crate::types::*;
use crate::worker_pool::run_sharded;
use log::{debug, info, trace, warn};
use std::collections::BTreeMap;

/// Collision threshold: two partials within 50 cents collide.
pub fn collision_ratio() -> f64 {
    2.0f64.powf(50.0 / 1200.0)
}

/// Per-harmonic weights for the collision score (H1–H4 count double).
pub const HARMONIC_WEIGHTS: [f64; N_HARMONICS] = [2.0, 2.0, 2.0, 2.0, 1.0, 1.0, 1.0, 1.0];

/// Floor for the temporal and dominance sub-scores. Only collision and
/// duration can veto a note.
pub const DENSITY_FLOOR: f64 = 0.05;

/// Empirical release decay of a note, in dB/s. Faster for higher pitches.
pub fn decay_rate_db_per_s(midi: u8) -> f64 {
    0.26 * (0.049 * midi as f64).exp()
}

/// Fraction of a note's amplitude left `t` seconds after its offset.
pub fn decay_remaining_amplitude(midi: u8, t: f64) -> f64 {
    if t <= 0.0 {
        return 1.0;
    }
    10f64.powf(-decay_rate_db_per_s(midi) * t / 20.0)
}

/// Outcome of scoring one note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsolationAssessment {
    pub score: f64,
    pub tier: IsolationTier,
    pub sub_scores: SubScores,
    pub harmonic_mask: [bool; N_HARMONICS],
}

impl IsolationAssessment {
    /// Isolated reference recordings: gold, fully clean, no computation.
    pub fn ground_truth() -> Self {
        Self {
            score: 1.0,
            tier: IsolationTier::Gold,
            sub_scores: SubScores::uniform(1.0),
            harmonic_mask: [true; N_HARMONICS],
        }
    }

    fn too_short() -> Self {
        Self {
            score: 0.0,
            tier: IsolationTier::Reject,
            sub_scores: SubScores::uniform(0.0),
            harmonic_mask: [false; N_HARMONICS],
        }
    }
}

impl NoteEvent {
    /// Record a scoring result. A note leaves `Pending` exactly once.
    pub fn apply_assessment(&mut self, a: &IsolationAssessment) -> Result<()> {
        if self.isolation_tier != IsolationTier::Pending {
            return Err(PipelineError::AlreadyScored { id: self.id.clone() });
        }
        self.isolation_score = a.score;
        self.isolation_tier = a.tier;
        self.sub_scores = Some(a.sub_scores);
        self.harmonic_mask = a.harmonic_mask;
        Ok(())
    }
}

/// Time range over which contamination is judged: 50 ms after onset up to
/// 800 ms or the note end, or the whole note if that range is empty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisSpan {
    pub start_s: f64,
    pub end_s: f64,
}

impl AnalysisSpan {
    pub fn for_note(note: &NoteEvent) -> Self {
        let start_s = note.onset_s + 0.050;
        let end_s = (note.onset_s + 0.800).min(note.offset_s);
        if start_s >= end_s {
            Self {
                start_s: note.onset_s,
                end_s: note.offset_s,
            }
        } else {
            Self { start_s, end_s }
        }
    }

    pub fn mid_s(&self) -> f64 {
        (self.start_s + self.end_s) / 2.0
    }

    /// `other` is held (sounding) somewhere inside the span.
    fn overlaps(&self, other: &NoteEvent) -> bool {
        other.onset_s < self.end_s && other.offset_s > self.start_s
    }

    /// `other` was released before the span started.
    fn released_before(&self, other: &NoteEvent) -> bool {
        other.offset_s < self.start_s
    }
}

/// Other notes sharing the target's recording (excluding the target itself).
fn neighbours<'a>(target: &'a NoteEvent, file_notes: &'a [&'a NoteEvent]) -> impl Iterator<Item = &'a NoteEvent> + 'a {
    file_notes
        .iter()
        .copied()
        .filter(move |o| o.id != target.id && o.source_file == target.source_file)
}

/// Temporal isolation: each neighbour with relative (decayed) amplitude
/// above 0.1 costs 0.10·min(rel, 1). Floored at [`DENSITY_FLOOR`].
pub fn score_temporal(target: &NoteEvent, file_notes: &[&NoteEvent], span: AnalysisSpan) -> f64 {
    let target_amp = target.amplitude.max(1e-6);
    let mut score = 1.0;
    for other in neighbours(target, file_notes) {
        let rel = if span.overlaps(other) {
            other.amplitude / target_amp
        } else if span.released_before(other) {
            let remaining = decay_remaining_amplitude(other.midi_note, span.start_s - other.offset_s);
            remaining * other.amplitude / target_amp
        } else {
            continue;
        };
        if rel > 0.1 {
            score -= 0.10 * rel.min(1.0);
        }
    }
    f64::max(DENSITY_FLOOR, score)
}

/// Which of the target's harmonics land within 50 cents of any harmonic of
/// any concurrent pitch. Returns (weighted clean fraction, clean mask).
pub fn harmonic_collision_check(target_midi: u8, concurrent_midis: &[u8]) -> (f64, [bool; N_HARMONICS]) {
    let threshold = collision_ratio();
    let target_f0 = midi_to_hz(target_midi as f64);
    let mut mask = [true; N_HARMONICS];

    for (h_target, clean) in mask.iter_mut().enumerate() {
        let fh = target_f0 * (h_target + 1) as f64;
        *clean = !concurrent_midis.iter().any(|&other| {
            let other_f0 = midi_to_hz(other as f64);
            (1..=N_HARMONICS).any(|h_other| {
                let fo = other_f0 * h_other as f64;
                let ratio = fh.max(fo) / fh.min(fo).max(1e-6);
                ratio < threshold
            })
        });
    }

    let total: f64 = HARMONIC_WEIGHTS.iter().sum();
    let clean: f64 = HARMONIC_WEIGHTS
        .iter()
        .zip(&mask)
        .filter(|(_, &c)| c)
        .map(|(w, _)| w)
        .sum();
    (clean / total, mask)
}

/// Harmonic collision against neighbours that are held during the span or
/// released with `remaining × amplitude > 0.05`.
pub fn score_harmonic_collision(
    target: &NoteEvent,
    file_notes: &[&NoteEvent],
    span: AnalysisSpan,
) -> (f64, [bool; N_HARMONICS]) {
    let concurrent: Vec<u8> = neighbours(target, file_notes)
        .filter(|other| {
            if span.overlaps(other) {
                true
            } else if span.released_before(other) {
                let remaining = decay_remaining_amplitude(other.midi_note, span.start_s - other.offset_s);
                remaining * other.amplitude > 0.05
            } else {
                false
            }
        })
        .map(|other| other.midi_note)
        .collect();

    if concurrent.is_empty() {
        return (1.0, [true; N_HARMONICS]);
    }
    harmonic_collision_check(target.midi_note, &concurrent)
}

/// Share of the span's energy proxy (amplitude, decayed to the span
/// midpoint for released notes) that belongs to the target.
pub fn score_energy_dominance(target: &NoteEvent, file_notes: &[&NoteEvent], span: AnalysisSpan) -> f64 {
    let target_energy = target.amplitude;
    let mut total = target_energy;
    for other in neighbours(target, file_notes) {
        if span.overlaps(other) {
            total += other.amplitude;
        } else if span.released_before(other) {
            let remaining = decay_remaining_amplitude(other.midi_note, span.mid_s() - other.offset_s);
            total += remaining * other.amplitude;
        }
    }
    if total < 1e-10 {
        return 1.0;
    }
    (target_energy / total).clamp(0.0, 1.0)
}

/// Duration adequacy. Notes of 150 ms or less are too short to analyse.
pub fn score_duration(duration_s: f64) -> f64 {
    // Whole microseconds, so offset - onset lands on the same step for any onset.
    let micros = (duration_s * 1e6).round();
    if micros <= 150_000.0 {
        0.0
    } else if micros < 300_000.0 {
        0.3
    } else if micros < 600_000.0 {
        0.7
    } else {
        1.0
    }
}

/// Weighted geometric mean of the sub-scores. Collision or duration at
/// zero vetoes; temporal and dominance are floored instead.
pub fn composite_score(temporal: f64, collision: f64, dominance: f64, duration: f64) -> f64 {
    if collision <= 0.0 || duration <= 0.0 {
        return 0.0;
    }
    let temporal = temporal.max(DENSITY_FLOOR);
    let dominance = dominance.max(DENSITY_FLOOR);
    let log_score = 0.35 * collision.ln() + 0.20 * temporal.ln() + 0.20 * dominance.ln() + 0.25 * duration.ln();
    log_score.exp()
}

/// Score one note against the notes of its recording. Pure: reads no audio
/// and depends only on its inputs (including their order).
pub fn assess_note(note: &NoteEvent, file_notes: &[&NoteEvent]) -> IsolationAssessment {
    if note.is_ground_truth() {
        return IsolationAssessment::ground_truth();
    }

    let duration = score_duration(note.duration_s());
    if duration == 0.0 {
        return IsolationAssessment::too_short();
    }

    let span = AnalysisSpan::for_note(note);
    let temporal = score_temporal(note, file_notes, span);
    let (collision, harmonic_mask) = score_harmonic_collision(note, file_notes, span);
    let dominance = score_energy_dominance(note, file_notes, span);

    let score = composite_score(temporal, collision, dominance, duration);
    trace!(
        "{}: T={:.3} C={:.3} D={:.3} L={:.1} → {:.4}",
        note.id,
        temporal,
        collision,
        dominance,
        duration,
        score
    );

    IsolationAssessment {
        score,
        tier: IsolationTier::from_score(score),
        sub_scores: SubScores {
            temporal,
            collision,
            dominance,
            duration,
        },
        harmonic_mask,
    }
}

// ─── Batch scoring ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounts {
    pub gold: usize,
    pub silver: usize,
    pub bronze: usize,
    pub reject: usize,
}

impl TierCounts {
    pub fn add(&mut self, tier: IsolationTier) {
        match tier {
            IsolationTier::Gold => self.gold += 1,
            IsolationTier::Silver => self.silver += 1,
            IsolationTier::Bronze => self.bronze += 1,
            IsolationTier::Reject | IsolationTier::Pending => self.reject += 1,
        }
    }

    pub fn usable(&self) -> usize {
        self.gold + self.silver + self.bronze
    }

    pub fn total(&self) -> usize {
        self.usable() + self.reject
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScoringSummary {
    pub tiers: TierCounts,
    /// Notes left untouched because they had already left `Pending`.
    pub already_scored: usize,
    pub usable_midi_range: Option<(u8, u8)>,
    pub per_source: BTreeMap<String, TierCounts>,
}

impl ScoringSummary {
    fn from_notes(notes: &[NoteEvent], already_scored: usize) -> Self {
        let mut summary = ScoringSummary {
            already_scored,
            ..Default::default()
        };
        for note in notes {
            summary.tiers.add(note.isolation_tier);
            let source = std::path::Path::new(&note.source_file)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| note.source_file.clone());
            summary.per_source.entry(source).or_default().add(note.isolation_tier);
            if note.isolation_tier.at_least(IsolationTier::Bronze) {
                let m = note.midi_note;
                summary.usable_midi_range = Some(match summary.usable_midi_range {
                    Some((lo, hi)) => (lo.min(m), hi.max(m)),
                    None => (m, m),
                });
            }
        }
        summary
    }

    pub fn log(&self) {
        let total = self.tiers.total();
        info!("Isolation scoring summary ({} notes):", total);
        for (name, count) in [
            ("gold", self.tiers.gold),
            ("silver", self.tiers.silver),
            ("bronze", self.tiers.bronze),
            ("reject", self.tiers.reject),
        ] {
            let pct = 100.0 * count as f64 / total.max(1) as f64;
            info!("  {:>7}: {:>5} ({:>5.1}%)", name, count, pct);
        }
        info!("  usable: {:>5} (bronze+)", self.tiers.usable());
        if self.already_scored > 0 {
            info!("  already scored (left as-is): {}", self.already_scored);
        }
        if let Some((lo, hi)) = self.usable_midi_range {
            info!("  MIDI range (usable): {}-{}", lo, hi);
        }
        info!("Per-source breakdown:");
        for (src, c) in &self.per_source {
            info!(
                "  {}: {} total, {} usable (G:{} S:{} B:{})",
                src,
                c.total(),
                c.usable(),
                c.gold,
                c.silver,
                c.bronze
            );
        }
    }
}

/// Score every pending note in place, one worker shard per recording.
/// Notes that have already left `Pending` are skipped with a warning.
pub fn score_notes(notes: &mut [NoteEvent], workers: usize) -> ScoringSummary {
    let mut by_file: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, note) in notes.iter().enumerate() {
        by_file.entry(note.source_file.as_str()).or_default().push(i);
    }

    let assessments: Vec<Vec<(usize, IsolationAssessment)>> = {
        let notes_ref: &[NoteEvent] = notes;
        let shards: Vec<Vec<usize>> = by_file.into_values().collect();
        run_sharded(shards, workers, |indices| {
            let file_notes: Vec<&NoteEvent> = indices.iter().map(|&i| &notes_ref[i]).collect();
            indices
                .iter()
                .filter(|&&i| notes_ref[i].isolation_tier == IsolationTier::Pending)
                .map(|&i| (i, assess_note(&notes_ref[i], &file_notes)))
                .collect()
        })
    };

    let mut already_scored = 0;
    let mut scored = vec![false; notes.len()];
    for (i, assessment) in assessments.into_iter().flatten() {
        if let Err(e) = notes[i].apply_assessment(&assessment) {
            warn!("{}", e);
            continue;
        }
        scored[i] = true;
    }
    for (note, &was_scored) in notes.iter().zip(&scored) {
        if was_scored {
            continue;
        }
        // Reference notes are routinely injected at gold.
        if note.is_ground_truth() {
            debug!("Reference note {} kept at {}", note.id, note.isolation_tier);
            continue;
        }
        warn!("Note {} already has tier {}; not rescored", note.id, note.isolation_tier);
        already_scored += 1;
    }

    ScoringSummary::from_notes(notes, already_scored)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str, onset: f64, offset: f64, midi: u8, amp: f64) -> NoteEvent {
        NoteEvent {
            id: id.into(),
            onset_s: onset,
            offset_s: offset,
            midi_note: midi,
            measured_f0: None,
            amplitude: amp,
            velocity_midi: 80,
            source_file: "rec.wav".into(),
            source_type: SourceType::Polyphonic,
            isolation_score: 0.0,
            isolation_tier: IsolationTier::Pending,
            harmonic_mask: [true; N_HARMONICS],
            sub_scores: None,
        }
    }

    fn assess_in(target: &NoteEvent, all: &[NoteEvent]) -> IsolationAssessment {
        let refs: Vec<&NoteEvent> = all.iter().collect();
        assess_note(target, &refs)
    }

    #[test]
    fn test_decay_model() {
        assert_eq!(decay_remaining_amplitude(60, 0.0), 1.0);
        assert_eq!(decay_remaining_amplitude(60, -1.0), 1.0);
        let rate = decay_rate_db_per_s(60);
        assert!((rate - 0.26 * (0.049f64 * 60.0).exp()).abs() < 1e-12);
        let r = decay_remaining_amplitude(60, 1.0);
        assert!((20.0 * r.log10() + rate).abs() < 1e-9);
        assert!(decay_rate_db_per_s(90) > decay_rate_db_per_s(40));
    }

    #[test]
    fn test_duration_boundaries() {
        assert_eq!(score_duration(0.100), 0.0);
        assert_eq!(score_duration(0.150), 0.0);
        assert_eq!(score_duration(0.151), 0.3);
        assert_eq!(score_duration(0.299), 0.3);
        assert_eq!(score_duration(0.300), 0.7);
        assert_eq!(score_duration(0.600), 1.0);
        assert_eq!(score_duration(3.0), 1.0);
    }

    #[test]
    fn test_duration_boundary_independent_of_onset() {
        for onset in [0.0, 1.0, 3.7, 10.2, 1234.56] {
            for (len, expected) in [(0.150, 0.0), (0.300, 0.7), (0.600, 1.0)] {
                let n = note("n", onset, onset + len, 60, 0.5);
                assert_eq!(score_duration(n.duration_s()), expected, "onset {} len {}", onset, len);
            }
            let short = note("n", onset, onset + 0.150, 60, 0.5);
            let a = assess_in(&short, &[short.clone()]);
            assert_eq!(a.tier, IsolationTier::Reject, "onset {}", onset);
        }
    }

    #[test]
    fn test_150ms_note_rejected_151ms_scored() {
        let short = note("a", 0.0, 0.150, 60, 0.5);
        let a = assess_in(&short, std::slice::from_ref(&short));
        assert_eq!(a.score, 0.0);
        assert_eq!(a.tier, IsolationTier::Reject);
        assert_eq!(a.sub_scores.duration, 0.0);

        let ok = note("b", 0.0, 0.151, 60, 0.5);
        let a = assess_in(&ok, std::slice::from_ref(&ok));
        assert_eq!(a.sub_scores.duration, 0.3);
        assert!(a.score > 0.0);
    }

    #[test]
    fn test_lone_long_note_is_gold() {
        let n = note("solo", 1.0, 3.0, 60, 0.5);
        let a = assess_in(&n, std::slice::from_ref(&n));
        assert!((a.score - 1.0).abs() < 1e-12);
        assert_eq!(a.tier, IsolationTier::Gold);
        assert_eq!(a.harmonic_mask, [true; N_HARMONICS]);
    }

    #[test]
    fn test_same_pitch_class_collides_everywhere() {
        // Unison: every partial of the target collides.
        let a = note("a", 0.0, 2.0, 60, 0.5);
        let b = note("b", 0.0, 2.0, 60, 0.5);
        let all = vec![a.clone(), b];
        let res = assess_in(&a, &all);
        assert_eq!(res.sub_scores.collision, 0.0);
        assert_eq!(res.score, 0.0);
        assert_eq!(res.tier, IsolationTier::Reject);
        assert_eq!(res.harmonic_mask, [false; N_HARMONICS]);
    }

    #[test]
    fn test_octave_above_masks_even_harmonics() {
        let (score, mask) = harmonic_collision_check(48, &[60]);
        // C3 partials 2,4,6,8 coincide with C4 partials 1,2,3,4.
        assert_eq!(mask, [true, false, true, false, true, false, true, false]);
        let expected = (2.0 + 2.0 + 1.0 + 1.0) / 12.0;
        assert!((score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_collision_threshold_is_50_cents() {
        assert!((collision_ratio() - 1.0293).abs() < 1e-4);
        // A semitone (100 cents) apart: fundamentals don't collide.
        let (_, mask) = harmonic_collision_check(60, &[61]);
        assert!(mask[0]);
    }

    #[test]
    fn test_temporal_floor_never_vetoes() {
        let target = note("t", 0.0, 2.0, 40, 0.2);
        let mut all = vec![target.clone()];
        for i in 0..30 {
            // Loud, held, non-colliding neighbours (pitches well apart).
            all.push(note(&format!("o{}", i), 0.0, 2.0, 100 + (i % 5) as u8, 1.0));
        }
        let refs: Vec<&NoteEvent> = all.iter().collect();
        let t = score_temporal(&target, &refs, AnalysisSpan::for_note(&target));
        assert_eq!(t, DENSITY_FLOOR);
    }

    #[test]
    fn test_released_neighbour_decays_out() {
        let target = note("t", 10.0, 12.0, 60, 0.5);
        // High note released 9 s earlier: long gone.
        let gone = note("g", 0.0, 1.0, 96, 1.0);
        // Same-pitch note released just before the span: still ringing.
        let ringing = note("r", 9.0, 10.04, 60, 1.0);
        let all = vec![target.clone(), gone.clone()];
        let refs: Vec<&NoteEvent> = all.iter().collect();
        let span = AnalysisSpan::for_note(&target);
        assert_eq!(score_temporal(&target, &refs, span), 1.0);
        assert_eq!(score_harmonic_collision(&target, &refs, span).0, 1.0);

        let all = vec![target.clone(), ringing];
        let refs: Vec<&NoteEvent> = all.iter().collect();
        assert_eq!(score_harmonic_collision(&target, &refs, span).0, 0.0);
        assert!(score_temporal(&target, &refs, span) < 1.0);
    }

    #[test]
    fn test_dominance() {
        let target = note("t", 0.0, 2.0, 60, 0.6);
        let other = note("o", 0.0, 2.0, 67, 0.2);
        let all = vec![target.clone(), other];
        let refs: Vec<&NoteEvent> = all.iter().collect();
        let d = score_energy_dominance(&target, &refs, AnalysisSpan::for_note(&target));
        assert!((d - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_other_recordings_ignored() {
        let target = note("t", 0.0, 2.0, 60, 0.5);
        let mut elsewhere = note("e", 0.0, 2.0, 60, 0.5);
        elsewhere.source_file = "other.wav".into();
        let a = assess_in(&target, &[target.clone(), elsewhere]);
        assert_eq!(a.tier, IsolationTier::Gold);
    }

    #[test]
    fn test_composite_veto_and_floor() {
        assert_eq!(composite_score(1.0, 0.0, 1.0, 1.0), 0.0);
        assert_eq!(composite_score(1.0, 1.0, 1.0, 0.0), 0.0);
        // Zero temporal/dominance are floored, not vetoed.
        let s = composite_score(0.0, 1.0, 0.0, 1.0);
        let expected = (0.20 * 0.05f64.ln() + 0.20 * 0.05f64.ln()).exp();
        assert!((s - expected).abs() < 1e-12);
        assert!(s > 0.0);
    }

    #[test]
    fn test_ground_truth_bypasses_scoring() {
        let mut gt = note("obm_60", 0.0, 0.1, 60, 0.01);
        gt.source_type = SourceType::IsolatedReference;
        let unison = note("x", 0.0, 2.0, 60, 1.0);
        let a = assess_in(&gt, &[gt.clone(), unison]);
        assert_eq!(a, IsolationAssessment::ground_truth());
    }

    #[test]
    fn test_score_notes_is_one_shot() {
        let mut notes = vec![note("a", 0.0, 2.0, 60, 0.5), note("b", 5.0, 7.0, 64, 0.5)];
        notes[1].isolation_tier = IsolationTier::Silver;
        notes[1].isolation_score = 0.6;
        let summary = score_notes(&mut notes, 2);
        assert_eq!(notes[0].isolation_tier, IsolationTier::Gold);
        assert_eq!(notes[1].isolation_tier, IsolationTier::Silver);
        assert_eq!(notes[1].isolation_score, 0.6);
        assert_eq!(summary.already_scored, 1);

        let err = notes[0].apply_assessment(&IsolationAssessment::ground_truth());
        assert!(matches!(err, Err(PipelineError::AlreadyScored { .. })));
    }

    #[test]
    fn test_injected_reference_notes_not_counted_as_rescored() {
        let mut gt = note("obm_60", 0.0, 1.0, 60, 0.5);
        gt.source_type = SourceType::IsolatedReference;
        gt.isolation_tier = IsolationTier::Gold;
        gt.isolation_score = 1.0;
        let mut notes = vec![gt.clone(), note("a", 5.0, 7.0, 64, 0.5)];
        let summary = score_notes(&mut notes, 1);
        assert_eq!(summary.already_scored, 0);
        assert_eq!(notes[0], gt);
        assert_eq!(notes[1].isolation_tier, IsolationTier::Gold);
    }

    #[test]
    fn test_scoring_deterministic_and_consistent() {
        let make = || {
            vec![
                note("a", 0.0, 1.2, 60, 0.8),
                note("b", 0.3, 0.9, 64, 0.4),
                note("c", 0.5, 2.0, 67, 0.6),
                note("d", 1.0, 1.1, 72, 0.3),
                note("e", 1.5, 2.5, 48, 0.9),
            ]
        };
        let mut first = make();
        let mut second = make();
        score_notes(&mut first, 1);
        score_notes(&mut second, 4);
        assert_eq!(first, second);
        for n in &first {
            assert_eq!(n.harmonic_mask.len(), N_HARMONICS);
            assert!((0.0..=1.0).contains(&n.isolation_score), "{}", n.isolation_score);
            assert_eq!(n.isolation_tier, IsolationTier::from_score(n.isolation_score));
        }
    }
}
