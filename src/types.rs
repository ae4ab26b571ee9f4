use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Constants ──────────────────────────────────────────────────────────────

/// Harmonics measured per note (H1..H8).
pub const N_HARMONICS: usize = 8;

/// Discrete velocity levels the model renderer is driven at.
pub const VELOCITY_BUCKETS: [u8; 8] = [20, 35, 50, 65, 80, 95, 110, 127];

/// Post-onset offsets (s) at which H1 is sampled for the decay fit.
pub const DECAY_TIMES_S: [f64; 6] = [0.1, 0.3, 0.5, 0.8, 1.0, 1.5];

/// Velocity assumed for notes that arrive without one.
pub const DEFAULT_VELOCITY: u8 = 80;

/// Equal-tempered frequency of a MIDI note (A4 = 440 Hz).
pub fn midi_to_hz(midi: f64) -> f64 {
    440.0 * 2.0f64.powf((midi - 69.0) / 12.0)
}

/// Nearest member of [`VELOCITY_BUCKETS`]; ties resolve to the lower bucket.
pub fn bucket_velocity(velocity: u8) -> u8 {
    let mut best = VELOCITY_BUCKETS[0];
    for &b in &VELOCITY_BUCKETS[1..] {
        if (b as i16 - velocity as i16).abs() < (best as i16 - velocity as i16).abs() {
            best = b;
        }
    }
    best
}

/// Key under which model renderings are stored: `"{midi}_{bucket}"`.
pub fn model_key(midi: u8, velocity_bucket: u8) -> String {
    format!("{}_{}", midi, velocity_bucket)
}

// ─── Isolation tiers ────────────────────────────────────────────────────────

/// Quality grade assigned once by the isolation scorer.
/// `Pending` is the only state a note may be scored from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IsolationTier {
    Gold,
    Silver,
    Bronze,
    Reject,
    #[default]
    Pending,
}

impl IsolationTier {
    pub const ALL: [IsolationTier; 5] = [
        IsolationTier::Gold,
        IsolationTier::Silver,
        IsolationTier::Bronze,
        IsolationTier::Reject,
        IsolationTier::Pending,
    ];

    /// Map a composite isolation score to its tier.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.85 {
            IsolationTier::Gold
        } else if score >= 0.55 {
            IsolationTier::Silver
        } else if score >= 0.15 {
            IsolationTier::Bronze
        } else {
            IsolationTier::Reject
        }
    }

    /// Ordering used for eligibility checks (higher = cleaner).
    pub fn rank(self) -> i8 {
        match self {
            IsolationTier::Gold => 3,
            IsolationTier::Silver => 2,
            IsolationTier::Bronze => 1,
            IsolationTier::Reject => 0,
            IsolationTier::Pending => -1,
        }
    }

    pub fn at_least(self, min: IsolationTier) -> bool {
        self.rank() >= min.rank()
    }

    /// Sample weight of a training row taken from a note of this tier.
    pub fn weight(self) -> f64 {
        match self {
            IsolationTier::Gold => 1.0,
            IsolationTier::Silver => 0.6,
            _ => 0.3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IsolationTier::Gold => "gold",
            IsolationTier::Silver => "silver",
            IsolationTier::Bronze => "bronze",
            IsolationTier::Reject => "reject",
            IsolationTier::Pending => "pending",
        }
    }
}

impl fmt::Display for IsolationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for IsolationTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IsolationTier::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown isolation tier: {}", s))
    }
}

/// Where a note observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Detected inside a polyphonic recording; must be scored.
    #[default]
    Polyphonic,
    /// Isolated single-note reference recording; bypasses scoring as gold.
    #[serde(rename = "obm_isolated")]
    IsolatedReference,
}

// ─── Note events ────────────────────────────────────────────────────────────

/// Per-note isolation sub-scores, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub temporal: f64,
    pub collision: f64,
    pub dominance: f64,
    pub duration: f64,
}

impl SubScores {
    pub fn uniform(value: f64) -> Self {
        Self {
            temporal: value,
            collision: value,
            dominance: value,
            duration: value,
        }
    }
}

fn default_velocity() -> u8 {
    DEFAULT_VELOCITY
}

fn all_clean() -> [bool; N_HARMONICS] {
    [true; N_HARMONICS]
}

/// One note observation. Produced upstream by onset detection, then scored
/// exactly once (tier/score/mask written, never rewritten).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub id: String,
    pub onset_s: f64,
    pub offset_s: f64,
    pub midi_note: u8,
    /// Measured fundamental (Hz). Falls back to equal temperament when absent.
    #[serde(default)]
    pub measured_f0: Option<f64>,
    /// Relative amplitude estimate, used as the energy proxy when scoring.
    pub amplitude: f64,
    #[serde(default = "default_velocity")]
    pub velocity_midi: u8,
    pub source_file: String,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub isolation_score: f64,
    #[serde(default)]
    pub isolation_tier: IsolationTier,
    /// H1..H8, true = clean.
    #[serde(default = "all_clean")]
    pub harmonic_mask: [bool; N_HARMONICS],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_scores: Option<SubScores>,
}

impl NoteEvent {
    pub fn duration_s(&self) -> f64 {
        self.offset_s - self.onset_s
    }

    pub fn fundamental_hz(&self) -> f64 {
        self.measured_f0
            .filter(|f| *f > 0.0)
            .unwrap_or_else(|| midi_to_hz(self.midi_note as f64))
    }

    pub fn is_ground_truth(&self) -> bool {
        self.source_type == SourceType::IsolatedReference
    }
}

// ─── Nullable harmonic series ───────────────────────────────────────────────

/// Eight per-harmonic values paired with per-entry validity bits.
/// Serialized as an array of numbers with `null` for invalid entries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[Option<f64>; N_HARMONICS]", into = "[Option<f64>; N_HARMONICS]")]
pub struct HarmonicSeries {
    values: [f64; N_HARMONICS],
    valid: [bool; N_HARMONICS],
}

impl HarmonicSeries {
    /// All entries valid. Missing trailing values are padded as invalid.
    pub fn from_values(values: &[f64]) -> Self {
        let mut out = Self {
            values: [0.0; N_HARMONICS],
            valid: [false; N_HARMONICS],
        };
        for (i, &v) in values.iter().take(N_HARMONICS).enumerate() {
            out.values[i] = v;
            out.valid[i] = true;
        }
        out
    }

    pub fn get(&self, h: usize) -> Option<f64> {
        if h < N_HARMONICS && self.valid[h] {
            Some(self.values[h])
        } else {
            None
        }
    }

    pub fn invalidate(&mut self, h: usize) {
        if h < N_HARMONICS {
            self.valid[h] = false;
            self.values[h] = 0.0;
        }
    }

    /// Invalidate every harmonic whose mask entry is false (contaminated).
    pub fn apply_mask(&mut self, mask: &[bool; N_HARMONICS]) {
        for (h, &clean) in mask.iter().enumerate() {
            if !clean {
                self.invalidate(h);
            }
        }
    }
}

impl From<[Option<f64>; N_HARMONICS]> for HarmonicSeries {
    fn from(raw: [Option<f64>; N_HARMONICS]) -> Self {
        let mut out = Self {
            values: [0.0; N_HARMONICS],
            valid: [false; N_HARMONICS],
        };
        for (h, v) in raw.into_iter().enumerate() {
            if let Some(v) = v.filter(|v| v.is_finite()) {
                out.values[h] = v;
                out.valid[h] = true;
            }
        }
        out
    }
}

impl From<HarmonicSeries> for [Option<f64>; N_HARMONICS] {
    fn from(s: HarmonicSeries) -> Self {
        let mut out = [None; N_HARMONICS];
        for (h, slot) in out.iter_mut().enumerate() {
            *slot = s.get(h);
        }
        out
    }
}

/// Per-harmonic SNR in dB against the inter-harmonic noise floor.
/// NaN where either side could not be resolved; serialized as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[Option<f64>; N_HARMONICS]", into = "[Option<f64>; N_HARMONICS]")]
pub struct SnrProfile(pub [f64; N_HARMONICS]);

impl SnrProfile {
    pub fn undefined() -> Self {
        SnrProfile([f64::NAN; N_HARMONICS])
    }

    pub fn get(&self, h: usize) -> Option<f64> {
        self.0.get(h).copied().filter(|v| !v.is_nan())
    }

    /// True when harmonic `h` has a defined SNR at or above `threshold_db`.
    pub fn passes(&self, h: usize, threshold_db: f64) -> bool {
        self.get(h).is_some_and(|snr| snr >= threshold_db)
    }
}

impl From<[Option<f64>; N_HARMONICS]> for SnrProfile {
    fn from(raw: [Option<f64>; N_HARMONICS]) -> Self {
        let mut out = [f64::NAN; N_HARMONICS];
        for (h, v) in raw.into_iter().enumerate() {
            if let Some(v) = v {
                out[h] = v;
            }
        }
        SnrProfile(out)
    }
}

impl From<SnrProfile> for [Option<f64>; N_HARMONICS] {
    fn from(p: SnrProfile) -> Self {
        let mut out = [None; N_HARMONICS];
        for (h, slot) in out.iter_mut().enumerate() {
            *slot = p.get(h);
        }
        out
    }
}

// ─── Feature records ────────────────────────────────────────────────────────

/// Fixed analysis windows relative to note onset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    Attack,
    EarlySustain,
    Sustain,
}

impl WindowKind {
    pub const ALL: [WindowKind; 3] = [WindowKind::Attack, WindowKind::EarlySustain, WindowKind::Sustain];

    /// (start_s, end_s, minimum note duration_s) relative to onset.
    pub fn span(self) -> (f64, f64, f64) {
        match self {
            WindowKind::Attack => (0.000, 0.050, 0.100),
            WindowKind::EarlySustain => (0.050, 0.200, 0.250),
            WindowKind::Sustain => (0.200, 0.800, 0.500),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            WindowKind::Attack => "attack",
            WindowKind::EarlySustain => "early_sustain",
            WindowKind::Sustain => "sustain",
        }
    }
}

/// Harmonic measurements inside one analysis window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowHarmonics {
    pub amps_linear: HarmonicSeries,
    #[serde(rename = "amps_dB_rel_H1")]
    pub amps_db_rel_h1: HarmonicSeries,
    pub freqs_hz: HarmonicSeries,
}

/// The three named windows; `None` when a window could not be formed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisWindows {
    pub attack: Option<WindowHarmonics>,
    pub early_sustain: Option<WindowHarmonics>,
    pub sustain: Option<WindowHarmonics>,
}

impl AnalysisWindows {
    pub fn get(&self, kind: WindowKind) -> Option<&WindowHarmonics> {
        match kind {
            WindowKind::Attack => self.attack.as_ref(),
            WindowKind::EarlySustain => self.early_sustain.as_ref(),
            WindowKind::Sustain => self.sustain.as_ref(),
        }
    }

    pub fn set(&mut self, kind: WindowKind, value: Option<WindowHarmonics>) {
        match kind {
            WindowKind::Attack => self.attack = value,
            WindowKind::EarlySustain => self.early_sustain = value,
            WindowKind::Sustain => self.sustain = value,
        }
    }
}

/// H1 magnitude sampled at [`DECAY_TIMES_S`] plus the fitted decay rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayProfile {
    pub times_s: [f64; 6],
    pub h1_amps: [Option<f64>; 6],
    /// Positive = decaying.
    #[serde(rename = "decay_rate_dB_s")]
    pub decay_rate_db_s: Option<f64>,
}

/// Immutable per-note feature record, produced once per qualifying note
/// (real observation) or once per rendered model key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonicFeatureRecord {
    pub id: String,
    pub midi_note: u8,
    #[serde(default = "default_velocity")]
    pub velocity_midi: u8,
    #[serde(default)]
    pub isolation_tier: IsolationTier,
    #[serde(default)]
    pub isolation_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    pub f0: f64,
    pub duration_s: f64,
    pub windows: AnalysisWindows,
    pub decay: DecayProfile,
    #[serde(rename = "overshoot_dB")]
    pub overshoot_db: Option<f64>,
    pub centroid_attack: Option<f64>,
    pub centroid_sustain: Option<f64>,
    /// Inter-harmonic SNR over the early-sustain range of the recording.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snr_db: Option<SnrProfile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_velocity_nearest() {
        assert_eq!(bucket_velocity(1), 20);
        assert_eq!(bucket_velocity(64), 65);
        assert_eq!(bucket_velocity(100), 95);
        assert_eq!(bucket_velocity(127), 127);
        // Equidistant between 20 and 35 → lower bucket.
        assert_eq!(bucket_velocity(27), 20);
        assert_eq!(bucket_velocity(28), 35);
    }

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(IsolationTier::from_score(1.0), IsolationTier::Gold);
        assert_eq!(IsolationTier::from_score(0.85), IsolationTier::Gold);
        assert_eq!(IsolationTier::from_score(0.8499), IsolationTier::Silver);
        assert_eq!(IsolationTier::from_score(0.55), IsolationTier::Silver);
        assert_eq!(IsolationTier::from_score(0.15), IsolationTier::Bronze);
        assert_eq!(IsolationTier::from_score(0.1499), IsolationTier::Reject);
        assert_eq!(IsolationTier::from_score(0.0), IsolationTier::Reject);
    }

    #[test]
    fn test_tier_weights() {
        assert_eq!(IsolationTier::Gold.weight(), 1.0);
        assert_eq!(IsolationTier::Silver.weight(), 0.6);
        assert_eq!(IsolationTier::Bronze.weight(), 0.3);
        assert_eq!(IsolationTier::Pending.weight(), 0.3);
    }

    #[test]
    fn test_tier_parse() {
        assert_eq!("Silver".parse::<IsolationTier>().unwrap(), IsolationTier::Silver);
        assert!("platinum".parse::<IsolationTier>().is_err());
    }

    #[test]
    fn test_series_json_nulls() {
        let mut s = HarmonicSeries::from_values(&[1.0, 0.5, 0.25, 0.1, 0.0, 0.0, 0.0, 0.0]);
        s.invalidate(2);
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, "[1.0,0.5,null,0.1,0.0,0.0,0.0,0.0]");
        let back: HarmonicSeries = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(2), None);
        assert_eq!(back.get(1), Some(0.5));
    }

    #[test]
    fn test_snr_profile_nan_is_null() {
        let mut raw = [20.0; N_HARMONICS];
        raw[3] = f64::NAN;
        let p = SnrProfile(raw);
        assert!(p.passes(0, 10.0));
        assert!(!p.passes(3, 10.0));
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("null"));
        let back: SnrProfile = serde_json::from_str(&json).unwrap();
        assert!(back.0[3].is_nan());
    }

    #[test]
    fn test_note_defaults_from_minimal_json() {
        let json = r#"{"id":"n1","onset_s":1.0,"offset_s":2.0,"midi_note":60,
                       "amplitude":0.5,"source_file":"a.wav"}"#;
        let note: NoteEvent = serde_json::from_str(json).unwrap();
        assert_eq!(note.isolation_tier, IsolationTier::Pending);
        assert_eq!(note.harmonic_mask, [true; N_HARMONICS]);
        assert_eq!(note.velocity_midi, DEFAULT_VELOCITY);
        assert!((note.fundamental_hz() - midi_to_hz(60.0)).abs() < 1e-9);
    }

    #[test]
    fn test_ground_truth_source_type_name() {
        let json = r#"{"id":"obm_60","onset_s":0.0,"offset_s":2.0,"midi_note":60,
                       "amplitude":1.0,"source_file":"obm.wav","source_type":"obm_isolated"}"#;
        let note: NoteEvent = serde_json::from_str(json).unwrap();
        assert!(note.is_ground_truth());
    }
}
