//! Spectral measurement primitives: Goertzel narrowband magnitude, padded
//! Hann spectrum with per-harmonic peak search, dB conversion, and RMS.

use rustfft::{num_complex::Complex, FftPlanner};

/// Floor applied to amplitudes before any logarithm.
pub const AMP_FLOOR: f64 = 1e-20;

/// Harmonics this close to Nyquist (Hz) are not searched.
pub const NYQUIST_GUARD_HZ: f64 = 100.0;

/// Relative half-width of every frequency search (±1%).
pub const SEARCH_PCT: f64 = 0.01;

/// Shortest segment worth a spectrum. Callers reject anything shorter.
pub const MIN_SPECTRUM_SAMPLES: usize = 128;

/// Zero-padding factor for the harmonic spectrum.
const PAD_FACTOR: usize = 4;

/// Goertzel algorithm: amplitude of the DFT bin nearest `freq`, evaluated
/// over the whole block and scaled 2/N (single-sided).
/// Returns 0.0 for an empty block or when the nearest bin is DC or ≥ N/2.
pub fn goertzel_magnitude(samples: &[f64], freq: f64, sample_rate: f64) -> f64 {
    let n = samples.len();
    if n == 0 {
        return 0.0;
    }
    let k = (freq * n as f64 / sample_rate).round();
    if k <= 0.0 || k >= (n / 2) as f64 {
        return 0.0;
    }
    let w = 2.0 * std::f64::consts::PI * k / n as f64;
    let coeff = 2.0 * w.cos();
    let mut s1 = 0.0f64;
    let mut s2 = 0.0f64;
    for &sample in samples {
        let s0 = sample + coeff * s1 - s2;
        s2 = s1;
        s1 = s0;
    }
    (s1 * s1 + s2 * s2 - coeff * s1 * s2).abs().sqrt() / n as f64 * 2.0
}

/// Goertzel magnitude at 11 frequencies spread evenly over ±`search_pct`
/// of `target_freq`; returns the largest. Tolerates tuning drift.
pub fn narrowband_magnitude(samples: &[f64], sample_rate: f64, target_freq: f64, search_pct: f64) -> f64 {
    const STEPS: usize = 11;
    let mut best = 0.0f64;
    for i in 0..STEPS {
        let offset = -search_pct + 2.0 * search_pct * i as f64 / (STEPS - 1) as f64;
        let mag = goertzel_magnitude(samples, target_freq * (1.0 + offset), sample_rate);
        if mag > best {
            best = mag;
        }
    }
    best
}

/// Linear amplitude and measured frequency per harmonic, H1 first.
#[derive(Debug, Clone, PartialEq)]
pub struct HarmonicPeaks {
    pub amps: Vec<f64>,
    pub freqs: Vec<f64>,
}

/// Symmetric Hann window (matches `numpy.hanning`).
fn hann_window(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    let n_minus_1 = (n - 1) as f64;
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / n_minus_1).cos())
        .collect()
}

/// Single-sided magnitude spectrum of a Hann-windowed, 4×-zero-padded
/// segment, scaled so a sinusoid's peak bin reads its amplitude
/// (2/N for single-sided, ÷0.5 for Hann coherent gain).
pub struct PaddedSpectrum {
    magnitudes: Vec<f64>,
    bin_hz: f64,
    sample_rate: f64,
}

impl PaddedSpectrum {
    pub fn new(segment: &[f64], sample_rate: f64) -> Self {
        let n = segment.len();
        let nfft = (n * PAD_FACTOR).max(1);
        let window = hann_window(n.max(1));

        let mut buffer: Vec<Complex<f64>> = segment
            .iter()
            .zip(&window)
            .map(|(&s, &w)| Complex { re: s * w, im: 0.0 })
            .collect();
        buffer.resize(nfft, Complex { re: 0.0, im: 0.0 });

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(nfft);
        fft.process(&mut buffer);

        let scale = if n > 0 { 2.0 / n as f64 / 0.5 } else { 0.0 };
        let magnitudes = buffer
            .iter()
            .take(nfft / 2 + 1)
            .map(|c| c.norm() * scale)
            .collect();

        Self {
            magnitudes,
            bin_hz: sample_rate / nfft as f64,
            sample_rate,
        }
    }

    pub fn bin_freq(&self, k: usize) -> f64 {
        k as f64 * self.bin_hz
    }

    /// True when `freq` is too close to Nyquist to be searched.
    pub fn near_nyquist(&self, freq: f64) -> bool {
        freq >= self.sample_rate / 2.0 - NYQUIST_GUARD_HZ
    }

    /// Bin indices whose centre frequency lies in `[lo, hi]`.
    fn bins_in(&self, lo: f64, hi: f64) -> std::ops::Range<usize> {
        let last = self.magnitudes.len();
        let mut start = ((lo / self.bin_hz).floor().max(0.0) as usize).min(last);
        while start < last && self.bin_freq(start) < lo {
            start += 1;
        }
        let mut end = start;
        while end < last && self.bin_freq(end) <= hi {
            end += 1;
        }
        start..end
    }

    /// Largest bin in `[lo, hi]`: (magnitude, frequency). First bin wins ties.
    pub fn peak_in(&self, lo: f64, hi: f64) -> Option<(f64, f64)> {
        let mut best: Option<(f64, f64)> = None;
        for k in self.bins_in(lo, hi) {
            let mag = self.magnitudes[k];
            if best.map_or(true, |(m, _)| mag > m) {
                best = Some((mag, self.bin_freq(k)));
            }
        }
        best
    }

    /// Median magnitude over bins in `[lo, hi]`.
    pub fn median_in(&self, lo: f64, hi: f64) -> Option<f64> {
        let mut mags: Vec<f64> = self.magnitudes[self.bins_in(lo, hi)].to_vec();
        if mags.is_empty() {
            return None;
        }
        mags.sort_by(|a, b| a.total_cmp(b));
        let mid = mags.len() / 2;
        Some(if mags.len() % 2 == 0 {
            (mags[mid - 1] + mags[mid]) / 2.0
        } else {
            mags[mid]
        })
    }

    /// Peak search ±[`SEARCH_PCT`] around each harmonic of `f0`.
    /// Harmonics near Nyquist, or with no bin in range, get [`AMP_FLOOR`]
    /// at their nominal frequency.
    pub fn harmonic_peaks(&self, f0: f64, n_harmonics: usize) -> HarmonicPeaks {
        let mut amps = Vec::with_capacity(n_harmonics);
        let mut freqs = Vec::with_capacity(n_harmonics);
        for h in 1..=n_harmonics {
            let fh = f0 * h as f64;
            let peak = if self.near_nyquist(fh) {
                None
            } else {
                self.peak_in(fh * (1.0 - SEARCH_PCT), fh * (1.0 + SEARCH_PCT))
            };
            let (amp, freq) = peak.unwrap_or((AMP_FLOOR, fh));
            amps.push(amp);
            freqs.push(freq);
        }
        HarmonicPeaks { amps, freqs }
    }
}

/// FFT harmonic extraction: amplitude plus refined frequency of H1..Hn.
pub fn extract_harmonics_fft(segment: &[f64], sample_rate: f64, f0: f64, n_harmonics: usize) -> HarmonicPeaks {
    PaddedSpectrum::new(segment, sample_rate).harmonic_peaks(f0, n_harmonics)
}

/// Narrowband (Goertzel) harmonic extraction. Slower but more precise in
/// amplitude; frequencies are reported at their nominal values.
pub fn extract_harmonics_narrowband(segment: &[f64], sample_rate: f64, f0: f64, n_harmonics: usize) -> HarmonicPeaks {
    let mut amps = Vec::with_capacity(n_harmonics);
    let mut freqs = Vec::with_capacity(n_harmonics);
    for h in 1..=n_harmonics {
        let fh = f0 * h as f64;
        let amp = if fh >= sample_rate / 2.0 - NYQUIST_GUARD_HZ {
            AMP_FLOOR
        } else {
            narrowband_magnitude(segment, sample_rate, fh, SEARCH_PCT).max(AMP_FLOOR)
        };
        amps.push(amp);
        freqs.push(fh);
    }
    HarmonicPeaks { amps, freqs }
}

/// 20·log10(amp / reference), both floored at [`AMP_FLOOR`].
/// `reference` defaults to the first (H1) amplitude.
pub fn amps_to_db(amps: &[f64], reference: Option<f64>) -> Vec<f64> {
    let reference = reference
        .or_else(|| amps.first().copied())
        .unwrap_or(AMP_FLOOR)
        .max(AMP_FLOOR);
    amps.iter()
        .map(|&a| 20.0 * (a.max(AMP_FLOOR) / reference).log10())
        .collect()
}

/// Root mean square, floored at [`AMP_FLOOR`] (empty input → floor).
pub fn compute_rms(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return AMP_FLOOR;
    }
    let sum: f64 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f64).sqrt().max(AMP_FLOOR)
}

/// Test signal generators for unit tests.
#[cfg(test)]
pub mod test_helpers {
    use std::f64::consts::PI;

    /// Mono sine wave.
    pub fn sine_wave(freq_hz: f64, amp: f64, sr: u32, ms: u32) -> Vec<f64> {
        let n = (sr as u64 * ms as u64 / 1000) as usize;
        (0..n)
            .map(|i| amp * (2.0 * PI * freq_hz * i as f64 / sr as f64).sin())
            .collect()
    }

    /// Harmonic tone: `amps[h]` is the amplitude of harmonic h+1.
    pub fn harmonic_tone(f0: f64, amps: &[f64], sr: u32, ms: u32) -> Vec<f64> {
        let n = (sr as u64 * ms as u64 / 1000) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / sr as f64;
                amps.iter()
                    .enumerate()
                    .map(|(h, &a)| a * (2.0 * PI * f0 * (h + 1) as f64 * t).sin())
                    .sum()
            })
            .collect()
    }

    /// Sine with exponential decay expressed in dB per second.
    pub fn decaying_sine(freq_hz: f64, amp: f64, decay_db_s: f64, sr: u32, ms: u32) -> Vec<f64> {
        let n = (sr as u64 * ms as u64 / 1000) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / sr as f64;
                let env = 10f64.powf(-decay_db_s * t / 20.0);
                amp * env * (2.0 * PI * freq_hz * t).sin()
            })
            .collect()
    }
}
