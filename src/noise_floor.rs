//! Per-harmonic SNR from the inter-harmonic noise floor.
//!
//! For harmonic index h (0-based), noise is read at (h + 1.5)·f0, midway
//! between H(h+1) and H(h+2), as the median magnitude over ±1%. The median
//! ignores stray peaks that a max search would latch onto.

use crate::dsp::{PaddedSpectrum, AMP_FLOOR, MIN_SPECTRUM_SAMPLES, SEARCH_PCT};
use crate::types::{SnrProfile, N_HARMONICS};

/// Measurement range for SNR, relative to onset (the early-sustain window).
pub const SNR_WINDOW_S: (f64, f64) = (0.050, 0.200);

/// Noise amplitude per harmonic index from an already computed spectrum.
pub fn noise_floor(spectrum: &PaddedSpectrum, f0: f64) -> [f64; N_HARMONICS] {
    let mut noise = [AMP_FLOOR; N_HARMONICS];
    for (h, slot) in noise.iter_mut().enumerate() {
        let freq = (h as f64 + 1.5) * f0;
        if spectrum.near_nyquist(freq) {
            continue;
        }
        if let Some(median) = spectrum.median_in(freq * (1.0 - SEARCH_PCT), freq * (1.0 + SEARCH_PCT)) {
            *slot = median.max(AMP_FLOOR);
        }
    }
    noise
}

/// SNR profile of one segment. Segments shorter than 128 samples, and
/// harmonics where either amplitude sits on the floor, read NaN.
pub fn measure_snr(segment: &[f64], sample_rate: f64, f0: f64) -> SnrProfile {
    if segment.len() < MIN_SPECTRUM_SAMPLES {
        return SnrProfile::undefined();
    }
    let spectrum = PaddedSpectrum::new(segment, sample_rate);
    let harmonics = spectrum.harmonic_peaks(f0, N_HARMONICS);
    let noise = noise_floor(&spectrum, f0);

    let mut snr = [f64::NAN; N_HARMONICS];
    for h in 0..N_HARMONICS {
        let signal = harmonics.amps[h];
        if signal > AMP_FLOOR && noise[h] > AMP_FLOOR {
            snr[h] = 20.0 * (signal / noise[h]).log10();
        }
    }
    SnrProfile(snr)
}

/// SNR over the early-sustain range of a note inside a full recording.
pub fn measure_note_snr(audio: &[f64], sample_rate: f64, f0: f64, onset_s: f64) -> SnrProfile {
    let start = (((onset_s + SNR_WINDOW_S.0) * sample_rate).max(0.0) as usize).min(audio.len());
    let end = (((onset_s + SNR_WINDOW_S.1) * sample_rate).max(0.0) as usize).min(audio.len());
    if end <= start {
        return SnrProfile::undefined();
    }
    measure_snr(&audio[start..end], sample_rate, f0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::test_helpers::{harmonic_tone, sine_wave};

    const SR: u32 = 48000;

    /// Deterministic low-level broadband noise (LCG, uniform ±amp).
    fn lcg_noise(n: usize, amp: f64, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let u = (state >> 11) as f64 / (1u64 << 53) as f64;
                amp * (2.0 * u - 1.0)
            })
            .collect()
    }

    #[test]
    fn test_strong_harmonics_have_high_snr() {
        let tone = harmonic_tone(220.0, &[0.5, 0.25, 0.1], SR, 150);
        let noise = lcg_noise(tone.len(), 1e-4, 7);
        let x: Vec<f64> = tone.iter().zip(&noise).map(|(a, b)| a + b).collect();
        let snr = measure_snr(&x, SR as f64, 220.0);
        assert!(snr.passes(0, 40.0), "H1 snr={:?}", snr.get(0));
        assert!(snr.passes(1, 30.0), "H2 snr={:?}", snr.get(1));
        assert!(snr.passes(2, 20.0), "H3 snr={:?}", snr.get(2));
    }

    #[test]
    fn test_absent_harmonic_below_threshold() {
        // Only H1 present: H5 sits at the noise level.
        let tone = sine_wave(220.0, 0.5, SR, 150);
        let noise = lcg_noise(tone.len(), 1e-3, 11);
        let x: Vec<f64> = tone.iter().zip(&noise).map(|(a, b)| a + b).collect();
        let snr = measure_snr(&x, SR as f64, 220.0);
        assert!(snr.passes(0, 40.0), "H1 snr={:?}", snr.get(0));
        assert!(!snr.passes(4, 20.0), "H5 snr={:?}", snr.get(4));
    }

    #[test]
    fn test_short_segment_is_undefined() {
        let x = sine_wave(220.0, 0.5, SR, 2); // 96 samples
        let snr = measure_snr(&x, SR as f64, 220.0);
        assert!((0..N_HARMONICS).all(|h| snr.get(h).is_none()));
    }

    #[test]
    fn test_noise_near_nyquist_is_floor() {
        // f0 = 3 kHz at 16 kHz: (h+1.5)·f0 passes 7.9 kHz from h = 2 on.
        let x = sine_wave(3000.0, 0.5, 16000, 100);
        let spectrum = PaddedSpectrum::new(&x, 16000.0);
        let noise = noise_floor(&spectrum, 3000.0);
        assert_eq!(noise[2], AMP_FLOOR);
        assert_eq!(noise[7], AMP_FLOOR);
        let snr = measure_snr(&x, 16000.0, 3000.0);
        assert!(snr.get(2).is_none(), "floor noise → NaN SNR");
    }

    #[test]
    fn test_note_snr_window_clipped_to_audio() {
        let audio = sine_wave(220.0, 0.5, SR, 100);
        // Onset at 90 ms: range starts past the end of the audio.
        let snr = measure_note_snr(&audio, SR as f64, 220.0, 0.09);
        assert!(snr.get(0).is_none());
    }
}
