use crate::error::{PipelineError, Result};
use hound::{SampleFormat, WavReader};
use log::{debug, info};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A whole recording, mixed down to mono at its native sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f64>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn sample_rate_f64(&self) -> f64 {
        self.sample_rate as f64
    }

    pub fn duration_s(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode a WAV file (int or float PCM, any channel count) into mono f64.
pub fn decode_wav(path: &Path) -> Result<DecodedAudio> {
    let decode_err = |reason: String| PipelineError::AudioDecode {
        path: path.to_path_buf(),
        reason,
    };

    let reader = WavReader::open(path).map_err(|e| decode_err(e.to_string()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f64> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(|v| v as f64))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| decode_err(e.to_string()))?,
        SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f64;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f64 / max))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| decode_err(e.to_string()))?
        }
    };

    // Mix down to mono
    let samples: Vec<f64> = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f64>() / channels as f64)
            .collect()
    };

    let audio = DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
    };
    debug!(
        "WAV: {:?}  {} Hz  {} ch  {:?}  {} bit  {:.2}s",
        path.file_name().unwrap_or_default(),
        spec.sample_rate,
        channels,
        spec.sample_format,
        spec.bits_per_sample,
        audio.duration_s(),
    );
    Ok(audio)
}

type Slot = Arc<OnceCell<std::result::Result<Arc<DecodedAudio>, String>>>;

/// Shared decode-once cache keyed by path. Each file is decoded at most once
/// too so a bad file is reported once per distinct error, not per note.
/// Slots live until `release`d or the cache is dropped.
/// too so a bad file is reported once per distinct error, not per note.
#[derive(Default)]
pub struct AudioCache {
    slots: Mutex<HashMap<PathBuf, Slot>>,
}

impl AudioCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&self, path: &Path) -> Result<Arc<DecodedAudio>> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.entry(path.to_path_buf()).or_default().clone()
        };

        let loaded = slot.get_or_init(|| {
            info!("Loading audio: {}", path.display());
            decode_wav(path).map(Arc::new).map_err(|e| e.to_string())
        });

        loaded.clone().map_err(|reason| PipelineError::AudioDecode {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Forget `path`. Its audio is freed once the last caller drops its
    /// `Arc`. Returns whether a slot was present.
    pub fn release(&self, path: &Path) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
