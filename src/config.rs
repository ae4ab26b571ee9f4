use crate::types::IsolationTier;
use crate::worker_pool::default_workers;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// Run-wide knobs. Loaded from JSON; CLI flags override individual fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum real-side SNR (dB) for a harmonic-dependent target.
    pub snr_threshold_db: f64,
    /// When false, targets are not gated on SNR at all.
    pub snr_filter: bool,
    /// Lowest isolation tier eligible for feature extraction.
    pub min_tier: IsolationTier,
    /// Gold notes use narrowband amplitudes and nominal harmonic frequencies.
    pub precise_gold: bool,
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            snr_threshold_db: 10.0,
            snr_filter: true,
            min_tier: IsolationTier::Bronze,
            precise_gold: true,
            workers: default_workers(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Option<Self> {
        let data = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&data) {
            Ok(c) => {
                info!("Loaded config from {:?}", path);
                Some(c)
            }
            Err(e) => {
                warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, json)?;
        info!("Config saved to {:?}", path);
        Ok(())
    }

    /// SNR threshold to gate on, or `None` when filtering is off.
    pub fn snr_gate(&self) -> Option<f64> {
        self.snr_filter.then_some(self.snr_threshold_db)
    }
}
