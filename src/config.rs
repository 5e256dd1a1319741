//! Pipeline configuration.
//!
//! Every field has a default, so a config file only needs to list what it changes:
//!
//! ```toml
//! [ml]
//! model_path = "models/gesture-v2.onnx"
//! hold_ms = 500
//!
//! [gesture]
//! required_stable_frames = 3
//! ```
//!
//! # Environment Variables
//!
//! * `HANDSIGN_MODEL_PATH`: overrides `ml.model_path`.
//! * `HANDSIGN_ML`: `1`/`on`/`true` or `0`/`off`/`false`, overrides `ml.enabled`.

use std::{
    env::{self, VarError},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;

use crate::technique::{default_class_labels, Label};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gesture: GestureConfig,
    pub ml: MlConfig,
    pub tracking: TrackingConfig,
}

/// Thresholds of the heuristic detector and its stabilizer.
///
/// Distance thresholds are in units of palm scale.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub required_stable_frames: u32,
    pub release_frames: u32,
    pub pinch_threshold: f32,
    pub peace_gap_threshold: f32,
    pub thumb_extended_threshold: f32,
    pub curled_threshold: f32,
    /// How far a fingertip must be above its PIP joint to count as raised.
    pub finger_up_margin: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            required_stable_frames: 4,
            release_frames: 2,
            pinch_threshold: 0.45,
            peace_gap_threshold: 0.45,
            thumb_extended_threshold: 0.95,
            curled_threshold: 0.9,
            finger_up_margin: 0.12,
        }
    }
}

/// Sequence classifier and vote stabilization settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MlConfig {
    pub enabled: bool,
    pub model_path: PathBuf,
    pub class_labels: Vec<Label>,
    pub sequence_length: usize,
    pub vote_window: usize,
    pub vote_min: usize,
    pub hold_ms: u64,
    pub neutral_ms: u64,
    pub min_predict_confidence: f32,
    pub fallback_enabled: bool,
}

impl MlConfig {
    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    pub fn neutral(&self) -> Duration {
        Duration::from_millis(self.neutral_ms)
    }
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_path: PathBuf::from("assets/models/gesture-v1/model.onnx"),
            class_labels: default_class_labels(),
            sequence_length: 12,
            vote_window: 6,
            vote_min: 4,
            hold_ms: 600,
            neutral_ms: 900,
            min_predict_confidence: 0.34,
            fallback_enabled: true,
        }
    }
}

/// Frame scheduling settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub max_process_fps: u32,
    pub max_hands: usize,
}

impl TrackingConfig {
    /// Minimum time between two processed frames.
    pub fn min_frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.max_process_fps.max(1)))
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_process_fps: 30,
            max_hands: 2,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML config file and applies environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let mut config = Self::from_toml_str(&text)
            .with_context(|| format!("invalid config file '{}'", path.display()))?;
        config.apply_env();
        Ok(config)
    }

    /// Applies `HANDSIGN_*` environment variable overrides. Invalid values are logged and ignored.
    pub fn apply_env(&mut self) {
        if let Some(path) = env::var_os("HANDSIGN_MODEL_PATH") {
            self.ml.model_path = path.into();
        }
        match env::var("HANDSIGN_ML").as_deref() {
            Ok("1" | "on" | "true") => self.ml.enabled = true,
            Ok("0" | "off" | "false") => self.ml.enabled = false,
            Ok(invalid) => {
                log::warn!("invalid value set for `HANDSIGN_ML` variable: '{invalid}'; ignoring");
            }
            Err(VarError::NotPresent) => {}
            Err(VarError::NotUnicode(s)) => {
                log::warn!(
                    "invalid value set for `HANDSIGN_ML` variable: {}; ignoring",
                    s.to_string_lossy()
                );
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let ml = &self.ml;
        if ml.sequence_length == 0 {
            anyhow::bail!("`ml.sequence_length` must be at least 1");
        }
        if ml.vote_window == 0 {
            anyhow::bail!("`ml.vote_window` must be at least 1");
        }
        if ml.vote_min > ml.vote_window {
            anyhow::bail!(
                "`ml.vote_min` ({}) exceeds `ml.vote_window` ({})",
                ml.vote_min,
                ml.vote_window,
            );
        }
        if ml.neutral_ms < ml.hold_ms {
            anyhow::bail!(
                "`ml.neutral_ms` ({}) is shorter than `ml.hold_ms` ({})",
                ml.neutral_ms,
                ml.hold_ms,
            );
        }
        if ml.class_labels.is_empty() {
            anyhow::bail!("`ml.class_labels` is empty");
        }
        Ok(())
    }
}
