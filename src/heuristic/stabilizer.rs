//! Consecutive-frame debouncing of heuristic detections.

use crate::config::GestureConfig;
use crate::technique::Technique;

/// Debounces the raw per-frame output of [`detect_technique`].
///
/// A detection only becomes the stable technique after it was seen for `required_stable_frames`
/// consecutive frames. `release_frames` consecutive frames without hands force the stable
/// technique back to neutral.
///
/// [`detect_technique`]: super::detect_technique
#[derive(Debug, Clone)]
pub struct FallbackStabilizer {
    required_stable_frames: u32,
    release_frames: u32,
    stable: Technique,
    candidate: Technique,
    candidate_frames: u32,
    empty_frames: u32,
}

impl FallbackStabilizer {
    pub fn new(config: &GestureConfig) -> Self {
        Self {
            required_stable_frames: config.required_stable_frames,
            release_frames: config.release_frames,
            stable: Technique::Neutral,
            candidate: Technique::Neutral,
            candidate_frames: 0,
            empty_frames: 0,
        }
    }

    /// Feeds one frame's detection and returns the stable technique.
    pub fn update(&mut self, detected: Technique, has_hands: bool) -> Technique {
        if detected == self.candidate {
            self.candidate_frames = self.candidate_frames.saturating_add(1);
        } else {
            self.candidate = detected;
            self.candidate_frames = 1;
        }

        if self.candidate_frames >= self.required_stable_frames {
            self.stable = self.candidate;
        }

        if has_hands {
            self.empty_frames = 0;
        } else {
            self.empty_frames = self.empty_frames.saturating_add(1);
            if self.empty_frames >= self.release_frames {
                self.stable = Technique::Neutral;
            }
        }

        self.stable
    }

    pub fn stable(&self) -> Technique {
        self.stable
    }

    pub fn reset(&mut self) {
        self.stable = Technique::Neutral;
        self.candidate = Technique::Neutral;
        self.candidate_frames = 0;
        self.empty_frames = 0;
    }
}
