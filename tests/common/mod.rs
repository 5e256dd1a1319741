//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use handsign::{
    classifier::Classifier,
    config::Config,
    features::{FRAME_FEATURE_SIZE, HAND_FEATURE_SIZE},
    landmark::{DetectedHand, HandLandmarks, Handedness, LandmarkIdx, LANDMARK_COUNT},
    nn::{ModelLoader, SequenceModel},
    session::Session,
};

/// Builds an upright hand: wrist at `(0.5, 0.8)`, palm scale `0.2`, thumb tucked unless
/// `thumb_up` is set. `up` selects which of index/middle/ring/pinky are extended.
pub fn hand(up: [bool; 4], thumb_up: bool) -> HandLandmarks {
    use LandmarkIdx::*;

    let fingers = [
        (IndexFingerMcp, IndexFingerPip, IndexFingerDip, IndexFingerTip),
        (MiddleFingerMcp, MiddleFingerPip, MiddleFingerDip, MiddleFingerTip),
        (RingFingerMcp, RingFingerPip, RingFingerDip, RingFingerTip),
        (PinkyMcp, PinkyPip, PinkyDip, PinkyTip),
    ];
    let columns = [0.38, 0.5, 0.58, 0.66];

    let mut raw = [[0.0f32; 3]; LANDMARK_COUNT];
    let mut set = |idx: LandmarkIdx, x: f32, y: f32| raw[idx as usize] = [x, y, 0.0];
    set(Wrist, 0.5, 0.8);
    for (&(mcp, pip, dip, tip), (&x, &up)) in fingers.iter().zip(columns.iter().zip(&up)) {
        set(mcp, x, 0.6);
        let [p, d, t] = if up {
            [0.52, 0.46, 0.40]
        } else {
            [0.55, 0.58, 0.62]
        };
        set(pip, x, p);
        set(dip, x, d);
        set(tip, x, t);
    }
    set(ThumbCmc, 0.45, 0.75);
    if thumb_up {
        set(ThumbMcp, 0.40, 0.66);
        set(ThumbIp, 0.40, 0.56);
        set(ThumbTip, 0.40, 0.44);
    } else {
        set(ThumbMcp, 0.48, 0.74);
        set(ThumbIp, 0.52, 0.74);
        set(ThumbTip, 0.56, 0.72);
    }
    HandLandmarks::from_arrays(raw)
}

pub fn fist(handedness: Handedness) -> DetectedHand {
    DetectedHand::new(hand([false; 4], false), handedness)
}

pub fn middle_finger(handedness: Handedness) -> DetectedHand {
    DetectedHand::new(hand([false, true, false, false], false), handedness)
}

/// Predicts `label_index` with high confidence whenever the newest frame contains a hand, and a
/// flat, unconfident distribution otherwise.
pub struct PresenceModel {
    pub label_index: usize,
    pub classes: usize,
}

impl SequenceModel for PresenceModel {
    fn estimate(&self, input: &[f32], shape: [usize; 3]) -> anyhow::Result<Vec<f32>> {
        assert_eq!(shape[2], FRAME_FEATURE_SIZE);
        let newest = &input[input.len() - FRAME_FEATURE_SIZE..];
        let present = newest[HAND_FEATURE_SIZE - 1] > 0.5 || newest[FRAME_FEATURE_SIZE - 1] > 0.5;

        let flat = 1.0 / self.classes as f32;
        let mut p = vec![flat; self.classes];
        if present {
            p.iter_mut().for_each(|v| *v = 0.01);
            p[self.label_index] = 1.0 - 0.01 * (self.classes - 1) as f32;
        }
        Ok(p)
    }
}

pub struct PresenceLoader {
    pub label_index: usize,
}

impl ModelLoader for PresenceLoader {
    fn load(&self) -> anyhow::Result<Box<dyn SequenceModel>> {
        Ok(Box::new(PresenceModel {
            label_index: self.label_index,
            classes: 13,
        }))
    }

    fn describe(&self) -> String {
        "presence model".into()
    }
}

/// A session whose classifier predicts `label_index` (in default label order) while hands are
/// visible.
pub fn session_with_model(config: Config, label_index: usize) -> Session {
    let classifier = Classifier::new(Arc::new(PresenceLoader { label_index }), &config.ml);
    Session::new(config, classifier)
}
