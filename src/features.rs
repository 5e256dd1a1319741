//! Landmark normalization into fixed-size per-frame feature vectors.
//!
//! A frame holds up to two hands, one per side. Each hand block is `21 * 3` wrist-relative,
//! palm-scale-normalized coordinates followed by a presence flag; a missing hand is an all-zero
//! block. The result is invariant to where the hands are in the image and how large they appear.

use std::ops::Deref;

use serde::Serialize;

use crate::landmark::{DetectedHand, Handedness, HandLandmarks, LandmarkIdx, LANDMARK_COUNT};

/// Floats per hand: 21 landmarks with 3 coordinates each, plus the presence flag.
pub const HAND_FEATURE_SIZE: usize = LANDMARK_COUNT * 3 + 1;

/// Floats per frame: a left and a right hand block.
pub const FRAME_FEATURE_SIZE: usize = HAND_FEATURE_SIZE * 2;

/// Smallest palm scale coordinates are divided by.
const MIN_PALM_SCALE: f32 = 1e-5;

/// Feature layout information, for training tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureDims {
    pub landmark_count: usize,
    pub hand_feature_size: usize,
    pub frame_feature_size: usize,
}

pub const FEATURE_DIMS: FeatureDims = FeatureDims {
    landmark_count: LANDMARK_COUNT,
    hand_feature_size: HAND_FEATURE_SIZE,
    frame_feature_size: FRAME_FEATURE_SIZE,
};

/// An immutable per-frame feature vector of exactly [`FRAME_FEATURE_SIZE`] floats.
///
/// Cloning is cheap enough for the window sizes involved (a few dozen frames).
#[derive(Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FeatureVector(Box<[f32]>);

impl FeatureVector {
    /// A vector describing a frame without hands.
    pub fn empty() -> Self {
        Self(vec![0.0; FRAME_FEATURE_SIZE].into_boxed_slice())
    }

    /// Wraps raw feature data.
    ///
    /// Returns `None` if `data` does not have exactly [`FRAME_FEATURE_SIZE`] elements.
    pub fn from_vec(data: Vec<f32>) -> Option<Self> {
        (data.len() == FRAME_FEATURE_SIZE).then(|| Self(data.into_boxed_slice()))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// The block for the left hand slot.
    pub fn left(&self) -> &[f32] {
        &self.0[..HAND_FEATURE_SIZE]
    }

    /// The block for the right hand slot.
    pub fn right(&self) -> &[f32] {
        &self.0[HAND_FEATURE_SIZE..]
    }
}

impl Deref for FeatureVector {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.0
    }
}

impl std::fmt::Debug for FeatureVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FeatureVector(left={}, right={})",
            self.left()[HAND_FEATURE_SIZE - 1],
            self.right()[HAND_FEATURE_SIZE - 1],
        )
    }
}

/// Output of [`extract_frame_features`].
#[derive(Debug, Clone)]
pub struct FrameFeatures {
    pub vector: FeatureVector,
    /// Number of occupied hand slots (0..=2).
    pub hand_count: usize,
}

impl FrameFeatures {
    pub fn has_hands(&self) -> bool {
        self.hand_count > 0
    }
}

/// Normalizes the detected hands of one frame into a [`FeatureVector`].
///
/// The first hand labeled left fills the left slot, the first labeled right (or unlabeled) fills
/// the right slot. Further hands for an already occupied slot are ignored.
pub fn extract_frame_features(hands: &[DetectedHand]) -> FrameFeatures {
    let (left, right) = assign_hands_by_side(hands);

    let mut data = vec![0.0; FRAME_FEATURE_SIZE];
    let mut hand_count = 0;
    for (hand, block) in [left, right].into_iter().zip(data.chunks_exact_mut(HAND_FEATURE_SIZE)) {
        if let Some(hand) = hand {
            normalize_hand(hand, block);
            hand_count += 1;
        }
    }

    FrameFeatures {
        vector: FeatureVector(data.into_boxed_slice()),
        hand_count,
    }
}

fn assign_hands_by_side(hands: &[DetectedHand]) -> (Option<&HandLandmarks>, Option<&HandLandmarks>) {
    let mut left = None;
    let mut right = None;
    for hand in hands {
        let slot = match hand.handedness {
            Handedness::Left => &mut left,
            Handedness::Right | Handedness::Unknown => &mut right,
        };
        if slot.is_none() {
            *slot = Some(&hand.landmarks);
        }
    }
    (left, right)
}

/// Writes one hand block into `out`, which must be [`HAND_FEATURE_SIZE`] long.
fn normalize_hand(landmarks: &HandLandmarks, out: &mut [f32]) {
    debug_assert_eq!(out.len(), HAND_FEATURE_SIZE);

    let wrist = landmarks.get(LandmarkIdx::Wrist);
    let scale = landmarks.palm_scale().max(MIN_PALM_SCALE);

    for (pos, coords) in landmarks.positions().iter().zip(out.chunks_exact_mut(3)) {
        let rel = (pos - wrist) / scale;
        coords.copy_from_slice(rel.as_slice());
    }
    out[HAND_FEATURE_SIZE - 1] = 1.0;
}
