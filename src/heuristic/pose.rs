//! Per-hand pose flags.

use crate::config::GestureConfig;
use crate::landmark::{HandLandmarks, LandmarkIdx};

/// Boolean pose classification of one hand in one frame.
///
/// Recomputed every frame; never carried across frames.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HandPoseFlags {
    pub pinch: bool,
    pub fist: bool,
    pub open_palm: bool,
    pub point: bool,
    pub peace: bool,
    pub rock: bool,
    pub thumbs_up: bool,
    pub middle_finger: bool,
    /// Wrist to middle finger MCP distance the flags were derived with.
    pub palm_scale: f32,
}

/// `(tip, pip, mcp)` for the four non-thumb fingers.
const FINGERS: [(LandmarkIdx, LandmarkIdx, LandmarkIdx); 4] = {
    use LandmarkIdx::*;
    [
        (IndexFingerTip, IndexFingerPip, IndexFingerMcp),
        (MiddleFingerTip, MiddleFingerPip, MiddleFingerMcp),
        (RingFingerTip, RingFingerPip, RingFingerMcp),
        (PinkyTip, PinkyPip, PinkyMcp),
    ]
};

/// Derives the pose flags of a single hand.
pub fn analyze_hand(landmarks: &HandLandmarks, config: &GestureConfig) -> HandPoseFlags {
    use LandmarkIdx::*;

    let palm_scale = landmarks.palm_scale();
    let margin = palm_scale * config.finger_up_margin;
    let dist = |a, b| landmarks.normalized_distance(a, b, palm_scale);

    let [index_up, middle_up, ring_up, pinky_up] =
        FINGERS.map(|(tip, pip, _)| landmarks.is_above(tip, pip, margin));
    let fingers_up = [index_up, middle_up, ring_up, pinky_up]
        .iter()
        .filter(|up| **up)
        .count();
    let all_curled = FINGERS
        .iter()
        .all(|&(tip, _, mcp)| dist(tip, mcp) < config.curled_threshold);

    let pinch = dist(ThumbTip, IndexFingerTip) < config.pinch_threshold;
    let thumb_extended = dist(ThumbTip, Wrist) > config.thumb_extended_threshold;
    let thumb_tip_y = landmarks.get(ThumbTip).y;
    let thumb_pointing_up =
        thumb_tip_y < landmarks.get(ThumbIp).y && thumb_tip_y < landmarks.get(IndexFingerPip).y;

    HandPoseFlags {
        pinch,
        fist: all_curled && !pinch,
        open_palm: fingers_up == 4 && thumb_extended,
        point: index_up && !middle_up && !ring_up && !pinky_up && !pinch,
        peace: index_up
            && middle_up
            && !ring_up
            && !pinky_up
            && dist(IndexFingerTip, MiddleFingerTip) > config.peace_gap_threshold,
        rock: index_up && !middle_up && !ring_up && pinky_up && !pinch,
        thumbs_up: thumb_extended && thumb_pointing_up && fingers_up == 0,
        middle_finger: middle_up && !index_up && !ring_up && !pinky_up && !pinch,
        palm_scale,
    }
}
