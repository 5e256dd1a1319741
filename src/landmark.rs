//! Hand landmark data as delivered by an external hand detector.
//!
//! Coordinates are in image space: X points right, Y points *down*, Z is relative depth. All
//! pose geometry in this crate is planar (X/Y only); Z is carried along into feature vectors.

use std::str::FromStr;

use nalgebra::{distance, Point2, Point3};

/// Number of landmarks per hand.
pub const LANDMARK_COUNT: usize = 21;

/// Smallest palm scale used when normalizing distances.
const MIN_DISTANCE_SCALE: f32 = 1e-4;

/// Names for the hand pose landmarks.
///
/// # Terminology
///
/// - **CMC**: Carpometacarpal joint, the lowest joint of the thumb, located near the wrist.
/// - **MCP**: Metacarpophalangeal joint, the lower joint forming the knuckles near the palm.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: placed on the tip of the finger, above the DIP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Which hand the detector believes it saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Handedness {
    Left,
    Right,
    #[default]
    Unknown,
}

impl FromStr for Handedness {
    type Err = std::convert::Infallible;

    /// Parses a detector label. Anything containing "left" (case-insensitive) is a left hand,
    /// anything containing "right" a right hand, everything else is unknown.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Ok(if lower.contains("left") {
            Handedness::Left
        } else if lower.contains("right") {
            Handedness::Right
        } else {
            Handedness::Unknown
        })
    }
}

/// The 21 landmark positions of one hand.
#[derive(Debug, Clone, PartialEq)]
pub struct HandLandmarks {
    positions: [Point3<f32>; LANDMARK_COUNT],
}

impl HandLandmarks {
    pub fn new(positions: [Point3<f32>; LANDMARK_COUNT]) -> Self {
        Self { positions }
    }

    /// Creates landmarks from raw `[x, y, z]` triples.
    pub fn from_arrays(raw: [[f32; 3]; LANDMARK_COUNT]) -> Self {
        Self {
            positions: raw.map(|[x, y, z]| Point3::new(x, y, z)),
        }
    }

    #[inline]
    pub fn get(&self, idx: LandmarkIdx) -> Point3<f32> {
        self.positions[idx as usize]
    }

    #[inline]
    pub fn positions(&self) -> &[Point3<f32>; LANDMARK_COUNT] {
        &self.positions
    }

    /// Moves every landmark by the same offset.
    pub fn move_by(&mut self, x: f32, y: f32, z: f32) {
        for pos in &mut self.positions {
            pos.x += x;
            pos.y += y;
            pos.z += z;
        }
    }

    /// Planar distance between two landmarks.
    pub fn distance(&self, a: LandmarkIdx, b: LandmarkIdx) -> f32 {
        let (a, b) = (self.get(a), self.get(b));
        distance(&Point2::new(a.x, a.y), &Point2::new(b.x, b.y))
    }

    /// Planar distance between the wrist and the middle finger MCP.
    ///
    /// This is the reference length all other per-hand distances are divided by.
    pub fn palm_scale(&self) -> f32 {
        self.distance(LandmarkIdx::Wrist, LandmarkIdx::MiddleFingerMcp)
    }

    /// Distance between two landmarks divided by `scale` (floored to avoid division by zero).
    pub fn normalized_distance(&self, a: LandmarkIdx, b: LandmarkIdx, scale: f32) -> f32 {
        self.distance(a, b) / scale.max(MIN_DISTANCE_SCALE)
    }

    /// Returns whether `tip` sits above `pip` by more than `margin`.
    ///
    /// Y grows downwards, so "above" means numerically smaller.
    pub fn is_above(&self, tip: LandmarkIdx, pip: LandmarkIdx, margin: f32) -> bool {
        self.get(tip).y < self.get(pip).y - margin
    }
}

/// One hand reported by the detector for a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedHand {
    pub landmarks: HandLandmarks,
    pub handedness: Handedness,
}

impl DetectedHand {
    pub fn new(landmarks: HandLandmarks, handedness: Handedness) -> Self {
        Self {
            landmarks,
            handedness,
        }
    }
}
