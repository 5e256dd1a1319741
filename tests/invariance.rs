//! Randomized checks of the position and size invariance of features and pose detection.

mod common;

use approx::assert_abs_diff_eq;
use handsign::{
    config::GestureConfig,
    features::{extract_frame_features, FRAME_FEATURE_SIZE},
    heuristic::{analyze_hand, detect_technique},
    landmark::{DetectedHand, HandLandmarks, Handedness},
};

use common::hand;

const ITERATIONS: usize = 200;

fn random_pose(rng: &mut fastrand::Rng) -> HandLandmarks {
    let up = [rng.bool(), rng.bool(), rng.bool(), rng.bool()];
    hand(up, rng.bool())
}

fn scaled(landmarks: &HandLandmarks, factor: f32) -> HandLandmarks {
    let raw = (*landmarks.positions()).map(|p| [p.x * factor, p.y * factor, p.z * factor]);
    HandLandmarks::from_arrays(raw)
}

#[test]
fn features_ignore_translation_and_scale() {
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    for _ in 0..ITERATIONS {
        let original = random_pose(&mut rng);
        let mut moved = scaled(&original, 0.5 + rng.f32() * 1.5);
        moved.move_by(rng.f32() - 0.5, rng.f32() - 0.5, rng.f32() * 0.1);

        let side = if rng.bool() {
            Handedness::Left
        } else {
            Handedness::Right
        };
        let a = extract_frame_features(&[DetectedHand::new(original, side)]);
        let b = extract_frame_features(&[DetectedHand::new(moved, side)]);
        assert_eq!(a.vector.len(), FRAME_FEATURE_SIZE);
        assert_eq!(b.vector.len(), FRAME_FEATURE_SIZE);
        for (x, y) in a.vector.iter().zip(b.vector.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-3);
        }
    }
}

#[test]
fn feature_length_is_independent_of_hand_count() {
    let mut rng = fastrand::Rng::with_seed(7);
    for _ in 0..ITERATIONS {
        let hands: Vec<DetectedHand> = (0..rng.usize(0..5))
            .map(|_| {
                let side = match rng.u8(0..3) {
                    0 => Handedness::Left,
                    1 => Handedness::Right,
                    _ => Handedness::Unknown,
                };
                DetectedHand::new(random_pose(&mut rng), side)
            })
            .collect();
        let features = extract_frame_features(&hands);
        assert_eq!(features.vector.len(), FRAME_FEATURE_SIZE);
        assert!(features.hand_count <= 2);
        assert!(features.vector.iter().all(|v| v.is_finite()));
    }
}

#[test]
fn detected_technique_ignores_translation_and_scale() {
    let config = GestureConfig::default();
    let mut rng = fastrand::Rng::with_seed(42);
    for _ in 0..ITERATIONS {
        let original = random_pose(&mut rng);
        let mut moved = scaled(&original, 0.6 + rng.f32());
        moved.move_by(rng.f32() * 0.4 - 0.2, rng.f32() * 0.4 - 0.2, 0.0);

        let a = detect_technique(&[analyze_hand(&original, &config)]);
        let b = detect_technique(&[analyze_hand(&moved, &config)]);
        assert_eq!(a, b);
    }
}
