//! Rule-based technique detection from hand geometry.
//!
//! This is the fallback path used whenever the sequence classifier cannot be used. Every frame,
//! each detected hand is reduced to a set of [`HandPoseFlags`], the flags are combined into a raw
//! technique by [`detect_technique`], and the raw technique is debounced by a
//! [`FallbackStabilizer`].

mod pose;
mod stabilizer;

pub use pose::{analyze_hand, HandPoseFlags};
pub use stabilizer::FallbackStabilizer;

use crate::technique::Technique;

/// Returns whether the first two hands both show the override pose.
pub fn is_override_pose(states: &[HandPoseFlags]) -> bool {
    matches!(states, [a, b, ..] if a.middle_finger && b.middle_finger)
}

/// Resolves the per-hand pose flags of one frame into a raw (unsmoothed) technique.
///
/// Two-hand combinations of the first two hands take priority over single-hand rules. Within each
/// group, the first matching rule wins.
pub fn detect_technique(states: &[HandPoseFlags]) -> Technique {
    if let [a, b, ..] = states {
        let either = |p: fn(&HandPoseFlags) -> bool, q: fn(&HandPoseFlags) -> bool| {
            (p(a) && q(b)) || (p(b) && q(a))
        };

        if a.middle_finger && b.middle_finger {
            return Technique::DoubleMiddleMonkey;
        }
        if a.fist && b.fist {
            return Technique::Blackflash;
        }
        if a.open_palm && b.open_palm {
            return Technique::CleaveStorm;
        }
        if either(|s| s.pinch, |s| s.rock) {
            return Technique::DismantleSpiral;
        }
        if either(|s| s.point, |s| s.fist) {
            return Technique::RatioStrike;
        }
        if either(|s| s.thumbs_up, |s| s.peace) {
            return Technique::BoogieRipple;
        }
        if states.iter().any(|s| s.pinch) && states.iter().any(|s| s.thumbs_up) {
            return Technique::Blue;
        }
    }

    const SINGLE_HAND_RULES: [(fn(&HandPoseFlags) -> bool, Technique); 7] = [
        (|s| s.pinch, Technique::Purple),
        (|s| s.thumbs_up, Technique::Blue),
        (|s| s.rock, Technique::Meteor),
        (|s| s.open_palm, Technique::Shrine),
        (|s| s.peace, Technique::Void),
        (|s| s.point, Technique::Red),
        (|s| s.fist, Technique::Blackflash),
    ];

    SINGLE_HAND_RULES
        .iter()
        .find(|(rule, _)| states.iter().any(rule))
        .map_or(Technique::Neutral, |(_, technique)| *technique)
}
