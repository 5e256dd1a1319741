//! Technique, label, phase and source enumerations shared by every stage of the pipeline.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// A recognizable technique, including the resting [`Technique::Neutral`] state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Technique {
    Neutral,
    Red,
    Blue,
    Void,
    Purple,
    Shrine,
    Blackflash,
    Meteor,
    CleaveStorm,
    DismantleSpiral,
    RatioStrike,
    BoogieRipple,
    /// Two-hand override pose. Never produced by the classifier.
    DoubleMiddleMonkey,
}

impl Technique {
    pub const ALL: [Technique; 13] = [
        Technique::Neutral,
        Technique::Red,
        Technique::Blue,
        Technique::Void,
        Technique::Purple,
        Technique::Shrine,
        Technique::Blackflash,
        Technique::Meteor,
        Technique::CleaveStorm,
        Technique::DismantleSpiral,
        Technique::RatioStrike,
        Technique::BoogieRipple,
        Technique::DoubleMiddleMonkey,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Technique::Neutral => "neutral",
            Technique::Red => "red",
            Technique::Blue => "blue",
            Technique::Void => "void",
            Technique::Purple => "purple",
            Technique::Shrine => "shrine",
            Technique::Blackflash => "blackflash",
            Technique::Meteor => "meteor",
            Technique::CleaveStorm => "cleaveStorm",
            Technique::DismantleSpiral => "dismantleSpiral",
            Technique::RatioStrike => "ratioStrike",
            Technique::BoogieRipple => "boogieRipple",
            Technique::DoubleMiddleMonkey => "doubleMiddleMonkey",
        }
    }

    pub fn is_neutral(&self) -> bool {
        *self == Technique::Neutral
    }

    /// Display metadata for renderers.
    pub fn meta(&self) -> TechniqueMeta {
        let (label, glow) = match self {
            Technique::Neutral => ("Neutral State", 0x00ffff),
            Technique::Red => ("Reverse Cursed Technique: Red", 0xff3333),
            Technique::Blue => ("Cursed Technique Lapse: Blue", 0x33bbff),
            Technique::Void => ("Domain Expansion: Infinite Void", 0x00ffff),
            Technique::Purple => ("Secret Technique: Hollow Purple", 0xbb00ff),
            Technique::Shrine => ("Domain Expansion: Malevolent Shrine", 0xff0000),
            Technique::Blackflash => ("Black Flash", 0xffffff),
            Technique::Meteor => ("Maximum: Meteor Swarm", 0xff8a1f),
            Technique::CleaveStorm => ("Cleave Storm", 0xff8b6c),
            Technique::DismantleSpiral => ("Dismantle Spiral", 0xff4f4f),
            Technique::RatioStrike => ("Ratio Strike", 0xffd36e),
            Technique::BoogieRipple => ("Boogie Ripple", 0x6ef5ce),
            Technique::DoubleMiddleMonkey => ("Monkey Mockery", 0xd7b27a),
        };
        TechniqueMeta { label, glow }
    }
}

impl Default for Technique {
    fn default() -> Self {
        Technique::Neutral
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Technique {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Technique::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseLabelError(s.to_string()))
    }
}

/// Renderer-facing description of a technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TechniqueMeta {
    /// Human-readable name.
    pub label: &'static str,
    /// Glow colour as `0xRRGGBB`.
    pub glow: u32,
}

/// A classifier / capture label: either a technique or the `noGesture` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum Label {
    Technique(Technique),
    NoGesture,
}

impl Label {
    pub const NEUTRAL: Label = Label::Technique(Technique::Neutral);

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Technique(t) => t.as_str(),
            Label::NoGesture => "noGesture",
        }
    }

    /// Returns the technique this label names, or `None` for the sentinel.
    pub fn technique(&self) -> Option<Technique> {
        match self {
            Label::Technique(t) => Some(*t),
            Label::NoGesture => None,
        }
    }
}

impl From<Technique> for Label {
    fn from(t: Technique) -> Self {
        Label::Technique(t)
    }
}

impl From<Label> for &'static str {
    fn from(label: Label) -> Self {
        label.as_str()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "noGesture" {
            return Ok(Label::NoGesture);
        }
        s.parse().map(Label::Technique)
    }
}

impl TryFrom<String> for Label {
    type Error = ParseLabelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// The classifier's output space, in model output order.
pub fn default_class_labels() -> Vec<Label> {
    use Technique::*;
    let mut labels: Vec<Label> = [
        Neutral,
        Red,
        Blue,
        Void,
        Purple,
        Shrine,
        Blackflash,
        Meteor,
        CleaveStorm,
        DismantleSpiral,
        RatioStrike,
        BoogieRipple,
    ]
    .into_iter()
    .map(Label::Technique)
    .collect();
    labels.push(Label::NoGesture);
    labels
}

/// Error returned when parsing an unknown technique or label name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLabelError(String);

impl fmt::Display for ParseLabelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown technique label '{}'", self.0)
    }
}

impl std::error::Error for ParseLabelError {}

/// Qualitative state of the latch that produced the emitted technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// A majority vote committed the technique this frame.
    Stable,
    /// Signal lost, technique held at full strength.
    Hold,
    /// Signal lost for longer, technique about to decay.
    Cooldown,
    /// Nothing committed.
    Neutral,
    /// The two-hand override pose short-circuited the pipeline.
    Override,
    /// Output came from the heuristic detector.
    Fallback,
    /// Classifier not ready yet and no fallback allowed.
    Waiting,
    /// Classifier failed and no fallback allowed.
    Unavailable,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Stable => "stable",
            Phase::Hold => "hold",
            Phase::Cooldown => "cooldown",
            Phase::Neutral => "neutral",
            Phase::Override => "override",
            Phase::Fallback => "fallback",
            Phase::Waiting => "waiting",
            Phase::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which path produced a frame's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Source {
    Ml,
    Fallback,
    /// The override pose, detected heuristically.
    Heuristic,
    /// No path ran (waiting / unavailable).
    None,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Source::Ml => "ml",
            Source::Fallback => "fallback",
            Source::Heuristic => "heuristic",
            Source::None => "none",
        })
    }
}
