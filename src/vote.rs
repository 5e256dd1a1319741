//! Majority-vote stabilization of classifier output with time-decayed hold.
//!
//! Classifier labels are collected in a short rolling window. A technique is committed when it
//! wins the vote by a sufficient margin while hands are visible. Once committed, it survives loss
//! of signal for a while: it is *held* for `hold` after the last commit, then kept in *cooldown*
//! until `neutral`, and only then collapses to neutral. A single bad frame can therefore never
//! switch the output off, but a lost hand cannot latch a technique forever either.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use crate::config::MlConfig;
use crate::technique::{Label, Phase, Technique};

/// The latch output for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StableState {
    pub technique: Technique,
    pub phase: Phase,
}

/// Debounces raw classifier labels using majority voting plus hold/cooldown hysteresis.
#[derive(Debug, Clone)]
pub struct PredictionStateMachine {
    votes: VecDeque<Label>,
    vote_window: usize,
    vote_min: usize,
    hold: Duration,
    neutral: Duration,
    stable: Technique,
    last_commit: Option<Instant>,
}

impl PredictionStateMachine {
    pub fn new(vote_window: usize, vote_min: usize, hold: Duration, neutral: Duration) -> Self {
        Self {
            votes: VecDeque::with_capacity(vote_window + 1),
            vote_window,
            vote_min,
            hold,
            neutral,
            stable: Technique::Neutral,
            last_commit: None,
        }
    }

    pub fn from_config(config: &MlConfig) -> Self {
        Self::new(
            config.vote_window,
            config.vote_min,
            config.hold(),
            config.neutral(),
        )
    }

    /// Records `label` for the frame at `now` and returns the resulting stable state.
    ///
    /// Pass [`Label::NoGesture`] for frames whose prediction was not confident enough.
    pub fn update(&mut self, now: Instant, label: Label, has_hands: bool) -> StableState {
        self.votes.push_back(label);
        while self.votes.len() > self.vote_window {
            self.votes.pop_front();
        }

        if let Some((winner, count)) = self.majority() {
            if has_hands && label != Label::NoGesture && count >= self.vote_min {
                self.stable = winner;
                self.last_commit = Some(now);
                return StableState {
                    technique: winner,
                    phase: Phase::Stable,
                };
            }
        }

        if !self.stable.is_neutral() {
            let age = self
                .last_commit
                .map_or(Duration::MAX, |at| now.saturating_duration_since(at));
            if age <= self.hold {
                return StableState {
                    technique: self.stable,
                    phase: Phase::Hold,
                };
            }
            if age <= self.neutral {
                return StableState {
                    technique: self.stable,
                    phase: Phase::Cooldown,
                };
            }
            log::trace!("'{}' decayed after {:?}", self.stable, age);
        }

        self.stable = Technique::Neutral;
        StableState {
            technique: Technique::Neutral,
            phase: Phase::Neutral,
        }
    }

    /// The most frequent non-sentinel label in the window and its count.
    ///
    /// On ties, the label that was first seen in the window wins.
    fn majority(&self) -> Option<(Technique, usize)> {
        let mut counts: Vec<(Technique, usize)> = Vec::with_capacity(self.votes.len());
        for technique in self.votes.iter().filter_map(Label::technique) {
            match counts.iter_mut().find(|(t, _)| *t == technique) {
                Some((_, count)) => *count += 1,
                None => counts.push((technique, 1)),
            }
        }

        counts
            .into_iter()
            .fold(None, |best, (technique, count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((technique, count)),
            })
    }

    /// The currently committed technique.
    pub fn stable_technique(&self) -> Technique {
        self.stable
    }

    /// Clears the vote window and the committed technique.
    pub fn reset(&mut self) {
        self.votes.clear();
        self.stable = Technique::Neutral;
        self.last_commit = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Duration = Duration::from_millis(33);

    fn machine() -> PredictionStateMachine {
        PredictionStateMachine::new(
            6,
            4,
            Duration::from_millis(600),
            Duration::from_millis(900),
        )
    }

    fn red() -> Label {
        Technique::Red.into()
    }

    fn blue() -> Label {
        Technique::Blue.into()
    }

    #[test]
    fn commits_four_of_six() {
        let mut m = machine();
        let mut now = Instant::now();
        let mut state = None;
        for label in [red(), red(), blue(), red(), red(), red()] {
            now += FRAME;
            state = Some(m.update(now, label, true));
        }
        assert_eq!(
            state,
            Some(StableState {
                technique: Technique::Red,
                phase: Phase::Stable,
            })
        );
    }

    #[test]
    fn no_commit_below_vote_min() {
        let mut m = machine();
        let mut now = Instant::now();
        for label in [red(), blue(), red(), blue(), red()] {
            now += FRAME;
            let state = m.update(now, label, true);
            assert_eq!(state.technique, Technique::Neutral);
            assert_eq!(state.phase, Phase::Neutral);
        }
    }

    #[test]
    fn no_commit_without_hands_or_on_sentinel() {
        let mut m = machine();
        let mut now = Instant::now();
        for _ in 0..6 {
            now += FRAME;
            assert_eq!(m.update(now, red(), false).technique, Technique::Neutral);
        }

        let mut m = machine();
        for _ in 0..4 {
            now += FRAME;
            m.update(now, red(), true);
        }
        // The majority is still red, but the current frame is not confident.
        let state = m.update(now + FRAME, Label::NoGesture, true);
        assert_eq!(state.phase, Phase::Hold);
    }

    #[test]
    fn hold_then_cooldown_then_neutral() {
        let mut m = machine();
        let start = Instant::now();
        let mut now = start;
        for _ in 0..6 {
            now += FRAME;
            m.update(now, Technique::Purple.into(), true);
        }

        let hold = m.update(now + Duration::from_millis(500), Label::NoGesture, false);
        assert_eq!(hold.technique, Technique::Purple);
        assert_eq!(hold.phase, Phase::Hold);

        let hold_edge = m.update(now + Duration::from_millis(600), Label::NoGesture, false);
        assert_eq!(hold_edge.phase, Phase::Hold);

        let cooldown = m.update(now + Duration::from_millis(800), Label::NoGesture, false);
        assert_eq!(cooldown.technique, Technique::Purple);
        assert_eq!(cooldown.phase, Phase::Cooldown);

        let neutral = m.update(now + Duration::from_millis(1000), Label::NoGesture, false);
        assert_eq!(neutral.technique, Technique::Neutral);
        assert_eq!(neutral.phase, Phase::Neutral);
        assert_eq!(m.stable_technique(), Technique::Neutral);

        // Stays neutral afterwards.
        let later = m.update(now + Duration::from_millis(1100), Label::NoGesture, false);
        assert_eq!(later.phase, Phase::Neutral);
    }

    #[test]
    fn single_noisy_frame_does_not_flicker() {
        let mut m = machine();
        let mut now = Instant::now();
        for _ in 0..6 {
            now += FRAME;
            m.update(now, red(), true);
        }
        now += FRAME;
        let noisy = m.update(now, blue(), true);
        assert_eq!(noisy.technique, Technique::Red);
        // Five reds remain in the window, so the next red frame recommits.
        now += FRAME;
        assert_eq!(m.update(now, red(), true).phase, Phase::Stable);
    }

    #[test]
    fn tie_goes_to_first_seen() {
        let mut m = PredictionStateMachine::new(
            4,
            2,
            Duration::from_millis(600),
            Duration::from_millis(900),
        );
        let mut now = Instant::now();
        let mut last = None;
        for label in [blue(), red(), red(), blue()] {
            now += FRAME;
            last = Some(m.update(now, label, true));
        }
        assert_eq!(last.map(|s| s.technique), Some(Technique::Blue));
    }

    #[test]
    fn reset_clears_everything() {
        let mut m = machine();
        let mut now = Instant::now();
        for _ in 0..6 {
            now += FRAME;
            m.update(now, red(), true);
        }
        m.reset();
        assert_eq!(m.stable_technique(), Technique::Neutral);
        now += FRAME;
        let state = m.update(now, red(), true);
        assert_eq!(state.technique, Technique::Neutral);
    }
}
