//! Per-frame orchestration of the recognition pipeline.
//!
//! Every processed frame goes through the same decision order:
//!
//! 1. The two-hand override pose short-circuits everything else.
//! 2. With ML enabled, a ready classifier and a full window, the classifier's output is debounced
//!    by the [`PredictionStateMachine`].
//! 3. Otherwise the heuristic detector and its [`FallbackStabilizer`] decide, if allowed.
//! 4. Otherwise the output is neutral.
//!
//! Technique changes are reported on edges only; [`FrameMetrics`] are produced for every frame.

use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use crate::capture::{CaptureError, CapturePayload, CaptureRecorder, CaptureStats, FrameMeta};
use crate::classifier::{Classifier, ModelState, ModelStatus};
use crate::config::Config;
use crate::features::extract_frame_features;
use crate::heuristic::{
    analyze_hand, detect_technique, is_override_pose, FallbackStabilizer, HandPoseFlags,
};
use crate::landmark::DetectedHand;
use crate::technique::{Label, Phase, Source, Technique};
use crate::vote::PredictionStateMachine;
use crate::window::SequenceWindow;

/// Diagnostics reported for every processed frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMetrics {
    pub source: Source,
    pub confidence: f32,
    /// Raw label before debouncing.
    pub predicted_label: Label,
    /// The pipeline's technique for this frame. Ignores any forced technique.
    pub technique: Technique,
    pub hand_count: usize,
    pub phase: Phase,
    pub capture: CaptureStats,
}

/// Result of [`Session::process_frame`].
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Set when the emitted technique changed with this frame.
    pub changed: Option<Technique>,
    pub metrics: FrameMetrics,
    /// Set when the classifier finished loading (or failed to) since the previous frame.
    pub model_status: Option<MlStatus>,
}

/// Classifier status together with the ML toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MlStatus {
    #[serde(flatten)]
    pub status: ModelStatus,
    pub ml_enabled: bool,
}

struct Resolved {
    source: Source,
    technique: Technique,
    confidence: f32,
    predicted_label: Label,
    phase: Phase,
}

impl Resolved {
    fn neutral(phase: Phase) -> Self {
        Self {
            source: Source::None,
            technique: Technique::Neutral,
            confidence: 0.0,
            predicted_label: Label::NoGesture,
            phase,
        }
    }
}

/// Drives the pipeline one frame at a time and owns all of its rolling state.
pub struct Session {
    config: Config,
    window: SequenceWindow,
    classifier: Classifier,
    votes: PredictionStateMachine,
    stabilizer: FallbackStabilizer,
    capture: CaptureRecorder,
    ml_enabled: bool,
    running: bool,
    /// Last technique produced by the pipeline.
    tracked: Technique,
    /// Last technique reported through [`FrameReport::changed`].
    shown: Technique,
    forced: Option<Technique>,
}

impl Session {
    pub fn new(config: Config, classifier: Classifier) -> Self {
        let ml = &config.ml;
        Self {
            window: SequenceWindow::new(ml.sequence_length),
            votes: PredictionStateMachine::from_config(ml),
            stabilizer: FallbackStabilizer::new(&config.gesture),
            capture: CaptureRecorder::new(ml.sequence_length, ml.class_labels.clone()),
            ml_enabled: ml.enabled,
            running: false,
            tracked: Technique::Neutral,
            shown: Technique::Neutral,
            forced: None,
            classifier,
            config,
        }
    }

    /// Creates a session whose classifier loads the configured ONNX model.
    pub fn from_config(config: Config) -> Self {
        let classifier = Classifier::from_config(&config.ml);
        Self::new(config, classifier)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Starts a run with fresh rolling state, and kicks off the model load if it never happened.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.reset_rolling_state();
        if self.ml_enabled && self.classifier.status().state == ModelState::Unloaded {
            self.classifier.load();
        }
    }

    /// Ends the run, resets all rolling state and emits neutral.
    pub fn stop(&mut self) -> Option<Technique> {
        self.running = false;
        self.reset_rolling_state();
        self.track(Technique::Neutral)
    }

    fn reset_rolling_state(&mut self) {
        self.window.clear();
        self.votes.reset();
        self.stabilizer.reset();
    }

    /// Runs the pipeline on one frame's detections.
    pub fn process_frame(&mut self, hands: &[DetectedHand], now: Instant) -> FrameReport {
        let model_status = self.classifier.poll().then(|| {
            let status = self.model_status();
            log::debug!("model status: {:?}: {}", status.status.state, status.status.message);
            status
        });

        let poses: Vec<HandPoseFlags> = hands
            .iter()
            .map(|hand| analyze_hand(&hand.landmarks, &self.config.gesture))
            .collect();
        let features = extract_frame_features(hands);

        self.window.push(features.vector.clone());
        if self.capture.is_recording() {
            self.capture.append_frame(
                features.vector.clone(),
                FrameMeta {
                    timestamp: Utc::now(),
                    has_hands: features.has_hands(),
                },
            );
        }

        let resolved = if is_override_pose(&poses) {
            self.votes.reset();
            Resolved {
                source: Source::Heuristic,
                technique: Technique::DoubleMiddleMonkey,
                confidence: 1.0,
                predicted_label: Technique::DoubleMiddleMonkey.into(),
                phase: Phase::Override,
            }
        } else if self.ml_enabled && self.classifier.is_ready() && self.window.is_full() {
            match self.classifier.predict(self.window.as_slice()) {
                Ok(prediction) => {
                    let vote = if prediction.is_confident {
                        prediction.label
                    } else {
                        Label::NoGesture
                    };
                    let state = self.votes.update(now, vote, features.has_hands());
                    Resolved {
                        source: Source::Ml,
                        technique: state.technique,
                        confidence: prediction.confidence,
                        predicted_label: prediction.label,
                        phase: state.phase,
                    }
                }
                Err(e) => {
                    log::debug!("no prediction ({}): {e}", e.reason());
                    if self.config.ml.fallback_enabled {
                        self.run_fallback(&poses)
                    } else {
                        Resolved::neutral(Phase::Unavailable)
                    }
                }
            }
        } else if self.config.ml.fallback_enabled || !self.ml_enabled {
            self.run_fallback(&poses)
        } else if self.classifier.status().state == ModelState::Error {
            Resolved::neutral(Phase::Unavailable)
        } else {
            Resolved::neutral(Phase::Waiting)
        };

        let changed = self.track(resolved.technique);

        FrameReport {
            changed,
            metrics: FrameMetrics {
                source: resolved.source,
                confidence: resolved.confidence,
                predicted_label: resolved.predicted_label,
                technique: resolved.technique,
                hand_count: features.hand_count,
                phase: resolved.phase,
                capture: self.capture.stats(),
            },
            model_status,
        }
    }

    fn run_fallback(&mut self, poses: &[HandPoseFlags]) -> Resolved {
        let detected = detect_technique(poses);
        let stable = self.stabilizer.update(detected, !poses.is_empty());
        Resolved {
            source: Source::Fallback,
            technique: stable,
            confidence: 0.0,
            predicted_label: detected.into(),
            phase: Phase::Fallback,
        }
    }

    /// Records the pipeline's technique and reports it unless a technique is forced.
    fn track(&mut self, technique: Technique) -> Option<Technique> {
        self.tracked = technique;
        if self.forced.is_some() {
            return None;
        }
        self.show(technique)
    }

    fn show(&mut self, technique: Technique) -> Option<Technique> {
        if technique == self.shown {
            return None;
        }
        log::debug!("technique: {} -> {}", self.shown, technique);
        self.shown = technique;
        Some(technique)
    }

    /// The technique most recently reported to downstream consumers.
    pub fn current_technique(&self) -> Technique {
        self.shown
    }

    /// Forces the reported technique, or returns to live tracking with `None`.
    ///
    /// Tracking keeps running while a technique is forced. Clearing the override reports the
    /// latest tracked technique. Returns the newly reported technique if it changed.
    pub fn force_technique(&mut self, technique: Option<Technique>) -> Option<Technique> {
        self.forced = technique;
        self.votes.reset();
        match technique {
            Some(t) => self.show(t),
            None => self.show(self.tracked),
        }
    }

    pub fn forced_technique(&self) -> Option<Technique> {
        self.forced
    }

    pub fn set_ml_enabled(&mut self, enabled: bool) -> MlStatus {
        self.ml_enabled = enabled;
        if enabled && self.running && self.classifier.status().state == ModelState::Unloaded {
            self.classifier.load();
        }
        self.model_status()
    }

    pub fn model_status(&self) -> MlStatus {
        MlStatus {
            status: self.classifier.status().clone(),
            ml_enabled: self.ml_enabled,
        }
    }

    /// Loads the model on the calling thread. Returns whether it is ready.
    pub fn load_model_blocking(&mut self) -> bool {
        self.classifier.load_blocking()
    }

    /// Drops the current model and loads it again in the background.
    pub fn reload_model(&mut self) {
        self.classifier.dispose();
        self.classifier.load();
    }

    pub fn start_capture(&mut self, label: Label) -> Result<(), CaptureError> {
        self.capture.start(label)
    }

    pub fn stop_capture(&mut self) -> CaptureStats {
        self.capture.stop();
        self.capture.stats()
    }

    pub fn export_capture(&self) -> CapturePayload {
        self.capture.export(Utc::now())
    }

    pub fn clear_capture(&mut self) {
        self.capture.clear();
    }

    pub fn capture_stats(&self) -> CaptureStats {
        self.capture.stats()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::classifier::tests::{red_model, FailingModel, FixedModel, MockLoader};
    use crate::landmark::Handedness;
    use crate::nn::SequenceModel;
    use crate::test::{synthetic_hand, Thumb};

    const FRAME: Duration = Duration::from_millis(33);

    fn session(
        make: fn() -> anyhow::Result<Box<dyn SequenceModel>>,
        configure: impl FnOnce(&mut Config),
    ) -> Session {
        let mut config = Config::default();
        configure(&mut config);
        let classifier = Classifier::new(MockLoader::new(make), &config.ml);
        Session::new(config, classifier)
    }

    fn fist() -> DetectedHand {
        DetectedHand::new(synthetic_hand([false; 4], Thumb::Tucked), Handedness::Right)
    }

    fn middle(handedness: Handedness) -> DetectedHand {
        DetectedHand::new(
            synthetic_hand([false, true, false, false], Thumb::Tucked),
            handedness,
        )
    }

    fn run(s: &mut Session, hands: &[DetectedHand], frames: usize, now: &mut Instant) -> Vec<FrameReport> {
        (0..frames)
            .map(|_| {
                *now += FRAME;
                s.process_frame(hands, *now)
            })
            .collect()
    }

    #[test]
    fn fallback_when_classifier_unloaded() {
        let mut s = session(red_model, |_| {});
        let mut now = Instant::now();
        let reports = run(&mut s, &[fist()], 5, &mut now);

        let changes: Vec<_> = reports.iter().map(|r| r.changed).collect();
        assert_eq!(changes, [None, None, None, Some(Technique::Blackflash), None]);
        let last = &reports[4].metrics;
        assert_eq!(last.source, Source::Fallback);
        assert_eq!(last.phase, Phase::Fallback);
        assert_eq!(last.confidence, 0.0);
        assert_eq!(last.predicted_label, Technique::Blackflash.into());
        assert_eq!(last.hand_count, 1);
    }

    #[test]
    fn ml_path_commits_after_vote() {
        let mut s = session(red_model, |c| c.ml.fallback_enabled = false);
        assert!(s.classifier.load_blocking());
        let mut now = Instant::now();

        let waiting = run(&mut s, &[fist()], 11, &mut now);
        assert!(waiting.iter().all(|r| r.metrics.phase == Phase::Waiting));

        let reports = run(&mut s, &[fist()], 4, &mut now);
        assert_eq!(reports[0].metrics.source, Source::Ml);
        assert_eq!(reports[0].metrics.phase, Phase::Neutral);
        approx::assert_abs_diff_eq!(reports[0].metrics.confidence, 0.88);
        assert_eq!(reports[3].changed, Some(Technique::Red));
        assert_eq!(reports[3].metrics.phase, Phase::Stable);
        assert_eq!(s.current_technique(), Technique::Red);
    }

    #[test]
    fn low_confidence_votes_no_gesture() {
        let mut s = session(
            || {
                let mut p = vec![0.05; 13];
                p[2] = 0.3;
                Ok(Box::new(FixedModel(p)))
            },
            |c| c.ml.fallback_enabled = false,
        );
        s.classifier.load_blocking();
        let mut now = Instant::now();
        let reports = run(&mut s, &[fist()], 20, &mut now);
        let last = &reports[19].metrics;
        assert_eq!(last.predicted_label, Technique::Blue.into());
        assert_eq!(last.technique, Technique::Neutral);
        assert_eq!(last.phase, Phase::Neutral);
        assert!(reports.iter().all(|r| r.changed.is_none()));
    }

    #[test]
    fn override_always_wins() {
        let mut s = session(red_model, |_| {});
        s.classifier.load_blocking();
        let mut now = Instant::now();
        let reports = run(&mut s, &[fist()], 15, &mut now);
        assert_eq!(reports[14].metrics.technique, Technique::Red);

        let hands = [middle(Handedness::Left), middle(Handedness::Right)];
        let report = run(&mut s, &hands, 1, &mut now).remove(0);
        assert_eq!(report.changed, Some(Technique::DoubleMiddleMonkey));
        assert_eq!(report.metrics.source, Source::Heuristic);
        assert_eq!(report.metrics.phase, Phase::Override);
        assert_eq!(report.metrics.confidence, 1.0);
        assert_eq!(s.votes.stable_technique(), Technique::Neutral);

        // Also wins over the fallback path.
        let mut s = session(red_model, |_| {});
        let report = run(&mut s, &hands, 1, &mut now).remove(0);
        assert_eq!(report.metrics.phase, Phase::Override);
    }

    #[test]
    fn waiting_vs_unavailable() {
        let mut s = session(red_model, |c| c.ml.fallback_enabled = false);
        let mut now = Instant::now();
        let report = run(&mut s, &[fist()], 1, &mut now).remove(0);
        assert_eq!(report.metrics.phase, Phase::Waiting);
        assert_eq!(report.metrics.source, Source::None);

        let mut s = session(|| anyhow::bail!("missing"), |c| c.ml.fallback_enabled = false);
        s.classifier.load_blocking();
        let report = run(&mut s, &[fist()], 1, &mut now).remove(0);
        assert_eq!(report.metrics.phase, Phase::Unavailable);
    }

    #[test]
    fn inference_failure_degrades() {
        let mut s = session(|| Ok(Box::new(FailingModel)), |c| c.ml.fallback_enabled = false);
        s.classifier.load_blocking();
        let mut now = Instant::now();
        let reports = run(&mut s, &[fist()], 13, &mut now);
        assert_eq!(reports[11].metrics.phase, Phase::Unavailable);
        assert!(!s.classifier.is_ready());
        assert_eq!(reports[12].metrics.phase, Phase::Unavailable);

        let mut s = session(|| Ok(Box::new(FailingModel)), |_| {});
        s.classifier.load_blocking();
        let reports = run(&mut s, &[fist()], 13, &mut now);
        assert_eq!(reports[11].metrics.source, Source::Fallback);
        assert_eq!(reports[12].metrics.source, Source::Fallback);
    }

    #[test]
    fn ml_disabled_uses_heuristics_even_without_fallback() {
        let mut s = session(red_model, |c| {
            c.ml.enabled = false;
            c.ml.fallback_enabled = false;
        });
        s.classifier.load_blocking();
        let mut now = Instant::now();
        let reports = run(&mut s, &[fist()], 12, &mut now);
        assert!(reports.iter().all(|r| r.metrics.source == Source::Fallback));
        assert_eq!(s.current_technique(), Technique::Blackflash);

        let status = s.set_ml_enabled(true);
        assert!(status.ml_enabled);
        assert_eq!(status.status.state, ModelState::Ready);
        let report = run(&mut s, &[fist()], 1, &mut now).remove(0);
        assert_eq!(report.metrics.source, Source::Ml);
    }

    #[test]
    fn forced_technique_masks_tracking() {
        let mut s = session(red_model, |_| {});
        let mut now = Instant::now();

        assert_eq!(s.force_technique(Some(Technique::Shrine)), Some(Technique::Shrine));
        let reports = run(&mut s, &[fist()], 6, &mut now);
        assert!(reports.iter().all(|r| r.changed.is_none()));
        assert_eq!(reports[5].metrics.technique, Technique::Blackflash);
        assert_eq!(s.current_technique(), Technique::Shrine);

        assert_eq!(s.force_technique(None), Some(Technique::Blackflash));
        assert_eq!(s.forced_technique(), None);
        assert!(run(&mut s, &[fist()], 1, &mut now)[0].changed.is_none());
    }

    #[test]
    fn stop_resets_and_emits_neutral() {
        let mut s = session(red_model, |_| {});
        s.start();
        assert!(s.is_running());
        let mut now = Instant::now();
        run(&mut s, &[fist()], 6, &mut now);
        assert_eq!(s.stop(), Some(Technique::Neutral));
        assert!(!s.is_running());
        assert!(s.window.is_empty());
        assert_eq!(s.stabilizer.stable(), Technique::Neutral);
        assert_eq!(s.stop(), None);
    }

    #[test]
    fn start_requests_model_load() {
        let mut s = session(red_model, |_| {});
        s.start();
        assert_ne!(s.classifier.status().state, ModelState::Unloaded);

        let mut now = Instant::now();
        let mut status = None;
        for _ in 0..500 {
            now += FRAME;
            if let Some(st) = s.process_frame(&[], now).model_status {
                status = Some(st);
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let status = status.unwrap();
        assert_eq!(status.status.state, ModelState::Ready);
        assert!(status.ml_enabled);
    }

    #[test]
    fn capture_through_session() {
        let mut s = session(red_model, |_| {});
        let mut now = Instant::now();
        assert!(s.start_capture(Technique::DoubleMiddleMonkey.into()).is_err());
        s.start_capture(Technique::Red.into()).unwrap();
        let reports = run(&mut s, &[fist()], 18, &mut now);
        assert_eq!(reports[17].metrics.capture.frame_count, 18);
        assert!(reports[17].metrics.capture.recording);

        let stats = s.stop_capture();
        assert_eq!(stats.sample_count, 2);
        assert!(!stats.recording);
        assert_eq!(s.export_capture().sample_count, 2);
        s.clear_capture();
        assert_eq!(s.capture_stats().sample_count, 0);
    }
}
