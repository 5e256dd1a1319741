//! Single-flight frame scheduling around an external hand detector.
//!
//! The [`Tracker`] is ticked once per camera frame. Hand detection runs on a worker thread, and at
//! most one detection is outstanding at any time: frames that arrive while the detector is busy,
//! or sooner than the configured minimum interval, are dropped rather than queued.
//!
//! Every submitted frame is tagged with the run it belongs to. Stopping the tracker starts a new
//! run, so a detection that completes after a stop is discarded instead of being applied.

use std::time::{Duration, Instant};

use crate::landmark::DetectedHand;
use crate::session::{FrameReport, Session};
use crate::technique::Technique;
use crate::timer::FpsCounter;
use crate::worker::{promise, Promise, PromiseHandle, PromiseState, Worker};

/// Produces hand landmarks for camera frames.
pub trait HandDetector: Send + 'static {
    type Frame: Send + 'static;

    fn detect(&mut self, frame: Self::Frame) -> anyhow::Result<Vec<DetectedHand>>;
}

type Detection = anyhow::Result<Vec<DetectedHand>>;

struct Job<F> {
    frame: F,
    promise: Promise<Detection>,
}

struct InFlight {
    handle: PromiseHandle<Detection>,
    generation: u64,
}

/// Feeds frames through a [`HandDetector`] into a [`Session`].
pub struct Tracker<D: HandDetector> {
    session: Session,
    worker: Worker<Job<D::Frame>>,
    in_flight: Option<InFlight>,
    generation: u64,
    min_interval: Duration,
    last_submitted: Option<Instant>,
    max_hands: usize,
    fps: FpsCounter,
}

impl<D: HandDetector> Tracker<D> {
    pub fn new(session: Session, mut detector: D) -> anyhow::Result<Self> {
        let worker = Worker::builder()
            .name("hand detector")
            .capacity(1)
            .spawn(move |job: Job<D::Frame>| job.promise.fulfill(detector.detect(job.frame)))?;
        let tracking = &session.config().tracking;
        Ok(Self {
            min_interval: tracking.min_frame_interval(),
            max_hands: tracking.max_hands,
            session,
            worker,
            in_flight: None,
            generation: 0,
            last_submitted: None,
            fps: FpsCounter::new("tracker"),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Whether a detection is outstanding.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Whether the outstanding detection has completed and will be consumed by the next tick.
    pub fn has_result(&self) -> bool {
        self.in_flight
            .as_ref()
            .map_or(false, |job| job.handle.is_fulfilled())
    }

    /// Starts a new run. Results of detections submitted before this call are discarded.
    pub fn start(&mut self) {
        if self.session.is_running() {
            return;
        }
        self.generation += 1;
        self.last_submitted = None;
        self.session.start();
    }

    /// Stops the run. Any detection in flight will be discarded when it completes.
    ///
    /// Returns `Some(Technique::Neutral)` if this changed the reported technique.
    pub fn stop(&mut self) -> Option<Technique> {
        self.generation += 1;
        self.session.stop()
    }

    /// Applies a completed detection, then submits `frame` if the detector is free.
    ///
    /// Returns the report of the frame whose detection was applied, if any.
    pub fn tick(&mut self, frame: D::Frame, now: Instant) -> Option<FrameReport> {
        let report = self.collect(now);

        if !self.session.is_running() {
            return report;
        }
        if self.in_flight.is_some() {
            log::trace!("detector busy, dropping frame");
            return report;
        }
        if let Some(last) = self.last_submitted {
            if now.saturating_duration_since(last) < self.min_interval {
                log::trace!("frame too early, dropping it");
                return report;
            }
        }

        let (promise, handle) = promise();
        self.worker.send(Job { frame, promise });
        self.in_flight = Some(InFlight {
            handle,
            generation: self.generation,
        });
        self.last_submitted = Some(now);

        report
    }

    fn collect(&mut self, now: Instant) -> Option<FrameReport> {
        let job = self.in_flight.as_mut()?;
        let detection = match job.handle.poll() {
            PromiseState::Pending => return None,
            PromiseState::Fulfilled(detection) => detection,
            PromiseState::Dropped => Err(anyhow::anyhow!("hand detector thread exited")),
        };
        let generation = job.generation;
        self.in_flight = None;

        if generation != self.generation || !self.session.is_running() {
            log::trace!("discarding detection from a previous run");
            return None;
        }

        let mut hands = match detection {
            Ok(hands) => hands,
            Err(e) => {
                log::warn!("hand detection failed: {e:#}");
                return None;
            }
        };
        hands.truncate(self.max_hands);

        let report = self.session.process_frame(&hands, now);
        if let Some(technique) = report.changed {
            log::debug!("technique changed to {technique} ({})", report.metrics.phase);
        }
        self.fps
            .tick_with([self.session.classifier().inference_timer()]);
        Some(report)
    }
}
