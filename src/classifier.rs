//! Sequence classification of feature windows.
//!
//! The [`Classifier`] owns the model lifecycle:
//!
//! ```text
//! unloaded --load()--> loading --ok--> ready
//!                         |              |
//!                         +--err--> error <--inference failure
//! ```
//!
//! `error` is terminal until [`Classifier::load`] is called again. Loading happens on a background
//! thread; [`Classifier::poll`] picks up the result without blocking.

use std::{fmt, sync::Arc};

use serde::Serialize;

use crate::config::MlConfig;
use crate::features::{FeatureVector, FRAME_FEATURE_SIZE};
use crate::nn::{ModelLoader, OnnxLoader, SequenceModel};
use crate::technique::Label;
use crate::timer::Timer;
use crate::worker::{spawn_task, PromiseHandle, PromiseState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
    Error,
}

/// Model lifecycle state with a user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    pub state: ModelState,
    pub message: String,
    /// Underlying cause, for `Error` states.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelStatus {
    fn new(state: ModelState, message: &str) -> Self {
        Self {
            state,
            message: message.to_string(),
            error: None,
        }
    }

    fn error(message: &str, cause: &anyhow::Error) -> Self {
        Self {
            state: ModelState::Error,
            message: message.to_string(),
            error: Some(format!("{cause:#}")),
        }
    }
}

/// Output of a successful [`Classifier::predict`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    /// The label with the highest probability.
    pub label: Label,
    /// Probability of `label`.
    pub confidence: f32,
    /// Raw model output, one entry per class label.
    pub probabilities: Vec<f32>,
    /// Whether `confidence` reaches the configured minimum.
    pub is_confident: bool,
}

/// Reasons a prediction was not produced. Every variant means "use the fallback path".
#[derive(Debug)]
pub enum PredictError {
    /// No model is loaded.
    Unavailable,
    /// The window does not hold exactly `sequence_length` frames.
    WindowSizeMismatch { expected: usize, actual: usize },
    /// The model failed during inference and has been unloaded.
    InferenceFailed(anyhow::Error),
}

impl PredictError {
    /// Short machine-readable reason: `unavailable` or `inference_failed`.
    pub fn reason(&self) -> &'static str {
        match self {
            PredictError::Unavailable | PredictError::WindowSizeMismatch { .. } => "unavailable",
            PredictError::InferenceFailed(_) => "inference_failed",
        }
    }
}

impl fmt::Display for PredictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictError::Unavailable => f.write_str("classifier is not ready"),
            PredictError::WindowSizeMismatch { expected, actual } => {
                write!(f, "window holds {actual} frames, expected {expected}")
            }
            PredictError::InferenceFailed(e) => write!(f, "inference failed: {e}"),
        }
    }
}

impl std::error::Error for PredictError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PredictError::InferenceFailed(e) => Some(&**e),
            _ => None,
        }
    }
}

type LoadResult = anyhow::Result<Box<dyn SequenceModel>>;

/// Classifies full [`SequenceWindow`]s into labels.
///
/// [`SequenceWindow`]: crate::window::SequenceWindow
pub struct Classifier {
    loader: Arc<dyn ModelLoader>,
    class_labels: Vec<Label>,
    sequence_length: usize,
    min_confidence: f32,
    model: Option<Box<dyn SequenceModel>>,
    pending: Option<PromiseHandle<LoadResult>>,
    status: ModelStatus,
    t_infer: Timer,
}

impl Classifier {
    pub fn new(loader: Arc<dyn ModelLoader>, config: &MlConfig) -> Self {
        Self {
            loader,
            class_labels: config.class_labels.clone(),
            sequence_length: config.sequence_length,
            min_confidence: config.min_predict_confidence,
            model: None,
            pending: None,
            status: ModelStatus::new(ModelState::Unloaded, "ML model not loaded."),
            t_infer: Timer::new("infer"),
        }
    }

    /// Creates a classifier that loads the ONNX model at `config.model_path`.
    pub fn from_config(config: &MlConfig) -> Self {
        let loader = OnnxLoader::new(
            config.model_path.clone(),
            config.sequence_length,
            FRAME_FEATURE_SIZE,
        );
        Self::new(Arc::new(loader), config)
    }

    /// Starts loading the model on a background thread.
    ///
    /// Does nothing if a load is already in flight or the model is ready.
    pub fn load(&mut self) {
        if self.pending.is_some() || self.model.is_some() {
            log::trace!("ignoring model load request ({:?})", self.status.state);
            return;
        }

        log::debug!("loading sequence model from '{}'", self.loader.describe());
        let loader = self.loader.clone();
        match spawn_task("model-loader", move || loader.load()) {
            Ok(handle) => {
                self.pending = Some(handle);
                self.status = ModelStatus::new(ModelState::Loading, "Loading ML model...");
            }
            Err(e) => self.fail_load(&e.into()),
        }
    }

    /// Loads the model on the calling thread, waiting for any load already in flight.
    ///
    /// Returns whether the classifier is ready afterwards.
    pub fn load_blocking(&mut self) -> bool {
        if self.model.is_some() {
            return true;
        }
        let result = match self.pending.take() {
            Some(handle) => handle
                .block()
                .unwrap_or_else(|_| Err(anyhow::anyhow!("model loader thread panicked"))),
            None => self.loader.load(),
        };
        self.finish_load(result);
        self.is_ready()
    }

    /// Applies the result of a background load if it has completed.
    ///
    /// Returns `true` if the status changed.
    pub fn poll(&mut self) -> bool {
        let Some(handle) = &mut self.pending else {
            return false;
        };
        let result = match handle.poll() {
            PromiseState::Pending => return false,
            PromiseState::Fulfilled(result) => result,
            PromiseState::Dropped => Err(anyhow::anyhow!("model loader thread panicked")),
        };
        self.pending = None;
        self.finish_load(result);
        true
    }

    fn finish_load(&mut self, result: LoadResult) {
        match result {
            Ok(model) => {
                self.model = Some(model);
                self.status = ModelStatus::new(ModelState::Ready, "ML model ready.");
                log::info!("ML model ready");
            }
            Err(e) => self.fail_load(&e),
        }
    }

    fn fail_load(&mut self, e: &anyhow::Error) {
        log::warn!("failed to load sequence model: {e:#}");
        self.model = None;
        self.status = ModelStatus::error(
            "Failed to load model. Falling back to legacy detection.",
            e,
        );
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    pub fn status(&self) -> &ModelStatus {
        &self.status
    }

    /// Timing of recent [`predict`][Self::predict] calls.
    pub fn inference_timer(&self) -> &Timer {
        &self.t_infer
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn class_labels(&self) -> &[Label] {
        &self.class_labels
    }

    /// Classifies a window of exactly `sequence_length` frames, oldest first.
    ///
    /// An inference failure unloads the model; later calls return [`PredictError::Unavailable`]
    /// until the model is reloaded.
    pub fn predict(&mut self, window: &[FeatureVector]) -> Result<ClassificationResult, PredictError> {
        let Some(model) = &self.model else {
            return Err(PredictError::Unavailable);
        };
        if window.len() != self.sequence_length {
            return Err(PredictError::WindowSizeMismatch {
                expected: self.sequence_length,
                actual: window.len(),
            });
        }

        let feature_size = window.first().map_or(0, |frame| frame.len());
        let mut input = Vec::with_capacity(self.sequence_length * feature_size);
        for frame in window {
            input.extend_from_slice(frame.as_slice());
        }

        let result = self.t_infer.time(|| {
            let probabilities =
                model.estimate(&input, [1, self.sequence_length, feature_size])?;
            if probabilities.is_empty() {
                anyhow::bail!("model produced an empty output");
            }
            Ok(probabilities)
        });

        match result {
            Ok(probabilities) => {
                let (best, confidence) = argmax(&probabilities);
                let label = self
                    .class_labels
                    .get(best)
                    .copied()
                    .unwrap_or(Label::NoGesture);
                Ok(ClassificationResult {
                    label,
                    confidence,
                    is_confident: confidence >= self.min_confidence,
                    probabilities,
                })
            }
            Err(e) => {
                log::warn!("inference failed, unloading model: {e:#}");
                self.model = None;
                self.status = ModelStatus::error(
                    "Inference failed. Falling back to legacy detection.",
                    &e,
                );
                Err(PredictError::InferenceFailed(e))
            }
        }
    }

    /// Drops the model and discards any load in flight.
    pub fn dispose(&mut self) {
        self.model = None;
        self.pending = None;
        self.status = ModelStatus::new(ModelState::Unloaded, "ML model unloaded.");
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("status", &self.status)
            .field("sequence_length", &self.sequence_length)
            .field("loading", &self.pending.is_some())
            .finish()
    }
}

/// Index and value of the first maximum.
fn argmax(values: &[f32]) -> (usize, f32) {
    let mut best = 0;
    let mut max = f32::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > max {
            max = v;
            best = i;
        }
    }
    (best, values.get(best).copied().unwrap_or(0.0))
}
