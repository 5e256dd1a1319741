//! Recording of labeled training windows.
//!
//! While a capture is active, every frame's feature vector is buffered. Stopping the capture cuts
//! the buffer into overlapping windows of `sequence_length` frames, advancing by half a window
//! each time, and keeps them as [`CaptureSample`]s until they are exported or cleared.

use std::{fmt, io};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::features::FeatureVector;
use crate::technique::Label;

/// Version of the [`CapturePayload`] layout.
pub const SCHEMA_VERSION: u32 = 1;

/// Per-frame metadata recorded alongside the feature vector.
#[derive(Debug, Clone, Copy)]
pub struct FrameMeta {
    pub timestamp: DateTime<Utc>,
    pub has_hands: bool,
}

#[derive(Debug, Clone)]
struct RecordedFrame {
    vector: FeatureVector,
    meta: FrameMeta,
}

/// One labeled training window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSample {
    pub label: Label,
    pub frames: Vec<FeatureVector>,
    /// Timestamp of the first frame in the window.
    #[serde(serialize_with = "serialize_rfc3339")]
    pub captured_at: DateTime<Utc>,
}

/// The export document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturePayload {
    pub schema_version: u32,
    #[serde(serialize_with = "serialize_rfc3339")]
    pub exported_at: DateTime<Utc>,
    pub sequence_length: usize,
    pub class_labels: Vec<Label>,
    pub sample_count: usize,
    pub samples: Vec<CaptureSample>,
}

impl CapturePayload {
    /// Writes the payload as pretty-printed JSON.
    pub fn write_json<W: io::Write>(&self, writer: W) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

/// JS-style ISO 8601 timestamps with millisecond precision, e.g. `2024-03-01T12:00:00.000Z`.
fn serialize_rfc3339<S: serde::Serializer>(
    at: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// The default file name for an export created at `now`.
pub fn export_file_name(now: DateTime<Utc>) -> String {
    let stamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("gesture-capture-{stamp}.json")
}

/// Snapshot of the recorder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStats {
    pub recording: bool,
    pub label: Label,
    /// Frames buffered by the active recording.
    pub frame_count: usize,
    /// Committed samples.
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The label is not one of the configured class labels.
    UnknownLabel(Label),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::UnknownLabel(label) => write!(f, "unknown capture label: {label}"),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Segments a live feature stream into labeled, fixed-length windows.
#[derive(Debug, Clone)]
pub struct CaptureRecorder {
    sequence_length: usize,
    class_labels: Vec<Label>,
    recording: bool,
    label: Label,
    frames: Vec<RecordedFrame>,
    samples: Vec<CaptureSample>,
}

impl CaptureRecorder {
    pub fn new(sequence_length: usize, class_labels: Vec<Label>) -> Self {
        Self {
            sequence_length,
            class_labels,
            recording: false,
            label: Label::NEUTRAL,
            frames: Vec::new(),
            samples: Vec::new(),
        }
    }

    /// Begins a recording for `label`, discarding any frames of a recording already in progress.
    pub fn start(&mut self, label: Label) -> Result<(), CaptureError> {
        if !self.class_labels.contains(&label) {
            return Err(CaptureError::UnknownLabel(label));
        }
        log::info!("capture started for '{label}'");
        self.recording = true;
        self.label = label;
        self.frames.clear();
        Ok(())
    }

    /// Ends the recording and commits its windows. Does nothing if not recording.
    pub fn stop(&mut self) {
        if !self.recording {
            return;
        }
        let new = self.segment();
        log::info!(
            "capture for '{}' stopped: {} frames, {} new samples",
            self.label,
            self.frames.len(),
            new.len(),
        );
        self.samples.extend(new);
        self.recording = false;
        self.frames.clear();
    }

    /// Buffers a frame. Ignored unless recording.
    pub fn append_frame(&mut self, vector: FeatureVector, meta: FrameMeta) {
        if !self.recording {
            return;
        }
        self.frames.push(RecordedFrame { vector, meta });
    }

    /// Returns all committed samples plus those of the recording in progress.
    pub fn export(&self, now: DateTime<Utc>) -> CapturePayload {
        let mut samples = self.samples.clone();
        if self.recording {
            samples.extend(self.segment());
        }
        CapturePayload {
            schema_version: SCHEMA_VERSION,
            exported_at: now,
            sequence_length: self.sequence_length,
            class_labels: self.class_labels.clone(),
            sample_count: samples.len(),
            samples,
        }
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            recording: self.recording,
            label: self.label,
            frame_count: self.frames.len(),
            sample_count: self.samples.len(),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Discards everything and returns to idle.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.frames.clear();
        self.recording = false;
        self.label = Label::NEUTRAL;
    }

    fn segment(&self) -> Vec<CaptureSample> {
        let len = self.sequence_length;
        if len == 0 || self.frames.len() < len {
            return Vec::new();
        }
        let stride = (len / 2).max(1);

        (0..=self.frames.len() - len)
            .step_by(stride)
            .map(|start| {
                let window = &self.frames[start..start + len];
                CaptureSample {
                    label: self.label,
                    frames: window.iter().map(|f| f.vector.clone()).collect(),
                    captured_at: window[0].meta.timestamp,
                }
            })
            .collect()
    }
}
