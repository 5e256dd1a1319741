//! Replays recorded landmark streams through the recognition pipeline.
//!
//! ```text
//! handsign [--config <file>] [--no-ml] [--capture <label>] <landmarks.jsonl>
//! ```
//!
//! Each input line is one frame:
//!
//! ```json
//! {"timestampMs": 1234.5, "hands": [{"handedness": "Left", "landmarks": [[0.5, 0.8, 0.0], ...]}]}
//! ```
//!
//! Technique changes are printed to stdout. With `--capture`, the whole replay is recorded under
//! the given label and exported as a capture file to the working directory.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufRead, BufReader, BufWriter},
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::{bail, Context};
use chrono::Utc;
use handsign::{
    capture::export_file_name,
    config::Config,
    landmark::{DetectedHand, HandLandmarks, Handedness, LANDMARK_COUNT},
    session::Session,
    technique::Label,
};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordedFrame {
    timestamp_ms: f64,
    #[serde(default)]
    hands: Vec<RecordedHand>,
}

#[derive(Deserialize)]
struct RecordedHand {
    #[serde(default)]
    handedness: String,
    landmarks: [[f32; 3]; LANDMARK_COUNT],
}

impl RecordedHand {
    fn into_detected(self) -> DetectedHand {
        let handedness = self.handedness.parse().unwrap_or(Handedness::Unknown);
        DetectedHand::new(HandLandmarks::from_arrays(self.landmarks), handedness)
    }
}

struct Args {
    config: Option<PathBuf>,
    no_ml: bool,
    capture: Option<Label>,
    input: PathBuf,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut config = None;
    let mut no_ml = false;
    let mut capture = None;
    let mut input = None;

    let mut args = std::env::args_os().skip(1);
    while let Some(arg) = args.next() {
        let flag = arg.to_string_lossy().into_owned();
        match flag.as_str() {
            "--config" => {
                config = Some(args.next().context("`--config` requires a path")?.into());
            }
            "--no-ml" => no_ml = true,
            "--capture" => {
                let label = args.next().context("`--capture` requires a label")?;
                let label = label.to_string_lossy().parse::<Label>()?;
                capture = Some(label);
            }
            _ if flag.starts_with("--") => bail!("unknown option `{flag}`"),
            _ if input.is_none() => input = Some(arg.into()),
            _ => bail!("unexpected argument '{flag}'"),
        }
    }

    Ok(Args {
        config,
        no_ml,
        capture,
        input: input.context(
            "usage: handsign [--config <file>] [--no-ml] [--capture <label>] <landmarks.jsonl>",
        )?,
    })
}

fn main() -> anyhow::Result<()> {
    handsign::init_logger!();

    let args = parse_args()?;
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => {
            let mut config = Config::default();
            config.apply_env();
            config
        }
    };
    if args.no_ml {
        config.ml.enabled = false;
    }

    let ml_enabled = config.ml.enabled;
    let mut session = Session::from_config(config);
    if ml_enabled && !session.load_model_blocking() {
        log::warn!("{}", session.model_status().status.message);
    }
    session.start();
    if let Some(label) = args.capture {
        session.start_capture(label)?;
    }

    let file = File::open(&args.input)
        .with_context(|| format!("failed to open '{}'", args.input.display()))?;
    let base = Instant::now();
    let mut frames = 0;
    let mut phases = BTreeMap::new();

    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: RecordedFrame = serde_json::from_str(&line)
            .with_context(|| format!("invalid frame on line {}", i + 1))?;
        let hands: Vec<DetectedHand> = frame
            .hands
            .into_iter()
            .map(RecordedHand::into_detected)
            .collect();

        let now = base + Duration::from_secs_f64(frame.timestamp_ms.max(0.0) / 1000.0);
        let report = session.process_frame(&hands, now);
        frames += 1;
        *phases.entry(report.metrics.phase.as_str()).or_insert(0usize) += 1;

        if let Some(technique) = report.changed {
            println!(
                "{:>10.1}ms  {:<20} {:<10} {} ({:.2})",
                frame.timestamp_ms,
                technique.as_str(),
                report.metrics.phase.as_str(),
                report.metrics.source,
                report.metrics.confidence,
            );
        }
    }

    log::info!("replayed {frames} frames, phases: {phases:?}");
    log::info!("{}", session.classifier().inference_timer());

    if args.capture.is_some() {
        let stats = session.stop_capture();
        let payload = session.export_capture();
        let path = export_file_name(Utc::now());
        let out = File::create(&path).with_context(|| format!("failed to create '{path}'"))?;
        payload.write_json(BufWriter::new(out))?;
        log::info!(
            "wrote {} samples ({} committed) to '{path}'",
            payload.sample_count,
            stats.sample_count,
        );
    }

    session.stop();
    Ok(())
}
