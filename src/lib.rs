//! Hand sign recognition.
//!
//! Turns a stream of per-frame hand landmark detections into a single debounced *technique*
//! label. A sequence classifier is used when a model is available; a rule-based detector takes
//! over whenever it is not.
//!
//! # Coordinates
//!
//! Landmark coordinates are expected in normalized image space: X points to the right, Y points
//! *down*, both in range `[0.0, 1.0]`. Z is relative depth and does not take part in any of the
//! pose heuristics.
//!
//! # Environment Variables
//!
//! * `HANDSIGN_MODEL_PATH`: overrides the path of the ONNX sequence model.
//! * `HANDSIGN_ML`: `0`/`off`/`false` disables the sequence classifier, `1`/`on`/`true` enables it.
//! * `RUST_LOG`: standard [`env_logger`] filter, applied on top of the defaults of
//!   [`init_logger!`].

use log::LevelFilter;

pub mod capture;
pub mod classifier;
pub mod config;
pub mod features;
pub mod heuristic;
pub mod landmark;
pub mod nn;
pub mod session;
pub mod technique;
pub mod timer;
pub mod tracker;
pub mod vote;
pub mod window;
pub mod worker;


/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .filter(Some("tract_onnx"), LevelFilter::Warn)
        .filter(Some("tract_core"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and `handsign` will log at *trace*
/// level. Otherwise, they will log at *debug* level.
///
/// `tract` will always log at *warn* level.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
