//! Timing of pipeline stages and frame rate logging.

use std::{
    cell::Cell,
    fmt::{self, Arguments},
    mem,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

/// Smoothing factor of the exponential moving average used by [`Timer`].
const EMA_ALPHA: f32 = 0.3;

/// Smoothed duration of a recurring operation.
///
/// Formatting the timer with `{}` prints the smoothed duration and starts over.
pub struct Timer {
    name: &'static str,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// Smoothed duration in seconds, `None` until the first measurement.
    avg: Option<f32>,
    /// Measurements since the last reset.
    count: usize,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::default(),
        }
    }

    /// Runs `timee` and records how long it took.
    pub fn time<T>(&self, timee: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        timee()
    }

    /// Records the time until the returned guard is dropped.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    /// Returns the smoothed duration of the operation, without resetting it.
    pub fn average(&self) -> Option<Duration> {
        self.lock().avg.map(Duration::from_secs_f32)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&self, start: Instant) {
        let secs = start.elapsed().as_secs_f32();
        let mut state = self.lock();
        state.avg = Some(match state.avg {
            Some(prev) => prev + EMA_ALPHA * (secs - prev),
            None => secs,
        });
        state.count += 1;
    }
}

/// Prints `name: <count>x<avg>ms` and resets the timer.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let State { avg, count } = mem::take(&mut *self.lock());
        let avg_ms = avg.unwrap_or(0.0) * 1000.0;

        write!(f, "{}: {count}x{avg_ms:.01}ms", self.name)
    }
}

/// A clone starts without measurements.
impl Clone for Timer {
    fn clone(&self) -> Self {
        Self::new(self.name)
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("name", &self.name)
            .field("average", &self.average())
            .finish()
    }
}

/// Returned by [`Timer::start`].
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.stop(self.start);
    }
}

/// Counts processed frames and logs the rate once per second.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
    last_fps: Option<u32>,
}

impl FpsCounter {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start: Instant::now(),
            last_fps: None,
        }
    }

    /// Counts one frame.
    pub fn tick(&mut self) {
        self.tick_impl(format_args!(""));
    }

    /// Counts one frame. `extra` is appended to the log line, typically a set of [`Timer`]s.
    pub fn tick_with<D: fmt::Display, I: IntoIterator<Item = D>>(&mut self, extra: I) {
        struct DisplayExtra<D: fmt::Display, I: Iterator<Item = D>>(Cell<Option<I>>);

        impl<D: fmt::Display, I: Iterator<Item = D>> fmt::Display for DisplayExtra<D, I> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let Some(mut iter) = self.0.take() else {
                    return Ok(());
                };
                match iter.next() {
                    Some(item) => {
                        write!(f, " ({}", item)?;
                        for item in iter {
                            write!(f, ", {}", item)?;
                        }
                        f.write_str(")")
                    }
                    None => Ok(()),
                }
            }
        }

        self.tick_impl(format_args!(
            "{}",
            DisplayExtra(Cell::new(Some(extra.into_iter())))
        ));
    }

    /// The frame count of the last completed one-second interval.
    pub fn last_fps(&self) -> Option<u32> {
        self.last_fps
    }

    fn tick_impl(&mut self, args: Arguments<'_>) {
        self.frames += 1;
        if self.start.elapsed() > Duration::from_secs(1) {
            log::debug!("{}: {} FPS{}", self.name, self.frames, args);

            self.last_fps = Some(self.frames);
            self.frames = 0;
            self.start = Instant::now();
        }
    }
}
