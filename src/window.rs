//! Rolling window of recent feature vectors.

use std::collections::VecDeque;

use crate::features::FeatureVector;

/// Holds the most recent `capacity` [`FeatureVector`]s in chronological order.
///
/// The classifier may only be invoked once the window [`is_full`][Self::is_full].
#[derive(Debug, Clone)]
pub struct SequenceWindow {
    frames: VecDeque<FeatureVector>,
    capacity: usize,
}

impl SequenceWindow {
    /// Creates an empty window holding up to `capacity` frames.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "sequence window capacity must be non-zero");
        Self {
            frames: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Appends the newest frame, evicting the oldest one if the window is over capacity.
    pub fn push(&mut self, frame: FeatureVector) {
        self.frames.push_back(frame);
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() == self.capacity
    }

    /// Frames from oldest to newest.
    pub fn frames(&self) -> impl ExactSizeIterator<Item = &FeatureVector> + '_ {
        self.frames.iter()
    }

    /// Returns the frames as a contiguous slice, oldest first.
    pub fn as_slice(&mut self) -> &[FeatureVector] {
        self.frames.make_contiguous()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FRAME_FEATURE_SIZE;

    fn frame(marker: f32) -> FeatureVector {
        let mut data = vec![0.0; FRAME_FEATURE_SIZE];
        data[0] = marker;
        FeatureVector::from_vec(data).unwrap()
    }

    #[test]
    fn fills_then_evicts_oldest() {
        let mut window = SequenceWindow::new(3);
        window.push(frame(1.0));
        window.push(frame(2.0));
        assert!(!window.is_full());
        window.push(frame(3.0));
        assert!(window.is_full());
        window.push(frame(4.0));
        assert_eq!(window.len(), 3);
        let markers: Vec<f32> = window.frames().map(|f| f[0]).collect();
        assert_eq!(markers, [2.0, 3.0, 4.0]);
        assert_eq!(window.as_slice()[0][0], 2.0);
    }

    #[test]
    fn clear_empties() {
        let mut window = SequenceWindow::new(2);
        window.push(frame(1.0));
        window.push(frame(1.0));
        window.clear();
        assert!(window.is_empty());
        assert!(!window.is_full());
    }
}
