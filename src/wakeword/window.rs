//! Fixed-capacity sliding windows for the wake-word pipeline.

use std::collections::VecDeque;

/// FIFO window of feature vectors with a fixed frame capacity.
///
/// Backs both the mel window (embedding network input) and the embedding
/// window (classifier input); the oldest frame is evicted once full.
#[derive(Debug, Clone)]
pub struct FrameWindow {
    frames: VecDeque<Vec<f32>>,
    capacity: usize,
}

impl FrameWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a feature vector, evicting the oldest frame when over capacity.
    pub fn push(&mut self, frame: Vec<f32>) {
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

    /// True once the window holds `capacity` frames.
    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames oldest-first.
    pub fn frames(&self) -> impl Iterator<Item = &Vec<f32>> {
        self.frames.iter()
    }

    /// Flatten the window oldest-first, taking `features_per_frame` values
    /// from each frame (zero-filled when a frame is shorter).
    pub fn pack(&self, features_per_frame: usize) -> Vec<f32> {
        let mut packed = Vec::with_capacity(self.frames.len() * features_per_frame);
        for frame in &self.frames {
            for i in 0..features_per_frame {
                packed.push(frame.get(i).copied().unwrap_or(0.0));
            }
        }
        packed
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// FIFO of recent classifier scores sized to the patience window.
///
/// Detection requires every held score to clear the threshold, so a single
/// low frame resets the wait without any explicit state.
#[derive(Debug, Clone)]
pub struct DetectionHistory {
    scores: VecDeque<f32>,
    capacity: usize,
}

impl DetectionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            scores: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a score, evicting the oldest beyond the patience window.
    pub fn push(&mut self, score: f32) {
        self.scores.push_back(score);
        while self.scores.len() > self.capacity {
            self.scores.pop_front();
        }
    }

    /// True when the window is full and every score clears the threshold.
    pub fn all_above(&self, threshold: f32) -> bool {
        self.scores.len() >= self.capacity && self.scores.iter().all(|&s| s >= threshold)
    }

    /// Mean of the held scores.
    pub fn average(&self) -> f32 {
        if self.scores.is_empty() {
            return 0.0;
        }
        self.scores.iter().sum::<f32>() / self.scores.len() as f32
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}
