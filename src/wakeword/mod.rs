//! Streaming wake-word detection: sliding feature windows, the three-network
//! classification pipeline, and the patience/debounce detection policy.

pub mod detector;
pub mod window;

pub use detector::{Detection, WakeWordDetector};
pub use window::{DetectionHistory, FrameWindow};
