//! sotto - streaming speech-to-text with wake-word detection
//!
//! A real-time microphone pipeline feeding a multi-stage neural inference
//! backend: ring-buffer capture, bounded accumulation, fixed-length
//! preprocessing, mel-spectrogram encoding, an autoregressive two-pass
//! decoder with cached attention state, and byte-level detokenization. A
//! companion wake-word classifier streams in parallel, sharing only the
//! microphone.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod config;
pub mod defaults;
pub mod error;
pub mod inference;
pub mod report;
pub mod time;
pub mod transcribe;
pub mod wakeword;

// Core traits (source → process → sink)
pub use audio::device::{CaptureConfig, MicrophoneDevice, MockMicrophoneDevice};
pub use inference::{InferenceBackend, Network, Tensor};
pub use transcribe::sink::{CallbackSink, CollectorSink, StdoutSink, TranscriptionSink};

// Pipelines
pub use transcribe::pipeline::{
    PipelineConfig, PipelineEvent, PipelineHandle, PipelineState, SpeechPipeline,
};
pub use wakeword::{Detection, WakeWordDetector};

// Error handling
pub use error::{Result, SottoError};

// Config
pub use config::{Config, Language};
