//! Default configuration constants for sotto.
//!
//! This module provides shared constants used across different configuration types
//! to ensure consistency and eliminate duplication.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational efficiency for voice applications.
pub const SAMPLE_RATE: u32 = 16000;

/// Default recording duration in seconds before an utterance auto-stops.
pub const RECORDING_DURATION_SECS: f32 = 10.0;

/// Capacity multiplier for the recording accumulator.
///
/// The accumulator holds at most `recording_duration * sample_rate * SAFETY_FACTOR`
/// samples; older samples are evicted first when the bound is exceeded.
pub const ACCUMULATOR_SAFETY_FACTOR: usize = 2;

/// Maximum waveform length fed to the spectrogram network: 30 seconds at 16kHz.
///
/// Shorter recordings are zero-padded up to this length, longer ones truncated.
pub const MAX_SAMPLES: usize = 30 * SAMPLE_RATE as usize;

/// Peak amplitude targeted by preprocessing normalization.
pub const NORMALIZATION_TARGET: f32 = 0.95;

/// Minimum peak amplitude required before normalization is applied.
///
/// Signals below this are near-silence; scaling them would amplify noise
/// (and divide by almost zero), so they pass through unscaled.
pub const SILENCE_EPSILON: f32 = 0.001;

/// Maximum number of tokens generated per utterance, including the seed tokens.
pub const MAX_TOKENS: usize = 100;

/// Number of attention layers in the bundled decoder networks.
///
/// Each layer contributes a key/value pair for both self-attention and
/// cross-attention, so the step pass receives `4 * DECODER_LAYERS` cache tensors.
pub const DECODER_LAYERS: usize = 4;

/// Output width of the decoder's logits: the model vocabulary size.
pub const VOCAB_SIZE: usize = 51865;

/// Maximum polls of a scheduled network before the wait is abandoned.
///
/// The wait yields to the scheduler between polls; exceeding the cap surfaces
/// a backend-timeout error instead of hanging the pipeline.
pub const MAX_POLL_ATTEMPTS: u32 = 100_000;

/// Pause between utterances in continuous mode, in milliseconds.
pub const INTER_UTTERANCE_PAUSE_MS: u64 = 500;

/// Settling delay after starting the microphone device, in milliseconds.
///
/// The ring-buffer read cursor is initialized after this delay so the first
/// poll does not race the device's own startup.
pub const MIC_SETTLE_MS: u64 = 100;

// Token ids fixed by the bundled model integration.
pub const END_OF_TEXT: i32 = 50257;
pub const START_OF_TRANSCRIPT: i32 = 50258;
pub const TOKEN_ENGLISH: i32 = 50259;
pub const TOKEN_GERMAN: i32 = 50261;
pub const TOKEN_FRENCH: i32 = 50265;
pub const TOKEN_TRANSLATE: i32 = 50358;
pub const TOKEN_TRANSCRIBE: i32 = 50359;
pub const TOKEN_NO_TIMESTAMPS: i32 = 50363;
pub const TOKEN_START_TIME: i32 = 50364;

/// Wake-word defaults, matching the bundled openwakeword-style model stack.
pub mod wake {
    /// Samples per wake-word frame: 80ms at 16kHz.
    pub const FRAME_SIZE: usize = 1280;

    /// Hop between successive frames, in samples (10ms at 16kHz).
    pub const HOP_SIZE: usize = 160;

    /// Classifier score threshold for a frame to count toward detection.
    pub const THRESHOLD: f32 = 0.5;

    /// Number of consecutive above-threshold scores required to fire.
    pub const PATIENCE_FRAMES: usize = 3;

    /// Cooldown after a detection, in seconds.
    pub const DEBOUNCE_SECS: f32 = 1.0;

    /// Mel-frame window length required by the embedding network.
    pub const REQUIRED_MEL_FRAMES: usize = 76;

    /// Embedding-frame window length required by the classifier network.
    pub const REQUIRED_EMBED_FRAMES: usize = 16;

    /// Mel feature vector width per frame.
    pub const MEL_BANDS: usize = 32;

    /// Embedding feature vector width per frame.
    pub const EMBEDDING_DIM: usize = 96;

    /// Circular capture buffer length for the wake-word stream, in seconds.
    pub const BUFFER_SECS: u32 = 2;
}
