//! Error types for sotto.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SottoError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Microphone device errors — fatal to the pipeline instance
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("Audio format mismatch: expected {expected}, got {actual}")]
    AudioFormatMismatch { expected: String, actual: String },

    // Inference backend errors — recoverable per utterance
    #[error("Model not available: {name}")]
    ModelNotFound { name: String },

    #[error("Network '{network}' produced no output '{output}' after {attempts} polls")]
    BackendTimeout {
        network: String,
        output: String,
        attempts: u32,
    },

    #[error("Network '{network}' inference failed: {message}")]
    BackendInference { network: String, message: String },

    #[error("Unexpected tensor from '{network}': {message}")]
    TensorShape { network: String, message: String },

    // Data errors
    #[error("No audio captured before stop")]
    NoAudioCaptured,

    #[error("Vocabulary asset is invalid: {message}")]
    VocabularyInvalid { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl SottoError {
    /// True when the error aborts only the current utterance.
    ///
    /// The pipeline releases the utterance's tensors and returns to idle;
    /// fatal errors (device failures) tear the pipeline instance down instead.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SottoError::BackendTimeout { .. }
                | SottoError::BackendInference { .. }
                | SottoError::TensorShape { .. }
                | SottoError::NoAudioCaptured
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, SottoError>;
