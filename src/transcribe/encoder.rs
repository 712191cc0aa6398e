//! Spectrogram and audio-encoder stage.
//!
//! Two sequential network invocations turn the fixed-length waveform into the
//! encoder hidden-state tensor every decode step reads. Each invocation is
//! asynchronous: submit, then poll until the backend reports output.

use crate::defaults;
use crate::error::Result;
use crate::inference::{
    InferenceBackend, ModelKind, Network, Tensor, await_output, single_input,
};

/// Runs mel-spectrogram extraction followed by audio encoding.
pub struct SpectrogramEncoderStage {
    spectrogram: Box<dyn Network>,
    encoder: Box<dyn Network>,
    max_polls: u32,
}

impl SpectrogramEncoderStage {
    pub fn new(spectrogram: Box<dyn Network>, encoder: Box<dyn Network>) -> Self {
        Self {
            spectrogram,
            encoder,
            max_polls: defaults::MAX_POLL_ATTEMPTS,
        }
    }

    /// Load both networks from a backend.
    pub fn from_backend(backend: &dyn InferenceBackend) -> Result<Self> {
        Ok(Self::new(
            backend.load(ModelKind::LogMelSpectrogram)?,
            backend.load(ModelKind::AudioEncoder)?,
        ))
    }

    /// Override the poll budget per invocation.
    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }

    /// Encode a prepared waveform into the utterance's hidden-state tensor.
    ///
    /// The caller owns the result and shares it read-only with every decode
    /// step of the utterance.
    pub async fn encode(&mut self, waveform: Tensor) -> Result<Tensor> {
        self.spectrogram.schedule(single_input(waveform))?;
        let log_mel = await_output(
            self.spectrogram.as_mut(),
            crate::inference::DEFAULT_OUTPUT,
            self.max_polls,
        )
        .await?;

        self.encoder.schedule(single_input(log_mel))?;
        await_output(
            self.encoder.as_mut(),
            crate::inference::DEFAULT_OUTPUT,
            self.max_polls,
        )
        .await
    }
}
