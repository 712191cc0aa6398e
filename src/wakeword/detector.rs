//! Streaming wake-word classifier.
//!
//! Runs independently of the transcription pipeline, sharing only the
//! microphone. Fixed-size frames flow through three networks: mel features
//! per frame, a speech embedding over the full mel window, and a classifier
//! over the full embedding window. Detection requires a run of consecutive
//! above-threshold scores and is suppressed for a cooldown after each fire,
//! so single-frame spikes and sustained utterances both fire exactly once.

use crate::config::WakeWordConfig;
use crate::defaults;
use crate::error::{Result, SottoError};
use crate::inference::{
    InferenceBackend, ModelKind, Network, Tensor, await_output, single_input,
};
use crate::time::{Clock, SystemClock};
use crate::wakeword::window::{DetectionHistory, FrameWindow};
use std::time::Duration;

/// A fired wake-word detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Classifier score of the frame that completed the patience run.
    pub score: f32,
}

/// The wake-word stream classifier.
pub struct WakeWordDetector<C: Clock = SystemClock> {
    config: WakeWordConfig,
    mel: Box<dyn Network>,
    embedding: Box<dyn Network>,
    classifier: Box<dyn Network>,
    mel_window: FrameWindow,
    embed_window: FrameWindow,
    history: DetectionHistory,
    last_detection: Option<std::time::Instant>,
    backlog: Vec<f32>,
    clock: C,
    max_polls: u32,
}

impl WakeWordDetector<SystemClock> {
    pub fn new(
        mel: Box<dyn Network>,
        embedding: Box<dyn Network>,
        classifier: Box<dyn Network>,
        config: WakeWordConfig,
    ) -> Self {
        Self::with_clock(mel, embedding, classifier, config, SystemClock)
    }

    /// Load the three networks from a backend.
    pub fn from_backend(backend: &dyn InferenceBackend, config: WakeWordConfig) -> Result<Self> {
        Ok(Self::new(
            backend.load(ModelKind::MelFeatures)?,
            backend.load(ModelKind::SpeechEmbedding)?,
            backend.load(ModelKind::WakeClassifier)?,
            config,
        ))
    }
}

impl<C: Clock> WakeWordDetector<C> {
    pub fn with_clock(
        mel: Box<dyn Network>,
        embedding: Box<dyn Network>,
        classifier: Box<dyn Network>,
        config: WakeWordConfig,
        clock: C,
    ) -> Self {
        Self {
            mel_window: FrameWindow::new(config.required_mel_frames),
            embed_window: FrameWindow::new(config.required_embed_frames),
            history: DetectionHistory::new(config.patience_frames),
            config,
            mel,
            embedding,
            classifier,
            last_detection: None,
            backlog: Vec::new(),
            clock,
            max_polls: defaults::MAX_POLL_ATTEMPTS,
        }
    }

    /// Override the poll budget per network invocation.
    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }

    /// Queue captured samples for processing.
    pub fn push_samples(&mut self, samples: &[f32]) {
        self.backlog.extend_from_slice(samples);
    }

    /// Samples queued but not yet consumed by a full frame.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Process every complete frame in the backlog.
    ///
    /// Returns the detections fired, usually zero or one; a long backlog can
    /// span several patience runs.
    pub async fn process_pending(&mut self) -> Result<Vec<Detection>> {
        let mut detections = Vec::new();
        while self.backlog.len() >= self.config.frame_size {
            let frame: Vec<f32> = self.backlog.drain(..self.config.frame_size).collect();
            if let Some(detection) = self.process_frame(frame).await? {
                detections.push(detection);
            }
        }
        Ok(detections)
    }

    /// Run one frame through mel → embedding → classifier.
    ///
    /// Short-circuits while either window is still filling.
    async fn process_frame(&mut self, frame: Vec<f32>) -> Result<Option<Detection>> {
        let mel_features = self.mel_features(frame).await?;
        self.mel_window.push(mel_features);
        if !self.mel_window.is_full() {
            return Ok(None);
        }

        let embedding_features = self.embedding_features().await?;
        self.embed_window.push(embedding_features);
        if !self.embed_window.is_full() {
            return Ok(None);
        }

        let score = self.classify().await?;
        Ok(self.evaluate(score))
    }

    /// Mel network over one frame: `[1, frame_size]` → 32 features.
    async fn mel_features(&mut self, frame: Vec<f32>) -> Result<Vec<f32>> {
        let input = Tensor::from_f32(&[1, self.config.frame_size], frame)?;
        self.mel.schedule(single_input(input))?;
        let output = await_output(
            self.mel.as_mut(),
            crate::inference::DEFAULT_OUTPUT,
            self.max_polls,
        )
        .await?;

        extract_features(&output, defaults::wake::MEL_BANDS, self.mel.name())
    }

    /// Embedding network over the mel window: `[1, mel_frames, 32, 1]` → 96
    /// features.
    async fn embedding_features(&mut self) -> Result<Vec<f32>> {
        let mel_frames = self.config.required_mel_frames;
        let packed = self.mel_window.pack(defaults::wake::MEL_BANDS);
        let input = Tensor::from_f32(&[1, mel_frames, defaults::wake::MEL_BANDS, 1], packed)?;

        self.embedding.schedule(single_input(input))?;
        let output = await_output(
            self.embedding.as_mut(),
            crate::inference::DEFAULT_OUTPUT,
            self.max_polls,
        )
        .await?;

        extract_features(&output, defaults::wake::EMBEDDING_DIM, self.embedding.name())
    }

    /// Classifier over the embedding window: `[1, embed_frames, 96]` → score.
    async fn classify(&mut self) -> Result<f32> {
        let embed_frames = self.config.required_embed_frames;
        let packed = self.embed_window.pack(defaults::wake::EMBEDDING_DIM);
        let input = Tensor::from_f32(&[1, embed_frames, defaults::wake::EMBEDDING_DIM], packed)?;

        self.classifier.schedule(single_input(input))?;
        let output = await_output(
            self.classifier.as_mut(),
            crate::inference::DEFAULT_OUTPUT,
            self.max_polls,
        )
        .await?;

        output.first_f32().ok_or_else(|| SottoError::TensorShape {
            network: self.classifier.name().to_string(),
            message: "classifier output holds no score".to_string(),
        })
    }

    /// Apply the patience-and-debounce detection policy to a score.
    fn evaluate(&mut self, score: f32) -> Option<Detection> {
        self.history.push(score);

        if !self.history.all_above(self.config.threshold) {
            return None;
        }

        let debounce = Duration::from_secs_f32(self.config.debounce_secs);
        let now = self.clock.now();
        let suppressed = self
            .last_detection
            .map(|last| now.duration_since(last) < debounce)
            .unwrap_or(false);
        if suppressed {
            return None;
        }

        self.last_detection = Some(now);
        Some(Detection { score })
    }
}

/// Read the first `count` values of a float output, in flat order.
fn extract_features(output: &Tensor, count: usize, network: &str) -> Result<Vec<f32>> {
    let array = output.as_f32().ok_or_else(|| SottoError::TensorShape {
        network: network.to_string(),
        message: "expected a float feature tensor".to_string(),
    })?;

    if array.len() < count {
        return Err(SottoError::TensorShape {
            network: network.to_string(),
            message: format!("expected at least {} features, got {}", count, array.len()),
        });
    }

    Ok(array.iter().take(count).copied().collect())
}
