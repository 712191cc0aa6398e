//! Utterance pipeline state machine.
//!
//! One explicit state value replaces scattered recording/transcribing flags:
//! transitions happen only on the defined events, and starting a recording or
//! transcription while one is in flight is rejected. All recoverable failures
//! resolve back to `Idle` with the pipeline re-armed.

use crate::audio::device::{CaptureConfig, MicrophoneDevice};
use crate::audio::preprocess::AudioPreprocessor;
use crate::audio::reader::RingBufferReader;
use crate::audio::RecordingAccumulator;
use crate::config::Config;
use crate::defaults;
use crate::error::{Result, SottoError};
use crate::inference::InferenceBackend;
use crate::report::{ErrorReporter, LogReporter};
use crate::time::{Clock, SystemClock};
use crate::transcribe::decoder::{AutoregressiveDecoder, DecoderConfig};
use crate::transcribe::encoder::SpectrogramEncoderStage;
use crate::transcribe::sink::TranscriptionSink;
use crate::transcribe::vocab::Vocabulary;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pipeline lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Armed, waiting for a recording to start.
    Idle,
    /// Capturing microphone samples into the accumulator.
    Recording,
    /// Running the inference stages for a completed recording.
    Transcribing,
}

/// Events emitted to observers over the optional event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    RecordingStarted,
    RecordingStopped,
    TranscriptionComplete(String),
    UtteranceFailed(String),
}

/// Configuration for the utterance pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capture device name; `None` selects the system default.
    pub device: Option<String>,
    pub sample_rate: u32,
    /// Circular capture buffer length in seconds.
    pub buffer_secs: u32,
    /// Seconds of audio captured per utterance before auto-stop.
    pub recording_duration_secs: f32,
    /// Restart recording automatically after each completed utterance.
    pub continuous: bool,
    /// Accumulator capacity bound in samples.
    pub accumulator_capacity: usize,
    /// Pause between utterances in continuous mode.
    pub inter_utterance_pause_ms: u64,
    /// Sleep between capture polls while recording.
    pub capture_poll_interval_ms: u64,
    /// Settling delay after starting the device.
    pub mic_settle_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PipelineConfig {
    /// Derive pipeline settings from the crate configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            device: config.audio.device.clone(),
            sample_rate: config.audio.sample_rate,
            buffer_secs: 30,
            recording_duration_secs: config.audio.recording_duration_secs,
            continuous: config.audio.continuous,
            accumulator_capacity: config.accumulator_capacity(),
            inter_utterance_pause_ms: defaults::INTER_UTTERANCE_PAUSE_MS,
            capture_poll_interval_ms: 10,
            mic_settle_ms: defaults::MIC_SETTLE_MS,
        }
    }
}

/// Handle to request shutdown of a running pipeline loop.
#[derive(Clone)]
pub struct PipelineHandle {
    shutdown: Arc<AtomicBool>,
}

impl PipelineHandle {
    /// Request the run loop to stop after the current utterance.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// The utterance pipeline: microphone reader → accumulator → preprocessor →
/// encoder stage → decoder → sink.
pub struct SpeechPipeline<M: MicrophoneDevice, C: Clock = SystemClock> {
    state: PipelineState,
    reader: RingBufferReader<M>,
    accumulator: RecordingAccumulator,
    preprocessor: AudioPreprocessor,
    encoder: SpectrogramEncoderStage,
    decoder: AutoregressiveDecoder,
    sink: Box<dyn TranscriptionSink>,
    reporter: Box<dyn ErrorReporter>,
    events: Option<crossbeam_channel::Sender<PipelineEvent>>,
    config: PipelineConfig,
    clock: C,
    recording_started: Option<Instant>,
    shutdown: Arc<AtomicBool>,
}

impl<M: MicrophoneDevice> SpeechPipeline<M, SystemClock> {
    pub fn new(
        device: M,
        encoder: SpectrogramEncoderStage,
        decoder: AutoregressiveDecoder,
        sink: Box<dyn TranscriptionSink>,
        config: PipelineConfig,
    ) -> Self {
        Self::with_clock(device, encoder, decoder, sink, config, SystemClock)
    }

    /// Build the inference stages from a backend and assemble the pipeline.
    pub fn from_backend(
        device: M,
        backend: &dyn InferenceBackend,
        vocab: Arc<Vocabulary>,
        crate_config: &Config,
        sink: Box<dyn TranscriptionSink>,
    ) -> Result<Self> {
        let encoder = SpectrogramEncoderStage::from_backend(backend)?;
        let decoder = AutoregressiveDecoder::from_backend(
            backend,
            vocab,
            DecoderConfig::from(&crate_config.transcription),
        )?;
        Ok(Self::new(
            device,
            encoder,
            decoder,
            sink,
            PipelineConfig::from_config(crate_config),
        ))
    }
}

impl<M: MicrophoneDevice, C: Clock> SpeechPipeline<M, C> {
    pub fn with_clock(
        device: M,
        encoder: SpectrogramEncoderStage,
        decoder: AutoregressiveDecoder,
        sink: Box<dyn TranscriptionSink>,
        config: PipelineConfig,
        clock: C,
    ) -> Self {
        Self {
            state: PipelineState::Idle,
            reader: RingBufferReader::new(device),
            accumulator: RecordingAccumulator::new(config.accumulator_capacity),
            preprocessor: AudioPreprocessor::default(),
            encoder,
            decoder,
            sink,
            reporter: Box::new(LogReporter),
            events: None,
            config,
            clock,
            recording_started: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the error reporter.
    pub fn with_reporter(mut self, reporter: Box<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Stream pipeline events to the given channel (non-blocking sends).
    pub fn with_event_sender(mut self, tx: crossbeam_channel::Sender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Access the underlying capture device.
    pub fn device(&self) -> &M {
        self.reader.device()
    }

    pub fn device_mut(&mut self) -> &mut M {
        self.reader.device_mut()
    }

    /// Handle for requesting shutdown of [`run`](Self::run).
    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    fn send_event(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            // Channel full or closed - OK to drop events
            let _ = tx.try_send(event);
        }
    }

    /// Start the capture device and settle the read cursor.
    ///
    /// Device failures here are fatal to the pipeline instance: reported
    /// once, no retry.
    pub async fn start(&mut self) -> Result<()> {
        let capture = CaptureConfig {
            device: self.config.device.clone(),
            buffer_secs: self.config.buffer_secs,
            sample_rate: self.config.sample_rate,
        };
        if let Err(e) = self.reader.device_mut().start(&capture) {
            self.reporter.report("device", &e);
            return Err(e);
        }

        tokio::time::sleep(Duration::from_millis(self.config.mic_settle_ms)).await;
        self.reader.sync_cursor();
        Ok(())
    }

    /// Begin capturing an utterance.
    ///
    /// Returns false when a recording or transcription is already in flight;
    /// the request is rejected rather than corrupting the running utterance.
    pub fn start_recording(&mut self) -> bool {
        if self.state != PipelineState::Idle {
            return false;
        }

        self.accumulator.start();
        self.reader.sync_cursor();
        self.recording_started = Some(self.clock.now());
        self.state = PipelineState::Recording;
        self.send_event(PipelineEvent::RecordingStarted);
        true
    }

    /// Drain newly captured samples into the accumulator.
    pub fn capture_tick(&mut self) -> Result<()> {
        if self.state != PipelineState::Recording {
            return Ok(());
        }
        let frame = self.reader.poll()?;
        self.accumulator.append(&frame);
        Ok(())
    }

    /// True once the configured recording duration has elapsed.
    pub fn recording_elapsed(&self) -> bool {
        let duration = Duration::from_secs_f32(self.config.recording_duration_secs);
        self.recording_started
            .map(|started| self.clock.now().duration_since(started) >= duration)
            .unwrap_or(false)
    }

    /// Stop the recording, flush remaining samples, and transcribe.
    ///
    /// Returns the trimmed utterance text, or `None` when nothing was
    /// captured or the utterance failed recoverably (reported, pipeline
    /// re-armed). Only fatal errors propagate.
    pub async fn stop_and_transcribe(&mut self) -> Result<Option<String>> {
        if self.state != PipelineState::Recording {
            return Ok(None);
        }

        // Flush samples still buffered in the device
        let frame = self.reader.poll()?;
        self.accumulator.append(&frame);
        self.recording_started = None;
        self.send_event(PipelineEvent::RecordingStopped);

        let samples = match self.accumulator.stop() {
            Ok(samples) => samples,
            Err(e) => {
                self.reporter.report("recording", &e);
                self.state = PipelineState::Idle;
                return Ok(None);
            }
        };

        self.state = PipelineState::Transcribing;
        let result = self.transcribe_utterance(&samples).await;
        self.state = PipelineState::Idle;

        match result {
            Ok(text) => {
                if let Err(e) = self.sink.handle(&text) {
                    self.reporter.report("sink", &e);
                }
                self.send_event(PipelineEvent::TranscriptionComplete(text.clone()));
                Ok(Some(text))
            }
            Err(e) if e.is_recoverable() => {
                self.reporter.report("transcription", &e);
                self.send_event(PipelineEvent::UtteranceFailed(e.to_string()));
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Transcribe a pre-recorded sample buffer through the same stages.
    ///
    /// Rejected while a live utterance is in flight.
    pub async fn transcribe_samples(&mut self, samples: &[f32]) -> Result<String> {
        if self.state != PipelineState::Idle {
            return Err(SottoError::Other(
                "transcription already in flight".to_string(),
            ));
        }

        self.state = PipelineState::Transcribing;
        let result = self.transcribe_utterance(samples).await;
        self.state = PipelineState::Idle;

        let text = result?;
        if let Err(e) = self.sink.handle(&text) {
            self.reporter.report("sink", &e);
        }
        self.send_event(PipelineEvent::TranscriptionComplete(text.clone()));
        Ok(text)
    }

    /// Transcribe a WAV file through the same stages as live audio.
    pub async fn transcribe_wav(&mut self, path: &std::path::Path) -> Result<String> {
        let samples = crate::audio::wav::load_wav(path)?;
        self.transcribe_samples(&samples).await
    }

    /// Preprocess → encode → decode. The per-utterance tensors (waveform,
    /// encoder states, cache) are owned values dropped on every exit path.
    async fn transcribe_utterance(&mut self, samples: &[f32]) -> Result<String> {
        let prepared = self.preprocessor.prepare(samples)?;
        if prepared.too_quiet {
            self.reporter.report(
                "preprocess",
                &SottoError::Other("audio signal is too quiet, transcribing unnormalized".into()),
            );
        }

        let encoded = self.encoder.encode(prepared.waveform).await?;
        let outcome = self.decoder.decode(&encoded).await?;
        Ok(outcome.text.trim().to_string())
    }

    /// Drive the full record → transcribe cycle until shutdown.
    ///
    /// In continuous mode the cycle restarts after a fixed pause; otherwise a
    /// single utterance is processed. Returns the sink's accumulated result.
    pub async fn run(&mut self) -> Result<Option<String>> {
        self.start().await?;

        let poll_interval = Duration::from_millis(self.config.capture_poll_interval_ms);
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            self.start_recording();
            while self.state == PipelineState::Recording
                && !self.recording_elapsed()
                && !self.shutdown.load(Ordering::SeqCst)
            {
                if let Err(e) = self.capture_tick() {
                    self.reporter.report("device", &e);
                    self.reader.device_mut().end()?;
                    return Err(e);
                }
                tokio::time::sleep(poll_interval).await;
            }

            self.stop_and_transcribe().await?;

            if !self.config.continuous {
                break;
            }
            tokio::time::sleep(Duration::from_millis(self.config.inter_utterance_pause_ms)).await;
        }

        self.reader.device_mut().end()?;
        Ok(self.sink.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::MockMicrophoneDevice;
    use crate::config::Language;
    use crate::inference::{
        DEFAULT_INPUT, DEFAULT_OUTPUT, MockNetwork, NamedTensors, Tensor,
    };
    use crate::time::MockClock;
    use crate::transcribe::decoder::LOGITS;
    use crate::transcribe::sink::CollectorSink;
    use std::collections::HashMap;

    const TEST_LAYERS: usize = 1;

    fn test_vocab() -> Arc<Vocabulary> {
        Arc::new(Vocabulary::from_json(r#"{"hello": 0, " there": 1}"#).unwrap())
    }

    fn passthrough(name: &str) -> MockNetwork {
        MockNetwork::new(name).with_compute(|inputs: &NamedTensors| {
            let input = inputs
                .get(DEFAULT_INPUT)
                .cloned()
                .unwrap_or_else(|| Tensor::scalar_f32(0.0));
            HashMap::from([(DEFAULT_OUTPUT.to_string(), input)])
        })
    }

    fn prefill_network() -> MockNetwork {
        MockNetwork::new("decoder-prefill").with_compute(|_| {
            let mut outputs = HashMap::new();
            for layer in 0..TEST_LAYERS {
                for stream in ["decoder", "encoder"] {
                    for slot in ["key", "value"] {
                        outputs.insert(
                            format!("present.{}.{}.{}", layer, stream, slot),
                            Tensor::scalar_f32(0.0),
                        );
                    }
                }
            }
            outputs
        })
    }

    fn step_network(script: Vec<i32>) -> MockNetwork {
        let mut remaining = script.into_iter();
        MockNetwork::new("decoder-step").with_compute(move |_| {
            let token = remaining.next().expect("script exhausted");
            let width = defaults::END_OF_TEXT as usize + 1;
            let mut logits = vec![0.0f32; width];
            logits[token as usize] = 1.0;
            HashMap::from([(
                LOGITS.to_string(),
                Tensor::from_f32(&[1, 1, width], logits).unwrap(),
            )])
        })
    }

    fn argmax_network() -> MockNetwork {
        MockNetwork::new("argmax").with_compute(|inputs| {
            let logits = inputs.get(DEFAULT_INPUT).and_then(Tensor::as_f32).unwrap();
            let (index, _) = logits
                .iter()
                .enumerate()
                .fold((0usize, f32::MIN), |(best_i, best), (i, &v)| {
                    if v > best { (i, v) } else { (best_i, best) }
                });
            HashMap::from([(
                DEFAULT_OUTPUT.to_string(),
                Tensor::from_i32(&[1, 1], vec![index as i32]).unwrap(),
            )])
        })
    }

    fn test_pipeline(
        script: Vec<i32>,
        buffer_len: usize,
    ) -> (
        SpeechPipeline<MockMicrophoneDevice, MockClock>,
        MockClock,
        crossbeam_channel::Receiver<PipelineEvent>,
    ) {
        let device = MockMicrophoneDevice::with_buffer_len(buffer_len);
        let encoder = SpectrogramEncoderStage::new(
            Box::new(passthrough("spectrogram")),
            Box::new(passthrough("encoder")),
        );
        let decoder = AutoregressiveDecoder::new(
            Box::new(prefill_network()),
            Box::new(step_network(script)),
            Box::new(argmax_network()),
            test_vocab(),
            DecoderConfig {
                language: Language::English,
                layers: TEST_LAYERS,
                max_tokens: 20,
                max_polls: 100,
                ..DecoderConfig::default()
            },
        );

        let clock = MockClock::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let config = PipelineConfig {
            recording_duration_secs: 2.0,
            mic_settle_ms: 0,
            accumulator_capacity: buffer_len * 2,
            ..PipelineConfig::default()
        };
        let pipeline = SpeechPipeline::with_clock(
            device,
            encoder,
            decoder,
            Box::new(CollectorSink::new()),
            config,
            clock.clone(),
        )
        .with_event_sender(tx);

        (pipeline, clock, rx)
    }

    #[tokio::test]
    async fn test_initial_state_is_idle() {
        let (pipeline, _, _) = test_pipeline(vec![defaults::END_OF_TEXT], 64);
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_start_recording_rejected_while_in_flight() {
        let (mut pipeline, _, _) = test_pipeline(vec![defaults::END_OF_TEXT], 64);
        pipeline.start().await.unwrap();

        assert!(pipeline.start_recording());
        assert_eq!(pipeline.state(), PipelineState::Recording);
        // Re-entrant start must be rejected
        assert!(!pipeline.start_recording());
    }

    #[tokio::test]
    async fn test_stop_without_recording_is_noop() {
        let (mut pipeline, _, _) = test_pipeline(vec![defaults::END_OF_TEXT], 64);
        assert_eq!(pipeline.stop_and_transcribe().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_recording_returns_to_idle() {
        let (mut pipeline, _, rx) = test_pipeline(vec![defaults::END_OF_TEXT], 64);
        pipeline.start().await.unwrap();
        pipeline.start_recording();

        // No samples fed: empty buffer at stop-time
        let result = pipeline.stop_and_transcribe().await.unwrap();
        assert_eq!(result, None);
        assert_eq!(pipeline.state(), PipelineState::Idle);

        let events: Vec<_> = rx.try_iter().collect();
        assert!(events.contains(&PipelineEvent::RecordingStarted));
        assert!(events.contains(&PipelineEvent::RecordingStopped));
        assert!(!events.iter().any(
            |e| matches!(e, PipelineEvent::TranscriptionComplete(_))
        ));
    }

    #[tokio::test]
    async fn test_full_utterance_reaches_sink() {
        let (mut pipeline, _, rx) =
            test_pipeline(vec![0, 1, defaults::END_OF_TEXT], 64);
        pipeline.start().await.unwrap();
        pipeline.start_recording();

        pipeline.reader.device_mut().feed(&[0.25; 32]);
        pipeline.capture_tick().unwrap();

        let result = pipeline.stop_and_transcribe().await.unwrap();
        assert_eq!(result, Some("hello there".to_string()));
        assert_eq!(pipeline.state(), PipelineState::Idle);

        let events: Vec<_> = rx.try_iter().collect();
        assert!(events.contains(&PipelineEvent::TranscriptionComplete(
            "hello there".to_string()
        )));
    }

    #[tokio::test]
    async fn test_stop_flushes_remaining_samples() {
        let (mut pipeline, _, _) = test_pipeline(vec![0, defaults::END_OF_TEXT], 64);
        pipeline.start().await.unwrap();
        pipeline.start_recording();

        // Samples fed but never drained by capture_tick: the stop path must
        // flush them
        pipeline.reader.device_mut().feed(&[0.25; 32]);
        let result = pipeline.stop_and_transcribe().await.unwrap();
        assert_eq!(result, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn test_backend_timeout_is_recoverable() {
        let device = MockMicrophoneDevice::with_buffer_len(64);
        let encoder = SpectrogramEncoderStage::new(
            Box::new(MockNetwork::new("spectrogram").with_never_ready()),
            Box::new(passthrough("encoder")),
        )
        .with_max_polls(5);
        let decoder = AutoregressiveDecoder::new(
            Box::new(prefill_network()),
            Box::new(step_network(vec![defaults::END_OF_TEXT])),
            Box::new(argmax_network()),
            test_vocab(),
            DecoderConfig {
                layers: TEST_LAYERS,
                ..DecoderConfig::default()
            },
        );
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut pipeline = SpeechPipeline::with_clock(
            device,
            encoder,
            decoder,
            Box::new(CollectorSink::new()),
            PipelineConfig {
                mic_settle_ms: 0,
                ..PipelineConfig::default()
            },
            MockClock::new(),
        )
        .with_reporter(Box::new(crate::report::NullReporter))
        .with_event_sender(tx);

        pipeline.start().await.unwrap();
        pipeline.start_recording();
        pipeline.reader.device_mut().feed(&[0.25; 32]);

        // The hung backend aborts the utterance but not the pipeline
        let result = pipeline.stop_and_transcribe().await.unwrap();
        assert_eq!(result, None);
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert!(rx
            .try_iter()
            .any(|e| matches!(e, PipelineEvent::UtteranceFailed(_))));
    }

    #[tokio::test]
    async fn test_recording_elapsed_uses_clock() {
        let (mut pipeline, clock, _) = test_pipeline(vec![defaults::END_OF_TEXT], 64);
        pipeline.start().await.unwrap();
        pipeline.start_recording();

        assert!(!pipeline.recording_elapsed());
        clock.advance(Duration::from_secs_f32(2.5));
        assert!(pipeline.recording_elapsed());
    }

    #[tokio::test]
    async fn test_transcribe_samples_rejected_while_recording() {
        let (mut pipeline, _, _) = test_pipeline(vec![defaults::END_OF_TEXT], 64);
        pipeline.start().await.unwrap();
        pipeline.start_recording();

        let result = pipeline.transcribe_samples(&[0.1; 16]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_transcribe_samples_offline() {
        let (mut pipeline, _, _) = test_pipeline(vec![0, defaults::END_OF_TEXT], 64);
        let text = pipeline.transcribe_samples(&[0.25; 32]).await.unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_handle_stops_run_loop() {
        let (pipeline, _, _) = test_pipeline(vec![defaults::END_OF_TEXT], 64);
        let handle = pipeline.handle();
        assert!(!handle.is_stopped());
        handle.stop();
        assert!(handle.is_stopped());
    }
}
