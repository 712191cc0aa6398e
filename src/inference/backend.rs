//! Inference backend abstraction.
//!
//! Networks are opaque: schedule named input tensors, then poll for outputs
//! until the backend reports them ready. The traits allow swapping
//! implementations (real runtime vs mock).

use crate::defaults;
use crate::error::{Result, SottoError};
use crate::inference::tensor::{NamedTensors, Tensor};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Conventional name of a network's single unnamed output.
pub const DEFAULT_OUTPUT: &str = "output";

/// Conventional name of a network's single unnamed input.
pub const DEFAULT_INPUT: &str = "input";

/// The bundled model set consumed by the pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// Waveform to log-mel spectrogram.
    LogMelSpectrogram,
    /// Log-mel spectrogram to encoder hidden states.
    AudioEncoder,
    /// Full token sequence + encoder states to per-layer key/value cache.
    DecoderPrefill,
    /// Single pending token + cache to next-step logits.
    DecoderStep,
    /// Logits to highest-scoring token id.
    Argmax,
    /// Wake-word frame to mel features.
    MelFeatures,
    /// Mel window to speech embedding.
    SpeechEmbedding,
    /// Embedding window to wake-word score.
    WakeClassifier,
}

impl ModelKind {
    /// Stable name used in error reporting.
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::LogMelSpectrogram => "log-mel-spectrogram",
            ModelKind::AudioEncoder => "audio-encoder",
            ModelKind::DecoderPrefill => "decoder-prefill",
            ModelKind::DecoderStep => "decoder-step",
            ModelKind::Argmax => "argmax",
            ModelKind::MelFeatures => "mel-features",
            ModelKind::SpeechEmbedding => "speech-embedding",
            ModelKind::WakeClassifier => "wake-classifier",
        }
    }
}

/// A loaded network that executes asynchronously.
///
/// `schedule` submits work; `peek_output` returns `None` until the output is
/// ready. Outputs stay readable until the next `schedule`.
pub trait Network: Send {
    /// Name for error reporting.
    fn name(&self) -> &str;

    /// Submit an invocation with the given named inputs.
    fn schedule(&mut self, inputs: NamedTensors) -> Result<()>;

    /// Non-blocking output read: `None` while the invocation is in flight.
    fn peek_output(&mut self, output: &str) -> Option<Tensor>;
}

/// Loads networks by model kind.
pub trait InferenceBackend: Send + Sync {
    fn load(&self, model: ModelKind) -> Result<Box<dyn Network>>;
}

/// Poll a scheduled network until the named output is ready.
///
/// Yields to the scheduler between polls so other tasks advance. Gives up
/// after `max_polls` attempts with a `BackendTimeout` — an unbounded wait
/// would hang the pipeline on a backend that never completes.
pub async fn await_output(
    network: &mut dyn Network,
    output: &str,
    max_polls: u32,
) -> Result<Tensor> {
    for _ in 0..max_polls {
        if let Some(tensor) = network.peek_output(output) {
            return Ok(tensor);
        }
        tokio::task::yield_now().await;
    }
    Err(SottoError::BackendTimeout {
        network: network.name().to_string(),
        output: output.to_string(),
        attempts: max_polls,
    })
}

/// `await_output` for the conventional single-output case.
pub async fn await_default_output(network: &mut dyn Network) -> Result<Tensor> {
    await_output(network, DEFAULT_OUTPUT, defaults::MAX_POLL_ATTEMPTS).await
}

/// Closure mapping scheduled inputs to named outputs.
pub type ComputeFn = Box<dyn FnMut(&NamedTensors) -> HashMap<String, Tensor> + Send>;

/// Mock network for testing.
///
/// Outputs are either fixed via `with_output` or computed from the scheduled
/// inputs via `with_compute`. `with_latency` makes `peek_output` return `None`
/// for the first N polls after each schedule, exercising the polling path.
pub struct MockNetwork {
    name: String,
    fixed_outputs: HashMap<String, Tensor>,
    compute: Option<ComputeFn>,
    current_outputs: HashMap<String, Tensor>,
    latency_polls: u32,
    polls_remaining: u32,
    scheduled: bool,
    never_ready: bool,
    should_fail_schedule: bool,
    captured: Arc<Mutex<Vec<NamedTensors>>>,
}

impl MockNetwork {
    /// Create a new mock network with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fixed_outputs: HashMap::new(),
            compute: None,
            current_outputs: HashMap::new(),
            latency_polls: 0,
            polls_remaining: 0,
            scheduled: false,
            never_ready: false,
            should_fail_schedule: false,
            captured: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure a fixed output under the given name.
    pub fn with_output(mut self, output: &str, tensor: Tensor) -> Self {
        self.fixed_outputs.insert(output.to_string(), tensor);
        self
    }

    /// Configure a fixed output under the conventional default name.
    pub fn with_default_output(self, tensor: Tensor) -> Self {
        self.with_output(DEFAULT_OUTPUT, tensor)
    }

    /// Configure outputs computed from the scheduled inputs.
    pub fn with_compute(
        mut self,
        compute: impl FnMut(&NamedTensors) -> HashMap<String, Tensor> + Send + 'static,
    ) -> Self {
        self.compute = Some(Box::new(compute));
        self
    }

    /// Require N polls before each scheduled output becomes visible.
    pub fn with_latency(mut self, polls: u32) -> Self {
        self.latency_polls = polls;
        self
    }

    /// Configure the mock to never produce output (timeout path).
    pub fn with_never_ready(mut self) -> Self {
        self.never_ready = true;
        self
    }

    /// Configure the mock to fail on schedule.
    pub fn with_schedule_failure(mut self) -> Self {
        self.should_fail_schedule = true;
        self
    }

    /// Handle to the inputs captured by every `schedule` call.
    ///
    /// Clone before boxing the network to assert on submitted inputs later.
    pub fn captured_inputs(&self) -> Arc<Mutex<Vec<NamedTensors>>> {
        Arc::clone(&self.captured)
    }
}

impl Network for MockNetwork {
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(&mut self, inputs: NamedTensors) -> Result<()> {
        if self.should_fail_schedule {
            return Err(SottoError::BackendInference {
                network: self.name.clone(),
                message: "mock schedule failure".to_string(),
            });
        }

        self.current_outputs = match self.compute.as_mut() {
            Some(compute) => compute(&inputs),
            None => self.fixed_outputs.clone(),
        };

        if let Ok(mut captured) = self.captured.lock() {
            captured.push(inputs);
        }

        self.polls_remaining = self.latency_polls;
        self.scheduled = true;
        Ok(())
    }

    fn peek_output(&mut self, output: &str) -> Option<Tensor> {
        if !self.scheduled || self.never_ready {
            return None;
        }
        if self.polls_remaining > 0 {
            self.polls_remaining -= 1;
            return None;
        }
        self.current_outputs.get(output).cloned()
    }
}

/// Mock backend holding pre-built networks per model kind.
///
/// `load` hands each network out once; loading an unconfigured kind is an
/// error, mirroring a missing model asset.
#[derive(Default)]
pub struct MockBackend {
    networks: Mutex<HashMap<ModelKind, Box<dyn Network>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a network for the given model kind.
    pub fn with_network(self, model: ModelKind, network: impl Network + 'static) -> Self {
        if let Ok(mut networks) = self.networks.lock() {
            networks.insert(model, Box::new(network));
        }
        self
    }
}

impl InferenceBackend for MockBackend {
    fn load(&self, model: ModelKind) -> Result<Box<dyn Network>> {
        self.networks
            .lock()
            .map_err(|e| SottoError::Other(format!("mock backend lock poisoned: {}", e)))?
            .remove(&model)
            .ok_or_else(|| SottoError::ModelNotFound {
                name: model.name().to_string(),
            })
    }
}
