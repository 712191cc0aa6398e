//! Autoregressive two-pass decoder loop.
//!
//! The bundled decoder is split into two networks. The prefill pass runs over
//! the entire token sequence plus the encoder hidden states and emits one
//! key/value pair per layer for both self-attention and cross-attention. The
//! step pass runs over the single pending token with those cached tensors as
//! explicit named inputs and emits next-step logits; an argmax network then
//! selects the token id.
//!
//! The sequence intentionally trails the pending token by one position: each
//! completed step appends the *previous* pending token, so the prefill pass
//! never sees the newest pick. Altering this bookkeeping changes generated
//! output.

use crate::config::{Language, TranscriptionConfig};
use crate::defaults;
use crate::error::{Result, SottoError};
use crate::inference::{
    InferenceBackend, ModelKind, NamedTensors, Network, Tensor, await_output, single_input,
};
use crate::transcribe::vocab::Vocabulary;
use std::sync::Arc;

/// Input name for the token sequence and the pending token.
pub const INPUT_IDS: &str = "input_ids";

/// Input name for the cached encoder hidden states.
pub const ENCODER_HIDDEN_STATES: &str = "encoder_hidden_states";

/// Output name of the step pass.
pub const LOGITS: &str = "logits";

/// Attention stream names used in the cache tensor naming scheme.
const CACHE_STREAMS: [&str; 2] = ["decoder", "encoder"];

/// Key/value slot names used in the cache tensor naming scheme.
const CACHE_SLOTS: [&str; 2] = ["key", "value"];

/// Prefill output name for one cache tensor: `present.<layer>.<stream>.<slot>`.
fn present_name(layer: usize, stream: &str, slot: &str) -> String {
    format!("present.{}.{}.{}", layer, stream, slot)
}

/// Step input name for one cache tensor: `past_key_values.<layer>.<stream>.<slot>`.
fn past_name(layer: usize, stream: &str, slot: &str) -> String {
    format!("past_key_values.{}.{}.{}", layer, stream, slot)
}

/// Decoder configuration derived from the transcription settings.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub language: Language,
    pub translate_to_english: bool,
    pub include_timestamps: bool,
    /// Token budget per utterance, seed tokens included.
    pub max_tokens: usize,
    /// Attention layers in the decoder networks.
    pub layers: usize,
    /// Poll budget per network invocation.
    pub max_polls: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            language: Language::English,
            translate_to_english: false,
            include_timestamps: false,
            max_tokens: defaults::MAX_TOKENS,
            layers: defaults::DECODER_LAYERS,
            max_polls: defaults::MAX_POLL_ATTEMPTS,
        }
    }
}

impl From<&TranscriptionConfig> for DecoderConfig {
    fn from(config: &TranscriptionConfig) -> Self {
        Self {
            language: config.language,
            translate_to_english: config.translate_to_english,
            include_timestamps: config.include_timestamps,
            max_tokens: config.max_tokens,
            ..Self::default()
        }
    }
}

/// Per-step cache: the prefill pass's present tensors keyed by the step
/// pass's past input names. Produced and consumed within a single step,
/// dropped when the step completes.
struct StepCache {
    tensors: Vec<(String, Tensor)>,
}

/// Result of a completed decode loop.
#[derive(Debug, Clone)]
pub struct DecodeOutcome {
    /// Concatenated detokenized text, untrimmed.
    pub text: String,
    /// Final token sequence, seed tokens included.
    pub tokens: Vec<i32>,
    /// True when the loop stopped on end-of-text rather than the budget.
    pub reached_end_of_text: bool,
}

/// The two-pass autoregressive decoder.
pub struct AutoregressiveDecoder {
    prefill: Box<dyn Network>,
    step: Box<dyn Network>,
    argmax: Box<dyn Network>,
    vocab: Arc<Vocabulary>,
    config: DecoderConfig,
}

impl AutoregressiveDecoder {
    pub fn new(
        prefill: Box<dyn Network>,
        step: Box<dyn Network>,
        argmax: Box<dyn Network>,
        vocab: Arc<Vocabulary>,
        config: DecoderConfig,
    ) -> Self {
        Self {
            prefill,
            step,
            argmax,
            vocab,
            config,
        }
    }

    /// Load the three networks from a backend.
    pub fn from_backend(
        backend: &dyn InferenceBackend,
        vocab: Arc<Vocabulary>,
        config: DecoderConfig,
    ) -> Result<Self> {
        Ok(Self::new(
            backend.load(ModelKind::DecoderPrefill)?,
            backend.load(ModelKind::DecoderStep)?,
            backend.load(ModelKind::Argmax)?,
            vocab,
            config,
        ))
    }

    /// The seed tokens: start-of-transcript, language, task.
    fn seed_tokens(&self) -> Vec<i32> {
        let task = if self.config.translate_to_english {
            defaults::TOKEN_TRANSLATE
        } else {
            defaults::TOKEN_TRANSCRIBE
        };
        vec![
            defaults::START_OF_TRANSCRIPT,
            self.config.language.token_id(),
            task,
        ]
    }

    /// Run the decode loop against an encoded utterance.
    ///
    /// Generates one token per step until end-of-text is selected or the
    /// sequence reaches `max_tokens - 1`. There is no mid-decode
    /// cancellation; per-step cache tensors are dropped as each step ends and
    /// the token buffers when the loop returns, on every exit path.
    pub async fn decode(&mut self, encoder_states: &Tensor) -> Result<DecodeOutcome> {
        let mut tokens = self.seed_tokens();
        let mut pending = if self.config.include_timestamps {
            defaults::TOKEN_START_TIME
        } else {
            defaults::TOKEN_NO_TIMESTAMPS
        };

        let mut text = String::new();
        let mut reached_end_of_text = false;

        while !reached_end_of_text && tokens.len() < self.config.max_tokens - 1 {
            let cache = self.prefill_pass(&tokens, encoder_states).await?;
            let logits = self.step_pass(pending, cache).await?;
            let selected = self.select_token(logits).await?;

            // One-step lag: the sequence takes the previous pending token,
            // the new pick becomes pending for the next step.
            tokens.push(pending);
            pending = selected;

            if selected == defaults::END_OF_TEXT {
                reached_end_of_text = true;
            } else if let Some(fragment) = self.vocab.decode(selected) {
                text.push_str(&fragment);
            }
        }

        Ok(DecodeOutcome {
            text,
            tokens,
            reached_end_of_text,
        })
    }

    /// First sub-pass: full sequence + encoder states → per-layer cache.
    async fn prefill_pass(&mut self, tokens: &[i32], encoder_states: &Tensor) -> Result<StepCache> {
        let input_ids = Tensor::from_i32(&[1, tokens.len()], tokens.to_vec())?;
        let inputs = NamedTensors::new()
            .with(INPUT_IDS, input_ids)
            .with(ENCODER_HIDDEN_STATES, encoder_states.clone());
        self.prefill.schedule(inputs)?;

        let mut tensors = Vec::with_capacity(self.config.layers * 4);
        for layer in 0..self.config.layers {
            for stream in CACHE_STREAMS {
                for slot in CACHE_SLOTS {
                    let tensor = await_output(
                        self.prefill.as_mut(),
                        &present_name(layer, stream, slot),
                        self.config.max_polls,
                    )
                    .await?;
                    tensors.push((past_name(layer, stream, slot), tensor));
                }
            }
        }

        Ok(StepCache { tensors })
    }

    /// Second sub-pass: pending token + cache → next-step logits.
    async fn step_pass(&mut self, pending: i32, cache: StepCache) -> Result<Tensor> {
        let mut inputs = NamedTensors::new().with(INPUT_IDS, Tensor::from_i32(&[1, 1], vec![pending])?);
        for (name, tensor) in cache.tensors {
            inputs.insert(&name, tensor);
        }
        self.step.schedule(inputs)?;

        await_output(self.step.as_mut(), LOGITS, self.config.max_polls).await
    }

    /// Argmax over the logits' last dimension, first maximum winning ties.
    async fn select_token(&mut self, logits: Tensor) -> Result<i32> {
        self.argmax.schedule(single_input(logits))?;
        let selected = await_output(
            self.argmax.as_mut(),
            crate::inference::DEFAULT_OUTPUT,
            self.config.max_polls,
        )
        .await?;

        selected.first_i32().ok_or_else(|| SottoError::TensorShape {
            network: self.argmax.name().to_string(),
            message: "argmax output holds no token id".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{DEFAULT_INPUT, DEFAULT_OUTPUT, MockNetwork};
    use std::collections::HashMap;

    const TEST_LAYERS: usize = 2;

    fn test_vocab() -> Arc<Vocabulary> {
        let json = r#"{"he": 0, "llo": 1, " world": 2, "!": 3}"#;
        Arc::new(Vocabulary::from_json(json).unwrap())
    }

    fn test_config() -> DecoderConfig {
        DecoderConfig {
            layers: TEST_LAYERS,
            max_tokens: 20,
            max_polls: 100,
            ..DecoderConfig::default()
        }
    }

    /// Prefill mock producing a distinct dummy tensor per cache output.
    fn prefill_network() -> MockNetwork {
        MockNetwork::new("decoder-prefill").with_compute(|_| {
            let mut outputs = HashMap::new();
            for layer in 0..TEST_LAYERS {
                for stream in CACHE_STREAMS {
                    for slot in CACHE_SLOTS {
                        outputs.insert(
                            present_name(layer, stream, slot),
                            Tensor::scalar_f32(layer as f32),
                        );
                    }
                }
            }
            outputs
        })
    }

    /// Step mock emitting one-hot logits for a scripted token sequence.
    ///
    /// Panics the test (empty outputs) if scheduled past the end of the
    /// script. Asserts every step receives the full cache tensor set.
    fn step_network(script: Vec<i32>) -> MockNetwork {
        let mut remaining = script.into_iter();
        MockNetwork::new("decoder-step").with_compute(move |inputs| {
            assert_eq!(
                inputs.len(),
                1 + TEST_LAYERS * 4,
                "step pass must receive input_ids plus all cache tensors"
            );

            let token = remaining.next().expect("script exhausted");
            let mut logits = vec![0.0f32; 10];
            logits[token as usize] = 1.0;
            HashMap::from([(
                LOGITS.to_string(),
                Tensor::from_f32(&[1, 1, 10], logits).unwrap(),
            )])
        })
    }

    /// Argmax mock computing a real first-max over the logits.
    fn argmax_network() -> MockNetwork {
        MockNetwork::new("argmax").with_compute(|inputs| {
            let logits = inputs
                .get(DEFAULT_INPUT)
                .and_then(Tensor::as_f32)
                .expect("argmax input must be float logits");
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

    fn decoder(script: Vec<i32>, config: DecoderConfig) -> AutoregressiveDecoder {
        AutoregressiveDecoder::new(
            Box::new(prefill_network()),
            Box::new(step_network(script)),
            Box::new(argmax_network()),
            test_vocab(),
            config,
        )
    }

    /// Step mock emitting one-hot logits wide enough to score the real
    /// control token ids (end-of-text, timestamps).
    fn wide_step_network(script: Vec<i32>) -> MockNetwork {
        let mut remaining = script.into_iter();
        MockNetwork::new("decoder-step").with_compute(move |_| {
            let token = remaining.next().expect("script exhausted");
            let width = defaults::TOKEN_START_TIME as usize + 2;
            let mut logits = vec![0.0f32; width];
            logits[token as usize] = 1.0;
            HashMap::from([(
                LOGITS.to_string(),
                Tensor::from_f32(&[1, 1, width], logits).unwrap(),
            )])
        })
    }

    fn wide_decoder(script: Vec<i32>) -> AutoregressiveDecoder {
        AutoregressiveDecoder::new(
            Box::new(prefill_network()),
            Box::new(wide_step_network(script)),
            Box::new(argmax_network()),
            test_vocab(),
            test_config(),
        )
    }

    #[tokio::test]
    async fn test_decode_terminates_on_end_of_text() {
        let mut decoder = wide_decoder(vec![0, 1, defaults::END_OF_TEXT]);
        let outcome = decoder.decode(&Tensor::scalar_f32(0.0)).await.unwrap();

        assert!(outcome.reached_end_of_text);
        assert_eq!(outcome.text, "hello");
        // 3 seed tokens + one appended pending token per completed step
        assert_eq!(outcome.tokens.len(), 6);
    }

    #[tokio::test]
    async fn test_sequence_grows_by_one_per_step() {
        let mut decoder = wide_decoder(vec![0, 1, 2, 3, defaults::END_OF_TEXT]);
        let outcome = decoder.decode(&Tensor::scalar_f32(0.0)).await.unwrap();

        // 5 completed steps on top of the 3 seed tokens
        assert_eq!(outcome.tokens.len(), 8);
    }

    #[tokio::test]
    async fn test_one_step_lag_keeps_newest_pick_out_of_prefill() {
        let prefill = prefill_network();
        let captured = prefill.captured_inputs();
        let mut decoder = AutoregressiveDecoder::new(
            Box::new(prefill),
            Box::new(wide_step_network(vec![0, 1, defaults::END_OF_TEXT])),
            Box::new(argmax_network()),
            test_vocab(),
            test_config(),
        );

        let outcome = decoder.decode(&Tensor::scalar_f32(0.0)).await.unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 3);

        let sequences: Vec<Vec<i32>> = captured
            .iter()
            .map(|inputs| {
                inputs
                    .get(INPUT_IDS)
                    .and_then(Tensor::as_i32)
                    .unwrap()
                    .iter()
                    .copied()
                    .collect()
            })
            .collect();

        let seed = vec![
            defaults::START_OF_TRANSCRIPT,
            defaults::TOKEN_ENGLISH,
            defaults::TOKEN_TRANSCRIBE,
        ];

        // Step 1 sees only the seed; the initial pending token (selected
        // nowhere) arrives in step 2's sequence; token 0, picked in step 1,
        // arrives only in step 3's sequence.
        assert_eq!(sequences[0], seed);
        assert_eq!(
            sequences[1],
            [seed.clone(), vec![defaults::TOKEN_NO_TIMESTAMPS]].concat()
        );
        assert_eq!(
            sequences[2],
            [seed, vec![defaults::TOKEN_NO_TIMESTAMPS, 0]].concat()
        );

        // The final sequence trails the last pick: token 1 was appended when
        // end-of-text was selected, end-of-text itself never enters.
        assert_eq!(
            outcome.tokens[outcome.tokens.len() - 1],
            1,
            "last appended token should be the pick before end-of-text"
        );
    }

    #[tokio::test]
    async fn test_decode_stops_at_token_budget() {
        // Script far more tokens than the budget admits
        let mut config = test_config();
        config.max_tokens = 8;
        let mut decoder = decoder(vec![0; 20], config);

        let outcome = decoder.decode(&Tensor::scalar_f32(0.0)).await.unwrap();

        assert!(!outcome.reached_end_of_text);
        // Loop runs while len < max_tokens - 1: 3 seeds + 4 steps = 7
        assert_eq!(outcome.tokens.len(), 7);
    }

    #[tokio::test]
    async fn test_out_of_vocabulary_ids_are_skipped_silently() {
        // 50364 is far beyond the 4-entry test vocabulary
        let mut decoder = wide_decoder(vec![0, 50364, 1, defaults::END_OF_TEXT]);
        let outcome = decoder.decode(&Tensor::scalar_f32(0.0)).await.unwrap();

        // 50364 contributed no text and did not fail the utterance
        assert_eq!(outcome.text, "hello");
        assert!(outcome.reached_end_of_text);
    }

    #[tokio::test]
    async fn test_translate_task_token_in_seed() {
        let prefill = prefill_network();
        let captured = prefill.captured_inputs();

        let mut config = test_config();
        config.translate_to_english = true;
        config.language = Language::German;
        let mut decoder = AutoregressiveDecoder::new(
            Box::new(prefill),
            Box::new(wide_step_network(vec![defaults::END_OF_TEXT])),
            Box::new(argmax_network()),
            test_vocab(),
            config,
        );
        decoder.decode(&Tensor::scalar_f32(0.0)).await.unwrap();

        let captured = captured.lock().unwrap();
        let seed: Vec<i32> = captured[0]
            .get(INPUT_IDS)
            .and_then(Tensor::as_i32)
            .unwrap()
            .iter()
            .copied()
            .collect();
        assert_eq!(
            seed,
            vec![
                defaults::START_OF_TRANSCRIPT,
                defaults::TOKEN_GERMAN,
                defaults::TOKEN_TRANSLATE,
            ]
        );
    }

    #[tokio::test]
    async fn test_timestamp_pending_token() {
        let prefill = prefill_network();
        let captured = prefill.captured_inputs();

        let mut config = test_config();
        config.include_timestamps = true;
        let mut decoder = AutoregressiveDecoder::new(
            Box::new(prefill),
            Box::new(wide_step_network(vec![0, defaults::END_OF_TEXT])),
            Box::new(argmax_network()),
            test_vocab(),
            config,
        );
        decoder.decode(&Tensor::scalar_f32(0.0)).await.unwrap();

        let captured = captured.lock().unwrap();
        let second: Vec<i32> = captured[1]
            .get(INPUT_IDS)
            .and_then(Tensor::as_i32)
            .unwrap()
            .iter()
            .copied()
            .collect();
        // With timestamps enabled the initial pending token is START_TIME
        assert_eq!(*second.last().unwrap(), defaults::TOKEN_START_TIME);
    }

    #[tokio::test]
    async fn test_hung_prefill_times_out() {
        let mut config = test_config();
        config.max_polls = 10;
        let mut decoder = AutoregressiveDecoder::new(
            Box::new(MockNetwork::new("decoder-prefill").with_never_ready()),
            Box::new(wide_step_network(vec![defaults::END_OF_TEXT])),
            Box::new(argmax_network()),
            test_vocab(),
            config,
        );

        let result = decoder.decode(&Tensor::scalar_f32(0.0)).await;
        assert!(matches!(result, Err(SottoError::BackendTimeout { .. })));
    }

    #[tokio::test]
    async fn test_cache_names_follow_layer_scheme() {
        assert_eq!(present_name(0, "decoder", "key"), "present.0.decoder.key");
        assert_eq!(
            past_name(3, "encoder", "value"),
            "past_key_values.3.encoder.value"
        );
    }

    #[tokio::test]
    async fn test_text_accumulates_across_steps() {
        let mut config = test_config();
        config.max_tokens = 7;
        let mut decoder = decoder(vec![3, 3, 3, 3], config);

        let outcome = decoder.decode(&Tensor::scalar_f32(0.0)).await.unwrap();
        assert_eq!(outcome.text, "!!!");
        assert!(!outcome.reached_end_of_text);
    }
}
