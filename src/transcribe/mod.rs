//! Transcription: spectrogram/encoder stage, the autoregressive two-pass
//! decoder, the vocabulary detokenizer, and the utterance pipeline tying
//! them to the microphone.

pub mod decoder;
pub mod encoder;
pub mod pipeline;
pub mod sink;
pub mod vocab;

pub use decoder::{AutoregressiveDecoder, DecodeOutcome, DecoderConfig};
pub use encoder::SpectrogramEncoderStage;
pub use pipeline::{
    PipelineConfig, PipelineEvent, PipelineHandle, PipelineState, SpeechPipeline,
};
pub use sink::{CallbackSink, CollectorSink, StdoutSink, TranscriptionSink};
pub use vocab::Vocabulary;
