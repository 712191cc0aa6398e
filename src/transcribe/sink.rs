//! Pluggable transcription output handlers.
//!
//! Pairs with the microphone device for input - this handles the completed
//! utterance text.

use crate::error::Result;

/// Receives each completed utterance's trimmed text exactly once.
pub trait TranscriptionSink: Send + 'static {
    /// Handle transcribed text. Called once per completed utterance.
    fn handle(&mut self, text: &str) -> Result<()>;

    /// Called on pipeline shutdown. Return accumulated text if applicable.
    fn finish(&mut self) -> Option<String> {
        None
    }

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Sink that prints each utterance to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl TranscriptionSink for StdoutSink {
    fn handle(&mut self, text: &str) -> Result<()> {
        println!("{}", text);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

/// Sink that accumulates utterances for later retrieval.
#[derive(Debug, Clone, Default)]
pub struct CollectorSink {
    utterances: Vec<String>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn utterances(&self) -> &[String] {
        &self.utterances
    }
}

impl TranscriptionSink for CollectorSink {
    fn handle(&mut self, text: &str) -> Result<()> {
        self.utterances.push(text.to_string());
        Ok(())
    }

    fn finish(&mut self) -> Option<String> {
        if self.utterances.is_empty() {
            None
        } else {
            Some(self.utterances.join(" "))
        }
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Sink that forwards each utterance to a closure.
pub struct CallbackSink<F: FnMut(&str) + Send + 'static> {
    callback: F,
}

impl<F: FnMut(&str) + Send + 'static> CallbackSink<F> {
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F: FnMut(&str) + Send + 'static> TranscriptionSink for CallbackSink<F> {
    fn handle(&mut self, text: &str) -> Result<()> {
        (self.callback)(text);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "callback"
    }
}
