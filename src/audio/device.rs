//! Microphone device interface.
//!
//! A device records into a fixed circular buffer and exposes its write head;
//! readers track their own cursor and pull samples incrementally. The trait
//! allows swapping implementations (real audio device vs mock).

use crate::defaults;
use crate::error::{Result, SottoError};

/// Parameters for starting a capture device.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Device name; `None` selects the system default.
    pub device: Option<String>,
    /// Circular buffer length in seconds.
    pub buffer_secs: u32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: None,
            buffer_secs: 30,
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

/// Trait for microphone capture devices.
///
/// The device writes float PCM samples into a circular buffer of
/// `buffer_secs * sample_rate` samples, wrapping around indefinitely.
pub trait MicrophoneDevice: Send {
    /// Start capturing into the circular buffer.
    fn start(&mut self, config: &CaptureConfig) -> Result<()>;

    /// Current write-head index into the circular buffer.
    fn position(&self) -> usize;

    /// Copy `out.len()` samples from the circular buffer starting at `offset`.
    ///
    /// The range must not cross the buffer end; callers split wrapped reads.
    fn read(&self, offset: usize, out: &mut [f32]) -> Result<()>;

    /// Circular buffer capacity in samples.
    fn buffer_len(&self) -> usize;

    /// True while the device is actively capturing.
    fn is_recording(&self) -> bool;

    /// Stop capturing.
    fn end(&mut self) -> Result<()>;
}

/// Mock microphone device for testing.
///
/// Tests feed samples in with [`MockMicrophoneDevice::feed`]; the mock writes
/// them into its circular buffer exactly as a hardware device would, including
/// wraparound.
#[derive(Debug, Clone)]
pub struct MockMicrophoneDevice {
    ring: Vec<f32>,
    write_pos: usize,
    recording: bool,
    should_fail_start: bool,
    error_message: String,
}

impl MockMicrophoneDevice {
    /// Create a mock with a 1-second buffer at the default sample rate.
    pub fn new() -> Self {
        Self::with_buffer_len(defaults::SAMPLE_RATE as usize)
    }

    /// Create a mock with an explicit circular buffer capacity.
    pub fn with_buffer_len(len: usize) -> Self {
        Self {
            ring: vec![0.0; len],
            write_pos: 0,
            recording: false,
            should_fail_start: false,
            error_message: "mock microphone error".to_string(),
        }
    }

    /// Configure the mock to fail on start.
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the error message for failures.
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Write samples into the circular buffer, advancing the write head.
    pub fn feed(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.ring[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.ring.len();
        }
    }
}

impl Default for MockMicrophoneDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MicrophoneDevice for MockMicrophoneDevice {
    fn start(&mut self, _config: &CaptureConfig) -> Result<()> {
        if self.should_fail_start {
            return Err(SottoError::AudioCapture {
                message: self.error_message.clone(),
            });
        }
        self.recording = true;
        Ok(())
    }

    fn position(&self) -> usize {
        self.write_pos
    }

    fn read(&self, offset: usize, out: &mut [f32]) -> Result<()> {
        let end = offset + out.len();
        if end > self.ring.len() {
            return Err(SottoError::AudioCapture {
                message: format!(
                    "read of {}..{} exceeds buffer of {}",
                    offset,
                    end,
                    self.ring.len()
                ),
            });
        }
        out.copy_from_slice(&self.ring[offset..end]);
        Ok(())
    }

    fn buffer_len(&self) -> usize {
        self.ring.len()
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn end(&mut self) -> Result<()> {
        self.recording = false;
        Ok(())
    }
}
