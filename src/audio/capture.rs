//! Real microphone capture using CPAL (Cross-Platform Audio Library).
//!
//! Writes float PCM into a fixed circular buffer, exposing the write head so
//! [`RingBufferReader`](crate::audio::reader::RingBufferReader) can drain it
//! incrementally.

use crate::audio::device::{CaptureConfig, MicrophoneDevice};
use crate::error::{Result, SottoError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Preferred device names for GNOME/PipeWire environments.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns to filter out (not useful for voice input).
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

/// Check if a device name should be filtered out.
fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

/// Check if a device is a preferred device.
fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List all available audio input devices with filtering and recommendations.
///
/// Preferred devices are marked with "\[recommended\]"; obviously unusable
/// devices (surround channels, HDMI, etc.) are filtered out.
///
/// # Errors
/// Returns `SottoError::AudioCapture` if device enumeration fails.
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _ = host; // keep host alive while iterating devices
    let devices = devices.map_err(|e| SottoError::AudioCapture {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }

            if is_preferred_device(&name) {
                device_names.push(format!("{} [recommended]", name));
            } else {
                device_names.push(name);
            }
        }
    }

    Ok(device_names)
}

/// Get the best default input device, preferring PipeWire/PulseAudio.
///
/// This ensures we respect the desktop's audio device selection.
fn get_best_default_device() -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| SottoError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

/// Find a device by name, or the best default when no name is given.
fn resolve_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        if let Some(name) = device_name {
            let host = cpal::default_host();
            let devices = host.input_devices().map_err(|e| SottoError::AudioCapture {
                message: format!("Failed to enumerate devices: {}", e),
            })?;

            for dev in devices {
                if let Ok(dev_name) = dev.name()
                    && dev_name == name
                {
                    return Ok(dev);
                }
            }

            Err(SottoError::AudioDeviceNotFound {
                device: name.to_string(),
            })
        } else {
            get_best_default_device()
        }
    })
}

/// Circular buffer shared between the CPAL callback and the reader.
#[derive(Debug)]
struct RingState {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl RingState {
    fn write(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.buffer[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.buffer.len();
        }
    }
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: The stream is only accessed under the Mutex in
/// CpalMicrophoneDevice; its methods are called synchronously and never cross
/// thread boundaries unsafely.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Real microphone device implementation using CPAL.
///
/// Captures float PCM mono at the configured rate into a looping circular
/// buffer, mirroring a hardware ring-buffer device.
pub struct CpalMicrophoneDevice {
    stream: Arc<Mutex<Option<SendableStream>>>,
    ring: Arc<Mutex<RingState>>,
}

impl CpalMicrophoneDevice {
    pub fn new() -> Self {
        Self {
            stream: Arc::new(Mutex::new(None)),
            ring: Arc::new(Mutex::new(RingState {
                buffer: Vec::new(),
                write_pos: 0,
            })),
        }
    }

    fn build_stream(&self, device: &cpal::Device, sample_rate: u32) -> Result<cpal::Stream> {
        let stream_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            eprintln!("Audio stream error: {}", err);
        };

        // Try f32/mono first — PipeWire/PulseAudio convert transparently
        let ring = Arc::clone(&self.ring);
        if let Ok(stream) = device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut ring) = ring.lock() {
                    ring.write(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        // Fall back to i16/mono for devices that only expose integer formats
        let ring = Arc::clone(&self.ring);
        device
            .build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut ring) = ring.lock() {
                        let converted: Vec<f32> =
                            data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                        ring.write(&converted);
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| SottoError::AudioCapture {
                message: format!("Failed to build input stream: {}", e),
            })
    }
}

impl Default for CpalMicrophoneDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MicrophoneDevice for CpalMicrophoneDevice {
    fn start(&mut self, config: &CaptureConfig) -> Result<()> {
        {
            let stream_guard = self.stream.lock().map_err(|e| SottoError::AudioCapture {
                message: format!("Failed to lock stream: {}", e),
            })?;
            if stream_guard.is_some() {
                return Ok(()); // Already started
            }
        }

        let capacity = config.buffer_secs as usize * config.sample_rate as usize;
        {
            let mut ring = self.ring.lock().map_err(|e| SottoError::AudioCapture {
                message: format!("Failed to lock ring buffer: {}", e),
            })?;
            ring.buffer = vec![0.0; capacity];
            ring.write_pos = 0;
        }

        let device = resolve_device(config.device.as_deref())?;
        let stream = self.build_stream(&device, config.sample_rate)?;
        stream.play().map_err(|e| SottoError::AudioCapture {
            message: format!("Failed to start audio stream: {}", e),
        })?;

        let mut stream_guard = self.stream.lock().map_err(|e| SottoError::AudioCapture {
            message: format!("Failed to lock stream: {}", e),
        })?;
        *stream_guard = Some(SendableStream(stream));
        Ok(())
    }

    fn position(&self) -> usize {
        self.ring.lock().map(|ring| ring.write_pos).unwrap_or(0)
    }

    fn read(&self, offset: usize, out: &mut [f32]) -> Result<()> {
        let ring = self.ring.lock().map_err(|e| SottoError::AudioCapture {
            message: format!("Failed to lock ring buffer: {}", e),
        })?;

        let end = offset + out.len();
        if end > ring.buffer.len() {
            return Err(SottoError::AudioCapture {
                message: format!(
                    "read of {}..{} exceeds buffer of {}",
                    offset,
                    end,
                    ring.buffer.len()
                ),
            });
        }
        out.copy_from_slice(&ring.buffer[offset..end]);
        Ok(())
    }

    fn buffer_len(&self) -> usize {
        self.ring.lock().map(|ring| ring.buffer.len()).unwrap_or(0)
    }

    fn is_recording(&self) -> bool {
        self.stream
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    fn end(&mut self) -> Result<()> {
        let mut stream_guard = self.stream.lock().map_err(|e| SottoError::AudioCapture {
            message: format!("Failed to lock stream: {}", e),
        })?;

        if let Some(sendable_stream) = stream_guard.take() {
            sendable_stream
                .0
                .pause()
                .map_err(|e| SottoError::AudioCapture {
                    message: format!("Failed to stop audio stream: {}", e),
                })?;
        }
        Ok(())
    }
}
