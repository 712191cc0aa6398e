//! Audio capture and conditioning: microphone devices, the incremental
//! ring-buffer reader, the bounded recording accumulator, and waveform
//! preprocessing.

pub mod accumulator;
#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod device;
pub mod preprocess;
pub mod reader;
pub mod wav;

pub use accumulator::RecordingAccumulator;
#[cfg(feature = "cpal-audio")]
pub use capture::{CpalMicrophoneDevice, list_devices};
pub use device::{CaptureConfig, MicrophoneDevice, MockMicrophoneDevice};
pub use preprocess::{AudioPreprocessor, PreparedAudio};
pub use reader::RingBufferReader;
