//! WAV file loading for offline transcription.
//!
//! Recorded files go through the same preprocess → encode → decode path as
//! live audio. Supports arbitrary sample rates and channels, resampling to
//! 16kHz mono float PCM.

use crate::defaults::SAMPLE_RATE;
use crate::error::{Result, SottoError};
use std::io::Read;
use std::path::Path;

/// Load a WAV file as mono float PCM at 16kHz.
pub fn load_wav(path: &Path) -> Result<Vec<f32>> {
    let file = std::fs::File::open(path)?;
    from_reader(Box::new(std::io::BufReader::new(file)))
}

/// Load WAV data from any reader as mono float PCM at 16kHz.
pub fn from_reader(reader: Box<dyn Read + Send>) -> Result<Vec<f32>> {
    let mut wav_reader = hound::WavReader::new(reader).map_err(|e| SottoError::AudioCapture {
        message: format!("Failed to parse WAV file: {}", e),
    })?;

    let spec = wav_reader.spec();
    let source_rate = spec.sample_rate;
    let source_channels = spec.channels;

    let raw_samples: Vec<i16> = wav_reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| SottoError::AudioCapture {
            message: format!("Failed to read WAV samples: {}", e),
        })?;

    // Convert to mono if stereo
    let mono_samples: Vec<f32> = if source_channels == 2 {
        raw_samples
            .chunks_exact(2)
            .map(|chunk| {
                let left = chunk[0] as f32;
                let right = chunk[1] as f32;
                (left + right) / 2.0 / i16::MAX as f32
            })
            .collect()
    } else {
        raw_samples
            .iter()
            .map(|&s| s as f32 / i16::MAX as f32)
            .collect()
    };

    // Resample to 16kHz if needed
    if source_rate != SAMPLE_RATE {
        Ok(resample(&mono_samples, source_rate, SAMPLE_RATE))
    } else {
        Ok(mono_samples)
    }
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[samples.len() - 1]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as f32
            }
        })
        .collect()
}
