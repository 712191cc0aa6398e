//! Waveform preprocessing ahead of the spectrogram network.
//!
//! Produces a fixed-length, peak-normalized waveform tensor so the encoder
//! sees a consistent dynamic range regardless of recording loudness.

use crate::defaults;
use crate::error::Result;
use crate::inference::Tensor;

/// Fixed-length framing, zero-padding, and peak normalization.
#[derive(Debug, Clone)]
pub struct AudioPreprocessor {
    /// Output length in samples; input is truncated or zero-padded to fit.
    pub max_samples: usize,
    /// Peak amplitude after normalization.
    pub normalization_target: f32,
    /// Peaks at or below this skip normalization entirely.
    pub silence_epsilon: f32,
}

impl Default for AudioPreprocessor {
    fn default() -> Self {
        Self {
            max_samples: defaults::MAX_SAMPLES,
            normalization_target: defaults::NORMALIZATION_TARGET,
            silence_epsilon: defaults::SILENCE_EPSILON,
        }
    }
}

/// Preprocessed waveform ready for the spectrogram network.
#[derive(Debug, Clone)]
pub struct PreparedAudio {
    /// `[1, max_samples]` waveform tensor.
    pub waveform: Tensor,
    /// Number of positions holding real input (the rest are padding).
    pub valid_samples: usize,
    /// Peak absolute amplitude of the input before scaling.
    pub peak: f32,
    /// True when the signal was too quiet to normalize.
    pub too_quiet: bool,
}

impl AudioPreprocessor {
    /// Frame, pad, and normalize a recording.
    ///
    /// The first `min(len, max_samples)` output positions hold the input
    /// (truncated if longer); the remainder is zero. If the peak over the
    /// valid region exceeds the silence epsilon, valid samples are scaled to
    /// the normalization target; otherwise the signal passes through unscaled
    /// and is flagged too quiet.
    pub fn prepare(&self, samples: &[f32]) -> Result<PreparedAudio> {
        let valid = samples.len().min(self.max_samples);

        let mut data = vec![0.0f32; self.max_samples];
        data[..valid].copy_from_slice(&samples[..valid]);

        let peak = data[..valid]
            .iter()
            .fold(0.0f32, |max, &s| max.max(s.abs()));

        let too_quiet = peak <= self.silence_epsilon;
        if !too_quiet {
            let factor = self.normalization_target / peak;
            for sample in &mut data[..valid] {
                *sample *= factor;
            }
        }

        Ok(PreparedAudio {
            waveform: Tensor::from_f32(&[1, self.max_samples], data)?,
            valid_samples: valid,
            peak,
            too_quiet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preprocessor(max_samples: usize) -> AudioPreprocessor {
        AudioPreprocessor {
            max_samples,
            ..AudioPreprocessor::default()
        }
    }

    #[test]
    fn test_output_is_always_max_samples() {
        let pre = preprocessor(16);
        for input_len in [0usize, 1, 8, 16, 40] {
            let prepared = pre.prepare(&vec![0.1; input_len]).unwrap();
            assert_eq!(prepared.waveform.shape(), &[1, 16]);
            assert_eq!(prepared.valid_samples, input_len.min(16));
        }
    }

    #[test]
    fn test_padding_region_is_zero() {
        let pre = preprocessor(8);
        let prepared = pre.prepare(&[0.5, 0.5, 0.5]).unwrap();
        let data = prepared.waveform.as_f32().unwrap();
        for i in 3..8 {
            assert_eq!(data[[0, i]], 0.0);
        }
    }

    #[test]
    fn test_all_zero_input_skips_normalization() {
        let pre = preprocessor(8);
        let prepared = pre.prepare(&[0.0; 8]).unwrap();

        assert!(prepared.too_quiet);
        assert_eq!(prepared.peak, 0.0);
        assert!(
            prepared
                .waveform
                .as_f32()
                .unwrap()
                .iter()
                .all(|&s| s == 0.0)
        );
    }

    #[test]
    fn test_near_silence_passes_through_unscaled() {
        let pre = preprocessor(4);
        let prepared = pre.prepare(&[0.0005, -0.0005]).unwrap();

        assert!(prepared.too_quiet);
        let data = prepared.waveform.as_f32().unwrap();
        assert_eq!(data[[0, 0]], 0.0005);
        assert_eq!(data[[0, 1]], -0.0005);
    }

    #[test]
    fn test_peak_normalized_to_target() {
        let pre = preprocessor(8);
        let prepared = pre.prepare(&[0.25, -0.5, 0.1]).unwrap();

        assert!(!prepared.too_quiet);
        assert_eq!(prepared.peak, 0.5);

        let data = prepared.waveform.as_f32().unwrap();
        let output_peak = data.iter().fold(0.0f32, |max, &s| max.max(s.abs()));
        assert!((output_peak - 0.95).abs() < 1e-6);
        // Relative levels preserved
        assert!((data[[0, 0]] - 0.475).abs() < 1e-6);
    }

    #[test]
    fn test_truncation_measures_peak_over_kept_region() {
        let pre = preprocessor(2);
        // The 0.8 sample falls outside the frame and must not affect scaling
        let prepared = pre.prepare(&[0.4, 0.2, 0.8]).unwrap();

        assert_eq!(prepared.valid_samples, 2);
        assert_eq!(prepared.peak, 0.4);
        let data = prepared.waveform.as_f32().unwrap();
        assert!((data[[0, 0]] - 0.95).abs() < 1e-6);
    }
}
