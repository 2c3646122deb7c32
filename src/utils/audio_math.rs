//! Audio mathematics utilities and conversion functions.
//!
//! Mel, power and frame/time conversions shared by the feature
//! extractors. Names and formulas follow the conventions of common music
//! information retrieval toolkits.
//!
//! # Examples
//!
//! ```rust
//! use amen::audio_math::{hz_to_mel, mel_to_hz, power_to_db};
//!
//! let mel = hz_to_mel(440.0);
//! assert!((mel_to_hz(mel) - 440.0).abs() < 1e-6);
//! assert!((power_to_db(1.0)).abs() < 1e-12);
//! ```

// =============================================================================
// FREQUENCY CONVERSIONS
// =============================================================================

/// Converts frequency in Hz to mel scale.
///
/// Uses `mel = 2595 * log10(1 + hz / 700)`.
pub fn hz_to_mel(freq_hz: f64) -> f64 {
    2595.0 * (1.0 + freq_hz / 700.0).log10()
}

/// Converts mel scale value back to frequency in Hz.
///
/// Inverse of [`hz_to_mel`]: `hz = 700 * (10^(mel / 2595) - 1)`.
pub fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10.0_f64.powf(mel / 2595.0) - 1.0)
}

/// Generates `n_mels` frequencies in Hz, linearly spaced on the mel scale
/// between `fmin` and `fmax` inclusive.
///
/// ```rust
/// use amen::audio_math::mel_frequencies;
///
/// let freqs = mel_frequencies(10, 0.0, 8000.0);
/// assert_eq!(freqs.len(), 10);
/// assert_eq!(freqs[0], 0.0);
/// assert!((freqs[9] - 8000.0).abs() < 1e-6);
/// ```
pub fn mel_frequencies(n_mels: usize, fmin: f64, fmax: f64) -> Vec<f64> {
    linspace(hz_to_mel(fmin), hz_to_mel(fmax), n_mels)
        .into_iter()
        .map(mel_to_hz)
        .collect()
}

// =============================================================================
// POWER CONVERSIONS
// =============================================================================

/// Floor applied to power values before taking the logarithm.
pub const POWER_FLOOR: f64 = 1e-10;

/// Converts a power value to decibels, `10 * log10(max(power, 1e-10))`.
pub fn power_to_db(power: f64) -> f64 {
    10.0 * power.max(POWER_FLOOR).log10()
}

// =============================================================================
// TIME/FRAME CONVERSIONS
// =============================================================================

/// Converts a frame index to time in seconds.
///
/// ```rust
/// use amen::audio_math::frames_to_time;
///
/// let time = frames_to_time(100, 44100.0, 512);
/// assert!((time - 51200.0 / 44100.0).abs() < 1e-12);
/// ```
pub fn frames_to_time(frame: usize, sample_rate: f64, hop_size: usize) -> f64 {
    (frame * hop_size) as f64 / sample_rate
}

// =============================================================================
// SPECTRAL HELPER FUNCTIONS
// =============================================================================

/// Center frequencies of the non-negative bins of an `n_fft` point real FFT.
///
/// ```rust
/// use amen::audio_math::fft_frequencies;
///
/// let freqs = fft_frequencies(1024, 44100.0);
/// assert_eq!(freqs.len(), 513);
/// assert_eq!(freqs[0], 0.0);
/// assert!((freqs[512] - 22050.0).abs() < 1e-9);
/// ```
pub fn fft_frequencies(n_fft: usize, sample_rate: f64) -> Vec<f64> {
    let resolution = sample_rate / n_fft as f64;
    (0..n_fft / 2 + 1).map(|i| i as f64 * resolution).collect()
}

/// Generates `num` linearly spaced values from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (num - 1) as f64;
            (0..num).map(|i| start + i as f64 * step).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mel_frequency_conversions() {
        let freq = 1000.0f64;
        let freq_back = mel_to_hz(hz_to_mel(freq));
        assert!((freq - freq_back).abs() < 0.001f64);

        // 1000 Hz ≈ 1000 mels
        assert!((hz_to_mel(1000.0f64) - 1000.0f64).abs() < 1.0f64);
        assert!((mel_to_hz(1000.0f64) - 1000.0f64).abs() < 10.0f64);
    }

    #[test]
    fn test_power_to_db() {
        assert!(power_to_db(1.0f64).abs() < 0.001f64);
        assert!((power_to_db(0.5f64) + 3.01f64).abs() < 0.1f64);
        assert!((power_to_db(0.0) + 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_frames_to_time() {
        let sample_rate = 44100.0;
        let hop_size = 512;

        let time = frames_to_time(100, sample_rate, hop_size);
        let expected_time = (100 * hop_size) as f64 / sample_rate;
        assert!((time - expected_time).abs() < 0.001f64);
        assert_eq!(frames_to_time(0, sample_rate, hop_size), 0.0);
    }

    #[test]
    fn test_mel_frequencies_spacing() {
        let mel_freqs = mel_frequencies(10, 0.0, 8000.0);
        let mel_vals: Vec<f64> = mel_freqs.iter().map(|&f| hz_to_mel(f)).collect();
        let expected_diff = (hz_to_mel(8000.0) - hz_to_mel(0.0)) / 9.0;
        for pair in mel_vals.windows(2) {
            assert!((pair[1] - pair[0] - expected_diff).abs() < 1e-6);
        }
    }

    #[test]
    fn test_linspace_edges() {
        assert!(linspace(0.0, 1.0, 0).is_empty());
        assert_eq!(linspace(3.0, 9.0, 1), vec![3.0]);
        assert_eq!(linspace(0.0, 1.0, 3), vec![0.0, 0.5, 1.0]);
    }
}
