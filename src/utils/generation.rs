//! Audio signal generation utilities.
//!
//! Deterministic test signals used throughout the test suite and handy for
//! exercising the feature extractors without touching the filesystem.

use std::f64::consts::PI;
use std::time::Duration;

use ndarray::{Array1, Array2, Axis};

use crate::repr::validate_sample_rate;
use crate::{AmenResult, SampleBuffer};

fn num_samples(duration: Duration, sample_rate: f64) -> usize {
    (duration.as_secs_f64() * sample_rate) as usize
}

/// Generates a mono sine wave.
///
/// # Arguments
/// * `frequency` - Frequency of the sine wave in Hz
/// * `duration` - Duration of the signal
/// * `sample_rate` - Sample rate in Hz
/// * `amplitude` - Peak amplitude (0.0 to 1.0)
///
/// # Errors
/// Returns [`crate::AmenError::InvalidInput`] if `sample_rate` is invalid or
/// the duration yields no samples.
///
/// # Examples
/// ```rust
/// use amen::utils::generation::sine_wave;
/// use std::time::Duration;
///
/// let tone = sine_wave(440.0, Duration::from_millis(500), 8000.0, 0.5).unwrap();
/// assert_eq!(tone.num_frames(), 4000);
/// ```
pub fn sine_wave(
    frequency: f64,
    duration: Duration,
    sample_rate: f64,
    amplitude: f64,
) -> AmenResult<SampleBuffer> {
    compound_tone(&[(frequency, amplitude)], duration, sample_rate)
}

/// Generates a mono signal that is the sum of several sinusoids.
///
/// Each `(frequency, amplitude)` pair contributes one partial.
///
/// # Errors
/// Same conditions as [`sine_wave`].
pub fn compound_tone(
    partials: &[(f64, f64)],
    duration: Duration,
    sample_rate: f64,
) -> AmenResult<SampleBuffer> {
    validate_sample_rate(sample_rate)?;
    let n = num_samples(duration, sample_rate);
    let samples = Array1::from_shape_fn(n, |i| {
        let t = i as f64 / sample_rate;
        partials
            .iter()
            .map(|&(freq, amp)| amp * (2.0 * PI * freq * t).sin())
            .sum()
    });
    SampleBuffer::from_mono(samples, sample_rate)
}

/// Generates a stereo sine wave by duplicating the mono signal to both channels.
///
/// # Errors
/// Same conditions as [`sine_wave`].
pub fn stereo_sine_wave(
    frequency: f64,
    duration: Duration,
    sample_rate: f64,
    amplitude: f64,
) -> AmenResult<SampleBuffer> {
    let mono = sine_wave(frequency, duration, sample_rate, amplitude)?;
    let row = mono.samples().row(0).to_owned();
    let stereo = ndarray::stack(Axis(0), &[row.view(), row.view()])
        .map_err(|e| crate::AmenError::invalid_input("channels", e.to_string()))?;
    SampleBuffer::new(stereo, sample_rate)
}

/// Generates `channels` channels of digital silence.
///
/// # Errors
/// Same conditions as [`sine_wave`], plus zero `channels`.
pub fn silence(duration: Duration, sample_rate: f64, channels: usize) -> AmenResult<SampleBuffer> {
    validate_sample_rate(sample_rate)?;
    let n = num_samples(duration, sample_rate);
    SampleBuffer::new(Array2::zeros((channels, n)), sample_rate)
}
