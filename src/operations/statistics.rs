//! Statistical analysis operations for [`SampleBuffer`].
//!
//! This module implements the [`AudioStatistics`] trait and the framed
//! time-domain measurements used by the feature engine.

use ndarray::ArrayView1;

use super::spectral::pad_for_frames;
use super::traits::AudioStatistics;
use crate::SampleBuffer;

impl AudioStatistics for SampleBuffer {
    fn zero_crossing_indexes(&self) -> Vec<Vec<usize>> {
        self.channels().map(zero_crossing_indexes).collect()
    }
}

/// Indices `i >= 1` where the sign of `signal[i]` differs from `signal[i - 1]`.
///
/// Zero counts as non-negative, so `[-1, 0]` crosses at index 1 while
/// `[0, 1]` and `[1, 0]` do not cross.
///
/// ```rust
/// use amen::operations::statistics::zero_crossing_indexes;
/// use ndarray::array;
///
/// let signal = array![1.0, -1.0, -0.5, 0.0, 2.0, -3.0];
/// assert_eq!(zero_crossing_indexes(signal.view()), vec![1, 3, 5]);
/// ```
pub fn zero_crossing_indexes(signal: ArrayView1<'_, f64>) -> Vec<usize> {
    let mut indexes = Vec::new();
    let mut prev_negative = match signal.first() {
        Some(&x) => x < 0.0,
        None => return indexes,
    };
    for (i, &x) in signal.iter().enumerate().skip(1) {
        let negative = x < 0.0;
        if negative != prev_negative {
            indexes.push(i);
        }
        prev_negative = negative;
    }
    indexes
}

/// RMS of each centered frame of `signal`.
///
/// Frame `i` covers `frame_length` samples centered on sample
/// `i * hop_length` of the reflect-padded signal. Signals shorter than
/// `frame_length` (or a frame shorter than 2, or a zero hop) yield no frames.
pub fn frame_rms(signal: &[f64], frame_length: usize, hop_length: usize) -> Vec<f64> {
    if frame_length < 2 || hop_length == 0 || signal.len() < frame_length {
        return Vec::new();
    }
    let padded = pad_for_frames(signal, frame_length);
    let n_frames = 1 + signal.len() / hop_length;
    (0..n_frames)
        .map(|frame| {
            let start = frame * hop_length;
            let energy: f64 = padded[start..start + frame_length]
                .iter()
                .map(|x| x * x)
                .sum();
            (energy / frame_length as f64).sqrt()
        })
        .collect()
}
