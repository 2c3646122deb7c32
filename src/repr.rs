//! Core audio sample representation.
//!
//! [`SampleBuffer`] pairs a `(channels, frames)` matrix of `f64` samples with
//! its sample rate. Buffers are immutable once constructed: downmixing and
//! resampling return new buffers.
//!
//! # Examples
//!
//! ```rust
//! use amen::SampleBuffer;
//! use ndarray::array;
//!
//! let stereo = SampleBuffer::new(
//!     array![[0.1, 0.2, 0.3], [0.3, 0.4, 0.5]],
//!     48000.0,
//! ).unwrap();
//!
//! assert_eq!(stereo.num_channels(), 2);
//! assert_eq!(stereo.num_frames(), 3);
//!
//! let mono = stereo.to_mono();
//! assert_eq!(mono.num_channels(), 1);
//! assert!((mono.samples()[[0, 0]] - 0.2).abs() < 1e-12);
//! ```
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use std::fmt::Display;
use std::path::Path;

use crate::io::{self, LoadOptions};
use crate::operations::types::ResamplingQuality;
use crate::{AmenError, AmenResult, resampling};

/// Multi-channel audio samples with their sample rate.
///
/// Invariants enforced at construction:
/// - at least one channel and one frame,
/// - `sample_rate` is finite and strictly positive.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Array2<f64>,
    sample_rate: f64,
}

impl SampleBuffer {
    /// Creates a buffer from a `(channels, frames)` array.
    ///
    /// # Errors
    /// Returns [`AmenError::InvalidInput`] if the array has no channels or no
    /// frames, or if `sample_rate` is not a finite positive number.
    pub fn new(samples: Array2<f64>, sample_rate: f64) -> AmenResult<Self> {
        validate_sample_rate(sample_rate)?;
        let (channels, frames) = samples.dim();
        if channels == 0 {
            return Err(AmenError::invalid_input(
                "samples",
                "sample array must have at least one channel",
            ));
        }
        if frames == 0 {
            return Err(AmenError::invalid_input(
                "samples",
                "sample array must contain at least one frame",
            ));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Creates a single-channel buffer.
    ///
    /// # Errors
    /// Same conditions as [`SampleBuffer::new`].
    pub fn from_mono(samples: Array1<f64>, sample_rate: f64) -> AmenResult<Self> {
        Self::new(samples.insert_axis(Axis(0)), sample_rate)
    }

    /// Creates a buffer from per-channel vectors of equal length.
    ///
    /// # Errors
    /// Returns [`AmenError::InvalidInput`] if channels differ in length, or for
    /// any of the conditions of [`SampleBuffer::new`].
    pub fn from_channels(channels: Vec<Vec<f64>>, sample_rate: f64) -> AmenResult<Self> {
        let num_channels = channels.len();
        let frames = channels.first().map_or(0, Vec::len);
        if channels.iter().any(|c| c.len() != frames) {
            return Err(AmenError::invalid_input(
                "channels",
                "all channels must have the same number of frames",
            ));
        }
        let flat: Vec<f64> = channels.into_iter().flatten().collect();
        let samples = Array2::from_shape_vec((num_channels, frames), flat)
            .map_err(|e| AmenError::invalid_input("channels", e.to_string()))?;
        Self::new(samples, sample_rate)
    }

    /// Loads a buffer from an audio file.
    ///
    /// See [`crate::io::load`] for the supported formats and error conditions.
    pub fn load<P: AsRef<Path>>(
        path: P,
        sample_rate: Option<f64>,
        convert_to_mono: bool,
    ) -> AmenResult<Self> {
        io::load_with(
            path,
            &LoadOptions {
                sample_rate,
                convert_to_mono,
            },
        )
    }

    /// The `(channels, frames)` sample matrix.
    pub fn samples(&self) -> ArrayView2<'_, f64> {
        self.samples.view()
    }

    /// Consumes the buffer, returning the sample matrix.
    pub fn into_samples(self) -> Array2<f64> {
        self.samples
    }

    /// Sample rate in Hz.
    pub const fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Number of channels (rows of the sample matrix).
    pub fn num_channels(&self) -> usize {
        self.samples.nrows()
    }

    /// Number of frames (samples per channel).
    pub fn num_frames(&self) -> usize {
        self.samples.ncols()
    }

    /// Returns true if the buffer has a single channel.
    pub fn is_mono(&self) -> bool {
        self.num_channels() == 1
    }

    /// Duration in seconds, `num_frames / sample_rate`.
    pub fn duration(&self) -> f64 {
        self.num_frames() as f64 / self.sample_rate
    }

    /// A view of one channel, or `None` if `index` is out of range.
    pub fn channel(&self, index: usize) -> Option<ArrayView1<'_, f64>> {
        (index < self.num_channels()).then(|| self.samples.row(index))
    }

    /// Iterates over the channels.
    pub fn channels(&self) -> impl Iterator<Item = ArrayView1<'_, f64>> {
        self.samples.axis_iter(Axis(0))
    }

    /// Interleaves the channels frame by frame (`LRLR...`).
    pub fn to_interleaved_vec(&self) -> Vec<f64> {
        self.samples.t().iter().copied().collect()
    }

    /// Returns a new single-channel buffer holding the mean of all channels.
    pub fn to_mono(&self) -> SampleBuffer {
        if self.is_mono() {
            return self.clone();
        }
        let mono = self
            .samples
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.num_frames()));
        SampleBuffer {
            samples: mono.insert_axis(Axis(0)),
            sample_rate: self.sample_rate,
        }
    }

    /// Returns a new buffer resampled to `target_rate` with the default
    /// (high) quality preset.
    ///
    /// # Errors
    /// Returns [`AmenError::InvalidInput`] for an invalid target rate and
    /// [`AmenError::Processing`] if the resampler fails.
    pub fn resample(&self, target_rate: f64) -> AmenResult<SampleBuffer> {
        self.resample_with_quality(target_rate, ResamplingQuality::default())
    }

    /// Returns a new buffer resampled to `target_rate` using `quality`.
    ///
    /// # Errors
    /// See [`SampleBuffer::resample`].
    pub fn resample_with_quality(
        &self,
        target_rate: f64,
        quality: ResamplingQuality,
    ) -> AmenResult<SampleBuffer> {
        resampling::resample(self, target_rate, quality)
    }
}

impl Display for SampleBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SampleBuffer({} ch, {} frames, {} Hz, {:.3} s)",
            self.num_channels(),
            self.num_frames(),
            self.sample_rate,
            self.duration()
        )
    }
}

pub(crate) fn validate_sample_rate(sample_rate: f64) -> AmenResult<()> {
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return Err(AmenError::invalid_input(
            "sample_rate",
            format!("must be a finite positive number, got {sample_rate}"),
        ));
    }
    Ok(())
}
