//! Spectral primitives used by the feature extractors.
//!
//! [`SpectralOps`] is the seam between the feature engine and the transforms
//! it depends on. [`RustFftOps`] implements it with `rustfft` for the Fourier
//! transforms and `rubato` for resampling; other implementations (a different
//! FFT library, a GPU backend, a test double) can be plugged into
//! [`crate::operations::features::FeatureEngine`] instead.
//!
//! All spectrogram-like outputs are laid out as `(bins, frames)`.

use std::f64::consts::PI;

use ndarray::Array2;
use num_complex::Complex;
use rustfft::FftPlanner;

use crate::operations::types::{ChromaConfig, ResamplingQuality, WindowType};
use crate::utils::audio_math::{fft_frequencies, mel_frequencies};
use crate::{AmenError, AmenResult, ProcessingError, SampleBuffer, resampling};

/// DSP primitives required to compute the built-in features.
pub trait SpectralOps: Send + Sync {
    /// Magnitude short-time Fourier transform with centered frames.
    ///
    /// Frame `i` is centered on sample `i * hop_length`; the signal is
    /// reflect-padded by `frame_length / 2` on the left and the rest of a
    /// frame on the right. Returns an array of
    /// shape `(frame_length / 2 + 1, 1 + len / hop_length)`, or zero frames when
    /// the signal is shorter than `frame_length`.
    ///
    /// # Errors
    /// Returns [`AmenError::InvalidInput`] for a `frame_length` below 2 or a
    /// zero `hop_length`.
    fn stft_magnitude(
        &self,
        signal: &[f64],
        frame_length: usize,
        hop_length: usize,
        window: WindowType,
    ) -> AmenResult<Array2<f64>>;

    /// Triangular mel filterbank of shape `(n_mels, n_fft / 2 + 1)`.
    fn mel_filterbank(
        &self,
        n_mels: usize,
        n_fft: usize,
        sample_rate: f64,
        fmin: f64,
        fmax: f64,
    ) -> Array2<f64>;

    /// Constant-Q magnitudes of shape `(config.num_bins(), num_frames)`.
    ///
    /// Frame `i` is centered on sample `i * hop_length`, matching
    /// [`SpectralOps::stft_magnitude`].
    ///
    /// # Errors
    /// Returns [`AmenError::InvalidInput`] for an invalid `config`.
    fn constant_q_magnitude(
        &self,
        signal: &[f64],
        sample_rate: f64,
        hop_length: usize,
        num_frames: usize,
        config: &ChromaConfig,
    ) -> AmenResult<Array2<f64>>;

    /// First `n_out` coefficients of the orthonormal DCT-II of `input`.
    fn dct(&self, input: &[f64], n_out: usize) -> Vec<f64>;

    /// Resamples every channel of `buffer` to `target_rate`.
    ///
    /// # Errors
    /// See [`crate::resampling::resample`].
    fn resample(&self, buffer: &SampleBuffer, target_rate: f64) -> AmenResult<SampleBuffer>;
}

/// [`SpectralOps`] backed by `rustfft` and `rubato`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustFftOps {
    /// Quality preset used by [`SpectralOps::resample`].
    pub resampling_quality: ResamplingQuality,
}

impl RustFftOps {
    /// Creates the default backend (high quality resampling).
    pub const fn new() -> Self {
        Self {
            resampling_quality: ResamplingQuality::High,
        }
    }
}

impl SpectralOps for RustFftOps {
    fn stft_magnitude(
        &self,
        signal: &[f64],
        frame_length: usize,
        hop_length: usize,
        window: WindowType,
    ) -> AmenResult<Array2<f64>> {
        if frame_length < 2 || hop_length == 0 {
            return Err(AmenError::invalid_input(
                "frame_length",
                "frame length must be at least 2 and hop length greater than 0",
            ));
        }
        let n_bins = frame_length / 2 + 1;
        if signal.len() < frame_length {
            return Ok(Array2::zeros((n_bins, 0)));
        }

        let padded = pad_for_frames(signal, frame_length);
        let n_frames = 1 + signal.len() / hop_length;
        let window = generate_window(frame_length, window);
        let fft = FftPlanner::<f64>::new().plan_fft_forward(frame_length);

        let mut magnitudes = Array2::zeros((n_bins, n_frames));
        let mut buffer = vec![Complex::new(0.0, 0.0); frame_length];
        for frame in 0..n_frames {
            let start = frame * hop_length;
            for (slot, (&x, &w)) in buffer
                .iter_mut()
                .zip(padded[start..start + frame_length].iter().zip(&window))
            {
                *slot = Complex::new(x * w, 0.0);
            }
            fft.process(&mut buffer);
            for (bin, value) in buffer.iter().take(n_bins).enumerate() {
                magnitudes[[bin, frame]] = value.norm();
            }
        }
        Ok(magnitudes)
    }

    fn mel_filterbank(
        &self,
        n_mels: usize,
        n_fft: usize,
        sample_rate: f64,
        fmin: f64,
        fmax: f64,
    ) -> Array2<f64> {
        generate_mel_filter_bank(n_mels, n_fft, sample_rate, fmin, fmax)
    }

    fn constant_q_magnitude(
        &self,
        signal: &[f64],
        sample_rate: f64,
        hop_length: usize,
        num_frames: usize,
        config: &ChromaConfig,
    ) -> AmenResult<Array2<f64>> {
        config.validate(sample_rate)?;
        if hop_length == 0 {
            return Err(AmenError::invalid_input(
                "hop_length",
                "hop length must be greater than 0",
            ));
        }
        let kernel = CqtKernel::new(config, sample_rate)?;
        Ok(kernel.apply(signal, hop_length, num_frames))
    }

    fn dct(&self, input: &[f64], n_out: usize) -> Vec<f64> {
        compute_dct_type2(input, n_out)
    }

    fn resample(&self, buffer: &SampleBuffer, target_rate: f64) -> AmenResult<SampleBuffer> {
        resampling::resample(buffer, target_rate, self.resampling_quality)
    }
}

/// Generate window function coefficients (symmetric form).
pub fn generate_window(size: usize, window_type: WindowType) -> Vec<f64> {
    if size < 2 {
        return vec![1.0; size];
    }
    let n_max = (size - 1) as f64;
    match window_type {
        WindowType::Rectangular => vec![1.0; size],
        WindowType::Hanning => (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / n_max).cos()))
            .collect(),
        WindowType::Hamming => (0..size)
            .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / n_max).cos())
            .collect(),
        WindowType::Blackman => (0..size)
            .map(|i| {
                let n = i as f64;
                0.42 - 0.5 * (2.0 * PI * n / n_max).cos() + 0.08 * (4.0 * PI * n / n_max).cos()
            })
            .collect(),
    }
}

/// Mirrors `pad` samples at each end without repeating the edge sample.
///
/// `pad` must be smaller than `signal.len()`.
pub(crate) fn reflect_pad(signal: &[f64], left: usize, right: usize) -> Vec<f64> {
    let n = signal.len();
    let mut padded = Vec::with_capacity(n + left + right);
    padded.extend((1..=left).rev().map(|i| signal[i]));
    padded.extend_from_slice(signal);
    padded.extend((1..=right).map(|i| signal[n - 1 - i]));
    padded
}

/// Pads `signal` for centered framing: `frame_length / 2` samples on the
/// left and the rest of the frame on the right, so that the frame centered
/// on the last sample fits. Requires `signal.len() >= frame_length >= 2`.
pub(crate) fn pad_for_frames(signal: &[f64], frame_length: usize) -> Vec<f64> {
    let left = frame_length / 2;
    reflect_pad(signal, left, frame_length - left)
}

/// Mel filterbank whose triangles are normalized to unit area.
fn generate_mel_filter_bank(
    n_filters: usize,
    n_fft: usize,
    sample_rate: f64,
    fmin: f64,
    fmax: f64,
) -> Array2<f64> {
    // n_filters + 2 edges: left, center and right of every triangle
    let edges = mel_frequencies(n_filters + 2, fmin, fmax);
    let freq_bins = fft_frequencies(n_fft, sample_rate);

    let mut filter_bank = Array2::zeros((n_filters, freq_bins.len()));
    for filter_idx in 0..n_filters {
        let f_left = edges[filter_idx];
        let f_center = edges[filter_idx + 1];
        let f_right = edges[filter_idx + 2];
        let rise = (f_center - f_left).max(f64::MIN_POSITIVE);
        let fall = (f_right - f_center).max(f64::MIN_POSITIVE);
        let area_norm = 2.0 / (f_right - f_left).max(f64::MIN_POSITIVE);

        for (bin_idx, &freq) in freq_bins.iter().enumerate() {
            let lower = (freq - f_left) / rise;
            let upper = (f_right - freq) / fall;
            let weight = lower.min(upper).max(0.0);
            filter_bank[[filter_idx, bin_idx]] = weight * area_norm;
        }
    }
    filter_bank
}

/// Orthonormal DCT-II: `X[k] = s_k Σ x[n] cos(π k (2n + 1) / 2N)` with
/// `s_0 = sqrt(1/N)` and `s_k = sqrt(2/N)` otherwise.
fn compute_dct_type2(input: &[f64], n_out: usize) -> Vec<f64> {
    let n_input = input.len();
    if n_input == 0 {
        return vec![0.0; n_out];
    }
    let n = n_input as f64;
    (0..n_out)
        .map(|k| {
            let sum: f64 = input
                .iter()
                .enumerate()
                .map(|(i, &x)| x * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos())
                .sum();
            let norm_factor = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            sum * norm_factor
        })
        .collect()
}

/// One sparse row of the spectral kernel: the FFT bins where the kernel is
/// non-negligible and the (conjugated, scaled) kernel values at those bins.
#[derive(Debug, Clone, Default)]
struct SparseRow {
    indices: Vec<usize>,
    values: Vec<Complex<f64>>,
}

/// Constant-Q transform as a sparse matrix applied in the frequency domain.
///
/// Each bin's windowed complex exponential is centered in an `fft_size`
/// buffer and transformed once; per frame, the constant-Q coefficient is then
/// the inner product of the frame's spectrum with that sparse kernel.
#[derive(Debug, Clone)]
struct CqtKernel {
    rows: Vec<SparseRow>,
    fft_size: usize,
}

impl CqtKernel {
    fn new(config: &ChromaConfig, sample_rate: f64) -> AmenResult<Self> {
        let num_bins = config.num_bins();
        let nyquist = sample_rate / 2.0;
        let fft_size = config.kernel_length(0, sample_rate).next_power_of_two();
        let fft = FftPlanner::<f64>::new().plan_fft_forward(fft_size);

        let mut rows = Vec::with_capacity(num_bins);
        for bin in 0..num_bins {
            let center_freq = config.bin_frequency(bin);
            if center_freq >= nyquist {
                // Bins above Nyquist stay empty and contribute nothing.
                rows.push(SparseRow::default());
                continue;
            }

            let length = config.kernel_length(bin, sample_rate).min(fft_size);
            let window = generate_window(length, config.window_type);
            let offset = (fft_size - length) / 2;
            let mut buffer = vec![Complex::new(0.0, 0.0); fft_size];
            for (n, &w) in window.iter().enumerate() {
                let phase = 2.0 * PI * center_freq * n as f64 / sample_rate;
                buffer[offset + n] = Complex::from_polar(w / length as f64, phase);
            }
            fft.process(&mut buffer);

            let peak = buffer.iter().map(|c| c.norm()).fold(0.0, f64::max);
            if peak == 0.0 || !peak.is_finite() {
                return Err(ProcessingError::algorithm_failure(
                    "cqt_kernel",
                    format!("degenerate kernel for bin {bin} at {center_freq:.3} Hz"),
                )
                .into());
            }
            let threshold = peak * config.sparsity_threshold;
            let scale = 1.0 / fft_size as f64;
            let mut row = SparseRow::default();
            for (index, value) in buffer.iter().enumerate() {
                if value.norm() >= threshold {
                    row.indices.push(index);
                    row.values.push(value.conj() * scale);
                }
            }
            rows.push(row);
        }

        Ok(Self { rows, fft_size })
    }

    fn apply(&self, signal: &[f64], hop_length: usize, num_frames: usize) -> Array2<f64> {
        let mut out = Array2::zeros((self.rows.len(), num_frames));
        if num_frames == 0 {
            return out;
        }

        // Zero padding centers the first kernel on sample 0.
        let half = self.fft_size / 2;
        let mut padded = vec![0.0; signal.len() + self.fft_size];
        padded[half..half + signal.len()].copy_from_slice(signal);

        let fft = FftPlanner::<f64>::new().plan_fft_forward(self.fft_size);
        let mut buffer = vec![Complex::new(0.0, 0.0); self.fft_size];
        for frame in 0..num_frames {
            let start = frame * hop_length;
            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = Complex::new(padded.get(start + i).copied().unwrap_or(0.0), 0.0);
            }
            fft.process(&mut buffer);

            for (bin, row) in self.rows.iter().enumerate() {
                let coefficient: Complex<f64> = row
                    .indices
                    .iter()
                    .zip(&row.values)
                    .map(|(&k, &v)| buffer[k] * v)
                    .sum();
                out[[bin, frame]] = coefficient.norm();
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sample_rate: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f64 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_window_shapes() {
        let hann = generate_window(5, WindowType::Hanning);
        assert!(hann[0].abs() < 1e-12);
        assert!((hann[2] - 1.0).abs() < 1e-12);
        assert!(hann[4].abs() < 1e-12);
        assert_eq!(generate_window(4, WindowType::Rectangular), vec![1.0; 4]);
        assert!((generate_window(3, WindowType::Hamming)[0] - 0.08).abs() < 1e-12);
    }

    #[test]
    fn test_reflect_pad() {
        let padded = reflect_pad(&[1.0, 2.0, 3.0, 4.0], 2, 2);
        assert_eq!(padded, vec![3.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0]);
    }

    #[test]
    fn test_stft_shape_and_peak() {
        let ops = RustFftOps::new();
        let sr = 8000.0;
        let signal = sine(1000.0, sr, 4000);
        let mags = ops.stft_magnitude(&signal, 256, 64, WindowType::Hanning).unwrap();
        assert_eq!(mags.dim(), (129, 1 + 4000 / 64));

        // 1000 Hz lands in bin 1000 / (8000 / 256) = 32
        let middle = mags.column(30);
        let peak_bin = middle
            .iter()
            .enumerate()
            .fold((0, 0.0), |best, (i, &m)| if m > best.1 { (i, m) } else { best })
            .0;
        assert_eq!(peak_bin, 32);
    }

    #[test]
    fn test_stft_odd_frame_length_covers_last_sample() {
        let ops = RustFftOps::new();
        let signal = sine(440.0, 8000.0, 2048);
        let mags = ops.stft_magnitude(&signal, 1025, 512, WindowType::Hanning).unwrap();
        assert_eq!(mags.dim(), (513, 5));

        let mags = ops.stft_magnitude(&signal[..2047], 2047, 1, WindowType::Hanning).unwrap();
        assert_eq!(mags.dim(), (1024, 2048));
    }

    #[test]
    fn test_reflect_pad_for_odd_frames() {
        let padded = pad_for_frames(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(padded, vec![2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0]);
    }

    #[test]
    fn test_stft_short_signal_has_no_frames() {
        let ops = RustFftOps::new();
        let mags = ops.stft_magnitude(&[0.0; 100], 256, 64, WindowType::Hanning).unwrap();
        assert_eq!(mags.ncols(), 0);
        assert!(ops.stft_magnitude(&[0.0; 100], 256, 0, WindowType::Hanning).is_err());
    }

    #[test]
    fn test_mel_filterbank_area_normalized() {
        let ops = RustFftOps::new();
        let n_fft = 2048;
        let sr = 22050.0;
        let bank = ops.mel_filterbank(40, n_fft, sr, 0.0, sr / 2.0);
        assert_eq!(bank.dim(), (40, n_fft / 2 + 1));
        assert!(bank.iter().all(|&w| w >= 0.0));

        // Integrating a triangle of height 2 / width over Hz gives ~1.
        let df = sr / n_fft as f64;
        for row in bank.rows().into_iter().skip(10) {
            let area: f64 = row.sum() * df;
            assert!((area - 1.0).abs() < 0.1, "area {area}");
        }
    }

    #[test]
    fn test_dct_orthonormal() {
        let ops = RustFftOps::new();
        let constant = vec![2.0; 16];
        let coeffs = ops.dct(&constant, 4);
        assert!((coeffs[0] - 2.0 * 16f64.sqrt()).abs() < 1e-9);
        for &c in &coeffs[1..] {
            assert!(c.abs() < 1e-9);
        }

        // Orthonormal: energy is preserved when every coefficient is kept.
        let x: Vec<f64> = (0..8).map(|i| (i as f64 * 0.7).sin()).collect();
        let full = ops.dct(&x, 8);
        let e_in: f64 = x.iter().map(|v| v * v).sum();
        let e_out: f64 = full.iter().map(|v| v * v).sum();
        assert!((e_in - e_out).abs() < 1e-9);
    }

    #[test]
    fn test_constant_q_peaks_at_tone_bin() {
        let ops = RustFftOps::new();
        let sr = 22050.0;
        let config = ChromaConfig::default();
        // A4 = 440 Hz is 45 semitones above C1
        let signal = sine(440.0, sr, 22050);
        let n_frames = 1 + signal.len() / 512;
        let cq = ops
            .constant_q_magnitude(&signal, sr, 512, n_frames, &config)
            .unwrap();
        assert_eq!(cq.dim(), (84, n_frames));

        let frame = cq.column(n_frames / 2);
        let peak_bin = frame
            .iter()
            .enumerate()
            .fold((0, 0.0), |best, (i, &m)| if m > best.1 { (i, m) } else { best })
            .0;
        assert_eq!(peak_bin, 45);
        assert_eq!(config.pitch_class(peak_bin), 9);
    }
}
