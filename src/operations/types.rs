//! Supporting types and configuration for the analysis operations.
//!
//! Every tunable lives in a plain struct with a `Default` implementation that
//! matches conventional short-time spectral analysis settings, and every type
//! can be (de)serialized with `serde` so analysis settings can be stored next
//! to their results.

use serde::{Deserialize, Serialize};

use crate::{AmenError, AmenResult};

/// Window functions for spectral analysis.
///
/// Different window types provide different trade-offs between frequency
/// resolution and spectral leakage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WindowType {
    /// Rectangular window (no windowing) - best frequency resolution but high leakage.
    Rectangular,
    /// Hann window - good general-purpose window with moderate leakage.
    #[default]
    Hanning,
    /// Hamming window - similar to Hann but does not reach zero at the edges.
    Hamming,
    /// Blackman window - low leakage but wider main lobe.
    Blackman,
}

/// Resampling quality settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResamplingQuality {
    /// Short sinc filter with linear interpolation.
    Fast,
    /// Balanced speed and quality.
    Medium,
    /// Long sinc filter with cubic interpolation.
    #[default]
    High,
}

/// Mel-frequency cepstral coefficient (timbre) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MfccConfig {
    /// Number of coefficients kept per frame.
    pub n_mfcc: usize,
    /// Number of mel bands in the filterbank.
    pub n_mels: usize,
    /// Lowest filterbank frequency in Hz.
    pub fmin: f64,
    /// Highest filterbank frequency in Hz (None = Nyquist).
    pub fmax: Option<f64>,
    /// Dynamic range kept below the loudest mel energy, in dB (None = unbounded).
    pub top_db: Option<f64>,
}

impl MfccConfig {
    /// Twenty coefficients over a 128 band mel filterbank covering 0 Hz to Nyquist.
    pub const fn new() -> Self {
        Self {
            n_mfcc: 20,
            n_mels: 128,
            fmin: 0.0,
            fmax: None,
            top_db: Some(80.0),
        }
    }

    /// The upper filterbank edge for `sample_rate`.
    pub fn effective_fmax(&self, sample_rate: f64) -> f64 {
        self.fmax.unwrap_or(sample_rate / 2.0)
    }

    /// Validates the configuration against `sample_rate`.
    ///
    /// # Errors
    /// Returns [`AmenError::InvalidInput`] describing the first invalid field.
    pub fn validate(&self, sample_rate: f64) -> AmenResult<()> {
        if self.n_mfcc == 0 || self.n_mels == 0 {
            return Err(AmenError::invalid_input(
                "mfcc",
                "number of coefficients and mel bands must be greater than 0",
            ));
        }
        if self.n_mfcc > self.n_mels {
            return Err(AmenError::invalid_input(
                "mfcc.n_mfcc",
                "number of coefficients cannot exceed number of mel bands",
            ));
        }
        let fmax = self.effective_fmax(sample_rate);
        if self.fmin < 0.0 || fmax <= self.fmin {
            return Err(AmenError::invalid_input(
                "mfcc.fmin",
                "frequency range must be non-negative with fmax > fmin",
            ));
        }
        if fmax > sample_rate / 2.0 {
            return Err(AmenError::invalid_input(
                "mfcc.fmax",
                "maximum frequency cannot exceed the Nyquist frequency",
            ));
        }
        if let Some(top_db) = self.top_db {
            if top_db <= 0.0 {
                return Err(AmenError::invalid_input(
                    "mfcc.top_db",
                    "dynamic range must be positive",
                ));
            }
        }
        Ok(())
    }
}

impl Default for MfccConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Constant-Q chroma settings.
///
/// Bins are logarithmically spaced from `fmin`, `bins_per_octave` per octave,
/// with a constant quality factor `Q = filter_scale / (2^(1/bins_per_octave) - 1)`.
/// `bins_per_octave` must be a multiple of 12 so that every bin belongs to
/// exactly one pitch class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChromaConfig {
    /// Center frequency of the lowest bin in Hz. Defaults to C1.
    pub fmin: f64,
    /// Number of octaves analysed.
    pub n_octaves: usize,
    /// Number of bins per octave (multiple of 12).
    pub bins_per_octave: usize,
    /// Scales the kernel lengths; 1.0 gives the standard constant-Q resolution.
    pub filter_scale: f64,
    /// Window applied to each kernel.
    pub window_type: WindowType,
    /// Relative magnitude below which spectral kernel entries are dropped.
    pub sparsity_threshold: f64,
    /// Whether each frame is scaled so that its loudest pitch class is 1.0.
    pub normalize: bool,
}

impl ChromaConfig {
    /// Seven octaves from C1 (32.703 Hz), one bin per semitone.
    pub const fn new() -> Self {
        Self {
            fmin: 32.703_195_662_574_83,
            n_octaves: 7,
            bins_per_octave: 12,
            filter_scale: 1.0,
            window_type: WindowType::Hanning,
            sparsity_threshold: 0.0054,
            normalize: true,
        }
    }

    /// Total number of constant-Q bins.
    pub const fn num_bins(&self) -> usize {
        self.n_octaves * self.bins_per_octave
    }

    /// The quality factor shared by every bin.
    pub fn q_factor(&self) -> f64 {
        self.filter_scale / (2.0_f64.powf(1.0 / self.bins_per_octave as f64) - 1.0)
    }

    /// Center frequency of `bin_index` in Hz.
    pub fn bin_frequency(&self, bin_index: usize) -> f64 {
        self.fmin * 2.0_f64.powf(bin_index as f64 / self.bins_per_octave as f64)
    }

    /// Length in samples of the time-domain kernel for `bin_index`.
    pub fn kernel_length(&self, bin_index: usize, sample_rate: f64) -> usize {
        ((self.q_factor() * sample_rate / self.bin_frequency(bin_index)).ceil() as usize).max(1)
    }

    /// Pitch class (0 = the class of `fmin`, counting up in semitones) of `bin_index`.
    pub const fn pitch_class(&self, bin_index: usize) -> usize {
        (bin_index / (self.bins_per_octave / 12)) % 12
    }

    /// Validates the configuration against `sample_rate`.
    ///
    /// # Errors
    /// Returns [`AmenError::InvalidInput`] describing the first invalid field.
    pub fn validate(&self, sample_rate: f64) -> AmenResult<()> {
        if self.bins_per_octave == 0 || self.bins_per_octave % 12 != 0 {
            return Err(AmenError::invalid_input(
                "chroma.bins_per_octave",
                "must be a positive multiple of 12",
            ));
        }
        if self.n_octaves == 0 {
            return Err(AmenError::invalid_input(
                "chroma.n_octaves",
                "must be greater than 0",
            ));
        }
        if !(self.fmin > 0.0) {
            return Err(AmenError::invalid_input(
                "chroma.fmin",
                "minimum frequency must be greater than 0",
            ));
        }
        if self.fmin >= sample_rate / 2.0 {
            return Err(AmenError::invalid_input(
                "chroma.fmin",
                "minimum frequency must be below the Nyquist frequency",
            ));
        }
        if !(self.filter_scale > 0.0) {
            return Err(AmenError::invalid_input(
                "chroma.filter_scale",
                "must be greater than 0",
            ));
        }
        if !(0.0..1.0).contains(&self.sparsity_threshold) {
            return Err(AmenError::invalid_input(
                "chroma.sparsity_threshold",
                "must be in [0.0, 1.0)",
            ));
        }
        Ok(())
    }
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Framing and per-family settings for feature extraction.
///
/// All features computed with one `FeatureConfig` share the same frame grid:
/// frame `i` is centered on sample `i * hop_length` of the analysis signal,
/// which is reflect-padded by `frame_length / 2` on both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Frame (and FFT) length in samples.
    pub frame_length: usize,
    /// Stride between consecutive frame centers in samples.
    pub hop_length: usize,
    /// Window applied before the short-time Fourier transform.
    pub window_type: WindowType,
    /// Timbre settings.
    pub mfcc: MfccConfig,
    /// Chroma settings.
    pub chroma: ChromaConfig,
}

impl FeatureConfig {
    /// 2048 sample frames with a 512 sample hop.
    pub const fn new() -> Self {
        Self {
            frame_length: 2048,
            hop_length: 512,
            window_type: WindowType::Hanning,
            mfcc: MfccConfig::new(),
            chroma: ChromaConfig::new(),
        }
    }

    /// Number of frames for a signal of `num_samples` samples.
    ///
    /// Signals shorter than one frame produce no frames.
    pub const fn num_frames(&self, num_samples: usize) -> usize {
        if num_samples < self.frame_length || self.hop_length == 0 {
            0
        } else {
            1 + num_samples / self.hop_length
        }
    }

    /// Validates framing and every feature family against `sample_rate`.
    ///
    /// # Errors
    /// Returns [`AmenError::InvalidInput`] describing the first invalid field.
    pub fn validate(&self, sample_rate: f64) -> AmenResult<()> {
        if self.frame_length < 2 || self.hop_length == 0 {
            return Err(AmenError::invalid_input(
                "frame_length",
                "frame length must be at least 2 and hop length greater than 0",
            ));
        }
        if self.hop_length > self.frame_length {
            return Err(AmenError::invalid_input(
                "hop_length",
                "hop length cannot be larger than frame length",
            ));
        }
        self.mfcc.validate(sample_rate)?;
        self.chroma.validate(sample_rate)
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_config_defaults_are_valid() {
        let config = FeatureConfig::default();
        assert_eq!(config.frame_length, 2048);
        assert_eq!(config.hop_length, 512);
        assert!(config.validate(22050.0).is_ok());
    }

    #[test]
    fn test_num_frames() {
        let config = FeatureConfig::default();
        assert_eq!(config.num_frames(0), 0);
        assert_eq!(config.num_frames(2047), 0);
        assert_eq!(config.num_frames(2048), 5);
        assert_eq!(config.num_frames(22050), 44);
    }

    #[test]
    fn test_invalid_framing() {
        let mut config = FeatureConfig::default();
        config.hop_length = 0;
        assert!(config.validate(22050.0).is_err());

        let mut config = FeatureConfig::default();
        config.hop_length = 4096;
        assert!(config.validate(22050.0).is_err());
    }

    #[test]
    fn test_mfcc_validation() {
        let mut mfcc = MfccConfig::default();
        mfcc.n_mfcc = 200;
        assert!(mfcc.validate(22050.0).is_err());

        let mut mfcc = MfccConfig::default();
        mfcc.fmax = Some(20000.0);
        assert!(mfcc.validate(22050.0).is_err());
    }

    #[test]
    fn test_chroma_bins() {
        let chroma = ChromaConfig::default();
        assert_eq!(chroma.num_bins(), 84);
        assert!((chroma.bin_frequency(12) - 2.0 * chroma.fmin).abs() < 1e-9);
        assert_eq!(chroma.pitch_class(0), 0);
        assert_eq!(chroma.pitch_class(13), 1);
        assert!(chroma.kernel_length(0, 22050.0) > chroma.kernel_length(83, 22050.0));

        let wide = ChromaConfig {
            bins_per_octave: 36,
            ..ChromaConfig::default()
        };
        assert_eq!(wide.pitch_class(2), 0);
        assert_eq!(wide.pitch_class(3), 1);
        assert!(wide.validate(22050.0).is_ok());
    }

    #[test]
    fn test_chroma_validation() {
        let bad = ChromaConfig {
            bins_per_octave: 10,
            ..ChromaConfig::default()
        };
        assert!(bad.validate(22050.0).is_err());

        let bad = ChromaConfig {
            fmin: 0.0,
            ..ChromaConfig::default()
        };
        assert!(bad.validate(22050.0).is_err());
    }

    #[test]
    fn test_config_serde_shape() {
        fn assert_serde<T: Serialize + for<'de> Deserialize<'de>>() {}
        assert_serde::<FeatureConfig>();
        assert_serde::<ResamplingQuality>();
    }
}
