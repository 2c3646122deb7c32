//! The [`Audio`] facade: samples, analysis signal, zero crossings and features.
//!
//! An `Audio` keeps two views of the same sound:
//!
//! - `raw_samples`, all channels at the loading rate, which is what
//!   [`Audio::output`] writes back out;
//! - `analysis_samples`, a mono downmix resampled to the analysis rate
//!   (22050 Hz by default), which every feature is computed from.
//!
//! Features are computed on first access and cached for the lifetime of the
//! value.
//!
//! ```rust,no_run
//! use amen::{Audio, AudioOptions};
//!
//! let audio = Audio::from_file("break.wav", AudioOptions::default())?;
//! let amplitude = &audio.features()?["amplitude"];
//! println!("{} frames over {:.2} s", amplitude.len(), audio.duration());
//! audio.output("copy.wav", "WAV")?;
//! # Ok::<(), amen::AmenError>(())
//! ```

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use ndarray::Array2;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::feature::FeatureCollection;
use crate::io::{self, LoadOptions, OutputFormat};
use crate::operations::features::FeatureEngine;
use crate::operations::spectral::{RustFftOps, SpectralOps};
use crate::operations::traits::AudioStatistics;
use crate::operations::types::FeatureConfig;
use crate::repr::validate_sample_rate;
use crate::{AmenError, AmenResult, ParameterError, SampleBuffer};

/// Sample rate assumed for raw samples supplied without one.
pub const DEFAULT_RAW_SAMPLE_RATE: f64 = 44100.0;

/// Default rate of the analysis signal.
pub const DEFAULT_ANALYSIS_SAMPLE_RATE: f64 = 22050.0;

/// Where the samples of an [`Audio`] come from.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    /// Decode a file.
    File(PathBuf),
    /// Use samples already in memory, `(channels, frames)`.
    Raw {
        /// The sample matrix.
        samples: Array2<f64>,
        /// Its sample rate; `None` means [`DEFAULT_RAW_SAMPLE_RATE`].
        sample_rate: Option<f64>,
    },
}

/// Construction options for [`Audio`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioOptions {
    /// Rate of `raw_samples`. `None` keeps the file's native rate (or the
    /// rate given with raw samples).
    pub sample_rate: Option<f64>,
    /// Downmix `raw_samples` to a single channel.
    pub convert_to_mono: bool,
    /// Rate of the analysis signal the features are computed from.
    pub analysis_sample_rate: f64,
    /// Framing and per-family feature settings.
    pub features: FeatureConfig,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            sample_rate: None,
            convert_to_mono: false,
            analysis_sample_rate: DEFAULT_ANALYSIS_SAMPLE_RATE,
            features: FeatureConfig::default(),
        }
    }
}

/// Audio samples together with their lazily computed features.
///
/// `Audio` is immutable after construction and is `Send + Sync`. Concurrent
/// first calls to [`Audio::features`] run the computation once and all
/// receive the same collection.
///
/// The spectral backend defaults to [`RustFftOps`]; [`Audio::with_ops`]
/// accepts any other [`SpectralOps`].
#[derive(Debug)]
pub struct Audio<S: SpectralOps = RustFftOps> {
    raw_samples: SampleBuffer,
    analysis_samples: SampleBuffer,
    file_path: Option<PathBuf>,
    zero_indexes: Vec<Vec<usize>>,
    raw_zero_indexes: OnceLock<Vec<Vec<usize>>>,
    engine: FeatureEngine<S>,
    features: OnceLock<FeatureCollection>,
    features_init: Mutex<()>,
}

impl<S: SpectralOps + Clone> Clone for Audio<S> {
    fn clone(&self) -> Self {
        Self {
            raw_samples: self.raw_samples.clone(),
            analysis_samples: self.analysis_samples.clone(),
            file_path: self.file_path.clone(),
            zero_indexes: self.zero_indexes.clone(),
            raw_zero_indexes: self.raw_zero_indexes.clone(),
            engine: self.engine.clone(),
            features: self.features.clone(),
            features_init: Mutex::new(()),
        }
    }
}

impl Audio {
    /// Creates an `Audio` from `source`.
    ///
    /// # Errors
    /// - [`AmenError::FileNotFound`] / [`AmenError::UnsupportedFormat`] when a
    ///   file cannot be loaded
    /// - [`AmenError::InvalidInput`] for empty samples, invalid rates or a
    ///   feature configuration that does not fit the analysis rate
    pub fn new(source: AudioSource, options: AudioOptions) -> AmenResult<Self> {
        Self::with_ops(source, options, RustFftOps::new())
    }

    /// Loads `path` with `options`.
    ///
    /// # Errors
    /// See [`Audio::new`].
    pub fn from_file<P: AsRef<Path>>(path: P, options: AudioOptions) -> AmenResult<Self> {
        Self::new(AudioSource::File(path.as_ref().to_path_buf()), options)
    }

    /// Wraps in-memory `(channels, frames)` samples, keeping them unchanged.
    ///
    /// `sample_rate` defaults to [`DEFAULT_RAW_SAMPLE_RATE`].
    ///
    /// # Errors
    /// See [`Audio::new`].
    pub fn from_raw_samples(samples: Array2<f64>, sample_rate: Option<f64>) -> AmenResult<Self> {
        Self::new(
            AudioSource::Raw {
                samples,
                sample_rate,
            },
            AudioOptions::default(),
        )
    }

    /// Starts an [`AudioBuilder`].
    pub fn builder() -> AudioBuilder {
        AudioBuilder::default()
    }
}

impl<S: SpectralOps> Audio<S> {
    /// Like [`Audio::new`], computing the analysis signal and the features
    /// with `ops`.
    ///
    /// # Errors
    /// See [`Audio::new`].
    pub fn with_ops(source: AudioSource, options: AudioOptions, ops: S) -> AmenResult<Self> {
        validate_sample_rate(options.analysis_sample_rate)?;
        options.features.validate(options.analysis_sample_rate)?;

        let (raw_samples, file_path) = match source {
            AudioSource::File(path) => {
                let raw = io::load_with(
                    &path,
                    &LoadOptions {
                        sample_rate: options.sample_rate,
                        convert_to_mono: options.convert_to_mono,
                    },
                )?;
                (raw, Some(path))
            }
            AudioSource::Raw {
                samples,
                sample_rate,
            } => {
                let rate = sample_rate.unwrap_or(DEFAULT_RAW_SAMPLE_RATE);
                let mut raw = SampleBuffer::new(samples, rate)?;
                if options.convert_to_mono {
                    raw = raw.to_mono();
                }
                if let Some(target) = options.sample_rate.filter(|&r| r != rate) {
                    raw = raw.resample(target)?;
                }
                (raw, None)
            }
        };

        let engine = FeatureEngine::with_ops(ops, options.features);
        let analysis_samples = engine
            .ops()
            .resample(&raw_samples.to_mono(), options.analysis_sample_rate)?;
        let zero_indexes = analysis_samples.zero_crossing_indexes();

        debug!(
            channels = raw_samples.num_channels(),
            sample_rate = raw_samples.sample_rate(),
            analysis_frames = analysis_samples.num_frames(),
            "created audio"
        );

        Ok(Self {
            raw_samples,
            analysis_samples,
            file_path,
            zero_indexes,
            raw_zero_indexes: OnceLock::new(),
            engine,
            features: OnceLock::new(),
            features_init: Mutex::new(()),
        })
    }

    /// All channels at [`Audio::sample_rate`].
    pub const fn raw_samples(&self) -> &SampleBuffer {
        &self.raw_samples
    }

    /// The mono signal at [`Audio::analysis_sample_rate`] the features are computed from.
    pub const fn analysis_samples(&self) -> &SampleBuffer {
        &self.analysis_samples
    }

    /// The source file, if loaded from one.
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Rate of the raw samples in Hz.
    pub const fn sample_rate(&self) -> f64 {
        self.raw_samples.sample_rate()
    }

    /// Rate of the analysis signal in Hz.
    pub const fn analysis_sample_rate(&self) -> f64 {
        self.analysis_samples.sample_rate()
    }

    /// Number of raw channels.
    pub fn num_channels(&self) -> usize {
        self.raw_samples.num_channels()
    }

    /// Duration in seconds: raw frames divided by [`Audio::sample_rate`].
    pub fn duration(&self) -> f64 {
        self.raw_samples.duration()
    }

    /// The feature settings in use.
    pub const fn feature_config(&self) -> &FeatureConfig {
        self.engine.config()
    }

    /// Zero-crossing indices of the analysis signal, one list per channel
    /// (always exactly one, since the analysis signal is mono).
    ///
    /// See [`crate::operations::statistics::zero_crossing_indexes`] for the
    /// sign convention.
    pub fn zero_indexes(&self) -> &[Vec<usize>] {
        &self.zero_indexes
    }

    /// Zero-crossing indices of every raw channel, at [`Audio::sample_rate`].
    pub fn raw_zero_indexes(&self) -> &[Vec<usize>] {
        self.raw_zero_indexes
            .get_or_init(|| self.raw_samples.zero_crossing_indexes())
    }

    /// The feature collection, computed on the first call.
    ///
    /// # Errors
    /// Returns any error raised while computing the features. A failed
    /// computation is not cached.
    pub fn features(&self) -> AmenResult<&FeatureCollection> {
        if let Some(features) = self.features.get() {
            return Ok(features);
        }
        let _init = self.features_init.lock();
        if let Some(features) = self.features.get() {
            return Ok(features);
        }
        let computed = self.engine.compute(&self.analysis_samples)?;
        Ok(self.features.get_or_init(|| computed))
    }

    /// Writes the raw samples to `path` as WAV.
    ///
    /// `format` is an [`OutputFormat`] or a format string such as `"WAV"`.
    ///
    /// # Errors
    /// Returns [`AmenError::UnsupportedFormat`] for an unknown format string
    /// and any error from [`crate::io::write`].
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub fn output<P, F>(&self, path: P, format: F) -> AmenResult<()>
    where
        P: AsRef<Path>,
        F: TryInto<OutputFormat>,
        AmenError: From<F::Error>,
    {
        let format = format.try_into()?;
        io::write(path, &self.raw_samples, format)
    }
}

/// Step-by-step construction of an [`Audio`].
///
/// Exactly one of [`AudioBuilder::file_path`] and
/// [`AudioBuilder::raw_samples`] must be set.
///
/// ```rust
/// use amen::Audio;
/// use ndarray::Array2;
///
/// let audio = Audio::builder()
///     .raw_samples(Array2::zeros((2, 44100)))
///     .sample_rate(44100.0)
///     .convert_to_mono(true)
///     .build()?;
/// assert_eq!(audio.num_channels(), 1);
/// # Ok::<(), amen::AmenError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct AudioBuilder {
    file_path: Option<PathBuf>,
    raw_samples: Option<Array2<f64>>,
    options: AudioOptions,
}

impl AudioBuilder {
    /// Loads samples from `path`.
    pub fn file_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Uses in-memory `(channels, frames)` samples.
    pub fn raw_samples(mut self, samples: Array2<f64>) -> Self {
        self.raw_samples = Some(samples);
        self
    }

    /// Rate to load the file at, or the rate of the raw samples.
    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.options.sample_rate = Some(sample_rate);
        self
    }

    /// Downmix the raw samples to mono.
    pub fn convert_to_mono(mut self, convert_to_mono: bool) -> Self {
        self.options.convert_to_mono = convert_to_mono;
        self
    }

    /// Rate of the analysis signal.
    pub fn analysis_sample_rate(mut self, analysis_sample_rate: f64) -> Self {
        self.options.analysis_sample_rate = analysis_sample_rate;
        self
    }

    /// Feature settings.
    pub fn feature_config(mut self, config: FeatureConfig) -> Self {
        self.options.features = config;
        self
    }

    /// Builds the [`Audio`].
    ///
    /// # Errors
    /// Returns [`AmenError::InvalidInput`] if neither or both sources were set,
    /// plus any error from [`Audio::new`].
    pub fn build(self) -> AmenResult<Audio> {
        let mut options = self.options;
        let source = match (self.file_path, self.raw_samples) {
            (Some(path), None) => AudioSource::File(path),
            (None, Some(samples)) => AudioSource::Raw {
                samples,
                sample_rate: options.sample_rate.take(),
            },
            (None, None) => {
                return Err(ParameterError::conflict(
                    "either a file path or raw samples must be provided",
                )
                .into());
            }
            (Some(_), Some(_)) => {
                return Err(ParameterError::conflict(
                    "a file path and raw samples cannot both be provided",
                )
                .into());
            }
        };
        Audio::new(source, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::types::{ChromaConfig, WindowType};
    use crate::utils::generation::{sine_wave, stereo_sine_wave};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_audio_is_send_sync() {
        assert_send_sync::<Audio>();
    }

    #[test]
    fn test_raw_construction_keeps_samples() {
        let stereo = stereo_sine_wave(440.0, Duration::from_millis(200), 44100.0, 0.5).unwrap();
        let audio = Audio::from_raw_samples(stereo.samples().to_owned(), None).unwrap();
        assert_eq!(audio.raw_samples(), &stereo);
        assert_eq!(audio.sample_rate(), DEFAULT_RAW_SAMPLE_RATE);
        assert_eq!(audio.num_channels(), 2);
        assert!(audio.file_path().is_none());

        assert_eq!(audio.analysis_samples().num_channels(), 1);
        assert_eq!(audio.analysis_sample_rate(), DEFAULT_ANALYSIS_SAMPLE_RATE);
        assert_eq!(audio.analysis_samples().num_frames(), 4410);
    }

    #[test]
    fn test_duration_is_frames_over_rate() {
        let tone = sine_wave(440.0, Duration::from_millis(1234), 48000.0, 0.5).unwrap();
        let frames = tone.num_frames();
        let audio = Audio::from_raw_samples(tone.into_samples(), Some(48000.0)).unwrap();
        assert_eq!(audio.duration(), frames as f64 / 48000.0);
    }

    #[test]
    fn test_builder_source_rules() {
        assert!(matches!(
            Audio::builder().build(),
            Err(AmenError::InvalidInput(ParameterError::Conflict(_)))
        ));
        assert!(matches!(
            Audio::builder()
                .file_path("a.wav")
                .raw_samples(Array2::zeros((1, 10)))
                .build(),
            Err(AmenError::InvalidInput(ParameterError::Conflict(_)))
        ));

        let audio = Audio::builder()
            .raw_samples(Array2::zeros((2, 4800)))
            .sample_rate(48000.0)
            .build()
            .unwrap();
        assert_eq!(audio.sample_rate(), 48000.0);
        assert_eq!(audio.num_channels(), 2);
    }

    #[test]
    fn test_raw_resampled_to_requested_rate() {
        let tone = sine_wave(440.0, Duration::from_secs(1), 44100.0, 0.5).unwrap();
        let options = AudioOptions {
            sample_rate: Some(22050.0),
            ..AudioOptions::default()
        };
        let audio = Audio::new(
            AudioSource::Raw {
                samples: tone.into_samples(),
                sample_rate: Some(44100.0),
            },
            options,
        )
        .unwrap();
        assert_eq!(audio.sample_rate(), 22050.0);
        assert_eq!(audio.raw_samples().num_frames(), 22050);
    }

    #[test]
    fn test_invalid_analysis_rate() {
        let options = AudioOptions {
            analysis_sample_rate: 0.0,
            ..AudioOptions::default()
        };
        let source = AudioSource::Raw {
            samples: Array2::zeros((1, 100)),
            sample_rate: None,
        };
        assert!(matches!(
            Audio::new(source, options),
            Err(AmenError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_features_are_memoized() {
        let tone = sine_wave(440.0, Duration::from_millis(500), 44100.0, 0.5).unwrap();
        let audio = Audio::from_raw_samples(tone.into_samples(), None).unwrap();
        let first = audio.features().unwrap();
        let second = audio.features().unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[derive(Debug, Clone, Default)]
    struct CountingOps {
        inner: RustFftOps,
        stft_calls: Arc<AtomicUsize>,
    }

    impl SpectralOps for CountingOps {
        fn stft_magnitude(
            &self,
            signal: &[f64],
            frame_length: usize,
            hop_length: usize,
            window: WindowType,
        ) -> AmenResult<Array2<f64>> {
            self.stft_calls.fetch_add(1, Ordering::SeqCst);
            // Keep the first caller inside compute while the others arrive
            thread::sleep(Duration::from_millis(20));
            self.inner
                .stft_magnitude(signal, frame_length, hop_length, window)
        }

        fn mel_filterbank(
            &self,
            n_mels: usize,
            n_fft: usize,
            sample_rate: f64,
            fmin: f64,
            fmax: f64,
        ) -> Array2<f64> {
            self.inner.mel_filterbank(n_mels, n_fft, sample_rate, fmin, fmax)
        }

        fn constant_q_magnitude(
            &self,
            signal: &[f64],
            sample_rate: f64,
            hop_length: usize,
            num_frames: usize,
            config: &ChromaConfig,
        ) -> AmenResult<Array2<f64>> {
            self.inner
                .constant_q_magnitude(signal, sample_rate, hop_length, num_frames, config)
        }

        fn dct(&self, input: &[f64], n_out: usize) -> Vec<f64> {
            self.inner.dct(input, n_out)
        }

        fn resample(&self, buffer: &SampleBuffer, target_rate: f64) -> AmenResult<SampleBuffer> {
            self.inner.resample(buffer, target_rate)
        }
    }

    #[test]
    fn test_concurrent_first_access_computes_once() {
        let ops = CountingOps::default();
        let calls = Arc::clone(&ops.stft_calls);
        let tone = sine_wave(440.0, Duration::from_millis(500), 22050.0, 0.5).unwrap();
        let source = AudioSource::Raw {
            samples: tone.into_samples(),
            sample_rate: Some(22050.0),
        };
        let audio = Audio::with_ops(source, AudioOptions::default(), ops).unwrap();

        let shared = &audio;
        let addresses: Vec<usize> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(move || {
                        shared.features().unwrap() as *const FeatureCollection as usize
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(addresses.iter().all(|&a| a == addresses[0]));
    }

    #[test]
    fn test_clone_keeps_computed_features() {
        let tone = sine_wave(440.0, Duration::from_millis(200), 22050.0, 0.5).unwrap();
        let audio = Audio::from_raw_samples(tone.into_samples(), Some(22050.0)).unwrap();
        let original = audio.features().unwrap().clone();
        let copy = audio.clone();
        assert_eq!(copy.features().unwrap(), &original);
    }

    #[test]
    fn test_raw_zero_indexes_per_channel() {
        let stereo = stereo_sine_wave(10.3, Duration::from_secs(1), 1000.0, 1.0).unwrap();
        let audio = Audio::from_raw_samples(stereo.into_samples(), Some(1000.0)).unwrap();
        let raw = audio.raw_zero_indexes();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0], raw[1]);
        assert_eq!(raw[0].len(), 20);
        assert_eq!(audio.zero_indexes().len(), 1);
    }

    #[test]
    fn test_output_rejects_unknown_format() {
        let audio = Audio::from_raw_samples(Array2::zeros((1, 100)), None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            audio.output(dir.path().join("x.ogg"), "OGG"),
            Err(AmenError::UnsupportedFormat(_))
        ));
        assert!(audio.output(dir.path().join("x.wav"), OutputFormat::Pcm16Wav).is_ok());
    }
}
