//! Frame-based feature extraction.
//!
//! [`FeatureEngine`] turns a mono analysis buffer into a [`FeatureCollection`]
//! holding the four built-in feature families:
//!
//! | Name | Shape | Description |
//! |---|---|---|
//! | `amplitude` | series | RMS of each frame |
//! | `centroid` | series | spectral centroid in Hz |
//! | `timbre` | indexed, `n_mfcc` series | mel-frequency cepstral coefficients |
//! | `chroma` | named, 12 series | constant-Q energy per pitch class |
//!
//! Every family is computed on the same frame grid (see [`FeatureConfig`]), so
//! value `i` of any series describes the same stretch of audio.

use std::collections::BTreeMap;
use std::time::Instant;

use ndarray::{Array2, Axis};
use tracing::{debug, instrument, trace, warn};

use super::spectral::{RustFftOps, SpectralOps};
use super::statistics::frame_rms;
use super::types::FeatureConfig;
use crate::feature::{Feature, FeatureCollection, FeatureSeries, NamedFeatures};
use crate::utils::audio_math::{fft_frequencies, power_to_db};
use crate::{AmenResult, SampleBuffer};

/// Name of the frame RMS feature.
pub const AMPLITUDE: &str = "amplitude";
/// Name of the spectral centroid feature.
pub const CENTROID: &str = "centroid";
/// Name of the MFCC feature.
pub const TIMBRE: &str = "timbre";
/// Name of the chroma feature.
pub const CHROMA: &str = "chroma";

/// Chroma keys, starting from the pitch class of `ChromaConfig::fmin` (C by default).
pub const PITCH_CLASSES: [&str; 12] = [
    "c", "c#", "d", "d#", "e", "f", "f#", "g", "g#", "a", "a#", "b",
];

/// Flat spellings accepted as chroma keys, with the sharp they resolve to.
pub const FLAT_ALIASES: [(&str, &str); 5] = [
    ("db", "c#"),
    ("eb", "d#"),
    ("gb", "f#"),
    ("ab", "g#"),
    ("bb", "a#"),
];

/// Computes the built-in features with a pluggable [`SpectralOps`] backend.
///
/// # Examples
///
/// ```rust
/// use amen::operations::features::FeatureEngine;
/// use amen::operations::types::FeatureConfig;
/// use amen::utils::generation::sine_wave;
/// use std::time::Duration;
///
/// let tone = sine_wave(440.0, Duration::from_secs(1), 22050.0, 0.5).unwrap();
/// let engine = FeatureEngine::new(FeatureConfig::default());
/// let features = engine.compute(&tone).unwrap();
///
/// assert_eq!(features["amplitude"].len(), 1 + 22050 / 512);
/// assert_eq!(features["timbre"].len(), 20);
/// assert_eq!(features["chroma"].len(), 12);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FeatureEngine<S: SpectralOps = RustFftOps> {
    ops: S,
    config: FeatureConfig,
}

impl FeatureEngine<RustFftOps> {
    /// Creates an engine backed by [`RustFftOps`].
    pub const fn new(config: FeatureConfig) -> Self {
        Self {
            ops: RustFftOps::new(),
            config,
        }
    }
}

impl<S: SpectralOps> FeatureEngine<S> {
    /// Creates an engine backed by `ops`.
    pub const fn with_ops(ops: S, config: FeatureConfig) -> Self {
        Self { ops, config }
    }

    /// The framing and per-family configuration.
    pub const fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// The spectral backend.
    pub const fn ops(&self) -> &S {
        &self.ops
    }

    /// Computes every feature family for `analysis`.
    ///
    /// Multi-channel input is averaged to mono first. A signal shorter than one
    /// frame yields a collection in which every series is empty.
    ///
    /// # Errors
    /// Returns [`crate::AmenError::InvalidInput`] if the configuration is not
    /// valid for the buffer's sample rate, or any error raised by the backend.
    #[instrument(
        level = "debug",
        skip_all,
        fields(frames = analysis.num_frames(), sample_rate = analysis.sample_rate())
    )]
    pub fn compute(&self, analysis: &SampleBuffer) -> AmenResult<FeatureCollection> {
        let sample_rate = analysis.sample_rate();
        self.config.validate(sample_rate)?;

        let mono = analysis.to_mono();
        let signal: Vec<f64> = mono.samples().iter().copied().collect();
        let n_frames = self.config.num_frames(signal.len());

        if n_frames == 0 {
            warn!(
                samples = signal.len(),
                frame_length = self.config.frame_length,
                "analysis signal is shorter than one frame, features are empty"
            );
            return self.empty_collection(sample_rate);
        }

        let magnitudes = timed("stft", || {
            self.ops.stft_magnitude(
                &signal,
                self.config.frame_length,
                self.config.hop_length,
                self.config.window_type,
            )
        })?;

        let (amplitude, centroid, timbre, chroma) =
            self.compute_families(&signal, &magnitudes, sample_rate, n_frames);

        let mut features = BTreeMap::new();
        features.insert(AMPLITUDE.to_string(), Feature::Series(amplitude));
        features.insert(CENTROID.to_string(), Feature::Series(centroid));
        features.insert(TIMBRE.to_string(), timbre);
        features.insert(CHROMA.to_string(), chroma?);

        debug!(n_frames, families = features.len(), "built feature collection");
        Ok(FeatureCollection::new(features))
    }

    #[cfg(not(feature = "parallel-processing"))]
    fn compute_families(
        &self,
        signal: &[f64],
        magnitudes: &Array2<f64>,
        sample_rate: f64,
        n_frames: usize,
    ) -> (FeatureSeries, FeatureSeries, Feature, AmenResult<Feature>) {
        (
            timed(AMPLITUDE, || self.amplitude(signal, sample_rate)),
            timed(CENTROID, || self.centroid(magnitudes, sample_rate)),
            timed(TIMBRE, || self.timbre(magnitudes, sample_rate)),
            timed(CHROMA, || self.chroma(signal, sample_rate, n_frames)),
        )
    }

    #[cfg(feature = "parallel-processing")]
    fn compute_families(
        &self,
        signal: &[f64],
        magnitudes: &Array2<f64>,
        sample_rate: f64,
        n_frames: usize,
    ) -> (FeatureSeries, FeatureSeries, Feature, AmenResult<Feature>) {
        let ((amplitude, centroid), (timbre, chroma)) = rayon::join(
            || {
                rayon::join(
                    || timed(AMPLITUDE, || self.amplitude(signal, sample_rate)),
                    || timed(CENTROID, || self.centroid(magnitudes, sample_rate)),
                )
            },
            || {
                rayon::join(
                    || timed(TIMBRE, || self.timbre(magnitudes, sample_rate)),
                    || timed(CHROMA, || self.chroma(signal, sample_rate, n_frames)),
                )
            },
        );
        (amplitude, centroid, timbre, chroma)
    }

    /// RMS of each frame of `signal`.
    pub fn amplitude(&self, signal: &[f64], sample_rate: f64) -> FeatureSeries {
        let rms = frame_rms(signal, self.config.frame_length, self.config.hop_length);
        self.series(rms, sample_rate)
    }

    /// Spectral centroid in Hz of each column of a magnitude spectrogram.
    ///
    /// Silent frames have a centroid of 0.
    pub fn centroid(&self, magnitudes: &Array2<f64>, sample_rate: f64) -> FeatureSeries {
        let freqs = fft_frequencies(self.config.frame_length, sample_rate);
        let centroids = magnitudes
            .axis_iter(Axis(1))
            .map(|frame| {
                let (weighted, total) = frame
                    .iter()
                    .zip(&freqs)
                    .fold((0.0, 0.0), |(w, t), (&m, &f)| (w + f * m, t + m));
                if total > 0.0 { weighted / total } else { 0.0 }
            })
            .collect();
        self.series(centroids, sample_rate)
    }

    /// Mel-frequency cepstral coefficients of a magnitude spectrogram.
    ///
    /// Returns [`Feature::Indexed`] with one series per coefficient.
    pub fn timbre(&self, magnitudes: &Array2<f64>, sample_rate: f64) -> Feature {
        let mfcc = &self.config.mfcc;
        let filterbank = self.ops.mel_filterbank(
            mfcc.n_mels,
            self.config.frame_length,
            sample_rate,
            mfcc.fmin,
            mfcc.effective_fmax(sample_rate),
        );
        let power = magnitudes.mapv(|m| m * m);
        let mut mel_db = filterbank.dot(&power).mapv(power_to_db);

        if let Some(top_db) = mfcc.top_db {
            let peak = mel_db.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let floor = peak - top_db;
            mel_db.mapv_inplace(|v| v.max(floor));
        }

        let n_frames = mel_db.ncols();
        let mut coefficients = vec![Vec::with_capacity(n_frames); mfcc.n_mfcc];
        for frame in mel_db.axis_iter(Axis(1)) {
            let bands: Vec<f64> = frame.to_vec();
            for (k, value) in self.ops.dct(&bands, mfcc.n_mfcc).into_iter().enumerate() {
                coefficients[k].push(value);
            }
        }

        Feature::Indexed(
            coefficients
                .into_iter()
                .map(|c| Feature::Series(self.series(c, sample_rate)))
                .collect(),
        )
    }

    /// Constant-Q chroma of `signal`, one series per pitch class.
    ///
    /// Each frame is scaled so its loudest pitch class is 1.0 when
    /// [`super::types::ChromaConfig::normalize`] is set; silent frames stay 0.
    ///
    /// # Errors
    /// Returns any error raised by [`SpectralOps::constant_q_magnitude`].
    pub fn chroma(&self, signal: &[f64], sample_rate: f64, n_frames: usize) -> AmenResult<Feature> {
        let config = &self.config.chroma;
        let cq = self.ops.constant_q_magnitude(
            signal,
            sample_rate,
            self.config.hop_length,
            n_frames,
            config,
        )?;

        let mut chroma = Array2::<f64>::zeros((PITCH_CLASSES.len(), cq.ncols()));
        for (bin, row) in cq.axis_iter(Axis(0)).enumerate() {
            let mut target = chroma.row_mut(config.pitch_class(bin));
            target += &row;
        }

        if config.normalize {
            for mut frame in chroma.axis_iter_mut(Axis(1)) {
                let peak = frame.iter().copied().fold(0.0, f64::max);
                if peak > 0.0 {
                    frame /= peak;
                }
            }
        }

        self.chroma_feature(
            chroma
                .axis_iter(Axis(0))
                .map(|row| self.series(row.to_vec(), sample_rate))
                .collect(),
        )
    }

    fn chroma_feature(&self, classes: Vec<FeatureSeries>) -> AmenResult<Feature> {
        let entries = PITCH_CLASSES
            .iter()
            .zip(classes)
            .map(|(name, series)| (name.to_string(), Feature::Series(series)))
            .collect();
        let named = FLAT_ALIASES
            .iter()
            .try_fold(NamedFeatures::new(entries)?, |named, (flat, sharp)| {
                named.with_alias(flat, sharp)
            })?;
        Ok(Feature::Named(named))
    }

    fn series(&self, data: Vec<f64>, sample_rate: f64) -> FeatureSeries {
        FeatureSeries::from_frames(data, sample_rate, self.config.hop_length)
    }

    fn empty_collection(&self, sample_rate: f64) -> AmenResult<FeatureCollection> {
        let empty = || self.series(Vec::new(), sample_rate);
        let mut features = BTreeMap::new();
        features.insert(AMPLITUDE.to_string(), Feature::Series(empty()));
        features.insert(CENTROID.to_string(), Feature::Series(empty()));
        features.insert(
            TIMBRE.to_string(),
            Feature::Indexed(
                (0..self.config.mfcc.n_mfcc)
                    .map(|_| Feature::Series(empty()))
                    .collect(),
            ),
        );
        features.insert(
            CHROMA.to_string(),
            self.chroma_feature(PITCH_CLASSES.iter().map(|_| empty()).collect())?,
        );
        Ok(FeatureCollection::new(features))
    }
}

fn timed<T>(family: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    trace!(family, elapsed_us = start.elapsed().as_micros() as u64, "computed feature family");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AmenError;
    use crate::utils::generation::{compound_tone, silence, sine_wave};
    use std::time::Duration;

    fn engine() -> FeatureEngine {
        FeatureEngine::new(FeatureConfig::default())
    }

    #[test]
    fn test_every_family_shares_the_frame_grid() {
        let tone = sine_wave(440.0, Duration::from_secs(1), 22050.0, 0.5).unwrap();
        let features = engine().compute(&tone).unwrap();
        let n_frames = 1 + 22050 / 512;

        assert_eq!(features.len(), 4);
        assert_eq!(features[AMPLITUDE].len(), n_frames);
        assert_eq!(features[CENTROID].len(), n_frames);
        for coefficient in 0..20 {
            assert_eq!(features[TIMBRE][coefficient].len(), n_frames);
        }
        for class in PITCH_CLASSES {
            assert_eq!(features[CHROMA][class].len(), n_frames);
        }
        assert_eq!(
            features[AMPLITUDE].series().unwrap().times(),
            features[CHROMA]["a"].series().unwrap().times()
        );
    }

    #[test]
    fn test_centroid_tracks_tone_frequency() {
        let tone = sine_wave(1000.0, Duration::from_secs(1), 22050.0, 0.5).unwrap();
        let features = engine().compute(&tone).unwrap();
        let centroid = features[CENTROID].data().unwrap();
        let middle = centroid[centroid.len() / 2];
        assert!((middle - 1000.0).abs() < 50.0, "centroid {middle}");
    }

    #[test]
    fn test_silence_has_zero_centroid_and_floor_timbre() {
        let quiet = silence(Duration::from_secs(1), 22050.0, 1).unwrap();
        let features = engine().compute(&quiet).unwrap();
        assert!(features[CENTROID].data().unwrap().iter().all(|&c| c == 0.0));
        assert!(features[AMPLITUDE].data().unwrap().iter().all(|&a| a == 0.0));
        assert!(features[CHROMA]["c"].data().unwrap().iter().all(|&v| v == 0.0));
        // log of the power floor, constant over bands: only the DC coefficient is non-zero
        assert!(features[TIMBRE][1].data().unwrap().iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_chroma_finds_pitch_class() {
        // A3 + A4: both fold into pitch class "a"
        let tone = compound_tone(&[(220.0, 0.4), (440.0, 0.4)], Duration::from_secs(1), 22050.0)
            .unwrap();
        let features = engine().compute(&tone).unwrap();
        let chroma = &features[CHROMA];
        let frame = chroma["a"].len() / 2;

        assert!((chroma["a"].data().unwrap()[frame] - 1.0).abs() < 1e-12);
        for class in PITCH_CLASSES.iter().filter(|&&c| c != "a") {
            assert!(chroma[*class].data().unwrap()[frame] < 1.0);
        }
        assert_eq!(&chroma["bb"], &chroma["a#"]);
    }

    #[test]
    fn test_short_signal_yields_empty_series() {
        let short = sine_wave(440.0, Duration::from_millis(10), 22050.0, 0.5).unwrap();
        let features = engine().compute(&short).unwrap();
        assert_eq!(features.len(), 4);
        assert!(features[AMPLITUDE].is_empty());
        assert!(features[CENTROID].is_empty());
        assert_eq!(features[TIMBRE].len(), 20);
        assert!(features[TIMBRE][0].is_empty());
        assert!(features[CHROMA]["db"].is_empty());
    }

    #[test]
    fn test_odd_frame_length_builds_every_family() {
        let config = FeatureConfig {
            frame_length: 1025,
            hop_length: 512,
            ..FeatureConfig::default()
        };
        let tone = sine_wave(440.0, Duration::from_millis(200), 22050.0, 0.5).unwrap();
        let n_frames = config.num_frames(tone.num_frames());
        assert_eq!(n_frames, 1 + 4410 / 512);
        let features = FeatureEngine::new(config).compute(&tone).unwrap();

        assert_eq!(features[AMPLITUDE].len(), n_frames);
        assert_eq!(features[CENTROID].len(), n_frames);
        assert_eq!(features[TIMBRE][0].len(), n_frames);
        assert_eq!(features[CHROMA]["a"].len(), n_frames);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = FeatureConfig::default();
        config.hop_length = 0;
        let tone = sine_wave(440.0, Duration::from_secs(1), 22050.0, 0.5).unwrap();
        assert!(matches!(
            FeatureEngine::new(config).compute(&tone),
            Err(AmenError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_compute_is_deterministic() {
        let tone = sine_wave(330.0, Duration::from_millis(500), 22050.0, 0.5).unwrap();
        let a = engine().compute(&tone).unwrap();
        let b = engine().compute(&tone).unwrap();
        assert_eq!(a, b);
    }
}
