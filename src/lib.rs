// Correctness and logic
#![warn(clippy::unit_cmp)] // Detects comparing unit types
#![warn(clippy::match_same_arms)]
// Duplicate match arms

// Performance-focused
#![warn(clippy::inefficient_to_string)] // `format!("{}", x)` vs `x.to_string()`
#![warn(clippy::map_clone)] // Cloning inside `map()` unnecessarily
#![warn(clippy::unnecessary_to_owned)] // Detects redundant `.to_owned()` or `.clone()`
#![warn(clippy::large_stack_arrays)] // Helps avoid stack overflows
#![warn(clippy::needless_collect)] // Avoids `.collect().iter()` chains

// Style and idiomatic Rust
#![warn(clippy::redundant_clone)] // Detects unnecessary `.clone()`
#![warn(clippy::identity_op)] // e.g., `x + 0`, `x * 1`
#![warn(clippy::needless_return)] // Avoids `return` at the end of functions
#![warn(clippy::let_unit_value)] // Avoids binding `()` to variables
#![warn(clippy::manual_map)] // Use `.map()` instead of manual `match`
#![warn(clippy::unwrap_used)] // Avoids using `unwrap()`

// Maintainability
#![warn(clippy::missing_panics_doc)] // Docs for functions that might panic
#![warn(clippy::missing_const_for_fn)] // Suggests making eligible functions `const`
#![deny(missing_docs)] // Documentation is a must for release

//! # amen
//!
//! Audio analysis for remixing: load a sound, get a mono analysis signal,
//! frame-level features and zero crossings, and write the samples back out.
//!
//! ## Installation
//!
//! ```toml
//! [dependencies]
//! amen = "0.1"
//! ```
//!
//! ## Features
//!
//! - `parallel-processing`: compute the feature families concurrently with
//!   `rayon`. Results are identical to the sequential build.
//!
//! ## Quick Start
//!
//! ```rust
//! use amen::{Audio, TimeSlice};
//! use amen::utils::generation::stereo_sine_wave;
//! use std::time::Duration;
//!
//! let tone = stereo_sine_wave(440.0, Duration::from_secs(2), 44100.0, 0.5)?;
//! let audio = Audio::from_raw_samples(tone.into_samples(), Some(44100.0))?;
//!
//! assert_eq!(audio.num_channels(), 2);
//! assert_eq!(audio.analysis_samples().num_channels(), 1);
//!
//! let features = audio.features()?;
//! let loudness = features.get("amplitude")?;
//! let a = &features["chroma"]["a"];
//! assert_eq!(loudness.len(), a.len());
//!
//! // One value per half second
//! let halves = TimeSlice::between(&[0.0, 0.5, 1.0, 1.5, 2.0]);
//! let per_half = features.at(&halves);
//! assert_eq!(per_half["centroid"].len(), 4);
//! # Ok::<(), amen::AmenError>(())
//! ```
//!
//! ## Architecture
//!
//! - [`SampleBuffer`] holds `(channels, frames)` samples and their rate.
//! - [`io`] reads WAV with `hound` and everything else with `symphonia`,
//!   and writes WAV.
//! - [`resampling`] wraps `rubato`'s FFT and sinc resamplers.
//! - [`operations`] holds the spectral primitives ([`operations::spectral::SpectralOps`]),
//!   statistics and the [`operations::features::FeatureEngine`].
//! - [`Feature`] and [`FeatureCollection`] are the typed results.
//! - [`Audio`] ties everything together.
//!
//! ## Logging
//!
//! The crate emits `tracing` events (`debug` for loading, resampling, feature
//! builds and output; `trace` for per-family timings) and never installs a
//! subscriber.

mod error;

pub mod audio;
pub mod feature;
pub mod io;
pub mod operations;
mod repr;
pub mod resampling;
pub mod utils;

pub use crate::audio::{Audio, AudioBuilder, AudioOptions, AudioSource};
pub use crate::error::{AmenError, AmenResult, ParameterError, ProcessingError};
pub use crate::feature::{
    Aggregation, Feature, FeatureCollection, FeatureSeries, NamedFeatures, TimeSlice,
};
pub use crate::io::{LoadOptions, OutputFormat};
pub use crate::operations::AudioStatistics;
pub use crate::operations::features::FeatureEngine;
pub use crate::operations::spectral::{RustFftOps, SpectralOps};
pub use crate::operations::types::{
    ChromaConfig, FeatureConfig, MfccConfig, ResamplingQuality, WindowType,
};
pub use crate::repr::SampleBuffer;
pub use crate::utils::audio_math;
pub use resampling::resample;
