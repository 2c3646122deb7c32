//! Analysis operations on [`crate::SampleBuffer`].
//!
//! ## Module Organization
//!
//! - [`traits`] - Core trait definitions
//! - [`statistics`] - Zero crossings and framed RMS
//! - [`spectral`] - STFT, mel filterbank, constant-Q and DCT behind [`SpectralOps`]
//! - [`features`] - The feature engine built on top of the above
//! - [`types`] - Supporting configuration types and enums
//!
//! ## Quick Start
//!
//! ```rust
//! use amen::SampleBuffer;
//! use amen::operations::*;
//! use ndarray::array;
//!
//! let audio = SampleBuffer::new(array![[0.5, -0.5, 0.25, -0.25]], 4.0).unwrap();
//! assert_eq!(audio.zero_crossing_indexes(), vec![vec![1, 2, 3]]);
//! assert_eq!(audio.zero_crossings(), 3);
//! ```

pub mod features;
pub mod spectral;
pub mod statistics;
pub mod traits;
pub mod types;

pub use spectral::{RustFftOps, SpectralOps};
pub use traits::AudioStatistics;
pub use types::{ChromaConfig, FeatureConfig, MfccConfig, ResamplingQuality, WindowType};
