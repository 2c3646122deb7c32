//! Utility functions for audio processing.
//!
//! # Modules
//!
//! - [`audio_math`] - Frequency, power and time/frame conversions
//! - [`comparison`] - Closeness checks between signals
//! - [`generation`] - Audio signal generation utilities

pub mod audio_math;
pub mod comparison;
pub mod generation;

pub use comparison::*;
pub use generation::*;
