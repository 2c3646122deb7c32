//! Core trait definitions for analysis operations on [`crate::SampleBuffer`].
//!
//! Implementations live in the sibling modules; this file only declares the
//! interfaces so that they can be imported from one place.

/// Zero-crossing statistics over every channel of a buffer.
///
/// Per-channel results are returned in channel order.
pub trait AudioStatistics {
    /// Indices at which each channel changes sign.
    ///
    /// Index `i >= 1` is reported when `(x[i - 1] < 0) != (x[i] < 0)`; an exact
    /// zero counts as non-negative.
    fn zero_crossing_indexes(&self) -> Vec<Vec<usize>>;

    /// Total number of zero crossings summed over channels.
    fn zero_crossings(&self) -> usize {
        self.zero_crossing_indexes().iter().map(Vec::len).sum()
    }
}
