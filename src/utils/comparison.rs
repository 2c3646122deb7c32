//! Audio comparison and similarity utilities.
//!
//! Element-wise closeness checks for comparing signals, e.g. after a
//! write/read round trip or a resampling pass.

/// Returns true if every pair satisfies `|a - b| <= atol + rtol * |b|`.
///
/// Slices of different length are never close.
///
/// # Examples
/// ```rust
/// use amen::utils::comparison::allclose;
///
/// assert!(allclose(&[1.0, 2.0], &[1.0, 2.000001], 1e-5, 1e-8));
/// assert!(!allclose(&[1.0], &[1.1], 1e-5, 1e-8));
/// ```
pub fn allclose(a: &[f64], b: &[f64], rtol: f64, atol: f64) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(&x, &y)| (x - y).abs() <= atol + rtol * y.abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allclose_tolerances() {
        assert!(allclose(&[], &[], 0.0, 0.0));
        assert!(allclose(&[0.0, 1e-9], &[0.0, 0.0], 0.0, 1e-8));
        assert!(!allclose(&[0.0, 1e-7], &[0.0, 0.0], 0.0, 1e-8));
        assert!(!allclose(&[1.0, 2.0], &[1.0], 1.0, 1.0));
    }
}
