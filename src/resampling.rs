//! Module for handling audio sample resampling operations.
//!
//! Integral rate pairs go through rubato's synchronous FFT resampler, whose
//! latency is an exact number of output frames. Anything else falls back to
//! band-limited sinc interpolation. Either way the output is aligned with the
//! input and holds exactly `round(frames * target / source)` frames.

use rubato::{
    FftFixedInOut, Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};
use tracing::debug;

use crate::operations::types::ResamplingQuality;
use crate::repr::validate_sample_rate;
use crate::{AmenError, AmenResult, ProcessingError, SampleBuffer};

const FAST_BLOCK: usize = 256;
const MEDIUM_BLOCK: usize = 512;
const HIGH_BLOCK: usize = 1024;

const FAST_SINC_BLOCK: usize = 4096;
const HIGH_SINC_BLOCK: usize = 8192;

fn fft_block_size(quality: ResamplingQuality) -> usize {
    match quality {
        ResamplingQuality::Fast => FAST_BLOCK,
        ResamplingQuality::Medium => MEDIUM_BLOCK,
        ResamplingQuality::High => HIGH_BLOCK,
    }
}

fn sinc_block_size(quality: ResamplingQuality, input_len: usize) -> usize {
    let target = match quality {
        ResamplingQuality::Fast | ResamplingQuality::Medium => FAST_SINC_BLOCK,
        ResamplingQuality::High => HIGH_SINC_BLOCK,
    };
    input_len.clamp(1, target)
}

fn interpolation_parameters(quality: ResamplingQuality) -> SincInterpolationParameters {
    match quality {
        ResamplingQuality::Fast => SincInterpolationParameters {
            sinc_len: 64,
            f_cutoff: 0.9,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::Hann2,
        },
        ResamplingQuality::Medium => SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        },
        ResamplingQuality::High => SincInterpolationParameters {
            sinc_len: 256, // Longer sinc filter for better quality
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 512,
            window: WindowFunction::BlackmanHarris2,
        },
    }
}

fn resampler_error(operation: &str, err: impl std::fmt::Display) -> AmenError {
    AmenError::Processing(ProcessingError::algorithm_failure(
        operation,
        err.to_string(),
    ))
}

/// Returns the rate as an integer if it is a whole number of Hz.
fn integral_rate(rate: f64) -> Option<usize> {
    (rate.fract() == 0.0 && rate <= u32::MAX as f64).then_some(rate as usize)
}

const fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

/// Resamples audio to a new sample rate.
///
/// When `target_sample_rate` equals the source rate the buffer is returned
/// unchanged. Otherwise every channel is resampled and the result holds
/// `round(frames * target / source)` frames, with frame `k` of the output
/// taken at input time `k * source / target`.
///
/// # Arguments
/// * `audio` - The input audio samples
/// * `target_sample_rate` - Desired output sample rate in Hz
/// * `quality` - Quality/performance trade-off setting
///
/// # Errors
/// Returns an error if:
/// - `target_sample_rate` is not a finite positive number
/// - Rubato encounters an internal error
///
/// # Example
/// ```rust
/// use amen::{SampleBuffer, resample};
/// use amen::operations::types::ResamplingQuality;
/// use ndarray::Array2;
///
/// let audio = SampleBuffer::new(Array2::zeros((1, 44100)), 44100.0).unwrap();
/// let resampled = resample(&audio, 22050.0, ResamplingQuality::Fast).unwrap();
/// assert_eq!(resampled.sample_rate(), 22050.0);
/// assert_eq!(resampled.num_frames(), 22050);
/// ```
pub fn resample(
    audio: &SampleBuffer,
    target_sample_rate: f64,
    quality: ResamplingQuality,
) -> AmenResult<SampleBuffer> {
    validate_sample_rate(target_sample_rate)?;

    let source_rate = audio.sample_rate();
    if source_rate == target_sample_rate {
        return Ok(audio.clone());
    }

    let frames = audio.num_frames();
    let expected = ((frames as f64 * target_sample_rate / source_rate).round() as usize).max(1);
    let input: Vec<Vec<f64>> = audio.channels().map(|c| c.to_vec()).collect();

    let aligned = match (integral_rate(source_rate), integral_rate(target_sample_rate)) {
        (Some(from), Some(to)) => resample_fft(&input, from, to, expected, quality)?,
        _ => resample_sinc(
            &input,
            target_sample_rate / source_rate,
            expected,
            quality,
        )?,
    };

    debug!(
        source_rate,
        target_sample_rate,
        frames_in = frames,
        frames_out = expected,
        ?quality,
        "resampled audio"
    );

    SampleBuffer::from_channels(aligned, target_sample_rate)
}

/// Synchronous FFT resampling between integral rates.
///
/// The block sizes are chosen so that the output block is even, which makes
/// the filter latency of `output_block / 2` frames exact.
fn resample_fft(
    input: &[Vec<f64>],
    from: usize,
    to: usize,
    expected: usize,
    quality: ResamplingQuality,
) -> AmenResult<Vec<Vec<f64>>> {
    let g = gcd(from, to);
    let (min_in, min_out) = (from / g, to / g);
    let mut blocks = fft_block_size(quality).div_ceil(min_in).max(1);
    if (blocks * min_out) % 2 == 1 {
        blocks += 1;
    }

    let mut resampler = FftFixedInOut::<f64>::new(from, to, blocks * min_in, input.len())
        .map_err(|e| resampler_error("fft_resampler", e))?;
    let delay = resampler.output_delay();
    run_and_align(&mut resampler, input, delay, expected, "fft_resampler")
}

/// Sinc resampling for rates that are not whole numbers of Hz.
///
/// `SincFixedIn` evaluates output frame `k` at input time
/// `(k + 1) / ratio - 1 + 1 / oversampling`. The input is delayed by `pad`
/// zeros so that the offset back to `k / ratio` is a non-negative number of
/// output frames, which is then skipped. The remaining sub-frame error is
/// below half an output frame.
fn resample_sinc(
    input: &[Vec<f64>],
    ratio: f64,
    expected: usize,
    quality: ResamplingQuality,
) -> AmenResult<Vec<Vec<f64>>> {
    let params = interpolation_parameters(quality);
    let oversampling = params.oversampling_factor as f64;
    let pad = (1.0 / ratio).ceil() as usize;
    let skip = (ratio * (pad as f64 + 1.0 - 1.0 / oversampling) - 1.0).round() as usize;

    let padded: Vec<Vec<f64>> = input
        .iter()
        .map(|channel| {
            let mut samples = vec![0.0; pad];
            samples.extend_from_slice(channel);
            samples
        })
        .collect();
    let frames = padded.first().map_or(0, Vec::len);

    let mut resampler = SincFixedIn::<f64>::new(
        ratio,
        1.0,
        params,
        sinc_block_size(quality, frames),
        input.len(),
    )
    .map_err(|e| resampler_error("sinc_resampler", e))?;
    run_and_align(&mut resampler, &padded, skip, expected, "sinc_resampler")
}

/// Feeds `input` through `resampler` in full blocks, a zero-padded tail and
/// as many flushes as needed, then drops the first `delay` output frames and
/// keeps `expected` frames.
fn run_and_align<R: Resampler<f64>>(
    resampler: &mut R,
    input: &[Vec<f64>],
    delay: usize,
    expected: usize,
    operation: &str,
) -> AmenResult<Vec<Vec<f64>>> {
    let frames = input.first().map_or(0, Vec::len);
    let wanted = delay + expected;
    let mut output: Vec<Vec<f64>> = vec![Vec::with_capacity(wanted); input.len()];

    let mut pos = 0;
    while pos + resampler.input_frames_next() <= frames {
        let n = resampler.input_frames_next();
        let chunk: Vec<&[f64]> = input.iter().map(|c| &c[pos..pos + n]).collect();
        let block = resampler
            .process(chunk.as_slice(), None)
            .map_err(|e| resampler_error(operation, e))?;
        append_block(&mut output, block);
        pos += n;
    }

    if pos < frames {
        let tail: Vec<&[f64]> = input.iter().map(|c| &c[pos..]).collect();
        let block = resampler
            .process_partial(Some(tail.as_slice()), None)
            .map_err(|e| resampler_error(operation, e))?;
        append_block(&mut output, block);
    }

    // Flush the filter until the delayed signal is fully out.
    while output.first().map_or(0, Vec::len) < wanted {
        let block = resampler
            .process_partial(None::<&[Vec<f64>]>, None)
            .map_err(|e| resampler_error(operation, e))?;
        if block.first().is_none_or(Vec::is_empty) {
            break;
        }
        append_block(&mut output, block);
    }

    Ok(output
        .into_iter()
        .map(|mut channel| {
            channel.resize(wanted, 0.0);
            channel.split_off(delay)
        })
        .collect())
}

fn append_block(output: &mut [Vec<f64>], block: Vec<Vec<f64>>) {
    for (channel, samples) in output.iter_mut().zip(block) {
        channel.extend_from_slice(&samples);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::comparison::allclose;
    use crate::utils::generation::{sine_wave, stereo_sine_wave};
    use std::time::Duration;

    #[test]
    fn test_same_rate_is_identity() {
        let audio = sine_wave(440.0, Duration::from_millis(100), 44100.0, 0.5).unwrap();
        let out = resample(&audio, 44100.0, ResamplingQuality::High).unwrap();
        assert_eq!(out, audio);
    }

    #[test]
    fn test_output_length_and_rate() {
        let audio = sine_wave(440.0, Duration::from_secs(1), 44100.0, 0.5).unwrap();
        let down = resample(&audio, 22050.0, ResamplingQuality::Medium).unwrap();
        assert_eq!(down.sample_rate(), 22050.0);
        assert_eq!(down.num_frames(), 22050);

        let up = resample(&audio, 48000.0, ResamplingQuality::Fast).unwrap();
        assert_eq!(up.num_frames(), 48000);
    }

    #[test]
    fn test_preserves_channel_count() {
        let stereo = stereo_sine_wave(300.0, Duration::from_millis(200), 44100.0, 0.5).unwrap();
        let out = resample(&stereo, 16000.0, ResamplingQuality::Fast).unwrap();
        assert_eq!(out.num_channels(), 2);
        assert_eq!(out.num_frames(), 3200);
    }

    fn argmax(values: &[f64]) -> usize {
        values
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
            .0
    }

    fn impulse(len: usize, at: usize, sample_rate: f64) -> SampleBuffer {
        let mut samples = vec![0.0; len];
        samples[at] = 1.0;
        SampleBuffer::from_channels(vec![samples], sample_rate).unwrap()
    }

    #[test]
    fn test_impulse_stays_in_place() {
        let down = resample(&impulse(44100, 20000, 44100.0), 22050.0, ResamplingQuality::High).unwrap();
        assert_eq!(argmax(&down.samples().row(0).to_vec()), 10000);

        let up = resample(&impulse(22050, 10000, 22050.0), 44100.0, ResamplingQuality::Fast).unwrap();
        assert_eq!(argmax(&up.samples().row(0).to_vec()), 20000);

        let odd = resample(&impulse(48000, 24000, 48000.0), 22050.0, ResamplingQuality::Medium).unwrap();
        assert_eq!(argmax(&odd.samples().row(0).to_vec()), 11025);
    }

    #[test]
    fn test_fractional_rate_stays_within_a_frame() {
        let out = resample(&impulse(44100, 20000, 44100.0), 22050.5, ResamplingQuality::High).unwrap();
        assert_eq!(out.num_frames(), 22051);
        let peak = argmax(&out.samples().row(0).to_vec()) as i64;
        assert!((peak - 10000).abs() <= 1, "peak at {peak}");
    }

    #[test]
    fn test_round_trip_preserves_band_limited_signal() {
        let audio = sine_wave(440.0, Duration::from_secs(1), 44100.0, 0.5).unwrap();
        let down = resample(&audio, 22050.0, ResamplingQuality::High).unwrap();
        let back = resample(&down, 44100.0, ResamplingQuality::High).unwrap();
        assert_eq!(back.num_frames(), audio.num_frames());

        // Edges see the filter's start-up transient, compare the interior.
        let margin = 4096;
        let original = audio.samples();
        let restored = back.samples();
        let a: Vec<f64> = original.row(0).iter().skip(margin).take(44100 - 2 * margin).copied().collect();
        let b: Vec<f64> = restored.row(0).iter().skip(margin).take(44100 - 2 * margin).copied().collect();
        assert!(allclose(&b, &a, 1e-3, 1e-4));
    }

    #[test]
    fn test_rejects_invalid_target_rate() {
        let audio = sine_wave(440.0, Duration::from_millis(10), 44100.0, 0.5).unwrap();
        assert!(matches!(
            resample(&audio, 0.0, ResamplingQuality::Fast),
            Err(AmenError::InvalidInput(_))
        ));
        assert!(resample(&audio, f64::NAN, ResamplingQuality::Fast).is_err());
    }
}
