//! Reading and writing audio files.
//!
//! WAV files are decoded with `hound`; every other container is probed and
//! decoded with `symphonia`. Output is always WAV, written with `hound`.
//!
//! ```rust,no_run
//! use amen::io::{self, OutputFormat};
//!
//! let buffer = io::load("drums.flac", Some(22050.0), true)?;
//! io::write("drums.wav", &buffer, OutputFormat::Wav)?;
//! # Ok::<(), amen::AmenError>(())
//! ```

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use symphonia::core::audio::SampleBuffer as DecodeBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, instrument};

use crate::{AmenError, AmenResult, SampleBuffer};

/// Options controlling how a file is turned into a [`SampleBuffer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Resample to this rate after decoding. `None` keeps the native rate.
    pub sample_rate: Option<f64>,
    /// Average all channels into one before resampling.
    pub convert_to_mono: bool,
}

/// Loads an audio file fully into memory.
///
/// # Errors
/// - [`AmenError::FileNotFound`] if `path` does not exist
/// - [`AmenError::UnsupportedFormat`] if the container or codec cannot be decoded
/// - [`AmenError::InvalidInput`] if the stream holds no audio frames or
///   `target_sample_rate` is invalid
pub fn load<P: AsRef<Path>>(
    path: P,
    target_sample_rate: Option<f64>,
    convert_to_mono: bool,
) -> AmenResult<SampleBuffer> {
    load_with(
        path,
        &LoadOptions {
            sample_rate: target_sample_rate,
            convert_to_mono,
        },
    )
}

/// Loads an audio file using [`LoadOptions`].
///
/// # Errors
/// See [`load`].
pub fn load_with<P: AsRef<Path>>(path: P, options: &LoadOptions) -> AmenResult<SampleBuffer> {
    load_path(path.as_ref(), options)
}

#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
fn load_path(path: &Path, options: &LoadOptions) -> AmenResult<SampleBuffer> {
    if !path.exists() {
        return Err(AmenError::FileNotFound(path.to_path_buf()));
    }

    let native = if is_wav(path)? {
        decode_wav(path)?
    } else {
        decode_with_symphonia(path)?
    };
    debug!(
        sample_rate = native.sample_rate(),
        channels = native.num_channels(),
        frames = native.num_frames(),
        "decoded audio file"
    );

    let buffer = if options.convert_to_mono {
        native.to_mono()
    } else {
        native
    };

    match options.sample_rate {
        Some(rate) if rate != buffer.sample_rate() => buffer.resample(rate),
        _ => Ok(buffer),
    }
}

fn open(path: &Path) -> AmenResult<File> {
    File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AmenError::FileNotFound(path.to_path_buf()),
        _ => AmenError::Io(e),
    })
}

fn is_wav(path: &Path) -> AmenResult<bool> {
    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav") || ext.eq_ignore_ascii_case("wave"));
    if by_extension {
        return Ok(true);
    }

    let mut header = [0u8; 12];
    let mut file = open(path)?;
    match file.read_exact(&mut header) {
        Ok(()) => Ok(&header[0..4] == b"RIFF" && &header[8..12] == b"WAVE"),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(AmenError::Io(e)),
    }
}

fn decode_wav(path: &Path) -> AmenResult<SampleBuffer> {
    let mut reader = WavReader::new(BufReader::new(open(path)?))?;
    let spec = reader.spec();

    // Normalize to f64 in [-1.0, 1.0)
    let interleaved: Vec<f64> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
            let scale = (1u64 << (bits - 1)) as f64;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| f64::from(v) / scale))
                .collect::<Result<_, _>>()?
        }
        (format, bits) => {
            return Err(AmenError::UnsupportedFormat(format!(
                "{format:?} {bits}-bit WAV"
            )));
        }
    };

    deinterleave(
        &interleaved,
        usize::from(spec.channels),
        f64::from(spec.sample_rate),
    )
}

fn decode_with_symphonia(path: &Path) -> AmenResult<SampleBuffer> {
    let mss = MediaSourceStream::new(Box::new(open(path)?), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| unsupported(path, e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| {
            AmenError::UnsupportedFormat(format!("{}: no decodable audio track", path.display()))
        })?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| unsupported(path, e))?;

    let mut interleaved: Vec<f64> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => match stream_error(path, e) {
                Some(err) => return Err(err),
                None => break,
            },
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = Some(spec.rate);
                channels = Some(spec.channels.count());

                let mut buf = DecodeBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                interleaved.extend(buf.samples().iter().map(|&s| f64::from(s)));
            }
            // Corrupt packets are skipped, the rest of the stream is still usable.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => match stream_error(path, e) {
                Some(err) => return Err(err),
                None => break,
            },
        }
    }

    let (Some(rate), Some(channels)) = (sample_rate, channels) else {
        return Err(AmenError::UnsupportedFormat(format!(
            "{}: stream does not declare a sample rate or channel layout",
            path.display()
        )));
    };
    deinterleave(&interleaved, channels, f64::from(rate))
}

fn unsupported(path: &Path, err: SymphoniaError) -> AmenError {
    AmenError::UnsupportedFormat(format!("{}: {err}", path.display()))
}

/// Maps a demuxer or decoder error to the load error, or `None` at end of stream.
fn stream_error(path: &Path, err: SymphoniaError) -> Option<AmenError> {
    match err {
        SymphoniaError::IoError(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => None,
        SymphoniaError::IoError(e) => Some(AmenError::Io(e)),
        e => Some(unsupported(path, e)),
    }
}

fn deinterleave(interleaved: &[f64], channels: usize, sample_rate: f64) -> AmenResult<SampleBuffer> {
    if channels == 0 {
        return Err(AmenError::invalid_input(
            "channels",
            "audio stream has no channels",
        ));
    }
    let frames = interleaved.len() / channels;
    let samples = Array2::from_shape_fn((channels, frames), |(c, f)| interleaved[f * channels + c]);
    SampleBuffer::new(samples, sample_rate)
}

/// WAV encodings supported by [`write`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputFormat {
    /// 32-bit IEEE float WAV.
    #[default]
    Wav,
    /// 16-bit integer PCM WAV.
    Pcm16Wav,
    /// 24-bit integer PCM WAV.
    Pcm24Wav,
}

impl OutputFormat {
    /// Canonical configuration string for this format.
    pub const fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Wav => "WAV",
            OutputFormat::Pcm16Wav => "PCM_16",
            OutputFormat::Pcm24Wav => "PCM_24",
        }
    }

    const fn spec(self, channels: u16, sample_rate: u32) -> WavSpec {
        let (bits_per_sample, sample_format) = match self {
            OutputFormat::Wav => (32, SampleFormat::Float),
            OutputFormat::Pcm16Wav => (16, SampleFormat::Int),
            OutputFormat::Pcm24Wav => (24, SampleFormat::Int),
        };
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample,
            sample_format,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = AmenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WAV" => Ok(OutputFormat::Wav),
            "WAV16" | "PCM_16" => Ok(OutputFormat::Pcm16Wav),
            "WAV24" | "PCM_24" => Ok(OutputFormat::Pcm24Wav),
            _ => Err(AmenError::UnsupportedFormat(format!(
                "unknown output format '{s}'"
            ))),
        }
    }
}

impl TryFrom<&str> for OutputFormat {
    type Error = AmenError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<String> for OutputFormat {
    type Error = AmenError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Writes `buffer` to `path` as a WAV file.
///
/// # Errors
/// - [`AmenError::InvalidInput`] if the sample rate is not a whole number of
///   Hz or the channel count does not fit a WAV header
/// - [`AmenError::Io`] if the file cannot be created or written
#[instrument(level = "debug", skip(path, buffer), fields(path = %path.as_ref().display()))]
pub fn write<P: AsRef<Path>>(
    path: P,
    buffer: &SampleBuffer,
    format: OutputFormat,
) -> AmenResult<()> {
    let rate = buffer.sample_rate();
    if rate.fract() != 0.0 || rate > f64::from(u32::MAX) {
        return Err(AmenError::invalid_input(
            "sample_rate",
            format!("WAV output requires an integral sample rate, got {rate}"),
        ));
    }
    let channels = u16::try_from(buffer.num_channels()).map_err(|_| {
        AmenError::invalid_input(
            "channels",
            format!("{} channels do not fit a WAV header", buffer.num_channels()),
        )
    })?;

    let spec = format.spec(channels, rate as u32);
    let mut writer = WavWriter::create(path.as_ref(), spec)?;
    let interleaved = buffer.to_interleaved_vec();
    match format {
        OutputFormat::Wav => {
            for &sample in &interleaved {
                writer.write_sample(sample as f32)?;
            }
        }
        OutputFormat::Pcm16Wav => {
            for &sample in &interleaved {
                writer.write_sample(quantize(sample, 16) as i16)?;
            }
        }
        OutputFormat::Pcm24Wav => {
            for &sample in &interleaved {
                writer.write_sample(quantize(sample, 24))?;
            }
        }
    }
    writer.finalize()?;

    debug!(
        frames = buffer.num_frames(),
        channels,
        sample_rate = rate,
        %format,
        "wrote audio file"
    );
    Ok(())
}

fn quantize(sample: f64, bits: u32) -> i32 {
    let scale = (1i64 << (bits - 1)) as f64;
    (sample * scale).round().clamp(-scale, scale - 1.0) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::comparison::allclose;
    use crate::utils::generation::{sine_wave, stereo_sine_wave};
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("WAV".parse::<OutputFormat>().unwrap(), OutputFormat::Wav);
        assert_eq!("wav".parse::<OutputFormat>().unwrap(), OutputFormat::Wav);
        assert_eq!("PCM_16".parse::<OutputFormat>().unwrap(), OutputFormat::Pcm16Wav);
        assert_eq!("wav24".parse::<OutputFormat>().unwrap(), OutputFormat::Pcm24Wav);
        assert!(matches!(
            "MP3".parse::<OutputFormat>(),
            Err(AmenError::UnsupportedFormat(_))
        ));
        assert_eq!(OutputFormat::Pcm24Wav.to_string(), "PCM_24");
    }

    #[test]
    fn test_float_wav_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let audio = stereo_sine_wave(440.0, Duration::from_millis(100), 44100.0, 0.5).unwrap();

        write(&path, &audio, OutputFormat::Wav).unwrap();
        let back = load(&path, None, false).unwrap();

        assert_eq!(back.sample_rate(), 44100.0);
        assert_eq!(back.num_channels(), 2);
        assert_eq!(back.num_frames(), audio.num_frames());
        let a: Vec<f64> = audio.samples().iter().copied().collect();
        let b: Vec<f64> = back.samples().iter().copied().collect();
        assert!(allclose(&b, &a, 1e-6, 1e-7));
    }

    #[test]
    fn test_pcm16_round_trip_within_quantization() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mono16.wav");
        let audio = sine_wave(1000.0, Duration::from_millis(50), 8000.0, 0.9).unwrap();

        write(&path, &audio, OutputFormat::Pcm16Wav).unwrap();
        let back = load(&path, None, false).unwrap();
        let a: Vec<f64> = audio.samples().iter().copied().collect();
        let b: Vec<f64> = back.samples().iter().copied().collect();
        assert!(allclose(&b, &a, 0.0, 1.0 / 32768.0));
    }

    #[test]
    fn test_load_downmixes_and_resamples() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let audio = stereo_sine_wave(440.0, Duration::from_secs(1), 44100.0, 0.5).unwrap();
        write(&path, &audio, OutputFormat::Pcm24Wav).unwrap();

        let analysed = load_with(
            &path,
            &LoadOptions {
                sample_rate: Some(22050.0),
                convert_to_mono: true,
            },
        )
        .unwrap();
        assert_eq!(analysed.num_channels(), 1);
        assert_eq!(analysed.sample_rate(), 22050.0);
        assert_eq!(analysed.num_frames(), 22050);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = load("/definitely/not/here.wav", None, false).unwrap_err();
        assert!(matches!(err, AmenError::FileNotFound(_)));
    }

    #[test]
    fn test_garbage_file_is_unsupported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"this is not audio at all").unwrap();
        assert!(matches!(
            load(&path, None, false),
            Err(AmenError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_fractional_rate_rejected_on_write() {
        let dir = tempdir().unwrap();
        let audio = sine_wave(440.0, Duration::from_millis(10), 22050.5, 0.5).unwrap();
        assert!(matches!(
            write(dir.path().join("x.wav"), &audio, OutputFormat::Wav),
            Err(AmenError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_stream_errors_stop_or_fail_the_load() {
        let path = Path::new("broken.ogg");
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "end of stream");
        assert!(stream_error(path, SymphoniaError::IoError(eof)).is_none());

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            stream_error(path, SymphoniaError::IoError(denied)),
            Some(AmenError::Io(_))
        ));
        assert!(matches!(
            stream_error(path, SymphoniaError::Unsupported("codec")),
            Some(AmenError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_quantize_clamps() {
        assert_eq!(quantize(1.0, 16), 32767);
        assert_eq!(quantize(-1.0, 16), -32768);
        assert_eq!(quantize(2.0, 24), (1 << 23) - 1);
        assert_eq!(quantize(0.0, 24), 0);
    }
}
