//! WAV header inspection, WAV writing and sample-rate conversion.

use std::io::{BufWriter, Cursor};

use rubato::{FftFixedIn, Resampler};
use tempfile::TempPath;
use tracing::warn;

/// Below this many frames the FFT resampler is skipped in favour of linear interpolation.
const MIN_FFT_FRAMES: usize = 64;
const FFT_CHUNK_FRAMES: usize = 1024;

/// Header facts of a WAV file, read without decoding the samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub frames: u32,
}

impl WavInfo {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }
}

/// Parse the header of an in-memory WAV file.
pub fn read_wav_info(bytes: &[u8]) -> Result<WavInfo, hound::Error> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    Ok(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        frames: reader.duration(),
    })
}

fn mono_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Write mono samples to a fresh uniquely-named temporary WAV file.
///
/// The file is deleted when the returned [`TempPath`] is dropped.
pub fn write_temp_wav(
    prefix: &str,
    samples: &[f32],
    sample_rate: u32,
) -> Result<TempPath, hound::Error> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".wav")
        .tempfile()?;
    {
        let mut writer =
            hound::WavWriter::new(BufWriter::new(file.as_file_mut()), mono_spec(sample_rate))?;
        for &sample in samples {
            writer.write_sample(to_i16(sample))?;
        }
        writer.finalize()?;
    }
    Ok(file.into_temp_path())
}

/// Interpret raw bytes as 16-bit little-endian mono PCM.
///
/// Returns `None` when the byte count is odd.
pub fn pcm16le_to_f32(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
            .collect(),
    )
}

/// Number of output frames for `frames` input frames converted between rates.
pub fn resampled_len(frames: usize, from_rate: u32, to_rate: u32) -> usize {
    (frames as u64 * to_rate as u64).div_ceil(from_rate.max(1) as u64) as usize
}

/// Convert mono samples between sample rates.
///
/// Uses the FFT resampler, falling back to linear interpolation for very
/// short buffers or if the resampler rejects the rate pair.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    if samples.len() < MIN_FFT_FRAMES {
        return resample_linear(samples, from_rate, to_rate);
    }

    match resample_fft(samples, from_rate, to_rate) {
        Ok(out) => out,
        Err(e) => {
            warn!(%e, from_rate, to_rate, "FFT resampling failed, using linear fallback");
            resample_linear(samples, from_rate, to_rate)
        }
    }
}

fn resample_fft(samples: &[f32], from_rate: u32, to_rate: u32) -> anyhow::Result<Vec<f32>> {
    let mut resampler =
        FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, FFT_CHUNK_FRAMES, 2, 1)?;

    let expected = resampled_len(samples.len(), from_rate, to_rate);
    let delay = resampler.output_delay();
    let mut out: Vec<f32> = Vec::with_capacity(expected + delay);

    let mut pos = 0;
    while samples.len() - pos >= resampler.input_frames_next() {
        let needed = resampler.input_frames_next();
        let input: [&[f32]; 1] = [&samples[pos..pos + needed]];
        let frames = resampler.process(&input[..], None)?;
        out.extend_from_slice(&frames[0]);
        pos += needed;
    }

    if pos < samples.len() {
        let input: [&[f32]; 1] = [&samples[pos..]];
        let frames = resampler.process_partial(Some(&input[..]), None)?;
        out.extend_from_slice(&frames[0]);
    }

    // Flush the filter tail so the delayed output is complete.
    while out.len() < expected + delay {
        let frames = resampler.process_partial::<&[f32]>(None, None)?;
        if frames[0].is_empty() {
            break;
        }
        out.extend_from_slice(&frames[0]);
    }

    let mut out = out.split_off(delay.min(out.len()));
    out.resize(expected, 0.0);
    Ok(out)
}

fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = resampled_len(samples.len(), from_rate, to_rate);
    let last = samples.len().saturating_sub(1);

    (0..new_len)
        .map(|i| {
            let src = i as f64 / ratio;
            let floor = (src.floor() as usize).min(last);
            let ceil = (floor + 1).min(last);
            let frac = (src - floor as f64) as f32;
            samples[floor] * (1.0 - frac) + samples[ceil] * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(frames: usize, sample_rate: u32) -> Vec<f32> {
        (0..frames)
            .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_temp_wav_header() {
        let samples = tone(16_000, 16_000);
        let path = write_temp_wav("vozqa-test-", &samples, 16_000).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        let info = read_wav_info(&bytes).unwrap();
        assert_eq!(info.sample_rate, 16_000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.frames, 16_000);
        assert!((info.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_wav_info_rejects_garbage() {
        assert!(read_wav_info(b"definitely not a wav file").is_err());
    }

    #[test]
    fn test_wav_info_counts_frames_not_samples() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..800 {
            writer.write_sample(100i16).unwrap();
            writer.write_sample(-100i16).unwrap();
        }
        writer.finalize().unwrap();

        let info = read_wav_info(cursor.get_ref()).unwrap();
        assert_eq!(info.channels, 2);
        assert_eq!(info.frames, 800);
        assert!((info.duration_secs() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_pcm16le_conversion() {
        let bytes = [0x00, 0x00, 0xff, 0x7f, 0x00, 0x80];
        let samples = pcm16le_to_f32(&bytes).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0], 0.0);
        assert!(samples[1] > 0.99);
        assert_eq!(samples[2], -1.0);
        assert!(pcm16le_to_f32(&[0x00, 0x01, 0x02]).is_none());
    }

    #[test]
    fn test_resample_to_48k_length() {
        let input = tone(24_000, 24_000);
        let out = resample(&input, 24_000, 48_000);
        assert_eq!(out.len(), 48_000);
        assert!(out.iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn test_resample_uneven_ratio_length() {
        let input = tone(5_000, 22_050);
        let out = resample(&input, 22_050, 48_000);
        assert_eq!(out.len(), resampled_len(5_000, 22_050, 48_000));
    }

    #[test]
    fn test_resample_short_buffer_uses_linear() {
        let input = vec![0.0, 1.0, 0.0, -1.0];
        let out = resample(&input, 16_000, 48_000);
        assert_eq!(out.len(), 12);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[3], 1.0);
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let input = tone(100, 48_000);
        assert_eq!(resample(&input, 48_000, 48_000), input);
    }

    #[test]
    fn test_temp_wav_unique_and_removed_on_drop() {
        let samples = tone(480, 48_000);
        let a = write_temp_wav("vozqa-test-", &samples, 48_000).unwrap();
        let b = write_temp_wav("vozqa-test-", &samples, 48_000).unwrap();
        assert_ne!(a.to_path_buf(), b.to_path_buf());

        let bytes = std::fs::read(&a).unwrap();
        let info = read_wav_info(&bytes).unwrap();
        assert_eq!(info.sample_rate, 48_000);
        assert_eq!(info.frames, 480);

        let path = a.to_path_buf();
        drop(a);
        assert!(!path.exists());
    }
}
