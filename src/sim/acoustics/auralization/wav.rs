use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Sample format of written files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitDepth {
    #[default]
    Int16,
    Int24,
    Float32,
}

impl BitDepth {
    fn spec(self, channels: u16, sample_rate: u32) -> hound::WavSpec {
        let (bits_per_sample, sample_format) = match self {
            BitDepth::Int16 => (16, hound::SampleFormat::Int),
            BitDepth::Int24 => (24, hound::SampleFormat::Int),
            BitDepth::Float32 => (32, hound::SampleFormat::Float),
        };
        hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample,
            sample_format,
        }
    }
}

/// Writes equal-length channels as one interleaved WAV file.
///
/// Samples are clamped to [-1, 1] before quantization.
pub fn write_wav<P: AsRef<Path>>(path: P, channels: &[Vec<f64>], sample_rate: u32, bit_depth: BitDepth) -> Result<()> {
    if channels.is_empty() {
        bail!("No channels to write");
    }
    let frames = channels[0].len();
    if channels.iter().any(|c| c.len() != frames) {
        bail!("Channels differ in length");
    }
    let spec = bit_depth.spec(channels.len() as u16, sample_rate);
    let mut writer = hound::WavWriter::create(path.as_ref(), spec).context("Failed to create WAV file")?;

    for frame in 0..frames {
        for channel in channels {
            let s = channel[frame].clamp(-1.0, 1.0);
            match bit_depth {
                BitDepth::Int16 => writer.write_sample((s * i16::MAX as f64) as i16),
                BitDepth::Int24 => writer.write_sample((s * 8_388_607.0) as i32),
                BitDepth::Float32 => writer.write_sample(s as f32),
            }
            .context("Failed to write sample")?;
        }
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

/// Reads a WAV file into per-channel samples in [-1, 1] and its sample rate.
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<(Vec<Vec<f64>>, u32)> {
    let reader = hound::WavReader::open(path.as_ref()).context("Failed to open WAV file for reading")?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f64> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = ((1i64 << (spec.bits_per_sample - 1)) - 1) as f64;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f64 / max_val))
                .collect::<Result<Vec<f64>, _>>()
                .context("Failed to read integer samples")?
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(|v| v as f64))
            .collect::<Result<Vec<f64>, _>>()
            .context("Failed to read float samples")?,
    };

    let mut out = vec![Vec::with_capacity(interleaved.len() / channels); channels];
    for frame in interleaved.chunks(channels) {
        for (channel, &s) in out.iter_mut().zip(frame) {
            channel.push(s);
        }
    }
    Ok((out, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_stereo_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("ir.wav");
        let left = vec![0.0, 0.5, -0.5, 1.0];
        let right = vec![0.25, -1.0, 0.0, 0.125];
        write_wav(&path, &[left.clone(), right.clone()], 44100, BitDepth::Int16)?;

        let (channels, sr) = read_wav(&path)?;
        assert_eq!(sr, 44100);
        assert_eq!(channels.len(), 2);
        // 16-bit quantization error is about 3e-5
        for (original, read_back) in [left, right].iter().zip(&channels) {
            assert_eq!(original.len(), read_back.len());
            for (a, b) in original.iter().zip(read_back) {
                assert!((a - b).abs() < 1e-4, "original={a}, read_back={b}");
            }
        }
        Ok(())
    }

    #[test]
    fn test_wav_bit_depths() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let samples = vec![vec![0.3, -0.7, 2.0]];
        for (depth, tol) in [(BitDepth::Int24, 1e-6), (BitDepth::Float32, 1e-7)] {
            let path = dir.path().join(format!("{depth:?}.wav"));
            write_wav(&path, &samples, 8000, depth)?;
            let (channels, sr) = read_wav(&path)?;
            assert_eq!(sr, 8000);
            assert!((channels[0][0] - 0.3).abs() < tol);
            assert!((channels[0][1] + 0.7).abs() < tol);
            // Clamped
            assert!((channels[0][2] - 1.0).abs() < tol);
        }
        Ok(())
    }

    #[test]
    fn test_wav_rejects_ragged_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.wav");
        assert!(write_wav(&path, &[vec![0.0; 3], vec![0.0; 2]], 44100, BitDepth::Int16).is_err());
        assert!(write_wav(&path, &[], 44100, BitDepth::Int16).is_err());
    }
}
