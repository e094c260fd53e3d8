use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use std::io::Cursor;
use tracing::info;

/// An uploaded WAV file decoded to interleaved 16-bit PCM.
pub struct AudioFile {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    /// Cheap check for a RIFF/WAVE header.
    pub fn is_wav(data: &[u8]) -> bool {
        data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE"
    }

    pub fn from_wav_bytes(data: &[u8]) -> Result<Self> {
        let reader = WavReader::new(Cursor::new(data)).context("Failed to parse WAV data")?;

        let spec = reader.spec();
        if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
            anyhow::bail!(
                "Expected 16-bit integer PCM, got {} bit {:?}",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "WAV upload decoded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Mono PCM as little-endian bytes (LINEAR16).
    ///
    /// Multi-channel input is downmixed by averaging each frame.
    pub fn to_mono_pcm_bytes(&self) -> Vec<u8> {
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            return self.samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        }

        self.samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .flat_map(|s| s.to_le_bytes())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(channels: u16, sample_rate: u32, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_detects_wav_header() {
        let data = wav_bytes(1, 16000, &[0, 1, 2]);
        assert!(AudioFile::is_wav(&data));
        assert!(!AudioFile::is_wav(b"OggS\0\0\0\0\0\0\0\0"));
        assert!(!AudioFile::is_wav(b"RIFF"));
    }

    #[test]
    fn test_mono_wav_passes_samples_through() {
        let data = wav_bytes(1, 16000, &[100, -200, 300]);
        let audio = AudioFile::from_wav_bytes(&data).unwrap();

        assert_eq!(audio.sample_rate, 16000);
        assert_eq!(audio.channels, 1);
        assert_eq!(
            audio.to_mono_pcm_bytes(),
            vec![100i16, -200, 300]
                .iter()
                .flat_map(|s| s.to_le_bytes())
                .collect::<Vec<u8>>()
        );
    }

    #[test]
    fn test_stereo_wav_is_downmixed() {
        let data = wav_bytes(2, 48000, &[100, 300, -100, -300]);
        let audio = AudioFile::from_wav_bytes(&data).unwrap();
        let pcm = audio.to_mono_pcm_bytes();

        let mono: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(mono, vec![200, -200]);
        assert!((audio.duration_seconds - 2.0 / 48000.0).abs() < 1e-9);
    }
}
