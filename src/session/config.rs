use serde::{Deserialize, Serialize};

use crate::audio::TranscoderConfig;
use crate::recognition::RecognitionConfig;

/// Configuration for one live transcription session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (UUID v4 unless supplied)
    pub session_id: String,

    /// Run inbound bytes through the transcoder. When false, inbound
    /// frames are already PCM and go straight onto the relay queue.
    pub transcode: bool,

    pub transcoder: TranscoderConfig,

    pub recognition: RecognitionConfig,

    /// Capacity of the bridge -> coordinator result channel
    pub result_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            transcode: true,
            transcoder: TranscoderConfig::default(),
            recognition: RecognitionConfig::default(),
            result_buffer: 64,
        }
    }
}

impl SessionConfig {
    /// Recognition settings matching the audio that reaches the recognizer.
    ///
    /// On the transcoding path the PCM sample rate is whatever the
    /// transcoder produces.
    pub fn effective_recognition(&self) -> RecognitionConfig {
        let mut recognition = self.recognition.clone();
        if self.transcode {
            recognition.sample_rate_hertz = self.transcoder.sample_rate;
        }
        recognition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcoding_path_uses_transcoder_rate() {
        let config = SessionConfig {
            transcoder: TranscoderConfig {
                sample_rate: 16000,
                ..Default::default()
            },
            recognition: RecognitionConfig {
                sample_rate_hertz: 8000,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(config.effective_recognition().sample_rate_hertz, 16000);

        let direct = SessionConfig {
            transcode: false,
            ..config
        };
        assert_eq!(direct.effective_recognition().sample_rate_hertz, 8000);
    }

    #[test]
    fn test_default_ids_are_unique() {
        assert_ne!(
            SessionConfig::default().session_id,
            SessionConfig::default().session_id
        );
    }
}
