//! Speech-synthesis collaborator: ElevenLabs-style REST TTS.
//!
//! Sends text plus a voice selection, receives mp3 bytes, and decodes them
//! to f32 PCM for rodio playback. A missing API key is a fatal configuration
//! error for this collaborator only; the rest of the session runs silently.

use std::future::Future;
use std::pin::Pin;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::mp3::decode_mp3_to_f32;

const API_BASE: &str = "https://api.elevenlabs.io/v1/text-to-speech";
const DEFAULT_FEMALE_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM"; // Rachel
const DEFAULT_MALE_VOICE_ID: &str = "pNInz6obpgDQGcFmaJgB"; // Adam

/// Voice selection exposed in the audio settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceGender {
    Male,
    Female,
}

impl Default for VoiceGender {
    fn default() -> Self {
        Self::Female
    }
}

impl std::fmt::Display for VoiceGender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Male => write!(f, "male"),
            Self::Female => write!(f, "female"),
        }
    }
}

/// One synthesized speech payload: decoded PCM for playback plus the raw
/// mp3 bytes for the frontend-facing data URI.
pub struct SpeechAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    mp3: Vec<u8>,
}

impl SpeechAudio {
    /// The payload as a self-contained `data:audio/mpeg` URI.
    pub fn data_uri(&self) -> String {
        let b64 = base64::engine::general_purpose::STANDARD.encode(&self.mp3);
        format!("data:audio/mpeg;base64,{}", b64)
    }
}

/// Errors from the speech-synthesis boundary.
#[derive(Debug)]
pub enum TtsError {
    /// No API key configured. Fatal for this collaborator at startup.
    MissingCredential,
    /// Credential rejected by the service (401/403).
    Unauthorized(String),
    /// Any other non-success response.
    Api { status: u16, message: String },
    /// Transport-level failure.
    Network(String),
    /// Audio arrived but could not be decoded.
    Decode(String),
}

impl TtsError {
    /// User-facing wording. The authorization case names the credential
    /// explicitly so it is distinguishable from a generic failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingCredential => {
                "Speech synthesis is not configured: the ELEVENLABS_API_KEY credential is missing."
                    .into()
            }
            Self::Unauthorized(_) => {
                "Speech synthesis authorization failed (invalid or expired API key). \
                 Please check the ELEVENLABS_API_KEY credential."
                    .into()
            }
            Self::Api { .. } | Self::Network(_) | Self::Decode(_) => {
                "Could not generate audio for the AI response.".into()
            }
        }
    }
}

impl std::fmt::Display for TtsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCredential => write!(f, "TTS API key is not set"),
            Self::Unauthorized(msg) => write!(f, "TTS authorization error (401): {}", msg),
            Self::Api { status, message } => write!(f, "TTS API error {}: {}", status, message),
            Self::Network(msg) => write!(f, "TTS network error: {}", msg),
            Self::Decode(msg) => write!(f, "TTS audio decode error: {}", msg),
        }
    }
}

impl std::error::Error for TtsError {}

/// Classify a non-success synthesis response by status code.
fn classify_status(status: u16, body: String) -> TtsError {
    match status {
        401 | 403 => TtsError::Unauthorized(body),
        _ => TtsError::Api {
            status,
            message: body,
        },
    }
}

/// Boxed future alias for the dyn-compatible trait below.
pub type SynthFuture<'a> = Pin<Box<dyn Future<Output = Result<SpeechAudio, TtsError>> + Send + 'a>>;

/// Speech-synthesis seam (dyn-compatible). Tests substitute a canned
/// implementation; production uses [`ElevenLabsSynth`].
pub trait SpeechSynth: Send + Sync {
    fn synthesize(&self, text: &str, voice: VoiceGender) -> SynthFuture<'_>;

    /// Display name for logs.
    fn name(&self) -> String;
}

/// ElevenLabs REST synthesis.
pub struct ElevenLabsSynth {
    api_key: String,
    female_voice_id: String,
    male_voice_id: String,
    client: reqwest::Client,
}

impl ElevenLabsSynth {
    /// Build the collaborator. `None` or an empty key is a fatal
    /// configuration error for this collaborator.
    pub fn new(api_key: Option<String>) -> Result<Self, TtsError> {
        let api_key = match api_key {
            Some(k) if !k.trim().is_empty() => k,
            _ => return Err(TtsError::MissingCredential),
        };
        Ok(Self {
            api_key,
            female_voice_id: std::env::var("ELEVENLABS_FEMALE_VOICE_ID")
                .unwrap_or_else(|_| DEFAULT_FEMALE_VOICE_ID.to_string()),
            male_voice_id: std::env::var("ELEVENLABS_MALE_VOICE_ID")
                .unwrap_or_else(|_| DEFAULT_MALE_VOICE_ID.to_string()),
            client: reqwest::Client::new(),
        })
    }

    fn voice_id(&self, voice: VoiceGender) -> &str {
        match voice {
            VoiceGender::Female => &self.female_voice_id,
            VoiceGender::Male => &self.male_voice_id,
        }
    }
}

impl SpeechSynth for ElevenLabsSynth {
    fn synthesize(&self, text: &str, voice: VoiceGender) -> SynthFuture<'_> {
        let text = text.to_string();
        Box::pin(async move {
            info!(voice = %voice, text_len = text.len(), "ElevenLabs TTS request");

            let url = format!("{}/{}", API_BASE, self.voice_id(voice));
            let body = serde_json::json!({
                "text": text,
                "model_id": "eleven_turbo_v2",
                "voice_settings": {
                    "stability": 0.5,
                    "similarity_boost": 0.75,
                    "style": 0.0,
                    "use_speaker_boost": true,
                },
                "output_format": "mp3_44100_128",
            });

            let resp = self
                .client
                .post(&url)
                .header("xi-api-key", &self.api_key)
                .header("Accept", "audio/mpeg")
                .json(&body)
                .send()
                .await
                .map_err(|e| TtsError::Network(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(classify_status(status.as_u16(), body));
            }

            let mp3 = resp
                .bytes()
                .await
                .map_err(|e| TtsError::Network(e.to_string()))?
                .to_vec();

            let (samples, sample_rate) = decode_mp3_to_f32(&mp3).map_err(TtsError::Decode)?;
            info!(samples = samples.len(), sample_rate, "TTS synthesis complete");

            Ok(SpeechAudio {
                samples,
                sample_rate,
                mp3,
            })
        })
    }

    fn name(&self) -> String {
        "ElevenLabs".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_fatal() {
        assert!(matches!(
            ElevenLabsSynth::new(None),
            Err(TtsError::MissingCredential)
        ));
        assert!(matches!(
            ElevenLabsSynth::new(Some("  ".into())),
            Err(TtsError::MissingCredential)
        ));
    }

    #[test]
    fn test_unauthorized_status_names_credential() {
        let err = classify_status(401, "bad key".into());
        assert!(matches!(err, TtsError::Unauthorized(_)));
        let msg = err.user_message();
        assert!(msg.contains("authorization"));
        assert!(msg.contains("ELEVENLABS_API_KEY"));
        // Distinct from generic failure wording.
        let generic = classify_status(500, "boom".into()).user_message();
        assert_ne!(msg, generic);
    }

    #[test]
    fn test_voice_id_mapping() {
        let synth = ElevenLabsSynth::new(Some("key".into())).unwrap();
        assert_ne!(
            synth.voice_id(VoiceGender::Female),
            synth.voice_id(VoiceGender::Male)
        );
    }

    #[test]
    fn test_data_uri_prefix() {
        let audio = SpeechAudio {
            samples: vec![0.0],
            sample_rate: 44_100,
            mp3: vec![0xff, 0xfb, 0x90, 0x00],
        };
        assert!(audio.data_uri().starts_with("data:audio/mpeg;base64,"));
    }
}
