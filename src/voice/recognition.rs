//! Speech-to-text boundary: recognition error categories and the cloud
//! Whisper-style transcriber behind them.

use std::future::Future;
use std::pin::Pin;

use reqwest::multipart;
use tracing::debug;

/// Why a recognition attempt produced no usable transcript.
///
/// Each category maps to fixed user-facing wording; callers emit the
/// message and drop the attempt without touching the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    /// The listening window elapsed without detectable speech.
    NoSpeech,
    /// The microphone could not be opened or the stream died.
    AudioCapture(String),
    /// Microphone permission was denied.
    NotAllowed(String),
    /// The transcription request failed in transit.
    Network(String),
    /// The transcription service answered with a non-success status.
    Api { status: u16, message: String },
}

impl RecognitionError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NoSpeech => "No speech was detected. Please try again.",
            Self::AudioCapture(_) => "Audio capture failed. Check microphone connection.",
            Self::NotAllowed(_) => "Microphone access denied. Please allow it in system settings.",
            Self::Network(_) | Self::Api { .. } => {
                "A network error occurred with speech recognition. Check connection."
            }
        }
    }
}

impl std::fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSpeech => write!(f, "no speech detected"),
            Self::AudioCapture(msg) => write!(f, "audio capture failed: {}", msg),
            Self::NotAllowed(msg) => write!(f, "microphone access denied: {}", msg),
            Self::Network(msg) => write!(f, "recognition network error: {}", msg),
            Self::Api { status, message } => {
                write!(f, "recognition API error {}: {}", status, message)
            }
        }
    }
}

impl std::error::Error for RecognitionError {}

/// Encode f32 audio samples as 16-bit PCM WAV bytes.
///
/// Assumes mono input at the given rate.
pub(crate) fn encode_wav(audio: &[f32], sample_rate: u32) -> Vec<u8> {
    let num_samples = audio.len() as u32;
    let bytes_per_sample: u16 = 2; // 16-bit
    let num_channels: u16 = 1;
    let data_size = num_samples * bytes_per_sample as u32;
    let file_size = 36 + data_size; // RIFF header is 44 bytes total, minus 8 for RIFF+size

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt sub-chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // sub-chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    buf.extend_from_slice(&num_channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    let byte_rate = sample_rate * num_channels as u32 * bytes_per_sample as u32;
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    let block_align = num_channels * bytes_per_sample;
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&(bytes_per_sample * 8).to_le_bytes()); // bits per sample

    // data sub-chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in audio {
        let clamped = sample.clamp(-1.0, 1.0);
        let pcm = (clamped * 32767.0) as i16;
        buf.extend_from_slice(&pcm.to_le_bytes());
    }

    buf
}

/// Boxed future alias for the dyn-compatible trait below.
pub type TranscribeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, RecognitionError>> + Send + 'a>>;

/// Transcription seam (dyn-compatible). Tests substitute a canned
/// implementation; production uses [`WhisperApiTranscriber`].
pub trait Transcriber: Send + Sync {
    /// Transcribe 16 kHz mono f32 audio to text.
    fn transcribe(&self, audio: &[f32]) -> TranscribeFuture<'_>;
}

/// OpenAI Whisper API transcriber.
pub struct WhisperApiTranscriber {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl WhisperApiTranscriber {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            endpoint: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            client: reqwest::Client::new(),
        }
    }
}

impl Transcriber for WhisperApiTranscriber {
    fn transcribe(&self, audio: &[f32]) -> TranscribeFuture<'_> {
        let wav = encode_wav(audio, 16_000);
        Box::pin(async move {
            debug!(bytes = wav.len(), "Sending audio to Whisper API");

            let file_part = multipart::Part::bytes(wav)
                .file_name("audio.wav")
                .mime_str("audio/wav")
                .map_err(|e| RecognitionError::Network(e.to_string()))?;

            let form = multipart::Form::new()
                .text("model", "whisper-1")
                .part("file", file_part);

            let resp = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .multipart(form)
                .send()
                .await
                .map_err(|e| RecognitionError::Network(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(RecognitionError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let json: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| RecognitionError::Network(e.to_string()))?;
            let text = json["text"].as_str().unwrap_or("").to_string();

            Ok(text)
        })
    }
}
