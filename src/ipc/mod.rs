//! IPC protocol types for communication with the UI shell.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (core -> UI).
//! Commands use `{"command": "<name>", ...}` format (UI -> core).

pub mod bridge;

use serde::{Deserialize, Serialize};

use crate::config::{AppSettings, AudioSettings, NotificationSettings, ProfileSettings};
use crate::session::profile::UserProfile;
use crate::session::transcript::ChatMessage;
use crate::voice::tts::VoiceGender;

// ---------------------------------------------------------------------------
// Events: core -> UI (stdout)
// ---------------------------------------------------------------------------

/// All events emitted to the UI via stdout as JSON lines.
///
/// Serialized as `{"event": "<variant>", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    Starting {},
    Ready {},
    /// Personalization finished; the session opens with this AI message.
    SessionStarted {
        message: ChatMessage,
        #[serde(rename = "empathyLevel")]
        empathy_level: i64,
        #[serde(rename = "identifiedNeeds")]
        identified_needs: Vec<String>,
    },
    /// Personalization failed; the session stays in intake.
    PersonalizationFailed { message: String },
    /// A user message was appended to the transcript (optimistic).
    UserMessage { message: ChatMessage },
    /// A turn is being processed by the AI.
    ThinkingStart {},
    ThinkingEnd {},
    /// An AI message was appended to the transcript.
    AiMessage {
        message: ChatMessage,
        #[serde(rename = "empathyLevel")]
        empathy_level: i64,
    },
    /// Speech playback started. `audio` is a data:audio/mpeg URI.
    SpeakingStart { text: String, audio: String },
    SpeakingEnd {},
    RelaxationStart {},
    RelaxationStop {},
    ListeningStart {},
    ListeningStop {},
    /// Microphone energy level while listening (drives the visualizer).
    InputLevel { level: f32 },
    /// Final transcript of a listening session, already fed into the chat.
    Transcription { text: String },
    /// Current settings snapshot (on request and after each change).
    Settings { settings: AppSettings },
    /// Session state snapshot, on request.
    SessionInfo {
        stage: String,
        #[serde(rename = "empathyLevel")]
        empathy_level: i64,
        #[serde(rename = "identifiedNeeds")]
        identified_needs: Vec<String>,
        #[serde(rename = "lastDetectedSentiment")]
        last_detected_sentiment: Option<String>,
        #[serde(rename = "messageCount")]
        message_count: usize,
    },
    Error { message: String },
    Pong {},
    Stopping {},
}

// ---------------------------------------------------------------------------
// Commands: UI -> core (stdin)
// ---------------------------------------------------------------------------

/// All commands received from the UI via stdin as JSON lines.
///
/// Deserialized from `{"command": "<variant>", ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum SessionCommand {
    /// Submit the intake profile and start the session.
    SubmitProfile { profile: UserProfile },
    /// Send one user chat message.
    SendMessage { text: String },
    /// Speak arbitrary text (replay of an AI message).
    PlaySpeech { text: String },
    StopSpeech {},
    ToggleRelaxation {},
    StopRelaxation {},
    StartListening {},
    StopListening {},
    SetVoice { voice: VoiceGender },
    /// Volume percentage, 0-100.
    SetVolume { volume: u8 },
    /// Playback rate, 0.5-2.0.
    SetSpeed { speed: f32 },
    GetSettings {},
    GetSessionInfo {},
    SetProfileSettings { settings: ProfileSettings },
    SetNotificationSettings { settings: NotificationSettings },
    SetAudioSettings { settings: AudioSettings },
    Ping {},
    Stop {},
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = SessionEvent::SpeakingStart {
            text: "Hello".into(),
            audio: "data:audio/mpeg;base64,AAAA".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "speaking_start");
        assert_eq!(json["data"]["text"], "Hello");
    }

    #[test]
    fn test_unit_event_wire_format() {
        let json = serde_json::to_value(SessionEvent::SpeakingEnd {}).unwrap();
        assert_eq!(json["event"], "speaking_end");
    }

    #[test]
    fn test_command_parses_from_tagged_json() {
        let cmd: SessionCommand =
            serde_json::from_str(r#"{"command": "send_message", "text": "hi"}"#).unwrap();
        assert!(matches!(cmd, SessionCommand::SendMessage { text } if text == "hi"));

        let cmd: SessionCommand =
            serde_json::from_str(r#"{"command": "set_volume", "volume": 70}"#).unwrap();
        assert!(matches!(cmd, SessionCommand::SetVolume { volume: 70 }));
    }

    #[test]
    fn test_submit_profile_command_parses() {
        let cmd: SessionCommand = serde_json::from_str(
            r#"{
                "command": "submit_profile",
                "profile": {
                    "age": 28,
                    "genderIdentity": "Non-Binary",
                    "ethnicity": "Mixed",
                    "vulnerableScore": 6,
                    "anxietyLevel": "High",
                    "breakupType": "Ghosted",
                    "background": "It ended suddenly."
                }
            }"#,
        )
        .unwrap();
        match cmd {
            SessionCommand::SubmitProfile { profile } => assert_eq!(profile.age, 28),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let res = serde_json::from_str::<SessionCommand>(r#"{"command": "warp_drive"}"#);
        assert!(res.is_err());
    }
}
