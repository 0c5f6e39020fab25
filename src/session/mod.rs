//! Session orchestration: conversation state and the sequencing of AI
//! collaborator calls.
//!
//! The orchestrator owns the transcript, the user profile, and the empathy
//! level. It processes inputs one at a time (turns are serial), emits
//! `SessionEvent`s toward the UI, and asks the voice coordinator to play
//! or stop audio. All reasoning happens in the AI collaborators; this
//! module only translates their results into state transitions.

pub mod profile;
pub mod transcript;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::ai::{
    AdaptedStyle, AiError, HistoryEntry, ReplyContext, TherapyModel, TherapyRecommendation,
};
use crate::ipc::SessionEvent;
use crate::voice::VoiceRequest;
use profile::UserProfile;
use transcript::{ChatMessage, Transcript};

/// How many prior transcript entries accompany each response-generation
/// call.
const HISTORY_WINDOW: usize = 4;

/// Inputs into the orchestrator task. Typed messages and finished voice
/// transcripts both arrive as `SendMessage`.
#[derive(Debug)]
pub enum SessionInput {
    SubmitProfile(UserProfile),
    SendMessage(String),
    RequestInfo,
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CollectingProfile,
    Personalizing,
    Chatting,
}

impl Stage {
    fn label(self) -> &'static str {
        match self {
            Self::CollectingProfile => "collecting_profile",
            Self::Personalizing => "personalizing",
            Self::Chatting => "chatting",
        }
    }
}

pub struct SessionOrchestrator {
    model: Arc<dyn TherapyModel>,
    events: mpsc::UnboundedSender<SessionEvent>,
    voice: mpsc::UnboundedSender<VoiceRequest>,
    /// Mirrored into the voice coordinator to gate listening while a turn
    /// is in flight.
    ai_processing: Arc<AtomicBool>,
    stage: Stage,
    profile: Option<UserProfile>,
    transcript: Transcript,
    empathy_level: i64,
    identified_needs: Vec<String>,
    last_sentiment: Option<String>,
}

impl SessionOrchestrator {
    pub fn new(
        model: Arc<dyn TherapyModel>,
        events: mpsc::UnboundedSender<SessionEvent>,
        voice: mpsc::UnboundedSender<VoiceRequest>,
        ai_processing: Arc<AtomicBool>,
    ) -> Self {
        Self {
            model,
            events,
            voice,
            ai_processing,
            stage: Stage::CollectingProfile,
            profile: None,
            transcript: Transcript::new(),
            empathy_level: 0,
            identified_needs: Vec::new(),
            last_sentiment: None,
        }
    }

    /// Process inputs until the channel closes. Inputs are handled one at
    /// a time, so turns never interleave.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionInput>) {
        while let Some(input) = rx.recv().await {
            match input {
                SessionInput::SubmitProfile(profile) => self.submit_profile(profile).await,
                SessionInput::SendMessage(text) => self.send_message(&text).await,
                SessionInput::RequestInfo => self.emit_session_info(),
            }
        }
        info!("Session orchestrator stopped");
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn empathy_level(&self) -> i64 {
        self.empathy_level
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn request_voice(&self, req: VoiceRequest) {
        let _ = self.voice.send(req);
    }

    fn silence_audio(&self) {
        self.request_voice(VoiceRequest::StopSpeech);
        self.request_voice(VoiceRequest::StopRelaxation);
    }

    /// Snapshot of the session state, on request.
    fn emit_session_info(&self) {
        self.emit(SessionEvent::SessionInfo {
            stage: self.stage.label().to_string(),
            empathy_level: self.empathy_level,
            identified_needs: self.identified_needs.clone(),
            last_detected_sentiment: self.last_sentiment.clone(),
            message_count: self.transcript.len(),
        });
    }

    /// Run the intake profile through the recommendation and
    /// style-adaptation collaborators (concurrently; both must succeed)
    /// and open the chat with a composed AI message.
    pub async fn submit_profile(&mut self, profile: UserProfile) {
        if self.stage != Stage::CollectingProfile {
            warn!("Ignoring profile submission outside intake stage");
            return;
        }

        self.silence_audio();
        self.stage = Stage::Personalizing;
        self.ai_processing.store(true, Ordering::SeqCst);

        let (recommendation, style) = tokio::join!(
            self.model.personalize(&profile),
            self.model.adapt_style(&profile, &profile.background),
        );

        self.ai_processing.store(false, Ordering::SeqCst);

        let (recommendation, style) = match (recommendation, style) {
            (Ok(r), Ok(s)) => (r, s),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Profile personalization failed: {}", e);
                self.silence_audio();
                self.stage = Stage::CollectingProfile;
                self.emit(SessionEvent::PersonalizationFailed {
                    message: personalization_error_text(&e).to_string(),
                });
                return;
            }
        };

        let opening = compose_opening_message(&recommendation, &style);
        let message = ChatMessage::ai(opening.clone(), None);

        self.profile = Some(profile);
        self.stage = Stage::Chatting;
        self.identified_needs = recommendation.identified_therapeutic_needs.clone();
        self.transcript.push(message.clone());

        info!(
            needs = recommendation.identified_therapeutic_needs.len(),
            "Session personalized"
        );
        self.emit(SessionEvent::SessionStarted {
            message,
            empathy_level: self.empathy_level,
            identified_needs: recommendation.identified_therapeutic_needs,
        });

        // A playback failure is reported by the voice side; the chat
        // proceeds silently either way.
        self.request_voice(VoiceRequest::PlaySpeech { text: opening });
    }

    /// One conversation turn. Appends the user message optimistically,
    /// asks the response collaborator for a reply, and appends either the
    /// reply or a fixed apology. Transcript length grows by exactly two
    /// either way.
    pub async fn send_message(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let Some(profile) = self.profile.clone() else {
            warn!("Ignoring chat message before profile submission");
            return;
        };

        // History snapshot excludes the message being sent this turn.
        let history: Vec<HistoryEntry> = self
            .transcript
            .last_n(HISTORY_WINDOW)
            .iter()
            .map(|msg| HistoryEntry {
                role: msg.sender,
                text: msg.text.clone(),
            })
            .collect();

        let user_message = ChatMessage::user(text);
        self.transcript.push(user_message.clone());
        self.emit(SessionEvent::UserMessage {
            message: user_message,
        });

        self.silence_audio();
        self.ai_processing.store(true, Ordering::SeqCst);
        self.emit(SessionEvent::ThinkingStart {});

        let context = ReplyContext {
            age: profile.age,
            gender_identity: profile.gender_identity,
            ethnicity: profile.ethnicity.clone(),
            vulnerable_score: profile.vulnerable_score,
            anxiety_level: profile.anxiety_level.into(),
            breakup_type: profile.breakup_type,
            background: profile.background.clone(),
            current_message: text.to_string(),
            empathy_level: self.empathy_level,
            chat_history: history,
        };

        let result = self.model.respond(&context).await;

        self.ai_processing.store(false, Ordering::SeqCst);
        self.emit(SessionEvent::ThinkingEnd {});

        match result {
            Ok(reply) => {
                self.empathy_level = reply.updated_empathy_level;
                self.last_sentiment = reply.detected_sentiment.clone();
                let message = ChatMessage::ai(reply.response.clone(), reply.detected_sentiment);
                self.transcript.push(message.clone());
                self.emit(SessionEvent::AiMessage {
                    message,
                    empathy_level: self.empathy_level,
                });
                self.request_voice(VoiceRequest::PlaySpeech {
                    text: reply.response,
                });
            }
            Err(e) => {
                warn!("AI response failed: {}", e);
                let message = ChatMessage::ai(apology_text(&e), None);
                self.transcript.push(message.clone());
                self.emit(SessionEvent::AiMessage {
                    message,
                    empathy_level: self.empathy_level,
                });
                self.emit(SessionEvent::Error {
                    message: "Could not get AI response.".into(),
                });
                self.silence_audio();
            }
        }
    }
}

/// Compose the deterministic opening message from the two collaborator
/// outputs: acknowledgment, needs summary (or fallback), raw
/// recommendations, raw adapted-language text, invitation.
pub fn compose_opening_message(
    recommendation: &TherapyRecommendation,
    style: &AdaptedStyle,
) -> String {
    let needs_text = if recommendation.identified_therapeutic_needs.is_empty() {
        "Thank you for sharing. I'm reviewing your information to best support you.".to_string()
    } else {
        format!(
            "Based on your information, I've identified that focusing on areas such as {} could be beneficial.",
            recommendation.identified_therapeutic_needs.join(", ")
        )
    };

    format!(
        "Thank you for sharing. {}\n\nHere are some initial thoughts on how we might proceed:\n{}\n\nOur approach will be as follows: {}\n\nFeel free to share what's on your mind to begin our conversation.",
        needs_text, recommendation.recommendations, style.adapted_language
    )
}

/// Fixed apology appended to the transcript when a turn fails. Overload
/// gets its own wording so the user knows a retry is worthwhile.
pub fn apology_text(error: &AiError) -> String {
    if error.is_overloaded() {
        "I'm receiving a lot of requests right now and need a brief moment to catch up. \
         Please try sending your message again shortly."
            .to_string()
    } else {
        "I'm having a little trouble connecting right now. Please try sending your message \
         again in a moment."
            .to_string()
    }
}

/// User-visible wording for a failed profile submission.
pub fn personalization_error_text(error: &AiError) -> &'static str {
    if error.is_overloaded() {
        "Could not process your profile because the AI service is temporarily overloaded. \
         Please try again shortly."
    } else {
        "Could not process your profile. Please try again."
    }
}
