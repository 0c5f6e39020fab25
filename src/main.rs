//! EmpathyAI core — headless therapy-session engine.
//!
//! Communicates with the UI shell via JSON-line IPC on stdin/stdout.
//! This is the entry point that initializes the AI and voice subsystems
//! and runs the main command loop.

mod ai;
mod config;
mod ipc;
mod session;
mod voice;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ai::openai::OpenAiTherapyModel;
use ai::TherapyModel;
use config::{AppSettings, SettingsStore};
use ipc::bridge::{emit_error, emit_event, spawn_stdin_reader};
use ipc::{SessionCommand, SessionEvent};
use session::{SessionInput, SessionOrchestrator};
use voice::recognition::{Transcriber, WhisperApiTranscriber};
use voice::tts::{ElevenLabsSynth, SpeechSynth};
use voice::{VoiceCoordinator, VoiceRequest};

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout is reserved for the event stream.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Emit starting event immediately so the shell knows we're alive.
    emit_event(&SessionEvent::Starting {});

    let store = SettingsStore::new();
    let settings = store.load();
    info!(?settings, "Settings loaded");

    let mut cmd_rx = spawn_stdin_reader();

    // The language model is the core collaborator; without its credential
    // there is no session to run.
    let openai_key = match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            emit_error("The OPENAI_API_KEY credential is missing.");
            warn!("OPENAI_API_KEY not set, exiting");
            return;
        }
    };
    let model: Arc<dyn TherapyModel> = Arc::new(OpenAiTherapyModel::new(
        &openai_key,
        std::env::var("OPENAI_BASE_URL").ok().as_deref(),
        std::env::var("OPENAI_MODEL").ok().as_deref(),
    ));

    // Speech synthesis is optional: a missing key disables playback but
    // the rest of the session runs silently.
    let synth: Option<Arc<dyn SpeechSynth>> =
        match ElevenLabsSynth::new(std::env::var("ELEVENLABS_API_KEY").ok()) {
            Ok(synth) => {
                info!(name = %synth.name(), "Speech synthesizer ready");
                Some(Arc::new(synth))
            }
            Err(e) => {
                warn!("Speech synthesis disabled: {}", e);
                emit_error(&e.user_message());
                None
            }
        };

    // Recognition shares the OpenAI credential.
    let transcriber: Option<Arc<dyn Transcriber>> =
        Some(Arc::new(WhisperApiTranscriber::new(&openai_key)));

    // Event channel: everything funnels through one stdout writer task.
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<SessionEvent>();
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            emit_event(&event);
        }
    });

    let ai_processing = Arc::new(AtomicBool::new(false));
    let (transcripts_tx, mut transcripts_rx) = mpsc::unbounded_channel::<String>();

    let (coordinator, voice_tx) = VoiceCoordinator::new(
        &settings.audio,
        Arc::clone(&ai_processing),
        synth,
        transcriber,
        events_tx.clone(),
        transcripts_tx,
    );
    tokio::spawn(coordinator.run());

    let (session_tx, session_rx) = mpsc::unbounded_channel::<SessionInput>();
    let orchestrator = SessionOrchestrator::new(
        model,
        events_tx.clone(),
        voice_tx.clone(),
        Arc::clone(&ai_processing),
    );
    tokio::spawn(orchestrator.run(session_rx));

    // Finished voice transcripts become chat turns.
    {
        let session_tx = session_tx.clone();
        tokio::spawn(async move {
            while let Some(text) = transcripts_rx.recv().await {
                let _ = session_tx.send(SessionInput::SendMessage(text));
            }
        });
    }

    emit_event(&SessionEvent::Ready {});
    info!("EmpathyAI core ready");

    let mut state = MainState {
        store,
        settings,
        session_tx,
        voice_tx,
    };

    // Main loop: route commands from the UI shell.
    while let Some(command) = cmd_rx.recv().await {
        if !state.handle_command(command) {
            break;
        }
    }

    info!("EmpathyAI core shutting down");
}

struct MainState {
    store: SettingsStore,
    settings: AppSettings,
    session_tx: mpsc::UnboundedSender<SessionInput>,
    voice_tx: mpsc::UnboundedSender<VoiceRequest>,
}

impl MainState {
    /// Handle a single command. Returns `false` if the main loop should
    /// exit.
    fn handle_command(&mut self, cmd: SessionCommand) -> bool {
        match cmd {
            SessionCommand::SubmitProfile { profile } => {
                let _ = self.session_tx.send(SessionInput::SubmitProfile(profile));
            }
            SessionCommand::SendMessage { text } => {
                let _ = self.session_tx.send(SessionInput::SendMessage(text));
            }

            SessionCommand::PlaySpeech { text } => {
                let _ = self.voice_tx.send(VoiceRequest::PlaySpeech { text });
            }
            SessionCommand::StopSpeech {} => {
                let _ = self.voice_tx.send(VoiceRequest::StopSpeech);
            }
            SessionCommand::ToggleRelaxation {} => {
                let _ = self.voice_tx.send(VoiceRequest::ToggleRelaxation);
            }
            SessionCommand::StopRelaxation {} => {
                let _ = self.voice_tx.send(VoiceRequest::StopRelaxation);
            }
            SessionCommand::StartListening {} => {
                let _ = self.voice_tx.send(VoiceRequest::StartListening);
            }
            SessionCommand::StopListening {} => {
                let _ = self.voice_tx.send(VoiceRequest::StopListening);
            }

            SessionCommand::SetVoice { voice } => {
                self.settings.audio.voice = voice;
                let _ = self.voice_tx.send(VoiceRequest::SetVoice(voice));
                self.save_audio();
            }
            SessionCommand::SetVolume { volume } => {
                self.settings.audio.volume = volume.min(100);
                let _ = self
                    .voice_tx
                    .send(VoiceRequest::SetVolume(self.settings.audio.volume));
                self.save_audio();
            }
            SessionCommand::SetSpeed { speed } => {
                self.settings.audio.playback_speed = speed.clamp(0.5, 2.0);
                let _ = self
                    .voice_tx
                    .send(VoiceRequest::SetSpeed(self.settings.audio.playback_speed));
                self.save_audio();
            }

            SessionCommand::GetSettings {} => self.emit_settings(),
            SessionCommand::GetSessionInfo {} => {
                let _ = self.session_tx.send(SessionInput::RequestInfo);
            }
            SessionCommand::SetProfileSettings { settings } => {
                self.settings.profile = settings;
                if let Err(e) = self.store.save_profile(&self.settings.profile) {
                    warn!("Failed to save profile settings: {}", e);
                }
                self.emit_settings();
            }
            SessionCommand::SetNotificationSettings { settings } => {
                self.settings.notifications = settings;
                if let Err(e) = self.store.save_notifications(&self.settings.notifications) {
                    warn!("Failed to save notification settings: {}", e);
                }
                self.emit_settings();
            }
            SessionCommand::SetAudioSettings { settings } => {
                self.settings.audio = settings.clamped();
                let audio = &self.settings.audio;
                let _ = self.voice_tx.send(VoiceRequest::SetVoice(audio.voice));
                let _ = self.voice_tx.send(VoiceRequest::SetVolume(audio.volume));
                let _ = self
                    .voice_tx
                    .send(VoiceRequest::SetSpeed(audio.playback_speed));
                self.save_audio();
            }

            SessionCommand::Ping {} => emit_event(&SessionEvent::Pong {}),
            SessionCommand::Stop {} => {
                emit_event(&SessionEvent::Stopping {});
                return false;
            }
        }
        true
    }

    fn save_audio(&self) {
        if let Err(e) = self.store.save_audio(&self.settings.audio) {
            warn!("Failed to save audio settings: {}", e);
        }
        self.emit_settings();
    }

    fn emit_settings(&self) {
        emit_event(&SessionEvent::Settings {
            settings: self.settings.clone(),
        });
    }
}
