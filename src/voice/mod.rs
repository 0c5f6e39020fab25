//! Voice I/O coordination: speech playback, the relaxation loop, and
//! microphone listening sessions.
//!
//! All voice state lives in [`VoiceShared`] as atomics plus generation
//! counters. Every playback or listening session captures the generation
//! at start and checks it on each tick; bumping the counter supersedes the
//! session, which is how stop and interruption work without locks around
//! the audio threads. Exactly one of AI speech and the relaxation loop can
//! be audible at a time.

pub mod capture;
pub mod mp3;
pub mod playback;
pub mod recognition;
pub mod ring_buffer;
pub mod tts;
pub mod vad;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::AudioSettings;
use crate::ipc::SessionEvent;
use recognition::{RecognitionError, Transcriber};
use tts::{SpeechSynth, VoiceGender};
use vad::UtteranceTracker;

/// Requests into the voice coordinator.
#[derive(Debug, Clone)]
pub enum VoiceRequest {
    PlaySpeech { text: String },
    StopSpeech,
    ToggleRelaxation,
    StopRelaxation,
    StartListening,
    StopListening,
    SetVoice(VoiceGender),
    SetVolume(u8),
    SetSpeed(f32),
}

/// Tunables for one listening session.
#[derive(Debug, Clone, Copy)]
pub struct ListenParams {
    /// Energy threshold for speech onset.
    pub vad_threshold: f32,
    /// How long to wait for speech before giving up.
    pub onset_window: Duration,
    /// Trailing silence that ends an utterance.
    pub silence_timeout: Duration,
    /// Hard cap on utterance length.
    pub max_utterance: Duration,
}

impl Default for ListenParams {
    fn default() -> Self {
        Self {
            vad_threshold: 0.01,
            onset_window: Duration::from_secs(7),
            silence_timeout: Duration::from_millis(1500),
            max_utterance: Duration::from_secs(30),
        }
    }
}

/// Voice state shared between the coordinator and its spawned sessions.
pub(crate) struct VoiceShared {
    speech_gen: AtomicU64,
    relax_gen: AtomicU64,
    listen_gen: AtomicU64,
    speaking: AtomicBool,
    relaxing: AtomicBool,
    listening: AtomicBool,
    /// Set by the session orchestrator while an AI turn is in flight.
    /// Listening cannot start while this is set.
    ai_processing: Arc<AtomicBool>,
    /// Playback gain (0.0-1.0) as f32 bits, applied live each poll tick.
    volume_bits: AtomicU32,
    /// Playback rate (0.5-2.0) as f32 bits, applied live to speech only.
    speed_bits: AtomicU32,
    voice: Mutex<VoiceGender>,
    /// Decoded relaxation track, fetched once per process.
    relax_cache: tokio::sync::Mutex<Option<Arc<(Vec<f32>, u32)>>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    /// Finished transcripts, funneled into the chat as user messages.
    transcripts: mpsc::UnboundedSender<String>,
}

impl VoiceShared {
    pub(crate) fn new(
        audio: &AudioSettings,
        ai_processing: Arc<AtomicBool>,
        events: mpsc::UnboundedSender<SessionEvent>,
        transcripts: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            speech_gen: AtomicU64::new(0),
            relax_gen: AtomicU64::new(0),
            listen_gen: AtomicU64::new(0),
            speaking: AtomicBool::new(false),
            relaxing: AtomicBool::new(false),
            listening: AtomicBool::new(false),
            ai_processing,
            volume_bits: AtomicU32::new(audio.volume_factor().to_bits()),
            speed_bits: AtomicU32::new(audio.playback_speed.to_bits()),
            voice: Mutex::new(audio.voice),
            relax_cache: tokio::sync::Mutex::new(None),
            events,
            transcripts,
        }
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    // -- live playback parameters ------------------------------------------

    pub(crate) fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set_volume_percent(&self, volume: u8) {
        let gain = f32::from(volume.min(100)) / 100.0;
        self.volume_bits.store(gain.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn speed(&self) -> f32 {
        f32::from_bits(self.speed_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set_speed(&self, speed: f32) {
        self.speed_bits
            .store(speed.clamp(0.5, 2.0).to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn voice(&self) -> VoiceGender {
        self.voice.lock().map(|g| *g).unwrap_or_default()
    }

    /// Change the voice. Any current speech was synthesized with the old
    /// voice, so it is stopped; the new voice applies from the next payload.
    pub(crate) fn set_voice(&self, voice: VoiceGender) {
        if let Ok(mut guard) = self.voice.lock() {
            *guard = voice;
        }
        self.stop_speech();
    }

    // -- speech ------------------------------------------------------------

    /// Start a new speech session: stops the relaxation loop and any
    /// current speech, then returns the new session's generation.
    pub(crate) fn begin_speech(&self) -> u64 {
        self.stop_relaxation();
        self.stop_speech();
        self.speech_gen.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn speech_current(&self, gen: u64) -> bool {
        self.speech_gen.load(Ordering::SeqCst) == gen
    }

    pub(crate) fn mark_speaking(&self) {
        self.speaking.store(true, Ordering::SeqCst);
    }

    /// Stop AI speech. Idempotent: emits `SpeakingEnd` only on the
    /// transition from speaking to not speaking.
    pub(crate) fn stop_speech(&self) {
        self.speech_gen.fetch_add(1, Ordering::SeqCst);
        if self.speaking.swap(false, Ordering::SeqCst) {
            self.emit(SessionEvent::SpeakingEnd {});
        }
    }

    /// End a speech session normally. No-op if the session was superseded.
    pub(crate) fn finish_speech(&self, gen: u64) {
        if self.speech_current(gen) && self.speaking.swap(false, Ordering::SeqCst) {
            self.emit(SessionEvent::SpeakingEnd {});
        }
    }

    // -- relaxation --------------------------------------------------------

    pub(crate) fn is_relaxing(&self) -> bool {
        self.relaxing.load(Ordering::SeqCst)
    }

    /// Start a new relaxation session: stops any AI speech first.
    pub(crate) fn begin_relaxation(&self) -> u64 {
        self.stop_speech();
        self.relaxing.store(true, Ordering::SeqCst);
        self.relax_gen.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn relax_current(&self, gen: u64) -> bool {
        self.relax_gen.load(Ordering::SeqCst) == gen
    }

    /// Stop the relaxation loop. Idempotent like [`stop_speech`].
    pub(crate) fn stop_relaxation(&self) {
        self.relax_gen.fetch_add(1, Ordering::SeqCst);
        if self.relaxing.swap(false, Ordering::SeqCst) {
            self.emit(SessionEvent::RelaxationStop {});
        }
    }

    /// Clear the relaxing flag without emitting, for sessions that failed
    /// before `RelaxationStart` was sent.
    pub(crate) fn abort_relaxation(&self, gen: u64) {
        if self.relax_current(gen) {
            self.relaxing.store(false, Ordering::SeqCst);
        }
    }

    pub(crate) async fn cached_relaxation_track(&self) -> Option<Arc<(Vec<f32>, u32)>> {
        self.relax_cache.lock().await.clone()
    }

    pub(crate) async fn store_relaxation_track(&self, track: Arc<(Vec<f32>, u32)>) {
        *self.relax_cache.lock().await = Some(track);
    }

    // -- listening ---------------------------------------------------------

    pub(crate) fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Start a listening session, unless one is already running or an AI
    /// turn is in flight. Interrupts AI speech so the microphone does not
    /// pick it up.
    pub(crate) fn begin_listening(&self) -> Option<u64> {
        if self.ai_processing.load(Ordering::SeqCst) {
            debug!("Ignoring listen request while AI turn is in flight");
            return None;
        }
        if self.listening.swap(true, Ordering::SeqCst) {
            debug!("Ignoring listen request while already listening");
            return None;
        }
        self.stop_speech();
        Some(self.listen_gen.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub(crate) fn listen_current(&self, gen: u64) -> bool {
        self.listen_gen.load(Ordering::SeqCst) == gen
    }

    /// Stop listening. Idempotent. The running session notices the bumped
    /// generation, finalizes whatever audio it captured, and exits.
    pub(crate) fn stop_listening(&self) {
        self.listen_gen.fetch_add(1, Ordering::SeqCst);
        if self.listening.swap(false, Ordering::SeqCst) {
            self.emit(SessionEvent::ListeningStop {});
        }
    }

    /// End a listening session normally. No-op if it was superseded.
    pub(crate) fn finish_listening(&self, gen: u64) {
        if self.listen_current(gen) && self.listening.swap(false, Ordering::SeqCst) {
            self.emit(SessionEvent::ListeningStop {});
        }
    }

    /// Clear the listening flag without emitting, for sessions that failed
    /// before `ListeningStart` was sent.
    pub(crate) fn abort_listening(&self, gen: u64) {
        if self.listen_current(gen) {
            self.listening.store(false, Ordering::SeqCst);
        }
    }

    pub(crate) fn send_transcript(&self, text: String) {
        let _ = self.transcripts.send(text);
    }
}

/// Owns the voice request channel and spawns playback/listening sessions.
pub struct VoiceCoordinator {
    shared: Arc<VoiceShared>,
    synth: Option<Arc<dyn SpeechSynth>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    listen_params: ListenParams,
    rx: mpsc::UnboundedReceiver<VoiceRequest>,
}

impl VoiceCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        audio: &AudioSettings,
        ai_processing: Arc<AtomicBool>,
        synth: Option<Arc<dyn SpeechSynth>>,
        transcriber: Option<Arc<dyn Transcriber>>,
        events: mpsc::UnboundedSender<SessionEvent>,
        transcripts: mpsc::UnboundedSender<String>,
    ) -> (Self, mpsc::UnboundedSender<VoiceRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(VoiceShared::new(audio, ai_processing, events, transcripts));
        (
            Self {
                shared,
                synth,
                transcriber,
                listen_params: ListenParams::default(),
                rx,
            },
            tx,
        )
    }

    /// Process voice requests until the channel closes.
    pub async fn run(mut self) {
        info!(
            tts = self.synth.is_some(),
            stt = self.transcriber.is_some(),
            "Voice coordinator started"
        );
        while let Some(req) = self.rx.recv().await {
            self.handle(req);
        }
        self.shared.stop_speech();
        self.shared.stop_relaxation();
        self.shared.stop_listening();
        info!("Voice coordinator stopped");
    }

    /// Dispatch one request. Session generations are claimed here, in
    /// channel order, so a stop that follows a play in the queue always
    /// supersedes it regardless of when the spawned task gets polled.
    fn handle(&self, req: VoiceRequest) {
        match req {
            VoiceRequest::PlaySpeech { text } => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    return;
                }
                let gen = self.shared.begin_speech();
                let shared = Arc::clone(&self.shared);
                let synth = self.synth.clone();
                tokio::spawn(async move {
                    playback::speak(shared, synth, text, gen).await;
                });
            }
            VoiceRequest::StopSpeech => self.shared.stop_speech(),
            VoiceRequest::ToggleRelaxation => {
                if self.shared.is_relaxing() {
                    self.shared.stop_relaxation();
                } else {
                    let gen = self.shared.begin_relaxation();
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move {
                        playback::start_relaxation(shared, gen).await;
                    });
                }
            }
            VoiceRequest::StopRelaxation => self.shared.stop_relaxation(),
            VoiceRequest::StartListening => {
                if let Some(gen) = self.shared.begin_listening() {
                    let shared = Arc::clone(&self.shared);
                    let transcriber = self.transcriber.clone();
                    let params = self.listen_params;
                    tokio::spawn(async move {
                        listen_session(shared, transcriber, params, gen).await;
                    });
                }
            }
            VoiceRequest::StopListening => self.shared.stop_listening(),
            VoiceRequest::SetVoice(voice) => self.shared.set_voice(voice),
            VoiceRequest::SetVolume(volume) => self.shared.set_volume_percent(volume),
            VoiceRequest::SetSpeed(speed) => self.shared.set_speed(speed),
        }
    }
}

/// Teardown for a listening session that failed before `ListeningStart`:
/// surface the error and return to idle without an unpaired stop event.
fn fail_listening(shared: &VoiceShared, gen: u64, message: &str) {
    shared.emit(SessionEvent::Error {
        message: message.to_string(),
    });
    shared.abort_listening(gen);
}

/// One microphone listening session: open the mic, wait for speech, record
/// until trailing silence, transcribe, and feed the transcript into the
/// chat. The caller claims `gen` before spawning; the mic is released as
/// soon as the session ends.
async fn listen_session(
    shared: Arc<VoiceShared>,
    transcriber: Option<Arc<dyn Transcriber>>,
    params: ListenParams,
    gen: u64,
) {
    let Some(transcriber) = transcriber else {
        warn!("Listen requested but no transcriber is configured");
        fail_listening(&shared, gen, "Speech recognition is not configured.");
        return;
    };

    let (stream, mut consumer) = match capture::open_microphone() {
        Ok(pair) => pair,
        Err(e) => {
            warn!("Microphone open failed: {}", e);
            fail_listening(&shared, gen, e.user_message());
            return;
        }
    };

    // Stopped before capture began; the stop already reset the state.
    if !shared.listen_current(gen) {
        return;
    }

    shared.emit(SessionEvent::ListeningStart {});

    let mut tracker = UtteranceTracker::new(params.vad_threshold);
    let mut recording: Vec<f32> = Vec::new();
    let max_samples = params.max_utterance.as_secs() as usize * capture::TARGET_SAMPLE_RATE as usize;
    let mut failure: Option<RecognitionError> = None;

    loop {
        tokio::time::sleep(Duration::from_millis(40)).await;

        // A bumped generation means stop_listening finalized the session;
        // break and transcribe what we have.
        if !shared.listen_current(gen) {
            break;
        }

        let chunk = consumer.drain_all();
        if !chunk.is_empty() {
            let level = tracker.process(&chunk);
            shared.emit(SessionEvent::InputLevel { level });
            if tracker.speech_started() {
                recording.extend_from_slice(&chunk);
            }
        }

        if tracker.onset_timed_out(params.onset_window) {
            failure = Some(RecognitionError::NoSpeech);
            break;
        }
        if tracker.utterance_ended(params.silence_timeout) || recording.len() >= max_samples {
            break;
        }
    }

    // Release the microphone before the (slow) transcription call.
    drop(stream);
    shared.finish_listening(gen);

    if let Some(err) = failure {
        shared.emit(SessionEvent::Error {
            message: err.user_message().to_string(),
        });
        return;
    }

    if !tracker.speech_started() || recording.is_empty() {
        // Manually stopped before any speech; nothing to transcribe.
        return;
    }

    match transcriber.transcribe(&recording).await {
        Ok(text) => {
            let text = text.trim().to_string();
            if text.is_empty() {
                shared.emit(SessionEvent::Error {
                    message: RecognitionError::NoSpeech.user_message().to_string(),
                });
            } else {
                info!(text = %text, "Transcription result");
                shared.emit(SessionEvent::Transcription { text: text.clone() });
                shared.send_transcript(text);
            }
        }
        Err(e) => {
            warn!("Transcription failed: {}", e);
            shared.emit(SessionEvent::Error {
                message: e.user_message().to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared_with_channels() -> (
        Arc<VoiceShared>,
        mpsc::UnboundedReceiver<SessionEvent>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (tx_tx, tx_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(VoiceShared::new(
            &AudioSettings::default(),
            Arc::new(AtomicBool::new(false)),
            events_tx,
            tx_tx,
        ));
        (shared, events_rx, tx_rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            let json = serde_json::to_value(&event).unwrap();
            names.push(json["event"].as_str().unwrap().to_string());
        }
        names
    }

    #[test]
    fn test_stop_speech_is_idempotent() {
        let (shared, mut events, _t) = shared_with_channels();
        let gen = shared.begin_speech();
        shared.mark_speaking();
        assert!(shared.speech_current(gen));

        shared.stop_speech();
        shared.stop_speech();

        let names = drain(&mut events);
        assert_eq!(
            names.iter().filter(|n| *n == "speaking_end").count(),
            1,
            "repeated stop must emit a single speaking_end"
        );
        assert!(!shared.speech_current(gen));
    }

    #[test]
    fn test_new_speech_supersedes_old_session() {
        let (shared, _e, _t) = shared_with_channels();
        let first = shared.begin_speech();
        shared.mark_speaking();
        let second = shared.begin_speech();
        assert!(!shared.speech_current(first));
        assert!(shared.speech_current(second));
    }

    #[test]
    fn test_relaxation_stops_speech_and_vice_versa() {
        let (shared, mut events, _t) = shared_with_channels();
        let speech = shared.begin_speech();
        shared.mark_speaking();

        let relax = shared.begin_relaxation();
        assert!(!shared.speech_current(speech));
        assert!(shared.is_relaxing());
        let names = drain(&mut events);
        assert!(names.contains(&"speaking_end".to_string()));

        let speech2 = shared.begin_speech();
        assert!(!shared.relax_current(relax));
        assert!(!shared.is_relaxing());
        assert!(shared.speech_current(speech2));
        let names = drain(&mut events);
        assert!(names.contains(&"relaxation_stop".to_string()));
    }

    #[test]
    fn test_listening_gated_while_ai_processing() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (tx_tx, _tx_rx) = mpsc::unbounded_channel();
        let ai_processing = Arc::new(AtomicBool::new(true));
        let shared = VoiceShared::new(
            &AudioSettings::default(),
            Arc::clone(&ai_processing),
            events_tx,
            tx_tx,
        );

        assert!(shared.begin_listening().is_none());

        ai_processing.store(false, Ordering::SeqCst);
        assert!(shared.begin_listening().is_some());
        // A second session while one is running is refused.
        assert!(shared.begin_listening().is_none());
    }

    #[test]
    fn test_stop_listening_is_idempotent() {
        let (shared, mut events, _t) = shared_with_channels();
        let gen = shared.begin_listening().unwrap();
        shared.stop_listening();
        shared.stop_listening();
        assert!(!shared.listen_current(gen));
        let names = drain(&mut events);
        assert_eq!(names.iter().filter(|n| *n == "listening_stop").count(), 1);
    }

    #[test]
    fn test_voice_change_stops_current_speech() {
        let (shared, mut events, _t) = shared_with_channels();
        let gen = shared.begin_speech();
        shared.mark_speaking();

        shared.set_voice(VoiceGender::Male);

        assert_eq!(shared.voice(), VoiceGender::Male);
        assert!(!shared.speech_current(gen));
        assert!(drain(&mut events).contains(&"speaking_end".to_string()));
    }

    #[test]
    fn test_volume_and_speed_round_trip() {
        let (shared, _e, _t) = shared_with_channels();
        shared.set_volume_percent(75);
        assert!((shared.volume() - 0.75).abs() < 1e-6);
        shared.set_volume_percent(200);
        assert!((shared.volume() - 1.0).abs() < 1e-6);

        shared.set_speed(1.5);
        assert!((shared.speed() - 1.5).abs() < 1e-6);
        shared.set_speed(9.0);
        assert!((shared.speed() - 2.0).abs() < 1e-6);
    }

    fn coordinator() -> (VoiceCoordinator, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (tx_tx, _tx_rx) = mpsc::unbounded_channel();
        let (coordinator, _tx) = VoiceCoordinator::new(
            &AudioSettings::default(),
            Arc::new(AtomicBool::new(false)),
            None,
            None,
            events_tx,
            tx_tx,
        );
        (coordinator, events_rx)
    }

    #[tokio::test]
    async fn test_stop_after_play_supersedes_in_request_order() {
        let (coordinator, _events) = coordinator();

        coordinator.handle(VoiceRequest::PlaySpeech {
            text: "hello".into(),
        });
        // The generation is claimed before the playback task is polled.
        let claimed = coordinator.shared.speech_gen.load(Ordering::SeqCst);
        coordinator.handle(VoiceRequest::StopSpeech);

        assert!(!coordinator.shared.speech_current(claimed));
    }

    #[tokio::test]
    async fn test_newer_play_supersedes_older_in_request_order() {
        let (coordinator, _events) = coordinator();

        coordinator.handle(VoiceRequest::PlaySpeech { text: "one".into() });
        let first = coordinator.shared.speech_gen.load(Ordering::SeqCst);
        coordinator.handle(VoiceRequest::PlaySpeech { text: "two".into() });
        let second = coordinator.shared.speech_gen.load(Ordering::SeqCst);

        assert!(!coordinator.shared.speech_current(first));
        assert!(coordinator.shared.speech_current(second));
    }

    #[tokio::test]
    async fn test_stop_after_start_listening_in_request_order() {
        let (coordinator, _events) = coordinator();

        coordinator.handle(VoiceRequest::StartListening);
        assert!(coordinator.shared.is_listening());
        let claimed = coordinator.shared.listen_gen.load(Ordering::SeqCst);
        coordinator.handle(VoiceRequest::StopListening);

        assert!(!coordinator.shared.listen_current(claimed));
        assert!(!coordinator.shared.is_listening());
    }

    #[tokio::test]
    async fn test_play_without_synthesizer_still_stops_relaxation() {
        let (coordinator, _events) = coordinator();

        coordinator.handle(VoiceRequest::ToggleRelaxation);
        assert!(coordinator.shared.is_relaxing());

        // No synthesizer is configured; the request still silences the loop.
        coordinator.handle(VoiceRequest::PlaySpeech { text: "hi".into() });

        assert!(!coordinator.shared.is_relaxing());
    }

    #[test]
    fn test_mic_open_failure_resets_listening_to_idle() {
        let (shared, mut events, _t) = shared_with_channels();
        let gen = shared.begin_listening().unwrap();

        let err = RecognitionError::NotAllowed("no default input device".into());
        fail_listening(&shared, gen, err.user_message());

        assert!(!shared.is_listening());
        let messages: Vec<(String, Option<String>)> = {
            let mut out = Vec::new();
            while let Ok(event) = events.try_recv() {
                let json = serde_json::to_value(&event).unwrap();
                out.push((
                    json["event"].as_str().unwrap().to_string(),
                    json["data"]["message"].as_str().map(str::to_string),
                ));
            }
            out
        };
        assert_eq!(
            messages,
            vec![(
                "error".to_string(),
                Some("Microphone access denied. Please allow it in system settings.".to_string())
            )],
            "a failed open surfaces the access-denied message and no listening_stop"
        );
        // The session can start again right away.
        assert!(shared.begin_listening().is_some());
    }

    #[test]
    fn test_defaults_from_audio_settings() {
        let (shared, _e, _t) = shared_with_channels();
        assert_eq!(shared.voice(), VoiceGender::Female);
        assert!((shared.volume() - 0.5).abs() < 1e-6);
        assert!((shared.speed() - 1.0).abs() < 1e-6);
    }
}
