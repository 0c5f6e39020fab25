//! Rodio playback for AI speech and the relaxation audio loop.
//!
//! Playback runs on blocking threads. Each player polls its session
//! generation every 50 ms so stops and interruptions take effect quickly,
//! and re-applies volume (and rate, for speech) from the shared atomics so
//! settings changes land on audio that is already playing.

use std::sync::Arc;
use std::time::Duration;

use rodio::{OutputStream, Sink, Source};
use tracing::{error, info, warn};

use super::mp3::decode_mp3_to_f32;
use super::tts::{SpeechAudio, SpeechSynth, TtsError};
use super::VoiceShared;
use crate::ipc::SessionEvent;

/// River ambience used by the relaxation exercise.
const RELAXATION_AUDIO_URL: &str = "https://www.soundjay.com/nature/sounds/river-1.mp3";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Synthesize `text` and play it as the current AI speech.
///
/// The caller claims `gen` (which stops the relaxation loop and any speech
/// already playing) before spawning this. If the session is superseded
/// while synthesis is in flight, the audio is discarded without playing.
pub(crate) async fn speak(
    shared: Arc<VoiceShared>,
    synth: Option<Arc<dyn SpeechSynth>>,
    text: String,
    gen: u64,
) {
    let Some(synth) = synth else {
        warn!("Speech requested but no synthesizer is configured");
        shared.emit(SessionEvent::Error {
            message: TtsError::MissingCredential.user_message(),
        });
        return;
    };

    let voice = shared.voice();

    let audio = match synth.synthesize(&text, voice).await {
        Ok(audio) => audio,
        Err(e) => {
            error!("Speech synthesis failed: {}", e);
            if shared.speech_current(gen) {
                shared.emit(SessionEvent::Error {
                    message: e.user_message(),
                });
            }
            return;
        }
    };

    // Superseded while synthesizing: a newer payload or a stop won.
    if !shared.speech_current(gen) {
        info!("Discarding synthesized audio for superseded speech session");
        return;
    }

    shared.mark_speaking();
    shared.emit(SessionEvent::SpeakingStart {
        text: text.clone(),
        audio: audio.data_uri(),
    });

    let play_shared = Arc::clone(&shared);
    let result = tokio::task::spawn_blocking(move || {
        play_speech_samples(audio, &play_shared, gen)
    })
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("Speech playback error: {}", e);
            shared.emit(SessionEvent::Error {
                message: "Could not play the AI speech audio.".into(),
            });
        }
        Err(e) => error!("Speech playback task panicked: {}", e),
    }

    shared.finish_speech(gen);
}

/// Play one speech payload on a blocking thread, honoring live volume and
/// rate and stopping as soon as the session is superseded.
fn play_speech_samples(
    audio: SpeechAudio,
    shared: &VoiceShared,
    gen: u64,
) -> Result<(), String> {
    let (_stream, stream_handle) = OutputStream::try_default()
        .map_err(|e| format!("No audio output device available: {}", e))?;
    let sink = Sink::try_new(&stream_handle)
        .map_err(|e| format!("Failed to create audio sink: {}", e))?;

    sink.set_volume(shared.volume());
    sink.set_speed(shared.speed());

    let source = rodio::buffer::SamplesBuffer::new(1, audio.sample_rate, audio.samples);
    sink.append(source);

    while !sink.empty() {
        if !shared.speech_current(gen) {
            sink.stop();
            return Ok(());
        }
        sink.set_volume(shared.volume());
        sink.set_speed(shared.speed());
        std::thread::sleep(POLL_INTERVAL);
    }
    sink.sleep_until_end();

    Ok(())
}

/// Run the relaxation loop: fetch (or reuse) the decoded track and loop
/// the ambience until toggled off or superseded. The caller claims `gen`
/// (which stops any AI speech) before spawning this.
pub(crate) async fn start_relaxation(shared: Arc<VoiceShared>, gen: u64) {
    let track = match fetch_relaxation_track(&shared).await {
        Ok(track) => track,
        Err(e) => {
            error!("Relaxation audio unavailable: {}", e);
            shared.emit(SessionEvent::Error {
                message: "Could not play the relaxation exercise audio.".into(),
            });
            shared.abort_relaxation(gen);
            return;
        }
    };

    // Toggled off (or replaced by speech) while the track was loading.
    if !shared.relax_current(gen) {
        return;
    }

    shared.emit(SessionEvent::RelaxationStart {});

    let play_shared = Arc::clone(&shared);
    let result = tokio::task::spawn_blocking(move || {
        play_relaxation_loop(&track, &play_shared, gen)
    })
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("Relaxation playback error: {}", e);
            shared.emit(SessionEvent::Error {
                message: "Could not play the relaxation exercise audio.".into(),
            });
        }
        Err(e) => error!("Relaxation playback task panicked: {}", e),
    }

    // Normally the loop only ends because the generation was bumped, in
    // which case stop_relaxation already emitted RelaxationStop. This
    // covers playback dying on its own (output device error).
    if shared.relax_current(gen) {
        shared.stop_relaxation();
    }
}

/// Fetch and decode the relaxation track, caching the decoded PCM so the
/// download happens at most once per process.
async fn fetch_relaxation_track(
    shared: &VoiceShared,
) -> Result<Arc<(Vec<f32>, u32)>, String> {
    if let Some(track) = shared.cached_relaxation_track().await {
        return Ok(track);
    }

    info!(url = RELAXATION_AUDIO_URL, "Fetching relaxation audio");
    let resp = reqwest::get(RELAXATION_AUDIO_URL)
        .await
        .map_err(|e| format!("fetch failed: {}", e))?;
    if !resp.status().is_success() {
        return Err(format!("fetch failed with status {}", resp.status()));
    }
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| format!("fetch body failed: {}", e))?;

    let (samples, sample_rate) = decode_mp3_to_f32(&bytes)?;
    info!(samples = samples.len(), sample_rate, "Relaxation audio decoded");

    let track = Arc::new((samples, sample_rate));
    shared.store_relaxation_track(Arc::clone(&track)).await;
    Ok(track)
}

/// Loop the relaxation track until the session is superseded. Volume is
/// applied live; playback rate intentionally is not, the ambience always
/// plays at normal speed.
fn play_relaxation_loop(
    track: &(Vec<f32>, u32),
    shared: &VoiceShared,
    gen: u64,
) -> Result<(), String> {
    let (_stream, stream_handle) = OutputStream::try_default()
        .map_err(|e| format!("No audio output device available: {}", e))?;
    let sink = Sink::try_new(&stream_handle)
        .map_err(|e| format!("Failed to create audio sink: {}", e))?;

    sink.set_volume(shared.volume());

    let source =
        rodio::buffer::SamplesBuffer::new(1, track.1, track.0.clone()).repeat_infinite();
    sink.append(source);

    // The source is infinite, so the sink never drains on its own.
    while !sink.empty() {
        if !shared.relax_current(gen) {
            sink.stop();
            return Ok(());
        }
        sink.set_volume(shared.volume());
        std::thread::sleep(POLL_INTERVAL);
    }

    Ok(())
}
