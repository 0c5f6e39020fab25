//! Microphone capture via cpal.
//!
//! Opens the default input device for the duration of one listening
//! session, captures at the device's native rate, downmixes to mono,
//! resamples to 16 kHz, and writes 1280-sample chunks to a ring buffer
//! for the listening task. The stream is dropped when the session ends
//! so the microphone is released between sessions.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

use super::recognition::RecognitionError;
use super::ring_buffer::{mic_ring_buffer, MicConsumer, MicProducer};

/// Target sample rate for recognition audio.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Chunk size in samples (80 ms at 16 kHz).
pub const CHUNK_SAMPLES: usize = 1280;

/// Wrapper to make `cpal::Stream` Send.
///
/// `cpal::Stream` is `!Send` on some platforms due to internal raw pointers,
/// but we only hold it alive. The audio callback runs on its own internal
/// thread managed by cpal; we never access the stream from another thread,
/// we only drop it, which is safe.
pub struct SendStream(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for SendStream {}

/// Simple linear resampler from `from_rate` to `to_rate`.
/// Operates on mono f32 samples.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let frac = (src_idx - idx0 as f64) as f32;
        let s0 = input.get(idx0).copied().unwrap_or(0.0);
        let s1 = input.get(idx0 + 1).copied().unwrap_or(s0);
        output.push(s0 + frac * (s1 - s0));
    }
    output
}

/// Down-mix multi-channel audio to mono by averaging channels.
fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Open the default microphone for one listening session.
///
/// Returns the live stream (keep it alive, drop it to release the mic)
/// and the consumer half of the ring buffer the callback fills.
pub fn open_microphone() -> Result<(SendStream, MicConsumer), RecognitionError> {
    let host = cpal::default_host();

    // An absent default input is the closest signal we get to the
    // microphone being unavailable or blocked for this process.
    let device = host.default_input_device().ok_or_else(|| {
        RecognitionError::NotAllowed("no default input device available".into())
    })?;

    let dev_name = device.name().unwrap_or_else(|_| "unknown".into());
    info!(device = %dev_name, "Selected input device");

    let default_config = device
        .default_input_config()
        .map_err(|e| RecognitionError::AudioCapture(format!("input config: {}", e)))?;

    let native_rate = default_config.sample_rate().0;
    let channels = default_config.channels();

    let stream_config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(native_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let needs_resample = native_rate != TARGET_SAMPLE_RATE;
    let needs_downmix = channels > 1;

    info!(
        native_rate,
        channels, needs_resample, needs_downmix, "Audio input config"
    );

    let (mut producer, consumer): (MicProducer, MicConsumer) = mic_ring_buffer();
    let mut chunk_buf: Vec<f32> = Vec::with_capacity(CHUNK_SAMPLES * 2);

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mono = if needs_downmix {
                    to_mono(data, channels)
                } else {
                    data.to_vec()
                };

                let resampled = if needs_resample {
                    resample_linear(&mono, native_rate, TARGET_SAMPLE_RATE)
                } else {
                    mono
                };

                // Accumulate and push full chunks. A full ring buffer
                // drops the oldest audio; the consumer will catch up.
                chunk_buf.extend_from_slice(&resampled);
                while chunk_buf.len() >= CHUNK_SAMPLES {
                    let chunk: Vec<f32> = chunk_buf.drain(..CHUNK_SAMPLES).collect();
                    producer.push_slice(&chunk);
                }
            },
            move |err| {
                error!("Audio input stream error: {}", err);
            },
            None,
        )
        .map_err(|e| RecognitionError::AudioCapture(format!("build input stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| RecognitionError::AudioCapture(format!("start input stream: {}", e)))?;

    info!("Microphone capture started");
    Ok((SendStream(stream), consumer))
}
