//! Microphone capture for voice messages.
//!
//! The recorder owns its input stream, so it lives on the caller's thread
//! and is not `Send`.  Stopping encodes the captured samples to WAV and
//! hands back a [`VoiceCapture`] that can cross into async code for upload.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info};

use crate::error::{MediaError, Result};

const SAMPLE_RATE: u32 = 48_000;

/// A finished clip, ready for upload.
#[derive(Debug, Clone)]
pub struct VoiceCapture {
    /// Mono 16-bit PCM WAV.
    pub bytes: Vec<u8>,
    pub duration_secs: f32,
    pub mime_type: &'static str,
    pub file_name: &'static str,
}

pub struct VoiceRecorder {
    _stream: cpal::Stream,
    samples: Arc<Mutex<Vec<f32>>>,
    active: Arc<AtomicBool>,
}

impl VoiceRecorder {
    /// Open the default input device and start capturing immediately.
    pub fn start() -> Result<Self> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(MediaError::NoInputDevice)?;

        info!(device = ?device.name(), "Using input device");

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let samples = Arc::new(Mutex::new(Vec::new()));
        let active = Arc::new(AtomicBool::new(true));

        let sink = samples.clone();
        let running = active.clone();
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        return;
                    }
                    if let Ok(mut sink) = sink.lock() {
                        sink.extend_from_slice(data);
                    }
                },
                move |err| {
                    error!("Audio input error: {err}");
                },
                None,
            )
            .map_err(|e| MediaError::Stream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| MediaError::Stream(e.to_string()))?;

        debug!("Voice capture started");
        Ok(Self {
            _stream: stream,
            samples,
            active,
        })
    }

    /// Stop capturing and encode what was recorded.
    pub fn stop(self) -> VoiceCapture {
        self.active.store(false, Ordering::SeqCst);
        let samples = match self.samples.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => Vec::new(),
        };
        debug!(samples = samples.len(), "Voice capture stopped");

        VoiceCapture {
            duration_secs: samples.len() as f32 / SAMPLE_RATE as f32,
            bytes: encode_wav(&samples, SAMPLE_RATE),
            mime_type: "audio/wav",
            file_name: "voice_message.wav",
        }
    }

    /// Stop capturing and discard the clip.
    pub fn cancel(self) {
        self.active.store(false, Ordering::SeqCst);
        debug!("Voice capture cancelled");
    }
}

/// Encode mono f32 samples as a 16-bit PCM WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        out.extend_from_slice(&((clamped * i16::MAX as f32) as i16).to_le_bytes());
    }
    out
}
