//! Notification cues: the message-alert blip and the incoming-call ring.
//!
//! Both sounds are synthesized, so there are no bundled asset files.  The
//! dispatcher talks to the [`CuePlayer`] trait; tests swap in a recorder.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{error, warn};

use crate::error::{MediaError, Result};

const SAMPLE_RATE: u32 = 48_000;

/// The two sounds the client ever plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    MessageAlert,
    Ringtone,
}

/// Anything that can voice a [`Cue`].
pub trait CuePlayer: Send + Sync {
    /// Play the cue once at the given volume (0.0 ..= 1.0).
    fn play_once(&self, cue: Cue, volume: f32);

    /// Loop the cue until [`stop`](Self::stop).  Starting a new loop
    /// replaces the previous one.
    fn play_looping(&self, cue: Cue);

    /// Silence a looping cue.  A no-op when nothing is looping.
    fn stop(&self);
}

// ---------------------------------------------------------------------------
// cpal-backed player
// ---------------------------------------------------------------------------

/// Plays cues on the default output device.
///
/// `cpal::Stream` is not `Send`, so every playback runs on its own short
/// lived thread that owns the stream; the handle here only carries the
/// stop flag of the live loop.
pub struct ToneCuePlayer {
    ringing: Mutex<Option<Arc<AtomicBool>>>,
}

impl ToneCuePlayer {
    pub fn new() -> Self {
        Self {
            ringing: Mutex::new(None),
        }
    }
}

impl Default for ToneCuePlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl CuePlayer for ToneCuePlayer {
    fn play_once(&self, cue: Cue, volume: f32) {
        std::thread::spawn(move || {
            if let Err(error) = play_tone_blocking(cue, volume, None) {
                warn!(%error, "failed to play cue");
            }
        });
    }

    fn play_looping(&self, cue: Cue) {
        let stop = Arc::new(AtomicBool::new(false));
        if let Ok(mut guard) = self.ringing.lock() {
            if let Some(previous) = guard.replace(stop.clone()) {
                previous.store(true, Ordering::SeqCst);
            }
        }
        std::thread::spawn(move || {
            if let Err(error) = play_tone_blocking(cue, 1.0, Some(stop)) {
                warn!(%error, "failed to play cue");
            }
        });
    }

    fn stop(&self) {
        if let Ok(mut guard) = self.ringing.lock() {
            if let Some(flag) = guard.take() {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }
}

fn play_tone_blocking(cue: Cue, volume: f32, stop: Option<Arc<AtomicBool>>) -> Result<()> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(MediaError::NoOutputDevice)?;

    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    };

    let gain = volume.clamp(0.0, 1.0);
    let mut clock = 0u64;
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                for sample in data.iter_mut() {
                    *sample = tone_sample(cue, clock, SAMPLE_RATE) * gain;
                    clock += 1;
                }
            },
            move |err| {
                error!("Audio output error: {err}");
            },
            None,
        )
        .map_err(|e| MediaError::Stream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| MediaError::Stream(e.to_string()))?;

    match stop {
        Some(flag) => {
            while !flag.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(50));
            }
        }
        None => std::thread::sleep(cue_duration(cue)),
    }
    // Dropping the stream here ends playback.
    Ok(())
}

fn cue_duration(cue: Cue) -> Duration {
    match cue {
        Cue::MessageAlert => Duration::from_millis(250),
        // One full ring cadence.
        Cue::Ringtone => Duration::from_secs(6),
    }
}

/// Sample `clock / sample_rate` seconds into the cue.
fn tone_sample(cue: Cue, clock: u64, sample_rate: u32) -> f32 {
    let t = clock as f32 / sample_rate as f32;
    match cue {
        Cue::MessageAlert => {
            // Two quick ascending notes with a linear fade.
            let duration = 0.18;
            if t >= duration {
                return 0.0;
            }
            let freq = if t < 0.09 { 880.0 } else { 1318.5 };
            let envelope = 1.0 - t / duration;
            (t * freq * TAU).sin() * envelope * 0.6
        }
        Cue::Ringtone => {
            // Ring cadence: two seconds of dual tone, four of silence.
            let phase = t % 6.0;
            if phase >= 2.0 {
                return 0.0;
            }
            ((t * 440.0 * TAU).sin() + (t * 480.0 * TAU).sin()) * 0.35
        }
    }
}
