//! Audio capture using cpal.
//!
//! Captures mono f32 at 16 kHz for Whisper. The capture subsystem pushes
//! sample blocks from its own callback thread; the daemon only appends them
//! to the current buffer while the recording flag is set.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::Capture;

/// Capture sample rate, matching what Whisper expects
pub const SAMPLE_RATE: u32 = 16_000;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio input device found")]
    NoInputDevice,

    #[error("Failed to build audio stream: {0}")]
    StreamBuildFailed(String),

    #[error("Failed to start audio stream: {0}")]
    StreamStartFailed(String),

    #[error("Already recording")]
    AlreadyRecording,
}

/// Microphone recorder: one input stream per recording span.
///
/// The stream is opened at `start` and dropped at `stop`; blocks delivered
/// by the callback are kept in arrival order and concatenated once, at stop
/// time.
pub struct AudioRecorder {
    device: Device,
    config: StreamConfig,
    recording: Arc<AtomicBool>,
    blocks: Arc<Mutex<Vec<Vec<f32>>>>,
    stream: Option<Stream>,
}

impl AudioRecorder {
    /// Create a recorder on the default input device
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or(AudioError::NoInputDevice)?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        info!("Using audio input device: {}", device_name);

        let config = StreamConfig {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            buffer_size: cpal::BufferSize::Default,
        };

        Ok(Self {
            device,
            config,
            recording: Arc::new(AtomicBool::new(false)),
            blocks: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }
}

impl Capture for AudioRecorder {
    fn start(&mut self) -> Result<(), AudioError> {
        if self.recording.load(Ordering::SeqCst) {
            return Err(AudioError::AlreadyRecording);
        }

        // Clear blocks from the previous span
        {
            let mut blocks = self.blocks.lock().unwrap_or_else(|poisoned| {
                warn!("Block buffer mutex was poisoned, recovering");
                poisoned.into_inner()
            });
            blocks.clear();
        }

        self.recording.store(true, Ordering::SeqCst);

        let recording = self.recording.clone();
        let blocks = self.blocks.clone();

        let err_fn = |err| error!("Audio stream error: {}", err);

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // A block arriving after the flag flips false is dropped,
                    // never retroactively appended. A block landing exactly at
                    // the stop boundary may go either way.
                    if recording.load(Ordering::SeqCst) {
                        if let Ok(mut blocks) = blocks.lock() {
                            blocks.push(data.to_vec());
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamBuildFailed(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamStartFailed(e.to_string()))?;

        self.stream = Some(stream);
        debug!("Audio recording started");

        Ok(())
    }

    fn stop(&mut self) -> Vec<f32> {
        self.recording.store(false, Ordering::SeqCst);

        // Dropping the stream closes it; no further blocks are accepted
        self.stream = None;

        let blocks = {
            let mut blocks = self.blocks.lock().unwrap_or_else(|poisoned| {
                warn!("Block buffer mutex was poisoned, recovering");
                poisoned.into_inner()
            });
            std::mem::take(&mut *blocks)
        };

        let samples = blocks.concat();
        debug!(
            "Audio recording stopped: {} samples ({:.2}s at {} Hz)",
            samples.len(),
            samples.len() as f32 / SAMPLE_RATE as f32,
            SAMPLE_RATE
        );

        samples
    }
}
