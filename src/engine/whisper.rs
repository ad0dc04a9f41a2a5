//! Whisper transcription engine using whisper-rs.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::Transcriber;
use crate::input::SAMPLE_RATE;

/// Whisper rejects audio shorter than 1s; shorter recordings are padded
/// with silence. 1.1s leaves headroom for rounding.
const WHISPER_MIN_SAMPLES: usize = (SAMPLE_RATE as f32 * 1.1) as usize;

#[derive(Error, Debug)]
pub enum WhisperError {
    #[error("Model not found at {0}. Run 'sotto config --model <name>' and download the model")]
    ModelNotFound(PathBuf),

    #[error("Failed to load model: {0}")]
    LoadFailed(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),
}

/// Whisper transcription engine, loaded once and kept resident.
pub struct WhisperEngine {
    ctx: WhisperContext,
    language: String,
}

impl WhisperEngine {
    /// Load the model from disk. Blocking and potentially slow (seconds).
    pub fn new(model_path: &Path, language: &str) -> Result<Self, WhisperError> {
        info!("Loading Whisper model from: {}", model_path.display());

        if !model_path.exists() {
            return Err(WhisperError::ModelNotFound(model_path.to_path_buf()));
        }

        let params = WhisperContextParameters::default();

        let ctx =
            WhisperContext::new_with_params(model_path.to_str().unwrap_or_default(), params)
                .map_err(|e| WhisperError::LoadFailed(format!("{:?}", e)))?;

        info!("Whisper model loaded successfully");

        Ok(Self {
            ctx,
            language: language.to_string(),
        })
    }
}

impl Transcriber for WhisperEngine {
    fn transcribe(&self, samples: &[f32]) -> Result<String, WhisperError> {
        let start_time = std::time::Instant::now();

        debug!(
            "Transcribing {:.2}s of audio ({} samples)",
            samples.len() as f32 / SAMPLE_RATE as f32,
            samples.len()
        );

        let samples = pad_to_whisper_min(samples.to_vec());

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| WhisperError::TranscriptionFailed(format!("{:?}", e)))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        if self.language != "auto" {
            params.set_language(Some(&self.language));
        }

        // Disable printing to avoid cluttering output
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, &samples)
            .map_err(|e| WhisperError::TranscriptionFailed(format!("{:?}", e)))?;

        let num_segments = state
            .full_n_segments()
            .map_err(|e| WhisperError::TranscriptionFailed(format!("{:?}", e)))?;

        // Segment texts are concatenated in the order produced
        let mut text = String::new();
        for i in 0..num_segments {
            if let Ok(segment) = state.full_get_segment_text(i) {
                text.push_str(&segment);
            }
        }

        let text = text.trim().to_string();

        info!(
            "Transcription complete ({} chars, {}ms)",
            text.len(),
            start_time.elapsed().as_millis()
        );

        Ok(text)
    }
}

/// Pad short audio with trailing silence up to Whisper's minimum
fn pad_to_whisper_min(mut samples: Vec<f32>) -> Vec<f32> {
    if !samples.is_empty() && samples.len() < WHISPER_MIN_SAMPLES {
        let padding = WHISPER_MIN_SAMPLES - samples.len();
        debug!(
            "Padding audio with {} samples of silence ({:.0}ms)",
            padding,
            padding as f32 / SAMPLE_RATE as f32 * 1000.0
        );
        samples.resize(WHISPER_MIN_SAMPLES, 0.0);
    }
    samples
}
