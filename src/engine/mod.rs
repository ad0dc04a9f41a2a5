//! Speech recognition engine.

pub mod whisper;

pub use whisper::{WhisperEngine, WhisperError};

/// Recognition seam used by the daemon state machine.
///
/// The real implementation is [`WhisperEngine`]; tests substitute fakes.
pub trait Transcriber {
    /// Transcribe mono 16 kHz f32 samples into text, trimmed of leading and
    /// trailing whitespace. Blocking; no timeout is imposed.
    fn transcribe(&self, samples: &[f32]) -> Result<String, WhisperError>;
}
