//! Microphone capture.

pub mod audio;

pub use audio::{AudioError, AudioRecorder, SAMPLE_RATE};

/// Capture seam used by the daemon state machine.
///
/// The real implementation is [`AudioRecorder`]; tests substitute fakes.
pub trait Capture {
    /// Open the input stream and begin buffering sample blocks.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Close the stream and return all samples buffered since `start`,
    /// concatenated into one contiguous array.
    fn stop(&mut self) -> Vec<f32>;
}
