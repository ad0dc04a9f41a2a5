//! Transcript delivery to the focused application.

pub mod inject;

pub use inject::{CommandInjector, InjectError};

/// Injection seam used by the daemon state machine.
///
/// The real implementation is [`CommandInjector`]; tests substitute fakes.
pub trait Inject {
    /// Deliver the transcript to the active application.
    fn inject(&self, text: &str) -> Result<(), InjectError>;
}
