//! Status indicator file consumed by an external status-bar widget.
//!
//! The file is overwritten on every daemon state transition with a pango
//! markup marker (or emptied when nothing is happening). It is a best-effort
//! side channel: write failures never affect the daemon.

use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::config::{self, ConfigError};

/// Marker shown while the model is loading
pub const STATUS_LOADING: &str = "<span color=\"#fabd2f\">\u{25cf} LOAD</span>";

/// Marker shown while recording
pub const STATUS_RECORDING: &str = "<span color=\"#fb4934\">\u{25cf} REC</span>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Loading,
    Recording,
    /// Idle / recording stopped: the indicator is emptied
    Clear,
}

impl Status {
    fn marker(self) -> &'static str {
        match self {
            Status::Loading => STATUS_LOADING,
            Status::Recording => STATUS_RECORDING,
            Status::Clear => "",
        }
    }
}

/// Writes state transitions to the status indicator file.
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Status file at the well-known runtime path
    pub fn at_default_path() -> Result<Self, ConfigError> {
        Ok(Self::new(config::runtime_dir()?.join("sotto-status")))
    }

    /// Overwrite the indicator. Failures are logged and ignored.
    pub fn set(&self, status: Status) {
        if let Err(e) = fs::write(&self.path, status.marker()) {
            debug!("Status write failed (ignored): {}", e);
        }
    }
}
