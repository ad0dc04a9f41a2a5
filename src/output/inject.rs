//! Types transcripts into the active window via an external command.
//!
//! The command (default `wtype --`) is run with the transcript appended as a
//! single final argument. Failures are surfaced to the caller, which logs
//! them and carries on; a broken typing tool must not take the daemon down.

use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

use super::Inject;

#[derive(Error, Debug)]
pub enum InjectError {
    #[error("Injection command is empty")]
    EmptyCommand,

    #[error("Failed to run injection command '{0}': {1}")]
    SpawnFailed(String, std::io::Error),

    #[error("Injection command '{0}' exited with {1}")]
    CommandFailed(String, std::process::ExitStatus),
}

/// Runs a configured external typing command.
pub struct CommandInjector {
    command: Vec<String>,
}

impl CommandInjector {
    pub fn new(command: &[String]) -> Self {
        Self {
            command: command.to_vec(),
        }
    }
}

impl Inject for CommandInjector {
    fn inject(&self, text: &str) -> Result<(), InjectError> {
        let (program, args) = self.command.split_first().ok_or(InjectError::EmptyCommand)?;

        debug!("Injecting {} characters via {}", text.len(), program);

        let status = Command::new(program)
            .args(args)
            .arg(text)
            .status()
            .map_err(|e| InjectError::SpawnFailed(program.clone(), e))?;

        if !status.success() {
            return Err(InjectError::CommandFailed(program.clone(), status));
        }

        info!("Typed {} characters", text.len());
        Ok(())
    }
}
