//! Background daemon for toggle-driven dictation.
//!
//! The daemon:
//! 1. Loads and keeps the Whisper model in memory
//! 2. Starts recording immediately once the model is loaded
//! 3. Flips between recording and idle on SIGUSR1
//! 4. Transcribes the buffered audio on every stop and types the result
//! 5. Shuts itself down after five idle minutes
//!
//! Lifecycle: LOADING -> RECORDING <-> IDLE_COUNTDOWN -> SHUTDOWN. All
//! transitions happen on the task draining the event channel; toggle,
//! shutdown, and timer expiry are unified into that one ordered stream.

use crate::config::{Config, ConfigError};
use crate::engine::{Transcriber, WhisperEngine, WhisperError};
use crate::input::{AudioError, AudioRecorder, Capture, SAMPLE_RATE};
use crate::output::{CommandInjector, Inject};
use crate::status::{Status, StatusFile};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// How long the daemon lingers without a toggle before exiting
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Whisper error: {0}")]
    Whisper(#[from] WhisperError),

    #[error("Daemon already running")]
    AlreadyRunning,

    #[error("Daemon not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Events driving the state machine.
///
/// Toggle and shutdown arrive as signals; the idle timer posts its expiry
/// into the same channel so the main task has a single blocking receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// SIGUSR1: flip between recording and idle
    Toggle,
    /// SIGTERM/SIGINT: flush if recording, then exit
    Shutdown,
    /// The idle countdown elapsed. Stale generations are ignored.
    IdleTimeout { generation: u64 },
}

/// Recording lifecycle state machine.
///
/// Owns the capture stream, the engine, and the injection command. While
/// recording no idle countdown is pending, and vice versa.
pub struct Daemon<R, E, O> {
    recorder: R,
    engine: E,
    output: O,
    status: StatusFile,
    recording: bool,
    /// Bumped on every recording transition; an IdleTimeout only fires if
    /// its generation still matches.
    idle_generation: u64,
    events: mpsc::Sender<Event>,
}

impl<R: Capture, E: Transcriber, O: Inject> Daemon<R, E, O> {
    pub fn new(
        recorder: R,
        engine: E,
        output: O,
        status: StatusFile,
        events: mpsc::Sender<Event>,
    ) -> Self {
        Self {
            recorder,
            engine,
            output,
            status,
            recording: false,
            idle_generation: 0,
            events,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Main loop: record immediately, then drain events until shutdown
    pub async fn run(&mut self, events: &mut mpsc::Receiver<Event>) -> Result<(), DaemonError> {
        self.start_recording()?;

        while let Some(event) = events.recv().await {
            if !self.handle_event(event)? {
                break;
            }
        }

        Ok(())
    }

    /// Apply one event. Returns false when the daemon should exit.
    fn handle_event(&mut self, event: Event) -> Result<bool, DaemonError> {
        match event {
            Event::Toggle => {
                if self.recording {
                    self.stop_recording();
                    // Re-armed only after the stop sequence, including the
                    // blocking transcription, has fully completed
                    self.arm_idle_timer();
                } else {
                    self.start_recording()?;
                }
                Ok(true)
            }

            Event::Shutdown => {
                info!("Shutdown requested");
                if self.recording {
                    self.stop_recording();
                }
                Ok(false)
            }

            Event::IdleTimeout { generation } => {
                if !self.recording && generation == self.idle_generation {
                    info!("Idle timeout, shutting down");
                    Ok(false)
                } else {
                    debug!("Ignoring stale idle timeout (generation {})", generation);
                    Ok(true)
                }
            }
        }
    }

    /// Open the capture stream with an empty buffer and disarm any pending
    /// idle countdown
    fn start_recording(&mut self) -> Result<(), DaemonError> {
        self.idle_generation += 1;
        self.recorder.start()?;
        self.recording = true;
        self.status.set(Status::Recording);
        info!("Recording...");
        Ok(())
    }

    /// Stop capture, transcribe whatever was buffered, type the result.
    ///
    /// Empty audio skips the engine; a transcript that is blank after
    /// trimming skips injection. Engine and injection failures are logged
    /// and the daemon carries on.
    fn stop_recording(&mut self) {
        self.recording = false;
        let samples = self.recorder.stop();
        self.status.set(Status::Clear);

        if samples.is_empty() {
            info!("No audio");
            return;
        }

        info!(
            "Transcribing {:.1}s...",
            samples.len() as f32 / SAMPLE_RATE as f32
        );

        let text = match self.engine.transcribe(&samples) {
            Ok(text) => text,
            Err(e) => {
                error!("Transcription failed: {}", e);
                return;
            }
        };

        let text = text.trim();
        if text.is_empty() {
            info!("Empty transcript");
            return;
        }

        match self.output.inject(text) {
            Ok(()) => info!("Typed: {}", text),
            Err(e) => error!("Injection failed: {}", e),
        }
    }

    /// Schedule an idle expiry event for the current generation
    fn arm_idle_timer(&mut self) {
        self.idle_generation += 1;
        let generation = self.idle_generation;
        let events = self.events.clone();

        tokio::spawn(async move {
            tokio::time::sleep(IDLE_TIMEOUT).await;
            let _ = events.send(Event::IdleTimeout { generation }).await;
        });

        debug!("Idle countdown armed (generation {})", generation);
    }
}

/// Get the PID record path
fn pid_file() -> Result<PathBuf, DaemonError> {
    Ok(crate::config::runtime_dir()?.join("sotto.pid"))
}

/// Read the PID record at the well-known path and verify the process is
/// alive
pub fn live_pid() -> Option<i32> {
    live_pid_at(&pid_file().ok()?)
}

/// Read a PID record and verify the referenced process is alive.
///
/// The probe is non-destructive (signal 0). A missing or garbage record, or
/// a stale one referencing a dead process, reads as "not running".
pub(crate) fn live_pid_at(path: &Path) -> Option<i32> {
    let pid = std::fs::read_to_string(path).ok()?.trim().parse::<i32>().ok()?;

    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        if kill(Pid::from_raw(pid), None).is_ok() {
            Some(pid)
        } else {
            None
        }
    }

    #[cfg(not(unix))]
    {
        Some(pid)
    }
}

/// Write the PID record at the well-known path
fn write_pid() -> Result<(), DaemonError> {
    write_pid_at(&pid_file()?)
}

/// Write this process's PID, overwriting any stale value
fn write_pid_at(path: &Path) -> Result<(), DaemonError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, std::process::id().to_string())?;
    Ok(())
}

/// Remove the PID record at the well-known path
fn remove_pid() -> Result<(), DaemonError> {
    remove_pid_at(&pid_file()?)
}

fn remove_pid_at(path: &Path) -> Result<(), DaemonError> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// Forward toggle and shutdown signals into the event channel
#[cfg(unix)]
fn spawn_signal_listeners(events: mpsc::Sender<Event>) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut toggle = signal(SignalKind::user_defined1())?;
    let tx = events.clone();
    tokio::spawn(async move {
        while toggle.recv().await.is_some() {
            let _ = tx.send(Event::Toggle).await;
        }
    });

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = terminate.recv() => {}
            _ = interrupt.recv() => {}
        }
        let _ = events.send(Event::Shutdown).await;
    });

    Ok(())
}

#[cfg(not(unix))]
fn spawn_signal_listeners(events: mpsc::Sender<Event>) -> std::io::Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = events.send(Event::Shutdown).await;
        }
    });
    Ok(())
}

/// Run the daemon until toggled off and idle, or told to shut down
pub async fn run() -> Result<(), DaemonError> {
    if live_pid().is_some() {
        return Err(DaemonError::AlreadyRunning);
    }

    let config = Config::load()?;
    write_pid()?;

    let status = StatusFile::at_default_path()?;
    let result = run_inner(&config, &status).await;

    status.set(Status::Clear);
    remove_pid()?;

    match &result {
        Ok(()) => info!("Daemon stopped"),
        Err(e) => error!("Daemon failed: {}", e),
    }
    result
}

async fn run_inner(config: &Config, status: &StatusFile) -> Result<(), DaemonError> {
    status.set(Status::Loading);

    let model_path = config.model_path()?;
    info!("Loading model {}...", model_path.display());
    let engine = WhisperEngine::new(&model_path, &config.transcription.language)?;
    info!("Model loaded");

    let recorder = AudioRecorder::new()?;
    let output = CommandInjector::new(&config.output.inject_command);

    let (tx, mut rx) = mpsc::channel(16);

    // Registered only now: a toggle sent while the model was loading would
    // otherwise stop the auto-started recording immediately
    spawn_signal_listeners(tx.clone())?;

    let mut daemon = Daemon::new(
        recorder,
        engine,
        output,
        StatusFile::at_default_path()?,
        tx,
    );
    daemon.run(&mut rx).await
}

/// Send a graceful-shutdown signal to a running daemon
pub fn stop() -> Result<(), DaemonError> {
    let pid = live_pid().ok_or(DaemonError::NotRunning)?;

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        kill(Pid::from_raw(pid), Signal::SIGTERM)
            .map_err(|e| DaemonError::Io(std::io::Error::other(e)))?;
        info!("Sent SIGTERM to daemon (PID: {})", pid);
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        error!("Stop not implemented on this platform");
    }

    Ok(())
}

/// Report whether a daemon is running
pub fn status() -> Result<(), DaemonError> {
    match live_pid() {
        Some(pid) => println!("sotto daemon is running (PID: {})", pid),
        None => println!("sotto daemon is not running"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeRecorderState {
        starts: usize,
        stops: usize,
        recording: bool,
        /// Samples returned by the next stop
        buffered: Vec<f32>,
    }

    #[derive(Clone, Default)]
    struct FakeRecorder(Arc<Mutex<FakeRecorderState>>);

    impl Capture for FakeRecorder {
        fn start(&mut self) -> Result<(), AudioError> {
            let mut state = self.0.lock().unwrap();
            state.starts += 1;
            state.recording = true;
            Ok(())
        }

        fn stop(&mut self) -> Vec<f32> {
            let mut state = self.0.lock().unwrap();
            state.stops += 1;
            state.recording = false;
            std::mem::take(&mut state.buffered)
        }
    }

    #[derive(Default)]
    struct FakeEngineState {
        /// Sample count of each transcribe call
        calls: Vec<usize>,
        reply: String,
    }

    #[derive(Clone, Default)]
    struct FakeEngine(Arc<Mutex<FakeEngineState>>);

    impl Transcriber for FakeEngine {
        fn transcribe(&self, samples: &[f32]) -> Result<String, WhisperError> {
            let mut state = self.0.lock().unwrap();
            state.calls.push(samples.len());
            Ok(state.reply.clone())
        }
    }

    #[derive(Clone, Default)]
    struct FakeInjector(Arc<Mutex<Vec<String>>>);

    impl Inject for FakeInjector {
        fn inject(&self, text: &str) -> Result<(), crate::output::InjectError> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct Harness {
        recorder: FakeRecorder,
        engine: FakeEngine,
        injector: FakeInjector,
        daemon: Daemon<FakeRecorder, FakeEngine, FakeInjector>,
        events: mpsc::Receiver<Event>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let status = StatusFile::new(dir.path().join("status"));
        let (tx, rx) = mpsc::channel(16);

        let recorder = FakeRecorder::default();
        let engine = FakeEngine::default();
        let injector = FakeInjector::default();

        let daemon = Daemon::new(
            recorder.clone(),
            engine.clone(),
            injector.clone(),
            status,
            tx,
        );

        Harness {
            recorder,
            engine,
            injector,
            daemon,
            events: rx,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn toggles_alternate_recording_and_idle() {
        let mut h = harness();
        h.daemon.start_recording().unwrap();
        assert!(h.daemon.is_recording());

        // Odd toggle count -> idle, even -> recording
        for count in 1..=6 {
            assert!(h.daemon.handle_event(Event::Toggle).unwrap());
            assert_eq!(h.daemon.is_recording(), count % 2 == 0);
        }
    }

    #[tokio::test]
    async fn empty_buffer_skips_engine_and_injection() {
        let mut h = harness();
        h.daemon.start_recording().unwrap();

        assert!(h.daemon.handle_event(Event::Toggle).unwrap());

        assert!(h.engine.0.lock().unwrap().calls.is_empty());
        assert!(h.injector.0.lock().unwrap().is_empty());
        // The stop still transitions into the idle countdown
        assert!(!h.daemon.is_recording());
    }

    #[tokio::test]
    async fn blank_transcript_skips_injection() {
        let mut h = harness();
        h.engine.0.lock().unwrap().reply = "  \n ".to_string();
        h.daemon.start_recording().unwrap();
        h.recorder.0.lock().unwrap().buffered = vec![0.0; 16_000];

        h.daemon.handle_event(Event::Toggle).unwrap();

        assert_eq!(h.engine.0.lock().unwrap().calls.len(), 1);
        assert!(h.injector.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transcript_is_trimmed_and_injected() {
        let mut h = harness();
        h.engine.0.lock().unwrap().reply = " hello world \n".to_string();
        h.daemon.start_recording().unwrap();
        h.recorder.0.lock().unwrap().buffered = vec![0.0; 16_000];

        h.daemon.handle_event(Event::Toggle).unwrap();

        assert_eq!(*h.injector.0.lock().unwrap(), vec!["hello world"]);
    }

    #[tokio::test]
    async fn three_seconds_of_silence_scenario() {
        // 3s of silence at 16 kHz -> engine called once with 48000 samples,
        // empty transcript -> no injection, daemon idles
        let mut h = harness();
        h.daemon.start_recording().unwrap();
        h.recorder.0.lock().unwrap().buffered = vec![0.0; 48_000];

        h.daemon.handle_event(Event::Toggle).unwrap();

        assert_eq!(*h.engine.0.lock().unwrap().calls, vec![48_000]);
        assert!(h.injector.0.lock().unwrap().is_empty());
        assert!(!h.daemon.is_recording());
    }

    #[tokio::test]
    async fn resume_restarts_capture_with_fresh_buffer() {
        let mut h = harness();
        h.daemon.start_recording().unwrap();
        h.recorder.0.lock().unwrap().buffered = vec![0.0; 16_000];

        h.daemon.handle_event(Event::Toggle).unwrap(); // stop, consumes buffer
        h.daemon.handle_event(Event::Toggle).unwrap(); // resume
        h.daemon.handle_event(Event::Toggle).unwrap(); // stop again, empty span

        // No carry-over: the second stop saw no audio
        assert_eq!(h.engine.0.lock().unwrap().calls.len(), 1);
        assert_eq!(h.recorder.0.lock().unwrap().starts, 2);
        assert_eq!(h.recorder.0.lock().unwrap().stops, 2);
    }

    #[tokio::test]
    async fn shutdown_while_recording_flushes_first() {
        let mut h = harness();
        h.engine.0.lock().unwrap().reply = "flush me".to_string();
        h.daemon.start_recording().unwrap();
        h.recorder.0.lock().unwrap().buffered = vec![0.0; 16_000];

        let keep_running = h.daemon.handle_event(Event::Shutdown).unwrap();

        assert!(!keep_running);
        assert_eq!(h.engine.0.lock().unwrap().calls.len(), 1);
        assert_eq!(*h.injector.0.lock().unwrap(), vec!["flush me"]);
    }

    #[tokio::test]
    async fn shutdown_while_idle_exits_without_transcribing() {
        let mut h = harness();
        h.daemon.start_recording().unwrap();
        h.daemon.handle_event(Event::Toggle).unwrap();

        let keep_running = h.daemon.handle_event(Event::Shutdown).unwrap();

        assert!(!keep_running);
        assert!(h.engine.0.lock().unwrap().calls.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_shuts_the_daemon_down() {
        let mut h = harness();
        h.daemon.start_recording().unwrap();
        h.daemon.handle_event(Event::Toggle).unwrap(); // arms the countdown

        tokio::time::advance(IDLE_TIMEOUT + Duration::from_secs(1)).await;

        let event = h.events.recv().await.unwrap();
        assert!(matches!(event, Event::IdleTimeout { .. }));
        assert!(!h.daemon.handle_event(event).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_during_countdown_disarms_the_timer() {
        let mut h = harness();
        h.daemon.start_recording().unwrap();
        h.daemon.handle_event(Event::Toggle).unwrap(); // idle, timer armed

        tokio::time::advance(IDLE_TIMEOUT / 2).await;
        h.daemon.handle_event(Event::Toggle).unwrap(); // back to recording

        tokio::time::advance(IDLE_TIMEOUT).await;

        // The stale expiry arrives but must not shut the daemon down
        let event = h.events.recv().await.unwrap();
        assert!(matches!(event, Event::IdleTimeout { .. }));
        assert!(h.daemon.handle_event(event).unwrap());
        assert!(h.daemon.is_recording());
    }

    #[test]
    fn pid_record_of_this_process_reads_as_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sotto.pid");
        std::fs::write(&path, std::process::id().to_string()).unwrap();

        assert_eq!(live_pid_at(&path), Some(std::process::id() as i32));
    }

    #[cfg(unix)]
    #[test]
    fn stale_record_of_a_dead_process_reads_as_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sotto.pid");

        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap(); // reaped: the PID no longer names a process

        std::fs::write(&path, pid.to_string()).unwrap();
        assert_eq!(live_pid_at(&path), None);
    }

    #[test]
    fn missing_or_garbage_record_reads_as_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sotto.pid");

        assert_eq!(live_pid_at(&path), None);

        std::fs::write(&path, "not a pid").unwrap();
        assert_eq!(live_pid_at(&path), None);
    }

    #[test]
    fn pid_record_is_overwritten_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        // Nested path exercises parent-directory creation
        let path = dir.path().join("run").join("sotto.pid");

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "99999999").unwrap(); // stale value

        write_pid_at(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            std::process::id().to_string()
        );

        // Clean shutdown deletes the record; a second removal is a no-op
        remove_pid_at(&path).unwrap();
        assert!(!path.exists());
        remove_pid_at(&path).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn each_stop_arms_a_fresh_countdown() {
        let mut h = harness();
        h.daemon.start_recording().unwrap();
        h.daemon.handle_event(Event::Toggle).unwrap(); // stop #1, timer g1
        h.daemon.handle_event(Event::Toggle).unwrap(); // resume
        h.daemon.handle_event(Event::Toggle).unwrap(); // stop #2, timer g2

        tokio::time::advance(IDLE_TIMEOUT + Duration::from_secs(1)).await;

        // Both expiries arrive; exactly the fresh one shuts the daemon down
        let first = h.events.recv().await.unwrap();
        let second = h.events.recv().await.unwrap();
        let keep_first = h.daemon.handle_event(first).unwrap();
        let keep_second = h.daemon.handle_event(second).unwrap();
        assert_ne!(keep_first, keep_second);
    }
}
