//! Interactive stream control.
//!
//! While streaming, a control thread reads single keys and starts or stops
//! the stream through a [`StreamController`]. The main thread waits on a
//! [`QuitSignal`] until the operator quits.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use panorama_common::error::{PanoramaError, PanoramaResult};

use crate::framework::OutputStats;
use crate::session::{Phase, PipelineSession, StopReport};

/// Serializes start/stop requests against one session.
///
/// The stream is considered live exactly when the session is `Running`;
/// that state is only read or changed with the lock held.
pub struct StreamController {
    session: Mutex<PipelineSession>,
}

impl StreamController {
    pub fn new(session: PipelineSession) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }

    fn session(&self) -> MutexGuard<'_, PipelineSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run every setup step up to `EncodersReady`.
    pub fn prepare(&self) -> PanoramaResult<()> {
        let mut session = self.session();
        session.init()?;
        session.setup_sources()?;
        session.setup_encoding()
    }

    pub fn start_streaming(&self) -> PanoramaResult<()> {
        let mut session = self.session();
        if session.phase() == Phase::Running {
            return Err(PanoramaError::AlreadyStreaming);
        }
        session.start()
    }

    pub fn stop_streaming(&self) -> PanoramaResult<StopReport> {
        let mut session = self.session();
        if session.phase() != Phase::Running {
            return Err(PanoramaError::NotStreaming);
        }
        session.stop()
    }

    pub fn is_streaming(&self) -> bool {
        self.session().phase() == Phase::Running
    }

    pub fn stats(&self) -> PanoramaResult<OutputStats> {
        self.session().stats()
    }

    pub fn phase(&self) -> Phase {
        self.session().phase()
    }

    /// Release everything. Stops the stream first if it is live.
    pub fn shutdown(&self) {
        self.session().teardown();
    }

    /// Run `f` with the session locked.
    pub fn with_session<R>(&self, f: impl FnOnce(&PipelineSession) -> R) -> R {
        f(&self.session())
    }
}

/// One-shot flag the main thread can block on.
#[derive(Debug, Default)]
pub struct QuitSignal {
    raised: AtomicBool,
    lock: Mutex<()>,
    cvar: Condvar,
}

impl QuitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.cvar.notify_all();
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Block until raised.
    pub fn wait(&self) {
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !self.is_raised() {
            guard = self
                .cvar
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until raised or `timeout` elapses. Returns whether it was raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (_guard, _) = self
            .cvar
            .wait_timeout_while(guard, timeout, |_| !self.is_raised())
            .unwrap_or_else(PoisonError::into_inner);
        self.is_raised()
    }
}

/// Operator commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Stop,
    Info,
    Quit,
}

impl ControlCommand {
    /// Parse a key, ignoring case.
    pub fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            's' => Some(Self::Start),
            't' => Some(Self::Stop),
            'i' => Some(Self::Info),
            'q' => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Source of single key presses.
pub trait KeySource: Send {
    /// Wait up to `timeout` for a key.
    fn poll_key(&mut self, timeout: Duration) -> PanoramaResult<Option<char>>;
}

/// Reads keys from the terminal.
///
/// The terminal is left in its normal mode, so on most platforms keys are
/// delivered once Enter is pressed.
#[derive(Debug, Default)]
pub struct TerminalKeys;

impl KeySource for TerminalKeys {
    fn poll_key(&mut self, timeout: Duration) -> PanoramaResult<Option<char>> {
        if !event::poll(timeout)? {
            return Ok(None);
        }
        match event::read()? {
            Event::Key(KeyEvent {
                code: KeyCode::Char(c),
                kind: KeyEventKind::Press,
                ..
            }) => Ok(Some(c)),
            _ => Ok(None),
        }
    }
}

/// Replays a fixed key sequence, then reports no input.
#[derive(Debug, Default)]
pub struct ScriptedKeys {
    keys: VecDeque<Option<char>>,
}

impl ScriptedKeys {
    /// `None` entries stand for a poll with no key pressed.
    pub fn new(keys: impl IntoIterator<Item = Option<char>>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// Every character of `keys`, in order.
    pub fn typed(keys: &str) -> Self {
        Self::new(keys.chars().map(Some))
    }
}

impl KeySource for ScriptedKeys {
    fn poll_key(&mut self, timeout: Duration) -> PanoramaResult<Option<char>> {
        match self.keys.pop_front() {
            Some(key) => Ok(key),
            None => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

/// Read keys and act on them until `Q` is pressed or `quit` is raised.
///
/// Start/stop failures are logged and the loop continues. A broken key
/// source raises `quit` and ends the loop with its error.
pub fn run_control_loop(
    controller: &StreamController,
    keys: &mut dyn KeySource,
    quit: &QuitSignal,
    poll_interval: Duration,
) -> PanoramaResult<()> {
    while !quit.is_raised() {
        let key = match keys.poll_key(poll_interval) {
            Ok(Some(key)) => key,
            Ok(None) => continue,
            Err(e) => {
                tracing::error!(error = %e, "Keyboard input failed; quitting");
                quit.raise();
                return Err(e);
            }
        };

        match ControlCommand::from_key(key) {
            Some(ControlCommand::Start) => match controller.start_streaming() {
                Ok(()) => tracing::info!("Streaming started"),
                Err(PanoramaError::AlreadyStreaming) => tracing::warn!("Already streaming"),
                Err(e) => tracing::error!(error = %e, "Failed to start streaming"),
            },
            Some(ControlCommand::Stop) => match controller.stop_streaming() {
                Ok(report) => log_stop(&report),
                Err(PanoramaError::NotStreaming) => tracing::warn!("Not currently streaming"),
                Err(e) => tracing::error!(error = %e, "Failed to stop streaming"),
            },
            Some(ControlCommand::Info) => match controller.stats() {
                Ok(stats) => tracing::info!(
                    uptime_secs = stats.uptime_secs,
                    frames = stats.frames_captured,
                    dropped = stats.frames_dropped,
                    drop_rate_pct = stats.drop_rate(),
                    congestion = stats.congestion,
                    megabytes = stats.megabytes_written(),
                    "Stream statistics"
                ),
                Err(_) => tracing::warn!("Not currently streaming; no statistics"),
            },
            Some(ControlCommand::Quit) => {
                tracing::info!("Quit requested");
                if controller.is_streaming() {
                    match controller.stop_streaming() {
                        Ok(report) => log_stop(&report),
                        Err(e) => tracing::warn!(error = %e, "Stop on quit failed"),
                    }
                }
                quit.raise();
            }
            None => tracing::warn!(key = %key, "Unknown command (use S, T, I or Q)"),
        }
    }
    Ok(())
}

fn log_stop(report: &StopReport) {
    tracing::info!(
        forced = report.forced,
        waited_ms = report.waited.as_millis() as u64,
        frames = report.stats.frames_captured,
        "Streaming stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn keys_are_case_insensitive() {
        assert_eq!(ControlCommand::from_key('s'), Some(ControlCommand::Start));
        assert_eq!(ControlCommand::from_key('S'), Some(ControlCommand::Start));
        assert_eq!(ControlCommand::from_key('T'), Some(ControlCommand::Stop));
        assert_eq!(ControlCommand::from_key('i'), Some(ControlCommand::Info));
        assert_eq!(ControlCommand::from_key('Q'), Some(ControlCommand::Quit));
        assert_eq!(ControlCommand::from_key('x'), None);
    }

    #[test]
    fn quit_signal_wakes_waiter() {
        let signal = Arc::new(QuitSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.wait())
        };
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
        signal.raise();
        waiter.join().unwrap();
        assert!(signal.is_raised());
        assert!(signal.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn scripted_keys_replay_then_go_quiet() {
        let mut keys = ScriptedKeys::new([Some('s'), None, Some('q')]);
        let tick = Duration::from_millis(1);
        assert_eq!(keys.poll_key(tick).unwrap(), Some('s'));
        assert_eq!(keys.poll_key(tick).unwrap(), None);
        assert_eq!(keys.poll_key(tick).unwrap(), Some('q'));
        assert_eq!(keys.poll_key(tick).unwrap(), None);
    }
}
