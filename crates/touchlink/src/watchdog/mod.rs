//! Keep-alive watchdog
//!
//! The runtime idles a session out when the headset's proximity sensor
//! reports nobody wearing it. The watchdog keeps it awake by launching the
//! vendor diagnostic tool, selecting its proximity bypass toggle, and then
//! re-toggling that property from a background thread.
//!
//! The owner starts and stops the task; the task itself only reads its
//! [`StopToken`] and reports a self-abort by moving its state cell back to
//! [`WatchdogState::Stopped`]. Each run gets its own state cell and token, so
//! a task abandoned after a join timeout can never disturb the next run.

mod controller;
mod locator;
mod scripted;
mod stop_token;
#[cfg(windows)]
mod win32;

pub use controller::{
    CommandLauncher, DebugToolController, ExternalToolController, Key, NoAutomation,
    ProcessLauncher, ToolError, WindowAutomation, WindowHandle,
};
pub use locator::{
    default_locator, ChainLocator, EnvLocator, FixedLocator, ToolLocator, DIAGNOSTICS_SUBDIR,
    RUNTIME_REGISTRY_KEY, RUNTIME_REGISTRY_VALUE,
};
pub use scripted::{ScriptedController, ToolEvent};
pub use stop_token::StopToken;
#[cfg(windows)]
pub use win32::{RegistryLocator, Win32Automation};

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use thiserror::Error;

use crate::core::{DebugToolConfig, WatchdogConfig};
use crate::events::LogChannel;

/// Watchdog lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WatchdogState {
    /// No task
    Stopped = 0,
    /// Task spawned, tool being brought up
    StartRequested = 1,
    /// Task pinging the tool
    Running = 2,
    /// Stop requested, waiting for the task to exit
    StopRequested = 3,
}

impl WatchdogState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::StartRequested,
            2 => Self::Running,
            3 => Self::StopRequested,
            _ => Self::Stopped,
        }
    }
}

/// Atomic [`WatchdogState`] shared between owner and task
#[derive(Debug)]
pub struct WatchdogStateCell(AtomicU8);

impl WatchdogStateCell {
    /// Cell holding `state`
    pub fn new(state: WatchdogState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// Current state
    pub fn load(&self) -> WatchdogState {
        WatchdogState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Overwrite the state
    pub fn store(&self, state: WatchdogState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move from `from` to `to`; false if the cell held something else
    pub fn transition(&self, from: WatchdogState, to: WatchdogState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Watchdog errors
#[derive(Error, Debug)]
pub enum WatchdogError {
    /// No install directory is known for the tool
    #[error("diagnostic tool location is unknown")]
    ToolNotFound,

    /// A task is already running
    #[error("keep-alive watchdog is already running")]
    AlreadyRunning,

    /// The previous run aborted too recently
    #[error("keep-alive watchdog restart deferred for {remaining:?}")]
    Backoff {
        /// Time left until a restart is allowed
        remaining: Duration,
    },

    /// The thread could not be spawned
    #[error("failed to spawn keep-alive watchdog: {0}")]
    Spawn(#[source] std::io::Error),

    /// The task did not exit in time and was abandoned
    #[error("keep-alive watchdog did not stop within {0:?}")]
    JoinTimeout(Duration),

    /// The task panicked
    #[error("keep-alive watchdog panicked")]
    Panicked,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Stopped,
    Aborted(Instant),
}

struct Run {
    state: Arc<WatchdogStateCell>,
    stop: StopToken,
    low_overhead: bool,
    handle: JoinHandle<()>,
    done: Receiver<RunOutcome>,
}

struct Task {
    controller: Arc<dyn ExternalToolController>,
    config: WatchdogConfig,
    ping_sentinel: u64,
    install_dir: PathBuf,
    reduce_res: bool,
    state: Arc<WatchdogStateCell>,
    stop: StopToken,
    log: LogChannel,
}

impl Task {
    fn run(self) -> RunOutcome {
        if self.controller.close_window() {
            log::debug!("Closed a stale diagnostic tool window");
        }
        if self.stop.wait(Duration::from_millis(self.config.close_settle_ms)) {
            return RunOutcome::Stopped;
        }

        if self.reduce_res {
            if let Err(err) = self.controller.apply_low_overhead_profile(&self.install_dir) {
                self.log.warn(format!("Could not apply the low overhead profile: {err}"));
            }
        }

        if let Err(err) = self.controller.ensure_running(&self.install_dir) {
            self.log.warn(format!("Diagnostic tool did not start, keep-alive disabled: {err}"));
            return self.abort();
        }
        if self.stop.wait(Duration::from_millis(self.config.verify_delay_ms)) {
            return RunOutcome::Stopped;
        }
        if !self.controller.is_running() {
            self.log.warn("Diagnostic tool window vanished after launch, keep-alive disabled");
            return self.abort();
        }

        if !self.state.transition(WatchdogState::StartRequested, WatchdogState::Running) {
            return RunOutcome::Stopped;
        }
        log::info!("Keep-alive watchdog running");

        let mut ticks = self.ping_sentinel;
        loop {
            if ticks == self.ping_sentinel {
                if let Err(err) = self.controller.keep_alive_ping() {
                    self.log.warn(format!("Keep-alive ping failed: {err}"));
                }
                ticks = 0;
            }
            ticks += 1;

            if self.stop.wait(self.config.tick()) {
                break;
            }
        }

        log::debug!("Keep-alive watchdog stopping");
        RunOutcome::Stopped
    }

    fn abort(&self) -> RunOutcome {
        self.state
            .transition(WatchdogState::StartRequested, WatchdogState::Stopped);
        RunOutcome::Aborted(Instant::now())
    }
}

/// Background keep-alive task and its handshake with the owner
pub struct ExternalToolWatchdog {
    controller: Arc<dyn ExternalToolController>,
    config: WatchdogConfig,
    ping_sentinel: u64,
    install_dir: Option<PathBuf>,
    log: LogChannel,
    run: Option<Run>,
    last_abort: Option<Instant>,
}

impl ExternalToolWatchdog {
    /// Idle watchdog driving `controller`
    pub fn new(
        controller: Arc<dyn ExternalToolController>,
        config: WatchdogConfig,
        tool: &DebugToolConfig,
        log: LogChannel,
    ) -> Self {
        Self {
            controller,
            config,
            ping_sentinel: tool.ping_sentinel_ticks.max(1),
            install_dir: None,
            log,
            run: None,
            last_abort: None,
        }
    }

    /// Set where the tool is installed; `None` makes `start` refuse
    pub fn set_install_dir(&mut self, dir: Option<PathBuf>) {
        self.install_dir = dir;
    }

    /// Tool install directory in use
    pub fn install_dir(&self) -> Option<&PathBuf> {
        self.install_dir.as_ref()
    }

    /// Current state
    pub fn state(&self) -> WatchdogState {
        self.run
            .as_ref()
            .map_or(WatchdogState::Stopped, |run| run.state.load())
    }

    /// True while a task is starting up or running
    pub fn is_started(&self) -> bool {
        matches!(
            self.state(),
            WatchdogState::StartRequested | WatchdogState::Running
        )
    }

    /// True while a stop is pending on the current task
    pub fn is_stop_requested(&self) -> bool {
        self.run
            .as_ref()
            .is_some_and(|run| run.stop.is_stop_requested())
    }

    /// True if a thread handle is held, even for a task that already exited
    pub fn has_task(&self) -> bool {
        self.run.is_some()
    }

    /// Spawn the keep-alive task
    pub fn start(&mut self, reduce_res: bool) -> Result<(), WatchdogError> {
        if self.is_started() {
            return Err(WatchdogError::AlreadyRunning);
        }
        self.reap()?;

        let install_dir = self.install_dir.clone().ok_or(WatchdogError::ToolNotFound)?;
        if let Some(aborted) = self.last_abort {
            let elapsed = aborted.elapsed();
            let backoff = self.config.restart_backoff();
            if elapsed < backoff {
                return Err(WatchdogError::Backoff {
                    remaining: backoff - elapsed,
                });
            }
        }

        let state = Arc::new(WatchdogStateCell::new(WatchdogState::StartRequested));
        let stop = StopToken::new();
        let (done_tx, done) = bounded(1);
        let task = Task {
            controller: Arc::clone(&self.controller),
            config: self.config.clone(),
            ping_sentinel: self.ping_sentinel,
            install_dir,
            reduce_res,
            state: Arc::clone(&state),
            stop: stop.clone(),
            log: self.log.clone(),
        };

        let handle = thread::Builder::new()
            .name("touchlink-watchdog".to_string())
            .spawn(move || {
                let outcome = task.run();
                let _ = done_tx.send(outcome);
            })
            .map_err(WatchdogError::Spawn)?;

        log::debug!("Keep-alive watchdog spawned");
        self.run = Some(Run {
            state,
            stop,
            low_overhead: reduce_res,
            handle,
            done,
        });
        Ok(())
    }

    /// Stop the task and wait for it, bounded by the join timeout
    ///
    /// Closes the tool window, and first restores the tool's default profile
    /// if this run applied the low overhead one.
    pub fn stop(&mut self) -> Result<(), WatchdogError> {
        let Some(run) = self.run.take() else {
            return Ok(());
        };

        if !run.state.transition(WatchdogState::Running, WatchdogState::StopRequested) {
            run.state
                .transition(WatchdogState::StartRequested, WatchdogState::StopRequested);
        }
        run.stop.request_stop();

        if run.low_overhead {
            if let Some(dir) = &self.install_dir {
                if let Err(err) = self.controller.restore_default_profile(dir) {
                    self.log.warn(format!("Could not restore the tool profile: {err}"));
                }
            }
        }
        if self.controller.close_window() {
            log::debug!("Closed the diagnostic tool window");
        }

        self.join(run)
    }

    fn reap(&mut self) -> Result<(), WatchdogError> {
        match self.run.take() {
            Some(run) => self.join(run),
            None => Ok(()),
        }
    }

    fn join(&mut self, run: Run) -> Result<(), WatchdogError> {
        let timeout = self.config.join_timeout();
        let result = match run.done.recv_timeout(timeout) {
            Ok(outcome) => {
                if let RunOutcome::Aborted(at) = outcome {
                    self.last_abort = Some(at);
                }
                run.handle.join().map_err(|_| WatchdogError::Panicked)
            }
            Err(RecvTimeoutError::Timeout) => {
                self.log.error(format!(
                    "Keep-alive watchdog did not stop within {timeout:?}, abandoning it"
                ));
                Err(WatchdogError::JoinTimeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = run.handle.join();
                self.log.error("Keep-alive watchdog panicked");
                Err(WatchdogError::Panicked)
            }
        };
        run.state.store(WatchdogState::Stopped);
        result
    }
}

impl Drop for ExternalToolWatchdog {
    fn drop(&mut self) {
        if self.run.is_some() {
            if let Err(err) = self.stop() {
                log::error!("Watchdog stop on drop failed: {err}");
            }
        }
    }
}

impl std::fmt::Debug for ExternalToolWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalToolWatchdog")
            .field("state", &self.state())
            .field("install_dir", &self.install_dir)
            .finish_non_exhaustive()
    }
}

/// Controller for the real tool on this platform
///
/// Window automation exists only on Windows; elsewhere the tool is never
/// found and the watchdog aborts on its first run.
pub fn platform_controller(
    tool: &DebugToolConfig,
    timings: &WatchdogConfig,
) -> Arc<dyn ExternalToolController> {
    #[cfg(windows)]
    let automation = Win32Automation;
    #[cfg(not(windows))]
    let automation = NoAutomation;

    Arc::new(DebugToolController::new(
        tool.clone(),
        timings,
        automation,
        CommandLauncher,
    ))
}
