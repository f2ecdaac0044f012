//! Scriptable in-process diagnostic tool
//!
//! Records every capability call and lets the caller decide whether the tool
//! window shows up, how long a launch takes and whether calls fail. Used by
//! the demo host and by tests in place of a real tool.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use super::controller::{ExternalToolController, ToolError};

/// One recorded capability call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolEvent {
    /// `close_window` found and closed the window
    Closed,
    /// Low overhead profile applied for this install dir
    LowOverhead(PathBuf),
    /// Default profile restored for this install dir
    Restored(PathBuf),
    /// Tool launched from this install dir
    Launched(PathBuf),
    /// Keep-alive ping delivered
    Ping,
}

#[derive(Debug, Default)]
struct ScriptState {
    events: Vec<ToolEvent>,
    window_open: bool,
    launch_opens_window: bool,
    launch_delay: Duration,
    fail_pings: bool,
}

/// [`ExternalToolController`] backed by a script instead of a process
///
/// Clones share state.
#[derive(Debug, Clone)]
pub struct ScriptedController {
    state: Arc<Mutex<ScriptState>>,
}

impl Default for ScriptedController {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedController {
    /// A tool whose window appears when launched
    pub fn new() -> Self {
        let state = ScriptState {
            launch_opens_window: true,
            ..ScriptState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// A tool that launches without ever showing its window
    pub fn without_window() -> Self {
        let controller = Self::new();
        controller.state().launch_opens_window = false;
        controller
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block inside `ensure_running` for `delay`
    pub fn set_launch_delay(&self, delay: Duration) {
        self.state().launch_delay = delay;
    }

    /// Make pings fail with a missing control
    pub fn set_fail_pings(&self, fail: bool) {
        self.state().fail_pings = fail;
    }

    /// Pretend the window is (or is not) already open
    pub fn set_window_open(&self, open: bool) {
        self.state().window_open = open;
    }

    /// Copy of the recorded calls
    pub fn events(&self) -> Vec<ToolEvent> {
        self.state().events.clone()
    }

    /// Number of delivered pings
    pub fn ping_count(&self) -> usize {
        self.state()
            .events
            .iter()
            .filter(|event| **event == ToolEvent::Ping)
            .count()
    }

    /// Number of launches
    pub fn launch_count(&self) -> usize {
        self.state()
            .events
            .iter()
            .filter(|event| matches!(event, ToolEvent::Launched(_)))
            .count()
    }
}

impl ExternalToolController for ScriptedController {
    fn is_running(&self) -> bool {
        self.state().window_open
    }

    fn close_window(&self) -> bool {
        let mut state = self.state();
        if std::mem::take(&mut state.window_open) {
            state.events.push(ToolEvent::Closed);
            true
        } else {
            false
        }
    }

    fn apply_low_overhead_profile(&self, install_dir: &Path) -> Result<(), ToolError> {
        self.state()
            .events
            .push(ToolEvent::LowOverhead(install_dir.to_path_buf()));
        Ok(())
    }

    fn restore_default_profile(&self, install_dir: &Path) -> Result<(), ToolError> {
        self.state()
            .events
            .push(ToolEvent::Restored(install_dir.to_path_buf()));
        Ok(())
    }

    fn ensure_running(&self, install_dir: &Path) -> Result<(), ToolError> {
        let delay = {
            let mut state = self.state();
            state.events.push(ToolEvent::Launched(install_dir.to_path_buf()));
            state.launch_delay
        };
        // Not interruptible, like a real launch
        thread::sleep(delay);

        let mut state = self.state();
        if state.launch_opens_window {
            state.window_open = true;
            Ok(())
        } else {
            Err(ToolError::WindowNotFound("Oculus Debug Tool".to_string()))
        }
    }

    fn keep_alive_ping(&self) -> Result<(), ToolError> {
        let mut state = self.state();
        if state.fail_pings {
            return Err(ToolError::ControlNotFound("wxWindow".to_string()));
        }
        if !state.window_open {
            return Err(ToolError::WindowNotFound("Oculus Debug Tool".to_string()));
        }
        state.events.push(ToolEvent::Ping);
        Ok(())
    }
}
