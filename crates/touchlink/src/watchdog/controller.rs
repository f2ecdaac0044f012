//! Driving the vendor diagnostic tool
//!
//! [`ExternalToolController`] is the capability surface the watchdog needs.
//! [`DebugToolController`] implements it for the Oculus Debug Tool on top of
//! two narrow OS seams: [`WindowAutomation`] for finding, focusing and poking
//! windows, and [`ProcessLauncher`] for starting the GUI and feeding its CLI.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::core::{DebugToolConfig, WatchdogConfig};

/// Tool automation failures
#[derive(Error, Debug)]
pub enum ToolError {
    /// A tool executable could not be started
    #[error("failed to launch {}: {source}", program.display())]
    Launch {
        /// Executable
        program: PathBuf,
        /// OS error
        source: std::io::Error,
    },

    /// A CLI command could not be delivered
    #[error("failed to send '{command}' to {}: {source}", program.display())]
    Command {
        /// CLI executable
        program: PathBuf,
        /// Command text
        command: String,
        /// OS error
        source: std::io::Error,
    },

    /// The tool's top-level window is not there
    #[error("window '{0}' not found")]
    WindowNotFound(String),

    /// A child control of the tool window is not there
    #[error("control of class '{0}' not found")]
    ControlNotFound(String),
}

/// Capabilities the keep-alive task needs from the diagnostic tool
pub trait ExternalToolController: Send + Sync {
    /// True if the tool window currently exists
    fn is_running(&self) -> bool;

    /// Close the tool window if it exists; returns whether one was found
    fn close_window(&self) -> bool;

    /// Drop the supersampling override and disable frame synthesis
    fn apply_low_overhead_profile(&self, install_dir: &Path) -> Result<(), ToolError>;

    /// Undo [`apply_low_overhead_profile`](Self::apply_low_overhead_profile)
    fn restore_default_profile(&self, install_dir: &Path) -> Result<(), ToolError>;

    /// Launch the tool, select the proximity toggle and minimize it
    fn ensure_running(&self, install_dir: &Path) -> Result<(), ToolError>;

    /// Toggle the selected property back and forth
    fn keep_alive_ping(&self) -> Result<(), ToolError>;
}

/// Opaque OS window handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub isize);

/// Keys the automation sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Arrow up
    Up,
    /// Arrow down
    Down,
}

/// Window-level automation primitives
pub trait WindowAutomation: Send + Sync {
    /// Top-level window by exact title
    fn find_window(&self, title: &str) -> Option<WindowHandle>;

    /// First child of `parent` with the given window class
    fn find_child(&self, parent: WindowHandle, class: &str) -> Option<WindowHandle>;

    /// Ask the window to close
    fn close(&self, window: WindowHandle);

    /// Bring the window to the foreground
    fn focus(&self, window: WindowHandle);

    /// Minimize the window
    fn minimize(&self, window: WindowHandle);

    /// Synthesize a global key press and release
    fn press_key(&self, key: Key);

    /// Post a key press and release straight to a window
    fn send_key(&self, window: WindowHandle, key: Key);
}

/// Process launching primitives
pub trait ProcessLauncher: Send + Sync {
    /// Start a program without waiting for it
    fn open(&self, program: &Path) -> Result<(), ToolError>;

    /// Start a program and write one command line to its stdin
    fn pipe_command(&self, program: &Path, command: &str) -> Result<(), ToolError>;
}

/// [`ProcessLauncher`] on top of `std::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandLauncher;

impl ProcessLauncher for CommandLauncher {
    fn open(&self, program: &Path) -> Result<(), ToolError> {
        Command::new(program)
            .spawn()
            .map(drop)
            .map_err(|source| ToolError::Launch {
                program: program.to_path_buf(),
                source,
            })
    }

    fn pipe_command(&self, program: &Path, command: &str) -> Result<(), ToolError> {
        let error = |source| ToolError::Command {
            program: program.to_path_buf(),
            command: command.to_string(),
            source,
        };

        let mut child = Command::new(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(error)?;

        // Dropping stdin closes the pipe so the CLI exits after one command
        if let Some(mut stdin) = child.stdin.take() {
            writeln!(stdin, "{command}").map_err(error)?;
        }
        Ok(())
    }
}

/// Window automation for platforms without one; never finds a window
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAutomation;

impl WindowAutomation for NoAutomation {
    fn find_window(&self, _title: &str) -> Option<WindowHandle> {
        None
    }

    fn find_child(&self, _parent: WindowHandle, _class: &str) -> Option<WindowHandle> {
        None
    }

    fn close(&self, _window: WindowHandle) {}

    fn focus(&self, _window: WindowHandle) {}

    fn minimize(&self, _window: WindowHandle) {}

    fn press_key(&self, _key: Key) {}

    fn send_key(&self, _window: WindowHandle, _key: Key) {}
}

/// Oculus Debug Tool driven through window automation and its CLI
pub struct DebugToolController<W, L> {
    config: DebugToolConfig,
    launch_settle: Duration,
    focus_settle: Duration,
    ping_gap: Duration,
    automation: W,
    launcher: L,
}

impl<W: WindowAutomation, L: ProcessLauncher> DebugToolController<W, L> {
    /// Controller with the given tool description and timings
    pub fn new(config: DebugToolConfig, timings: &WatchdogConfig, automation: W, launcher: L) -> Self {
        Self {
            config,
            launch_settle: Duration::from_millis(timings.launch_settle_ms),
            focus_settle: Duration::from_millis(timings.focus_settle_ms),
            ping_gap: Duration::from_millis(timings.ping_gap_ms),
            automation,
            launcher,
        }
    }

    fn window(&self) -> Result<WindowHandle, ToolError> {
        self.automation
            .find_window(&self.config.window_title)
            .ok_or_else(|| ToolError::WindowNotFound(self.config.window_title.clone()))
    }

    fn child(&self, parent: WindowHandle, class: &str) -> Result<WindowHandle, ToolError> {
        self.automation
            .find_child(parent, class)
            .ok_or_else(|| ToolError::ControlNotFound(class.to_string()))
    }

    fn send_commands(&self, install_dir: &Path, commands: &[String]) -> Result<(), ToolError> {
        let cli = install_dir.join(&self.config.cli_executable);
        for command in commands {
            log::debug!("Tool CLI: {command}");
            self.launcher.pipe_command(&cli, command)?;
        }
        Ok(())
    }
}

impl<W: WindowAutomation, L: ProcessLauncher> ExternalToolController for DebugToolController<W, L> {
    fn is_running(&self) -> bool {
        self.automation.find_window(&self.config.window_title).is_some()
    }

    fn close_window(&self) -> bool {
        match self.automation.find_window(&self.config.window_title) {
            Some(window) => {
                self.automation.close(window);
                self.automation.focus(window);
                true
            }
            None => false,
        }
    }

    fn apply_low_overhead_profile(&self, install_dir: &Path) -> Result<(), ToolError> {
        self.send_commands(install_dir, &self.config.low_overhead_commands)
    }

    fn restore_default_profile(&self, install_dir: &Path) -> Result<(), ToolError> {
        self.send_commands(install_dir, &self.config.restore_commands)
    }

    fn ensure_running(&self, install_dir: &Path) -> Result<(), ToolError> {
        self.launcher.open(&install_dir.join(&self.config.gui_executable))?;
        thread::sleep(self.launch_settle);

        let window = self.window()?;
        self.automation.focus(window);
        thread::sleep(self.focus_settle);

        // The tool opens with the first property selected
        for _ in 0..self.config.menu_navigation_presses {
            self.automation.press_key(Key::Down);
        }
        self.automation.minimize(window);
        Ok(())
    }

    fn keep_alive_ping(&self) -> Result<(), ToolError> {
        let window = self.window()?;
        let grid = self.child(window, &self.config.property_grid_class)?;
        let control = self.child(grid, &self.config.property_window_class)?;

        self.automation.send_key(control, Key::Up);
        thread::sleep(self.ping_gap);
        self.automation.send_key(control, Key::Down);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Close(WindowHandle),
        Focus(WindowHandle),
        Minimize(WindowHandle),
        Press(Key),
        Send(WindowHandle, Key),
        Open(PathBuf),
        Pipe(PathBuf, String),
    }

    #[derive(Clone, Default)]
    struct Fake {
        events: Arc<Mutex<Vec<Event>>>,
        window_open: Arc<Mutex<bool>>,
        opens_window: bool,
    }

    impl Fake {
        fn record(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    const MAIN: WindowHandle = WindowHandle(10);
    const GRID: WindowHandle = WindowHandle(11);
    const CONTROL: WindowHandle = WindowHandle(12);

    impl WindowAutomation for Fake {
        fn find_window(&self, title: &str) -> Option<WindowHandle> {
            (*self.window_open.lock().unwrap() && title == "Oculus Debug Tool").then_some(MAIN)
        }

        fn find_child(&self, parent: WindowHandle, class: &str) -> Option<WindowHandle> {
            match (parent, class) {
                (MAIN, "wxWindowNR") => Some(GRID),
                (GRID, "wxWindow") => Some(CONTROL),
                _ => None,
            }
        }

        fn close(&self, window: WindowHandle) {
            self.record(Event::Close(window));
        }

        fn focus(&self, window: WindowHandle) {
            self.record(Event::Focus(window));
        }

        fn minimize(&self, window: WindowHandle) {
            self.record(Event::Minimize(window));
        }

        fn press_key(&self, key: Key) {
            self.record(Event::Press(key));
        }

        fn send_key(&self, window: WindowHandle, key: Key) {
            self.record(Event::Send(window, key));
        }
    }

    impl ProcessLauncher for Fake {
        fn open(&self, program: &Path) -> Result<(), ToolError> {
            self.record(Event::Open(program.to_path_buf()));
            if self.opens_window {
                *self.window_open.lock().unwrap() = true;
            }
            Ok(())
        }

        fn pipe_command(&self, program: &Path, command: &str) -> Result<(), ToolError> {
            self.record(Event::Pipe(program.to_path_buf(), command.to_string()));
            Ok(())
        }
    }

    fn controller(fake: &Fake) -> DebugToolController<Fake, Fake> {
        DebugToolController::new(
            DebugToolConfig::default(),
            &WatchdogConfig::fast(),
            fake.clone(),
            fake.clone(),
        )
    }

    #[test]
    fn test_ensure_running_launches_navigates_and_minimizes() {
        let fake = Fake {
            opens_window: true,
            ..Fake::default()
        };
        let tool = controller(&fake);
        let dir = Path::new("tools");

        tool.ensure_running(dir).unwrap();
        assert!(tool.is_running());

        let events = fake.events();
        assert_eq!(events[0], Event::Open(dir.join("OculusDebugTool.exe")));
        assert_eq!(events[1], Event::Focus(MAIN));
        let presses = events.iter().filter(|e| **e == Event::Press(Key::Down)).count();
        assert_eq!(presses, 7);
        assert_eq!(events.last(), Some(&Event::Minimize(MAIN)));
    }

    #[test]
    fn test_ensure_running_fails_without_window() {
        let fake = Fake::default();
        let tool = controller(&fake);
        let err = tool.ensure_running(Path::new("tools")).unwrap_err();
        assert!(matches!(err, ToolError::WindowNotFound(title) if title == "Oculus Debug Tool"));
    }

    #[test]
    fn test_profiles_pipe_commands_to_the_cli() {
        let fake = Fake::default();
        let tool = controller(&fake);
        let dir = Path::new("odt");
        let cli = dir.join("OculusDebugToolCLI.exe");

        tool.apply_low_overhead_profile(dir).unwrap();
        tool.restore_default_profile(dir).unwrap();
        assert_eq!(
            fake.events(),
            vec![
                Event::Pipe(cli.clone(), "service set-pixels-per-display-pixel-override 0.01".into()),
                Event::Pipe(cli.clone(), "server: asw.Off".into()),
                Event::Pipe(cli, "service set-pixels-per-display-pixel-override 1".into()),
            ]
        );
    }

    #[test]
    fn test_ping_toggles_the_property_control() {
        let fake = Fake::default();
        *fake.window_open.lock().unwrap() = true;
        let tool = controller(&fake);

        tool.keep_alive_ping().unwrap();
        assert_eq!(
            fake.events(),
            vec![Event::Send(CONTROL, Key::Up), Event::Send(CONTROL, Key::Down)]
        );
    }

    #[test]
    fn test_close_window_reports_presence() {
        let fake = Fake::default();
        let tool = controller(&fake);
        assert!(!tool.close_window());

        *fake.window_open.lock().unwrap() = true;
        assert!(tool.close_window());
        assert_eq!(fake.events(), vec![Event::Close(MAIN), Event::Focus(MAIN)]);
    }

    #[test]
    fn test_no_automation_never_finds_the_tool() {
        let tool = DebugToolController::new(
            DebugToolConfig::default(),
            &WatchdogConfig::fast(),
            NoAutomation,
            CommandLauncher,
        );
        assert!(!tool.is_running());
        assert!(matches!(tool.keep_alive_ping(), Err(ToolError::WindowNotFound(_))));
    }
}
