//! # Unified Configuration
//!
//! All tunables of the orchestrator in one serializable tree:
//!
//! - **Tracking**: pose prediction and the two host-facing toggles
//! - **Render**: eye buffer sizing and the clear colour
//! - **Watchdog**: sleeps, tick rate and join timeout of the keep-alive task
//! - **Tool**: how to find and drive the vendor diagnostic tool
//!
//! Every section has sensible defaults so a partial file is enough.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{Config, ConfigError};

/// Default pose prediction offset in milliseconds
pub const DEFAULT_PREDICTION_MS: i32 = 11;

/// Largest prediction offset a host may configure
pub const MAX_PREDICTION_MS: i32 = 100;

/// # Tracking Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Extra prediction added to "now" when sampling poses
    pub prediction_ms: i32,
    /// Keep the headset awake through the diagnostic tool
    pub keep_alive: bool,
    /// Ask the diagnostic tool to drop the supersampling override
    pub reduce_res: bool,
}

impl TrackingConfig {
    /// Set the prediction offset
    pub fn with_prediction_ms(mut self, prediction_ms: i32) -> Self {
        self.prediction_ms = prediction_ms;
        self
    }

    /// Enable or disable keep-alive
    pub fn with_keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Enable or disable reduced resolution
    pub fn with_reduce_res(mut self, enabled: bool) -> Self {
        self.reduce_res = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0..=MAX_PREDICTION_MS).contains(&self.prediction_ms) {
            return Err(ConfigError::Invalid(format!(
                "prediction_ms must be within 0..={MAX_PREDICTION_MS}, got {}",
                self.prediction_ms
            )));
        }
        Ok(())
    }

    /// Recover from a stored value the host can no longer accept
    ///
    /// Out-of-range prediction offsets fall back to the default rather than
    /// being clamped, matching how settings pages reset corrupted values.
    pub fn sanitized(mut self) -> Self {
        if !(0..=MAX_PREDICTION_MS).contains(&self.prediction_ms) {
            log::warn!(
                "Prediction offset {}ms out of range, resetting to {}ms",
                self.prediction_ms,
                DEFAULT_PREDICTION_MS
            );
            self.prediction_ms = DEFAULT_PREDICTION_MS;
        }
        self
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            prediction_ms: DEFAULT_PREDICTION_MS,
            keep_alive: false,
            reduce_res: true,
        }
    }
}

/// # Render Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Title of the hidden window backing the graphics device
    pub window_title: String,
    /// The device back buffer is the HMD resolution divided by this
    pub resolution_divisor: u32,
    /// Eye texture density passed to the runtime's size query
    pub pixels_per_display_pixel: f32,
    /// RGBA clear colour for both eyes
    pub clear_color: [f32; 4],
}

impl RenderConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolution_divisor == 0 {
            return Err(ConfigError::Invalid("resolution_divisor must be at least 1".to_string()));
        }
        if !(self.pixels_per_display_pixel.is_finite() && self.pixels_per_display_pixel > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "pixels_per_display_pixel must be positive, got {}",
                self.pixels_per_display_pixel
            )));
        }
        Ok(())
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            window_title: "TouchLink HMD Session".to_string(),
            resolution_divisor: 2,
            pixels_per_display_pixel: 1.0,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// # Watchdog Configuration
///
/// All durations are in milliseconds so the file stays readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Wait after closing a stale tool window
    pub close_settle_ms: u64,
    /// Wait after launching the tool GUI
    pub launch_settle_ms: u64,
    /// Wait after bringing the tool window to the front
    pub focus_settle_ms: u64,
    /// Wait before checking the tool window survived the launch
    pub verify_delay_ms: u64,
    /// Keep-alive loop period
    pub tick_ms: u64,
    /// Gap between the two keys of a keep-alive ping
    pub ping_gap_ms: u64,
    /// How long `shutdown` waits for the task before giving up on it
    pub join_timeout_ms: u64,
    /// Minimum delay before relaunching a task that aborted on its own
    pub restart_backoff_ms: u64,
}

impl WatchdogConfig {
    /// Timings suitable for tests and simulated tools
    pub fn fast() -> Self {
        Self {
            close_settle_ms: 1,
            launch_settle_ms: 1,
            focus_settle_ms: 1,
            verify_delay_ms: 1,
            tick_ms: 5,
            ping_gap_ms: 1,
            join_timeout_ms: 2_000,
            restart_backoff_ms: 0,
        }
    }

    /// Keep-alive loop period
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Join timeout used on stop and shutdown
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Relaunch backoff after a self-aborted run
    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_ms == 0 {
            return Err(ConfigError::Invalid("watchdog tick_ms must be non-zero".to_string()));
        }
        if self.join_timeout_ms == 0 {
            return Err(ConfigError::Invalid("watchdog join_timeout_ms must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            close_settle_ms: 500,
            launch_settle_ms: 1_000,
            focus_settle_ms: 100,
            verify_delay_ms: 1_000,
            tick_ms: 1_000,
            ping_gap_ms: 50,
            join_timeout_ms: 5_000,
            restart_backoff_ms: 5_000,
        }
    }
}

/// # Diagnostic Tool Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugToolConfig {
    /// Top-level window title of the tool GUI
    pub window_title: String,
    /// GUI executable, relative to the install directory
    pub gui_executable: String,
    /// Command-line companion, relative to the install directory
    pub cli_executable: String,
    /// Window class of the property grid container
    pub property_grid_class: String,
    /// Window class of the control receiving keep-alive keys
    pub property_window_class: String,
    /// Down-arrow presses needed to reach the proximity toggle
    pub menu_navigation_presses: u32,
    /// Loop ticks between two keep-alive pings; a ping fires on the first tick
    pub ping_sentinel_ticks: u64,
    /// CLI commands sent when reduced resolution is enabled
    pub low_overhead_commands: Vec<String>,
    /// CLI commands that undo `low_overhead_commands`
    pub restore_commands: Vec<String>,
    /// Fixed install directory, skipping discovery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,
    /// Environment variable consulted for the install directory
    pub install_dir_env: String,
}

impl DebugToolConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_title.is_empty() {
            return Err(ConfigError::Invalid("tool window_title cannot be empty".to_string()));
        }
        if self.ping_sentinel_ticks == 0 {
            return Err(ConfigError::Invalid("ping_sentinel_ticks must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl Default for DebugToolConfig {
    fn default() -> Self {
        Self {
            window_title: "Oculus Debug Tool".to_string(),
            gui_executable: "OculusDebugTool.exe".to_string(),
            cli_executable: "OculusDebugToolCLI.exe".to_string(),
            property_grid_class: "wxWindowNR".to_string(),
            property_window_class: "wxWindow".to_string(),
            menu_navigation_presses: 7,
            ping_sentinel_ticks: 600_000,
            low_overhead_commands: vec![
                "service set-pixels-per-display-pixel-override 0.01".to_string(),
                "server: asw.Off".to_string(),
            ],
            restore_commands: vec!["service set-pixels-per-display-pixel-override 1".to_string()],
            install_dir: None,
            install_dir_env: "TOUCHLINK_TOOL_DIR".to_string(),
        }
    }
}

/// # Complete Configuration
///
/// Top-level configuration handed to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TouchLinkConfig {
    /// Tracking behaviour
    pub tracking: TrackingConfig,
    /// Eye buffer setup
    pub render: RenderConfig,
    /// Keep-alive task timings
    pub watchdog: WatchdogConfig,
    /// Diagnostic tool automation
    pub tool: DebugToolConfig,
}

impl TouchLinkConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tracking.validate()?;
        self.render.validate()?;
        self.watchdog.validate()?;
        self.tool.validate()?;
        Ok(())
    }

    /// Apply recovery rules for values a host may have persisted badly
    pub fn sanitized(mut self) -> Self {
        self.tracking = self.tracking.sanitized();
        self
    }
}

impl Config for TouchLinkConfig {}
