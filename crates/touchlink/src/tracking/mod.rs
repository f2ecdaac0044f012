//! Tracking orchestrator
//!
//! `TrackingOrchestrator` is the host-facing surface. Hosts call
//! [`initialize`](TrackingOrchestrator::initialize) once, then
//! [`update`](TrackingOrchestrator::update) every frame, then
//! [`shutdown`](TrackingOrchestrator::shutdown). Nothing escapes these calls:
//! failures end up as records on the [`LogChannel`] plus the status code, and
//! panics from runtime or device bindings are caught around initialization
//! and teardown.
//!
//! ```text
//! NotStarted ──initialize──► Initializing ──ok──► Running
//!                                 │                  │
//!                                 └──err──► Failed   ├──initialize──► (shutdown) Initializing
//!                                                    └──shutdown────► NotStarted
//! ```
//!
//! Joint data is written only by `update` on the caller's thread. The
//! watchdog thread never sees it.

mod joint;
mod status;

pub use joint::{JointId, JointMap, TrackedJoint};
pub use status::{
    LifecycleState, StatusCode, SHUTDOWN_FAILED, STATUS_INIT_FAILED, STATUS_NOT_STARTED,
    STATUS_SUCCESS,
};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::backend::{BackendFactory, TrackedDevice};
use crate::core::TouchLinkConfig;
use crate::events::LogChannel;
use crate::foundation::time::{prediction_offset_secs, Stopwatch};
use crate::session::SessionManager;
use crate::watchdog::{
    default_locator, platform_controller, ExternalToolController, ExternalToolWatchdog,
    ToolLocator, WatchdogError, WatchdogState,
};

/// Drives one HMD session, polls poses and manages the keep-alive watchdog
pub struct TrackingOrchestrator {
    config: TouchLinkConfig,
    backend: Box<dyn BackendFactory>,
    locator: Box<dyn ToolLocator>,
    log: LogChannel,
    session: Option<SessionManager>,
    watchdog: ExternalToolWatchdog,
    joints: JointMap,
    status: i32,
    lifecycle: LifecycleState,
    initialized: bool,
    frame: u64,
    keep_alive: bool,
    reduce_res: bool,
    prediction_ms: i32,
    missing_tool_reported: bool,
}

impl TrackingOrchestrator {
    /// Orchestrator driving the real diagnostic tool, located the default way
    pub fn new(config: TouchLinkConfig, backend: Box<dyn BackendFactory>) -> Self {
        let controller = platform_controller(&config.tool, &config.watchdog);
        let locator = Box::new(default_locator(&config.tool));
        Self::with_tool(config, backend, controller, locator)
    }

    /// Orchestrator with an explicit tool controller and locator
    pub fn with_tool(
        config: TouchLinkConfig,
        backend: Box<dyn BackendFactory>,
        controller: Arc<dyn ExternalToolController>,
        locator: Box<dyn ToolLocator>,
    ) -> Self {
        let log = LogChannel::new();
        let watchdog =
            ExternalToolWatchdog::new(controller, config.watchdog.clone(), &config.tool, log.clone());

        Self {
            keep_alive: config.tracking.keep_alive,
            reduce_res: config.tracking.reduce_res,
            prediction_ms: config.tracking.prediction_ms,
            config,
            backend,
            locator,
            log,
            session: None,
            watchdog,
            joints: JointMap::new(),
            status: STATUS_NOT_STARTED,
            lifecycle: LifecycleState::NotStarted,
            initialized: false,
            frame: 0,
            missing_tool_reported: false,
        }
    }

    /// Channel every advisory, warning and error is published on
    pub fn log_channel(&self) -> &LogChannel {
        &self.log
    }

    /// Bring up a fresh session; returns the new status value
    ///
    /// A live session is shut down first. The initialized flag is set even
    /// when the session fails, so check the returned status.
    pub fn initialize(&mut self) -> i32 {
        if self.initialized {
            self.log
                .warn("Handler already initialized, shutting down prior to reinitialization!");
            self.shutdown();
        }
        self.lifecycle = LifecycleState::Initializing;

        let install_dir = self.locator.locate();
        if install_dir.is_none() {
            self.log
                .warn("Diagnostic tool could not be found! Keep-alive will not work.");
        }
        self.watchdog.set_install_dir(install_dir);
        self.missing_tool_reported = false;
        self.joints = JointMap::new();
        self.frame = 0;

        let mut session = SessionManager::new(
            self.backend.create_runtime(),
            self.backend.create_device(),
            self.config.render.clone(),
            self.log.clone(),
        );

        self.status = STATUS_SUCCESS;
        let stopwatch = Stopwatch::start_new();
        match panic::catch_unwind(AssertUnwindSafe(|| session.initialize())) {
            Ok(Ok(())) => {
                self.lifecycle = LifecycleState::Running;
                self.log.info(format!(
                    "VR session initialized in {:.1} ms",
                    stopwatch.elapsed_millis()
                ));
            }
            Ok(Err(err)) => {
                log::debug!("Session initialization failed: {err}");
                self.status = STATUS_INIT_FAILED;
                self.lifecycle = LifecycleState::Failed;
            }
            Err(payload) => {
                self.log.error(format!(
                    "VR initialization failure! {}",
                    panic_message(payload.as_ref())
                ));
                self.status = STATUS_INIT_FAILED;
                self.lifecycle = LifecycleState::Failed;
            }
        }

        // Kept even when failed, so shutdown can release what was acquired
        self.session = Some(session);
        self.initialized = true;
        self.status
    }

    /// Advance one frame
    ///
    /// Does nothing unless initialized with a success status.
    pub fn update(&mut self) {
        if !self.initialized || self.status != STATUS_SUCCESS {
            return;
        }

        self.reconcile_watchdog();

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Err(err) = session.render() {
            self.log.error(format!("Frame render failed: {err}"));
        }

        self.poll_poses();
        self.frame += 1;
    }

    fn reconcile_watchdog(&mut self) {
        let started = self.watchdog.is_started();

        if self.keep_alive && !started && !self.watchdog.is_stop_requested() {
            match self.watchdog.start(self.reduce_res) {
                Ok(()) => self.log.info("Keep-alive watchdog started"),
                Err(WatchdogError::ToolNotFound) => {
                    if !std::mem::replace(&mut self.missing_tool_reported, true) {
                        self.log.warn(
                            "Keep-alive requested but the diagnostic tool could not be found",
                        );
                    }
                }
                Err(WatchdogError::Backoff { remaining }) => {
                    log::trace!("Watchdog restart deferred for {remaining:?}");
                }
                Err(err) => self.log.error(format!("Could not start keep-alive watchdog: {err}")),
            }
        } else if !self.keep_alive && started {
            match self.watchdog.stop() {
                Ok(()) => self.log.info("Keep-alive watchdog stopped"),
                Err(err) => log::warn!("Keep-alive watchdog stop: {err}"),
            }
        }
    }

    fn poll_poses(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let runtime = session.runtime();
        let at = runtime.time_seconds() + prediction_offset_secs(self.prediction_ms);

        match runtime.tracking_state(at) {
            Ok(state) => {
                self.joints.update(JointId::LeftController, state.hand_poses[0]);
                self.joints.update(JointId::RightController, state.hand_poses[1]);
                self.joints.update(JointId::Headset, state.head_pose);
            }
            Err(err) => self.log.warn(format!("Tracking state query failed: {err}")),
        }

        // The first connected object rides in the headset slot
        for (index, slot) in session.connected_devices().auxiliary_objects().enumerate() {
            let device = TrackedDevice::Object(slot);
            match runtime.device_pose(device, at) {
                Ok(state) if state.pose.has_blank_orientation() => {
                    log::trace!("Skipping {device}: no orientation fix");
                }
                Ok(state) => {
                    let id = if index == 0 {
                        JointId::Headset
                    } else {
                        JointId::Object(slot)
                    };
                    self.joints.update(id, state);
                }
                Err(err) => log::debug!("Pose query for {device} failed: {err}"),
            }
        }
    }

    /// Stop the watchdog and tear the session down
    ///
    /// Returns 0 on success. On failure the error is logged, the status
    /// becomes the init-failed value and -1 is returned. A second call is a
    /// no-op.
    pub fn shutdown(&mut self) -> i32 {
        let was_initialized = std::mem::replace(&mut self.initialized, false);
        if !was_initialized && self.session.is_none() && !self.watchdog.has_task() {
            return STATUS_SUCCESS;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.teardown()));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(message)) => Some(message),
            Err(payload) => {
                // Whatever the session still holds is released without a second unwind
                let leftover = self.session.take();
                let _ = panic::catch_unwind(AssertUnwindSafe(move || drop(leftover)));
                Some(panic_message(payload.as_ref()))
            }
        };

        self.session = None;
        self.lifecycle = LifecycleState::NotStarted;
        match failure {
            None => STATUS_SUCCESS,
            Some(message) => {
                self.log.error(format!("VR shutdown failure! {message}"));
                self.status = STATUS_INIT_FAILED;
                SHUTDOWN_FAILED
            }
        }
    }

    fn teardown(&mut self) -> Result<(), String> {
        if self.watchdog.has_task() {
            if let Err(err) = self.watchdog.stop() {
                log::warn!("Keep-alive watchdog stop: {err}");
            }
        }

        match self.session.as_mut() {
            Some(session) => session.shutdown().map_err(|err| err.to_string()),
            None => Ok(()),
        }
    }

    /// Keep-alive desired; takes effect on the next `update`
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Request or cancel keep-alive; takes effect on the next `update`
    pub fn set_keep_alive(&mut self, enabled: bool) {
        self.keep_alive = enabled;
    }

    /// Reduced resolution desired
    pub fn reduce_res(&self) -> bool {
        self.reduce_res
    }

    /// Request reduced resolution for the next watchdog start
    pub fn set_reduce_res(&mut self, enabled: bool) {
        self.reduce_res = enabled;
    }

    /// Pose prediction offset in milliseconds
    pub fn prediction_ms(&self) -> i32 {
        self.prediction_ms
    }

    /// Set the pose prediction offset in milliseconds
    pub fn set_prediction_ms(&mut self, prediction_ms: i32) {
        self.prediction_ms = prediction_ms;
    }

    /// True once `initialize` ran, whatever its outcome, until `shutdown`
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Raw status value
    pub fn status_result(&self) -> i32 {
        self.status
    }

    /// Decoded status
    pub fn status(&self) -> StatusCode {
        StatusCode::from_code(self.status)
    }

    /// Lifecycle state
    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    /// Copy of every tracked joint in slot order
    pub fn tracked_joints(&self) -> Vec<TrackedJoint> {
        self.joints.snapshot()
    }

    /// Joint by identity
    pub fn joint(&self, id: JointId) -> Option<&TrackedJoint> {
        self.joints.get(id)
    }

    /// Frames processed since the last `initialize`
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Current watchdog state
    pub fn watchdog_state(&self) -> WatchdogState {
        self.watchdog.state()
    }

    /// True while a watchdog stop is pending
    pub fn watchdog_stop_requested(&self) -> bool {
        self.watchdog.is_stop_requested()
    }

    /// Active session, if any
    pub fn session(&self) -> Option<&SessionManager> {
        self.session.as_ref()
    }

    /// Configuration this orchestrator was built with
    pub fn config(&self) -> &TouchLinkConfig {
        &self.config
    }
}

impl Drop for TrackingOrchestrator {
    fn drop(&mut self) {
        if self.initialized || self.session.is_some() {
            self.shutdown();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
