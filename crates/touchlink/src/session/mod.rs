//! VR session and stereo frame submission
//!
//! `SessionManager` owns one runtime session, one graphics device and the two
//! eye render states. It brings them up in a fixed order, renders and submits
//! one frame per call to [`SessionManager::render`], and tears everything down
//! again in reverse.
//!
//! Initialization is a pipeline of discrete steps, each reporting its own
//! [`SessionError`] variant. Any step failing is fatal for the session: the
//! failure is logged at error severity and the manager stays unusable until
//! it is dropped. Per-frame submission failures are logged and swallowed,
//! since compositor misses under load are routine.

mod eye;

pub use eye::EyeRenderState;

use thiserror::Error;

use crate::backend::{
    ConnectedDevices, DeviceError, Eye, EyeFovLayer, GraphicsDevice, HmdDescriptor, RuntimeError,
    TrackingOrigin, VrRuntime, EYE_COUNT,
};
use crate::core::RenderConfig;
use crate::events::LogChannel;

/// Session errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The runtime library could not be initialized
    #[error("VR runtime initialization failed: {0}")]
    RuntimeInit(#[source] RuntimeError),

    /// The runtime refused to open a session
    #[error("VR session creation failed: {0}")]
    SessionCreate(#[source] RuntimeError),

    /// The window backing the device could not be created
    #[error("window creation failed: {0}")]
    WindowCreate(#[source] DeviceError),

    /// The headset could not be described
    #[error("HMD query failed: {0}")]
    HmdQuery(#[source] RuntimeError),

    /// The graphics device could not be created
    #[error("graphics device creation failed: {0}")]
    DeviceCreate(#[source] DeviceError),

    /// The tracking origin could not be set
    #[error("setting the tracking origin failed: {0}")]
    TrackingOrigin(#[source] RuntimeError),

    /// An eye could not be measured
    #[error("{eye} eye setup failed: {source}")]
    EyeSetup {
        /// Eye being set up
        eye: Eye,
        /// Runtime failure
        source: RuntimeError,
    },

    /// An eye swap chain could not be created
    #[error("{eye} eye swap chain creation failed: {source}")]
    SwapChainCreate {
        /// Eye being set up
        eye: Eye,
        /// Runtime failure
        source: RuntimeError,
    },

    /// A render-target view could not be created
    #[error("{eye} eye render target creation failed: {source}")]
    RenderTargetCreate {
        /// Eye being set up
        eye: Eye,
        /// Device failure
        source: DeviceError,
    },

    /// A depth target could not be created
    #[error("{eye} eye depth target creation failed: {source}")]
    DepthTargetCreate {
        /// Eye being set up
        eye: Eye,
        /// Device failure
        source: DeviceError,
    },

    /// `render` was called on a session that is not up
    #[error("session is not ready for rendering")]
    NotReady,

    /// Eye poses could not be predicted
    #[error("eye pose query failed: {0}")]
    EyePoses(#[source] RuntimeError),

    /// A swap-chain operation failed mid-frame
    #[error("{eye} eye swap chain error: {source}")]
    SwapChain {
        /// Eye being rendered
        eye: Eye,
        /// Runtime failure
        source: RuntimeError,
    },

    /// The runtime handed out an image index with no matching view
    #[error("{eye} eye swap chain index {index} out of range")]
    ImageOutOfRange {
        /// Eye being rendered
        eye: Eye,
        /// Offending index
        index: usize,
    },

    /// Binding or clearing the eye targets failed
    #[error("{eye} eye draw failed: {source}")]
    Draw {
        /// Eye being rendered
        eye: Eye,
        /// Device failure
        source: DeviceError,
    },

    /// The session could not be closed cleanly
    #[error("VR session teardown failed: {0}")]
    Teardown(#[source] RuntimeError),
}

impl SessionError {
    /// True for failures raised while bringing the session up
    pub fn is_initialization_failure(&self) -> bool {
        !matches!(
            self,
            Self::NotReady
                | Self::EyePoses(_)
                | Self::SwapChain { .. }
                | Self::ImageOutOfRange { .. }
                | Self::Draw { .. }
                | Self::Teardown(_)
        )
    }
}

/// Lifecycle of a [`SessionManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Nothing acquired yet
    Created,
    /// Fully initialized, frames may be rendered
    Ready,
    /// Initialization failed; only teardown is possible
    Failed,
    /// Torn down
    Closed,
}

#[derive(Debug, Default)]
struct Acquired {
    runtime: bool,
    session: bool,
    device: bool,
}

/// Owner of one VR session and its eye buffers
pub struct SessionManager {
    runtime: Box<dyn VrRuntime>,
    device: Box<dyn GraphicsDevice>,
    config: RenderConfig,
    log: LogChannel,
    phase: SessionPhase,
    acquired: Acquired,
    hmd: Option<HmdDescriptor>,
    eyes: Vec<EyeRenderState>,
    layer: EyeFovLayer,
    connected: ConnectedDevices,
    frame_index: u64,
}

impl SessionManager {
    /// Wrap a runtime and device; nothing is acquired until `initialize`
    pub fn new(
        runtime: Box<dyn VrRuntime>,
        device: Box<dyn GraphicsDevice>,
        config: RenderConfig,
        log: LogChannel,
    ) -> Self {
        Self {
            runtime,
            device,
            config,
            log,
            phase: SessionPhase::Created,
            acquired: Acquired::default(),
            hmd: None,
            eyes: Vec::with_capacity(EYE_COUNT),
            layer: EyeFovLayer::default(),
            connected: ConnectedDevices::empty(),
            frame_index: 0,
        }
    }

    /// Bring up runtime, session, device and eye buffers
    ///
    /// Fails on the first step that fails; there is no retry.
    pub fn initialize(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Created {
            log::warn!("Session initialize called in phase {:?}", self.phase);
            return Err(SessionError::NotReady);
        }

        match self.run_initialization() {
            Ok(()) => {
                self.phase = SessionPhase::Ready;
                Ok(())
            }
            Err(err) => {
                self.log.error(err.to_string());
                self.phase = SessionPhase::Failed;
                Err(err)
            }
        }
    }

    fn run_initialization(&mut self) -> Result<(), SessionError> {
        self.runtime.initialize().map_err(SessionError::RuntimeInit)?;
        self.acquired.runtime = true;

        let adapter = self.runtime.create_session().map_err(SessionError::SessionCreate)?;
        self.acquired.session = true;

        self.device
            .init_window(&self.config.window_title)
            .map_err(SessionError::WindowCreate)?;

        let hmd = self.runtime.hmd_descriptor().map_err(SessionError::HmdQuery)?;
        let back_buffer = hmd.resolution.divided_by(self.config.resolution_divisor);
        self.device
            .init_device(back_buffer.width, back_buffer.height, adapter)
            .map_err(SessionError::DeviceCreate)?;
        self.acquired.device = true;

        self.runtime
            .set_tracking_origin(TrackingOrigin::FloorLevel)
            .map_err(SessionError::TrackingOrigin)?;

        self.init_render_targets(&hmd)?;
        self.connected = self.runtime.connected_devices();

        log::info!(
            "VR session up on '{}' ({}x{} device, {} auxiliary objects)",
            hmd.product_name,
            back_buffer.width,
            back_buffer.height,
            self.connected.auxiliary_count()
        );
        self.hmd = Some(hmd);
        Ok(())
    }

    fn init_render_targets(&mut self, hmd: &HmdDescriptor) -> Result<(), SessionError> {
        for eye in Eye::BOTH {
            let fov = hmd.default_eye_fov[eye.index()];
            let state = EyeRenderState::create(
                eye,
                fov,
                self.config.pixels_per_display_pixel,
                self.runtime.as_mut(),
                self.device.as_mut(),
            )?;

            let i = eye.index();
            self.layer.viewport[i] = state.viewport;
            self.layer.fov[i] = state.fov;
            self.layer.color_texture[i] = Some(state.swap_chain);
            self.eyes.push(state);
        }
        Ok(())
    }

    /// Render both eyes and submit one frame
    ///
    /// Submission failures are logged and do not fail the call.
    pub fn render(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Ready {
            return Err(SessionError::NotReady);
        }

        let hmd_to_eye = [self.eyes[0].hmd_to_eye, self.eyes[1].hmd_to_eye];
        let eye_poses = self
            .runtime
            .eye_poses(self.frame_index, &hmd_to_eye)
            .map_err(SessionError::EyePoses)?;

        for state in &self.eyes {
            let eye = state.eye;
            let i = eye.index();

            let index = self
                .runtime
                .swap_chain_current_index(state.swap_chain)
                .map_err(|source| SessionError::SwapChain { eye, source })?;
            let target = state
                .render_target(index)
                .ok_or(SessionError::ImageOutOfRange { eye, index })?;

            self.device
                .set_and_clear_render_target(target, state.depth_target, self.config.clear_color)
                .map_err(|source| SessionError::Draw { eye, source })?;
            self.device.set_viewport(state.viewport.into());

            self.layer.color_texture[i] = Some(state.swap_chain);
            self.layer.render_pose[i] = eye_poses.poses[i];
            self.layer.sensor_sample_time = eye_poses.sample_time;

            self.runtime
                .commit_swap_chain(state.swap_chain)
                .map_err(|source| SessionError::SwapChain { eye, source })?;
        }

        let frame = self.frame_index;
        self.frame_index += 1;
        if let Err(err) = self.runtime.submit_frame(frame, &self.layer) {
            self.log.error(format!("Frame {frame} submission failed: {err}"));
        }
        Ok(())
    }

    /// Release eye buffers, the device, the session and the runtime
    ///
    /// Every step runs even if an earlier one failed; the first failure is
    /// returned. Steps that already ran are skipped on a second call.
    pub fn shutdown(&mut self) -> Result<(), SessionError> {
        let mut first_error = None;

        for state in std::mem::take(&mut self.eyes) {
            state.release(self.runtime.as_mut(), self.device.as_mut());
        }
        self.layer = EyeFovLayer::default();

        if std::mem::take(&mut self.acquired.device) {
            self.device.release_device();
        }
        if std::mem::take(&mut self.acquired.session) {
            if let Err(err) = self.runtime.destroy_session() {
                first_error.get_or_insert(SessionError::Teardown(err));
            }
        }
        if std::mem::take(&mut self.acquired.runtime) {
            self.runtime.shutdown();
        }

        self.phase = SessionPhase::Closed;
        first_error.map_or(Ok(()), Err)
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// True once initialization succeeded and until shutdown
    pub fn is_ready(&self) -> bool {
        self.phase == SessionPhase::Ready
    }

    /// Runtime binding, for pose queries
    pub fn runtime(&self) -> &dyn VrRuntime {
        self.runtime.as_ref()
    }

    /// Connected controller and object mask captured at initialization
    pub fn connected_devices(&self) -> ConnectedDevices {
        self.connected
    }

    /// Headset description captured at initialization
    pub fn hmd(&self) -> Option<&HmdDescriptor> {
        self.hmd.as_ref()
    }

    /// Eye render states, left first
    pub fn eyes(&self) -> &[EyeRenderState] {
        &self.eyes
    }

    /// Index the next submitted frame will carry
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        let held = !self.eyes.is_empty()
            || self.acquired.device
            || self.acquired.session
            || self.acquired.runtime;
        if held && !std::thread::panicking() {
            log::debug!("Session dropped while live, tearing down");
            if let Err(err) = self.shutdown() {
                log::error!("Session teardown on drop failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulated::{FailPoint, SimulatedBackend};
    use crate::backend::{BackendFactory, ConnectedDevices, Extent2D, TrackingOrigin};
    use crate::events::{LogCollector, Severity};

    fn manager(backend: &SimulatedBackend) -> (SessionManager, LogCollector) {
        let log = LogChannel::new();
        let collector = LogCollector::new();
        collector.attach(&log);
        let manager = SessionManager::new(
            backend.create_runtime(),
            backend.create_device(),
            RenderConfig::default(),
            log,
        );
        (manager, collector)
    }

    #[test]
    fn test_initialize_builds_both_eyes() {
        let backend = SimulatedBackend::new();
        backend.set_connected(ConnectedDevices::TOUCH | ConnectedDevices::OBJECT0);
        let (mut session, _) = manager(&backend);

        session.initialize().unwrap();
        assert!(session.is_ready());
        assert_eq!(session.eyes().len(), 2);
        assert_eq!(session.eyes()[0].eye, Eye::Left);
        assert_eq!(session.eyes()[0].render_targets.len(), 3);
        assert_eq!(session.connected_devices().auxiliary_count(), 1);

        let state = backend.state();
        assert_eq!(state.device_size, Some(Extent2D::new(1080, 600)));
        assert_eq!(state.tracking_origin, Some(TrackingOrigin::FloorLevel));
    }

    #[test]
    fn test_initialization_order() {
        let backend = SimulatedBackend::new();
        let (mut session, _) = manager(&backend);
        session.initialize().unwrap();

        let journal = backend.journal();
        let position = |call: &str| journal.iter().position(|c| *c == call).unwrap();
        assert!(position("initialize") < position("create_session"));
        assert!(position("create_session") < position("init_window"));
        assert!(position("init_window") < position("init_device"));
        assert!(position("init_device") < position("set_tracking_origin"));
        assert!(position("set_tracking_origin") < position("create_swap_chain"));
        assert!(position("create_swap_chain") < position("connected_devices"));
    }

    #[test]
    fn test_each_init_step_failure_is_fatal() {
        let cases = [
            (FailPoint::RuntimeInit, "runtime initialization"),
            (FailPoint::CreateSession, "session creation"),
            (FailPoint::InitWindow, "window creation"),
            (FailPoint::InitDevice, "device creation"),
            (FailPoint::CreateSwapChain, "swap chain creation"),
            (FailPoint::CreateDepthTarget, "depth target creation"),
        ];

        for (point, needle) in cases {
            let backend = SimulatedBackend::new();
            backend.fail(point);
            let (mut session, log) = manager(&backend);

            let err = session.initialize().unwrap_err();
            assert!(err.is_initialization_failure(), "{point:?}");
            assert_eq!(session.phase(), SessionPhase::Failed);
            assert!(matches!(session.render(), Err(SessionError::NotReady)));

            let errors = log.with_severity(Severity::Error);
            assert_eq!(errors.len(), 1, "{point:?}");
            assert!(errors[0].message.contains(needle), "{}", errors[0].message);

            // Retrying is refused
            assert!(session.initialize().is_err());
            assert_eq!(backend.call_count("initialize"), 1);
        }
    }

    #[test]
    fn test_partial_eye_failure_releases_what_was_created() {
        let backend = SimulatedBackend::new();
        backend.fail(FailPoint::CreateDepthTarget);
        let (mut session, _) = manager(&backend);

        assert!(session.initialize().is_err());
        assert_eq!(backend.live_render_targets(), 0);
        assert_eq!(backend.live_swap_chains(), 0);

        session.shutdown().unwrap();
        let state = backend.state();
        assert!(!state.session_open);
        assert!(!state.device_alive);
        assert!(!state.runtime_initialized);
    }

    #[test]
    fn test_render_submits_one_frame_with_both_eyes() {
        let backend = SimulatedBackend::new();
        let (mut session, _) = manager(&backend);
        session.initialize().unwrap();

        session.render().unwrap();
        session.render().unwrap();

        let state = backend.state();
        assert_eq!(state.submitted_frames, vec![0, 1]);
        assert_eq!(state.viewports.len(), 4);

        let layer = state.last_layer.as_ref().unwrap();
        assert!(layer.color_texture.iter().all(Option::is_some));
        assert!(layer.render_pose[0].position.x < layer.render_pose[1].position.x);
        assert_eq!(session.frame_index(), 2);
        drop(state);

        assert_eq!(backend.call_count("commit_swap_chain"), 4);
        assert_eq!(backend.call_count("submit_frame"), 2);
    }

    #[test]
    fn test_submission_failure_is_logged_and_not_fatal() {
        let backend = SimulatedBackend::new();
        let (mut session, log) = manager(&backend);
        session.initialize().unwrap();

        backend.fail(FailPoint::SubmitFrame);
        assert!(session.render().is_ok());
        assert!(session.render().is_ok());
        assert_eq!(log.with_severity(Severity::Error).len(), 2);
        assert!(log.contains("Frame 0 submission failed"));

        backend.clear_faults();
        session.render().unwrap();
        assert_eq!(backend.state().submitted_frames, vec![0, 1, 2]);
        assert!(session.is_ready());
    }

    #[test]
    fn test_shutdown_releases_everything_and_is_repeatable() {
        let backend = SimulatedBackend::new();
        let (mut session, _) = manager(&backend);
        session.initialize().unwrap();
        session.render().unwrap();

        session.shutdown().unwrap();
        assert_eq!(backend.live_render_targets(), 0);
        assert_eq!(backend.live_depth_targets(), 0);
        assert_eq!(backend.live_swap_chains(), 0);

        let journal = backend.journal();
        let position = |call: &str| journal.iter().position(|c| *c == call).unwrap();
        assert!(position("release_device") < position("destroy_session"));
        assert!(position("destroy_session") < position("shutdown"));

        backend.clear_journal();
        session.shutdown().unwrap();
        assert!(backend.journal().is_empty());
        assert_eq!(session.phase(), SessionPhase::Closed);
    }

    #[test]
    fn test_drop_tears_down_live_session() {
        let backend = SimulatedBackend::new();
        {
            let (mut session, _) = manager(&backend);
            session.initialize().unwrap();
        }
        let state = backend.state();
        assert!(!state.session_open);
        assert!(!state.runtime_initialized);
    }
}
