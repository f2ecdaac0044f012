//! In-process runtime and device
//!
//! `SimulatedBackend` hands out a runtime and a device that share one state
//! block. The handle stays with the caller, who can script poses, inject
//! failures and inspect what the session did through the call journal.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use super::{
    AdapterId, BackendFactory, ConnectedDevices, DepthTargetId, DeviceError, DeviceResult, Extent2D,
    Eye, EyeFovLayer, EyePoses, EyeRenderDesc, FovPort, GraphicsDevice, HmdDescriptor,
    RenderTargetId, RuntimeError, RuntimeResult, SwapChainDesc, SwapChainId, TextureFormat,
    TextureHandle, TrackedDevice, TrackingOrigin, TrackingState, Viewport, VrRuntime, EYE_COUNT,
};
use crate::foundation::math::{Pose, PoseState, Vec3};

/// Places where a failure (or a panic) can be injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// `VrRuntime::initialize`
    RuntimeInit,
    /// `VrRuntime::create_session`
    CreateSession,
    /// `GraphicsDevice::init_window`
    InitWindow,
    /// `GraphicsDevice::init_device`
    InitDevice,
    /// `VrRuntime::create_swap_chain`
    CreateSwapChain,
    /// `GraphicsDevice::create_depth_target`
    CreateDepthTarget,
    /// `VrRuntime::eye_poses`
    EyePoses,
    /// `VrRuntime::submit_frame`
    SubmitFrame,
    /// `VrRuntime::tracking_state`
    TrackingState,
    /// `VrRuntime::destroy_session`
    DestroySession,
    /// `GraphicsDevice::release_device`
    ReleaseDevice,
}

/// Everything the simulated runtime and device know
#[derive(Debug)]
pub struct SimulatedState {
    /// Every call, in order
    pub journal: Vec<&'static str>,
    /// Reported headset
    pub hmd: HmdDescriptor,
    /// Images per swap chain
    pub swap_chain_length: usize,
    /// Reported controller and object mask
    pub connected: ConnectedDevices,
    /// Headset and hand poses returned by `tracking_state`
    pub tracking: TrackingState,
    /// Per-object poses returned by `device_pose`
    pub object_poses: HashMap<u8, PoseState>,
    /// Frame indices passed to `submit_frame`, successful or not
    pub submitted_frames: Vec<u64>,
    /// Last layer submitted successfully
    pub last_layer: Option<EyeFovLayer>,
    /// Absolute times passed to pose queries
    pub pose_query_times: Vec<f64>,
    /// Tracking origin in effect
    pub tracking_origin: Option<TrackingOrigin>,
    /// Device back buffer size
    pub device_size: Option<Extent2D>,
    /// Viewports set on the device, in order
    pub viewports: Vec<Viewport>,
    /// Sessions ever opened
    pub sessions_created: usize,
    /// Runtime is initialized
    pub runtime_initialized: bool,
    /// A session is open
    pub session_open: bool,
    /// The device is alive
    pub device_alive: bool,
    failures: HashSet<FailPoint>,
    panics: HashSet<FailPoint>,
    swap_chains: HashMap<SwapChainId, SwapChainSlot>,
    render_targets: HashSet<RenderTargetId>,
    depth_targets: HashSet<DepthTargetId>,
    next_handle: u64,
    clock_origin: Instant,
}

#[derive(Debug)]
struct SwapChainSlot {
    length: usize,
    commits: usize,
}

impl Default for SimulatedState {
    fn default() -> Self {
        Self {
            journal: Vec::new(),
            hmd: HmdDescriptor {
                product_name: "Simulated Rift CV1".to_string(),
                resolution: Extent2D::new(2160, 1200),
                default_eye_fov: [FovPort::symmetric(1.2); EYE_COUNT],
            },
            swap_chain_length: 3,
            connected: ConnectedDevices::TOUCH,
            tracking: TrackingState::default(),
            object_poses: HashMap::new(),
            submitted_frames: Vec::new(),
            last_layer: None,
            pose_query_times: Vec::new(),
            tracking_origin: None,
            device_size: None,
            viewports: Vec::new(),
            sessions_created: 0,
            runtime_initialized: false,
            session_open: false,
            device_alive: false,
            failures: HashSet::new(),
            panics: HashSet::new(),
            swap_chains: HashMap::new(),
            render_targets: HashSet::new(),
            depth_targets: HashSet::new(),
            next_handle: 1,
            clock_origin: Instant::now(),
        }
    }
}

impl SimulatedState {
    fn enter(&mut self, call: &'static str, point: Option<FailPoint>) -> bool {
        self.journal.push(call);
        if let Some(point) = point {
            if self.panics.contains(&point) {
                panic!("simulated fault in {call}");
            }
            return self.failures.contains(&point);
        }
        false
    }

    fn handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

fn failed(call: &'static str) -> RuntimeError {
    RuntimeError::CallFailed { call, code: -1000 }
}

/// Shared handle to a simulated runtime + device pair
#[derive(Clone, Default)]
pub struct SimulatedBackend {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedBackend {
    /// Backend with a touch-controller headset and no auxiliary objects
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the shared state
    pub fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make a call return an error until cleared
    pub fn fail(&self, point: FailPoint) {
        self.state().failures.insert(point);
    }

    /// Make a call panic until cleared
    pub fn panic_at(&self, point: FailPoint) {
        self.state().panics.insert(point);
    }

    /// Remove any injected failure or panic
    pub fn clear_faults(&self) {
        let mut state = self.state();
        state.failures.clear();
        state.panics.clear();
    }

    /// Set the connected device mask
    pub fn set_connected(&self, connected: ConnectedDevices) {
        self.state().connected = connected;
    }

    /// Set the headset and hand poses
    pub fn set_tracking_state(&self, tracking: TrackingState) {
        self.state().tracking = tracking;
    }

    /// Set the pose of an auxiliary object
    pub fn set_object_pose(&self, slot: u8, pose: PoseState) {
        self.state().object_poses.insert(slot, pose);
    }

    /// Copy of the call journal
    pub fn journal(&self) -> Vec<&'static str> {
        self.state().journal.clone()
    }

    /// How many times a call appears in the journal
    pub fn call_count(&self, call: &str) -> usize {
        self.state().journal.iter().filter(|c| **c == call).count()
    }

    /// Forget the journal
    pub fn clear_journal(&self) {
        self.state().journal.clear();
    }

    /// Render-target views not yet released
    pub fn live_render_targets(&self) -> usize {
        self.state().render_targets.len()
    }

    /// Depth targets not yet released
    pub fn live_depth_targets(&self) -> usize {
        self.state().depth_targets.len()
    }

    /// Swap chains not yet destroyed
    pub fn live_swap_chains(&self) -> usize {
        self.state().swap_chains.len()
    }
}

impl BackendFactory for SimulatedBackend {
    fn create_runtime(&self) -> Box<dyn VrRuntime> {
        Box::new(SimulatedRuntime {
            state: Arc::clone(&self.state),
        })
    }

    fn create_device(&self) -> Box<dyn GraphicsDevice> {
        Box::new(SimulatedDevice {
            state: Arc::clone(&self.state),
        })
    }
}

/// Runtime half of a [`SimulatedBackend`]
pub struct SimulatedRuntime {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedRuntime {
    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn require_session(state: &SimulatedState) -> RuntimeResult<()> {
        if state.session_open {
            Ok(())
        } else {
            Err(RuntimeError::NoSession)
        }
    }
}

impl VrRuntime for SimulatedRuntime {
    fn initialize(&mut self) -> RuntimeResult<()> {
        let mut state = self.state();
        if state.enter("initialize", Some(FailPoint::RuntimeInit)) {
            return Err(RuntimeError::Unavailable("simulated service offline".to_string()));
        }
        state.runtime_initialized = true;
        Ok(())
    }

    fn create_session(&mut self) -> RuntimeResult<AdapterId> {
        let mut state = self.state();
        if state.enter("create_session", Some(FailPoint::CreateSession)) {
            return Err(failed("create_session"));
        }
        if !state.runtime_initialized {
            return Err(RuntimeError::Unavailable("runtime not initialized".to_string()));
        }
        if state.session_open {
            return Err(RuntimeError::CallFailed {
                call: "create_session",
                code: -1006,
            });
        }
        state.session_open = true;
        state.sessions_created += 1;
        Ok(AdapterId(0x5eed))
    }

    fn hmd_descriptor(&self) -> RuntimeResult<HmdDescriptor> {
        let mut state = self.state();
        state.enter("hmd_descriptor", None);
        Self::require_session(&state)?;
        Ok(state.hmd.clone())
    }

    fn set_tracking_origin(&mut self, origin: TrackingOrigin) -> RuntimeResult<()> {
        let mut state = self.state();
        state.enter("set_tracking_origin", None);
        Self::require_session(&state)?;
        state.tracking_origin = Some(origin);
        Ok(())
    }

    fn fov_texture_size(
        &self,
        _eye: Eye,
        fov: FovPort,
        pixels_per_display_pixel: f32,
    ) -> RuntimeResult<Extent2D> {
        let mut state = self.state();
        state.enter("fov_texture_size", None);
        Self::require_session(&state)?;

        let per_eye = state.hmd.resolution.width / 2;
        let horizontal = (fov.left_tan + fov.right_tan) / 2.0;
        let vertical = (fov.up_tan + fov.down_tan) / 2.0;
        let width = (per_eye as f32 * horizontal * pixels_per_display_pixel).round() as u32;
        let height =
            (state.hmd.resolution.height as f32 * vertical * pixels_per_display_pixel).round() as u32;
        Ok(Extent2D::new(width.max(1), height.max(1)))
    }

    fn eye_render_desc(&self, eye: Eye, _fov: FovPort) -> RuntimeResult<EyeRenderDesc> {
        let mut state = self.state();
        state.enter("eye_render_desc", None);
        Self::require_session(&state)?;

        let half_ipd = 0.032;
        let x = match eye {
            Eye::Left => -half_ipd,
            Eye::Right => half_ipd,
        };
        Ok(EyeRenderDesc {
            hmd_to_eye_pose: Pose::from_position(Vec3::new(x, 0.0, 0.0)),
        })
    }

    fn create_swap_chain(&mut self, desc: &SwapChainDesc) -> RuntimeResult<SwapChainId> {
        let mut state = self.state();
        if state.enter("create_swap_chain", Some(FailPoint::CreateSwapChain)) {
            return Err(failed("create_swap_chain"));
        }
        Self::require_session(&state)?;
        if desc.size.width == 0 || desc.size.height == 0 {
            return Err(RuntimeError::CallFailed {
                call: "create_swap_chain",
                code: -1005,
            });
        }

        let id = SwapChainId(state.handle());
        let length = state.swap_chain_length;
        state.swap_chains.insert(id, SwapChainSlot { length, commits: 0 });
        Ok(id)
    }

    fn swap_chain_length(&self, chain: SwapChainId) -> RuntimeResult<usize> {
        let state = self.state();
        state
            .swap_chains
            .get(&chain)
            .map(|slot| slot.length)
            .ok_or(RuntimeError::InvalidSwapChain(chain))
    }

    fn swap_chain_buffer(&self, chain: SwapChainId, index: usize) -> RuntimeResult<TextureHandle> {
        let state = self.state();
        let slot = state
            .swap_chains
            .get(&chain)
            .ok_or(RuntimeError::InvalidSwapChain(chain))?;
        if index >= slot.length {
            return Err(RuntimeError::CallFailed {
                call: "swap_chain_buffer",
                code: -1001,
            });
        }
        Ok(TextureHandle((chain.0 << 8) | index as u64))
    }

    fn swap_chain_current_index(&self, chain: SwapChainId) -> RuntimeResult<usize> {
        let state = self.state();
        state
            .swap_chains
            .get(&chain)
            .map(|slot| slot.commits % slot.length)
            .ok_or(RuntimeError::InvalidSwapChain(chain))
    }

    fn commit_swap_chain(&mut self, chain: SwapChainId) -> RuntimeResult<()> {
        let mut state = self.state();
        state.enter("commit_swap_chain", None);
        let slot = state
            .swap_chains
            .get_mut(&chain)
            .ok_or(RuntimeError::InvalidSwapChain(chain))?;
        slot.commits += 1;
        Ok(())
    }

    fn destroy_swap_chain(&mut self, chain: SwapChainId) {
        let mut state = self.state();
        state.enter("destroy_swap_chain", None);
        state.swap_chains.remove(&chain);
    }

    fn connected_devices(&self) -> ConnectedDevices {
        let mut state = self.state();
        state.enter("connected_devices", None);
        state.connected
    }

    fn eye_poses(&self, _frame_index: u64, hmd_to_eye: &[Pose; EYE_COUNT]) -> RuntimeResult<EyePoses> {
        let mut state = self.state();
        if state.enter("eye_poses", Some(FailPoint::EyePoses)) {
            return Err(failed("eye_poses"));
        }
        Self::require_session(&state)?;

        let head = state.tracking.head_pose.pose;
        let poses = [0, 1].map(|i| {
            let offset = hmd_to_eye[i].position;
            Pose::new(head.position + offset, head.orientation)
        });
        Ok(EyePoses {
            poses,
            sample_time: state.clock_origin.elapsed().as_secs_f64(),
        })
    }

    fn submit_frame(&mut self, frame_index: u64, layer: &EyeFovLayer) -> RuntimeResult<()> {
        let mut state = self.state();
        let fail = state.enter("submit_frame", Some(FailPoint::SubmitFrame));
        state.submitted_frames.push(frame_index);
        if fail {
            return Err(failed("submit_frame"));
        }
        Self::require_session(&state)?;
        state.last_layer = Some(layer.clone());
        Ok(())
    }

    fn time_seconds(&self) -> f64 {
        self.state().clock_origin.elapsed().as_secs_f64()
    }

    fn tracking_state(&self, abs_time: f64) -> RuntimeResult<TrackingState> {
        let mut state = self.state();
        if state.enter("tracking_state", Some(FailPoint::TrackingState)) {
            return Err(failed("tracking_state"));
        }
        Self::require_session(&state)?;
        state.pose_query_times.push(abs_time);
        Ok(state.tracking)
    }

    fn device_pose(&self, device: TrackedDevice, abs_time: f64) -> RuntimeResult<PoseState> {
        let mut state = self.state();
        state.enter("device_pose", None);
        Self::require_session(&state)?;
        state.pose_query_times.push(abs_time);

        match device {
            TrackedDevice::Hmd => Ok(state.tracking.head_pose),
            TrackedDevice::LeftHand => Ok(state.tracking.hand_poses[0]),
            TrackedDevice::RightHand => Ok(state.tracking.hand_poses[1]),
            TrackedDevice::Object(slot) => {
                if !state.connected.contains(ConnectedDevices::object(slot)) {
                    return Err(RuntimeError::DeviceNotConnected(device));
                }
                // Unscripted objects read back as a zeroed pose
                Ok(state.object_poses.get(&slot).copied().unwrap_or_else(|| {
                    let mut blank = PoseState::default();
                    blank.pose.orientation.w = 0.0;
                    blank
                }))
            }
        }
    }

    fn destroy_session(&mut self) -> RuntimeResult<()> {
        let mut state = self.state();
        if state.enter("destroy_session", Some(FailPoint::DestroySession)) {
            return Err(failed("destroy_session"));
        }
        Self::require_session(&state)?;
        state.session_open = false;
        state.swap_chains.clear();
        Ok(())
    }

    fn shutdown(&mut self) {
        let mut state = self.state();
        state.enter("shutdown", None);
        state.runtime_initialized = false;
    }
}

/// Device half of a [`SimulatedBackend`]
pub struct SimulatedDevice {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedDevice {
    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl GraphicsDevice for SimulatedDevice {
    fn init_window(&mut self, title: &str) -> DeviceResult<()> {
        let mut state = self.state();
        if state.enter("init_window", Some(FailPoint::InitWindow)) {
            return Err(DeviceError::WindowCreation(format!("cannot create '{title}'")));
        }
        Ok(())
    }

    fn init_device(&mut self, width: u32, height: u32, _adapter: AdapterId) -> DeviceResult<()> {
        let mut state = self.state();
        if state.enter("init_device", Some(FailPoint::InitDevice)) {
            return Err(DeviceError::DeviceCreation("no compatible adapter".to_string()));
        }
        state.device_size = Some(Extent2D::new(width, height));
        state.device_alive = true;
        Ok(())
    }

    fn create_render_target(
        &mut self,
        texture: TextureHandle,
        _format: TextureFormat,
    ) -> DeviceResult<RenderTargetId> {
        let mut state = self.state();
        state.enter("create_render_target", None);
        if !state.device_alive {
            return Err(DeviceError::NotInitialized);
        }
        let id = RenderTargetId(texture.0);
        state.render_targets.insert(id);
        Ok(id)
    }

    fn create_depth_target(&mut self, size: Extent2D) -> DeviceResult<DepthTargetId> {
        let mut state = self.state();
        if state.enter("create_depth_target", Some(FailPoint::CreateDepthTarget)) {
            return Err(DeviceError::ResourceCreation(format!(
                "depth {}x{}",
                size.width, size.height
            )));
        }
        if !state.device_alive {
            return Err(DeviceError::NotInitialized);
        }
        let id = DepthTargetId(state.handle());
        state.depth_targets.insert(id);
        Ok(id)
    }

    fn set_and_clear_render_target(
        &mut self,
        target: RenderTargetId,
        depth: DepthTargetId,
        _clear_color: [f32; 4],
    ) -> DeviceResult<()> {
        let mut state = self.state();
        state.enter("set_and_clear_render_target", None);
        if !state.render_targets.contains(&target) {
            return Err(DeviceError::InvalidHandle(format!("{target:?}")));
        }
        if !state.depth_targets.contains(&depth) {
            return Err(DeviceError::InvalidHandle(format!("{depth:?}")));
        }
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        let mut state = self.state();
        state.enter("set_viewport", None);
        state.viewports.push(viewport);
    }

    fn release_render_target(&mut self, target: RenderTargetId) {
        let mut state = self.state();
        state.enter("release_render_target", None);
        state.render_targets.remove(&target);
    }

    fn release_depth_target(&mut self, depth: DepthTargetId) {
        let mut state = self.state();
        state.enter("release_depth_target", None);
        state.depth_targets.remove(&depth);
    }

    fn release_device(&mut self) {
        let mut state = self.state();
        state.enter("release_device", Some(FailPoint::ReleaseDevice));
        state.device_alive = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_one_session_at_a_time() {
        let backend = SimulatedBackend::new();
        let mut runtime = backend.create_runtime();
        runtime.initialize().unwrap();
        runtime.create_session().unwrap();
        assert!(runtime.create_session().is_err());

        runtime.destroy_session().unwrap();
        assert!(runtime.create_session().is_ok());
        assert_eq!(backend.state().sessions_created, 2);
    }

    #[test]
    fn test_swap_chain_rotates_on_commit() {
        let backend = SimulatedBackend::new();
        let mut runtime = backend.create_runtime();
        runtime.initialize().unwrap();
        runtime.create_session().unwrap();

        let chain = runtime
            .create_swap_chain(&SwapChainDesc::eye_buffer(Extent2D::new(64, 64)))
            .unwrap();
        assert_eq!(runtime.swap_chain_length(chain).unwrap(), 3);
        assert_eq!(runtime.swap_chain_current_index(chain).unwrap(), 0);
        runtime.commit_swap_chain(chain).unwrap();
        runtime.commit_swap_chain(chain).unwrap();
        assert_eq!(runtime.swap_chain_current_index(chain).unwrap(), 2);
        runtime.commit_swap_chain(chain).unwrap();
        assert_eq!(runtime.swap_chain_current_index(chain).unwrap(), 0);
    }

    #[test]
    fn test_injected_failure_is_reported() {
        let backend = SimulatedBackend::new();
        backend.fail(FailPoint::RuntimeInit);
        let mut runtime = backend.create_runtime();
        assert!(matches!(runtime.initialize(), Err(RuntimeError::Unavailable(_))));

        backend.clear_faults();
        assert!(runtime.initialize().is_ok());
        assert_eq!(backend.call_count("initialize"), 2);
    }

    #[test]
    fn test_disconnected_object_is_rejected() {
        let backend = SimulatedBackend::new();
        let mut runtime = backend.create_runtime();
        runtime.initialize().unwrap();
        runtime.create_session().unwrap();

        let result = runtime.device_pose(TrackedDevice::Object(1), 0.0);
        assert_eq!(result, Err(RuntimeError::DeviceNotConnected(TrackedDevice::Object(1))));

        backend.set_connected(ConnectedDevices::TOUCH | ConnectedDevices::OBJECT1);
        let pose = runtime.device_pose(TrackedDevice::Object(1), 0.0).unwrap();
        assert!(pose.pose.has_blank_orientation());
    }
}
