//! Runtime and graphics backends
//!
//! The session layer talks to the HMD SDK and to the graphics API only
//! through the two traits in this module. The concrete SDK bindings live
//! outside this crate; [`simulated`] provides an in-process implementation
//! of both used by the demo host and the tests.

pub mod simulated;
pub mod types;

pub use types::*;

use thiserror::Error;

use crate::foundation::math::{Pose, PoseState};

/// Result type for runtime calls
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Result type for graphics device calls
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Failures reported by a VR runtime binding
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// The runtime service is not installed or not running
    #[error("VR runtime unavailable: {0}")]
    Unavailable(String),

    /// An SDK call returned a failure code
    #[error("{call} failed with code {code}")]
    CallFailed {
        /// Name of the failing SDK call
        call: &'static str,
        /// SDK result code
        code: i32,
    },

    /// A call needed a session but none is open
    #[error("no active VR session")]
    NoSession,

    /// The swap chain handle is unknown to the runtime
    #[error("unknown swap chain {0:?}")]
    InvalidSwapChain(SwapChainId),

    /// The requested device is not connected
    #[error("{0} is not connected")]
    DeviceNotConnected(TrackedDevice),
}

/// Failures reported by a graphics device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The backing window could not be created
    #[error("window creation failed: {0}")]
    WindowCreation(String),

    /// The device could not be created
    #[error("device creation failed: {0}")]
    DeviceCreation(String),

    /// A view or texture could not be created
    #[error("resource creation failed: {0}")]
    ResourceCreation(String),

    /// A call needed a device but none exists
    #[error("graphics device not initialized")]
    NotInitialized,

    /// A handle does not refer to a live resource
    #[error("invalid handle: {0}")]
    InvalidHandle(String),
}

/// HMD SDK surface used by the session
///
/// Mirrors the shape of the vendor C APIs: a process-wide runtime that owns
/// at most one session, swap chains created against that session, and
/// time-stamped pose queries.
pub trait VrRuntime {
    /// Bring up the runtime library
    fn initialize(&mut self) -> RuntimeResult<()>;

    /// Open the session; returns the adapter the device must be created on
    fn create_session(&mut self) -> RuntimeResult<AdapterId>;

    /// Describe the connected headset
    fn hmd_descriptor(&self) -> RuntimeResult<HmdDescriptor>;

    /// Select the reference frame for all poses
    fn set_tracking_origin(&mut self, origin: TrackingOrigin) -> RuntimeResult<()>;

    /// Recommended eye texture size for a field of view
    fn fov_texture_size(
        &self,
        eye: Eye,
        fov: FovPort,
        pixels_per_display_pixel: f32,
    ) -> RuntimeResult<Extent2D>;

    /// Eye offset for a field of view
    fn eye_render_desc(&self, eye: Eye, fov: FovPort) -> RuntimeResult<EyeRenderDesc>;

    /// Allocate a swap chain
    fn create_swap_chain(&mut self, desc: &SwapChainDesc) -> RuntimeResult<SwapChainId>;

    /// Number of images in a swap chain
    fn swap_chain_length(&self, chain: SwapChainId) -> RuntimeResult<usize>;

    /// Texture backing one swap-chain image
    fn swap_chain_buffer(&self, chain: SwapChainId, index: usize) -> RuntimeResult<TextureHandle>;

    /// Image the application should render into next
    fn swap_chain_current_index(&self, chain: SwapChainId) -> RuntimeResult<usize>;

    /// Hand the current image back to the compositor
    fn commit_swap_chain(&mut self, chain: SwapChainId) -> RuntimeResult<()>;

    /// Free a swap chain
    fn destroy_swap_chain(&mut self, chain: SwapChainId);

    /// Connected controller and auxiliary object mask
    fn connected_devices(&self) -> ConnectedDevices;

    /// Predicted eye poses for the frame, given each eye's head offset
    fn eye_poses(&self, frame_index: u64, hmd_to_eye: &[Pose; EYE_COUNT]) -> RuntimeResult<EyePoses>;

    /// Submit one composited frame
    fn submit_frame(&mut self, frame_index: u64, layer: &EyeFovLayer) -> RuntimeResult<()>;

    /// Current runtime clock in seconds
    fn time_seconds(&self) -> f64;

    /// Headset and hand poses predicted for `abs_time`
    fn tracking_state(&self, abs_time: f64) -> RuntimeResult<TrackingState>;

    /// Pose of a single device predicted for `abs_time`
    fn device_pose(&self, device: TrackedDevice, abs_time: f64) -> RuntimeResult<PoseState>;

    /// Close the session
    fn destroy_session(&mut self) -> RuntimeResult<()>;

    /// Tear down the runtime library
    fn shutdown(&mut self);
}

/// Graphics device the eye buffers are rendered with
pub trait GraphicsDevice {
    /// Create the (hidden) window backing the device
    fn init_window(&mut self, title: &str) -> DeviceResult<()>;

    /// Create the device with a back buffer of the given size
    fn init_device(&mut self, width: u32, height: u32, adapter: AdapterId) -> DeviceResult<()>;

    /// Create a render-target view over a runtime-owned texture
    fn create_render_target(
        &mut self,
        texture: TextureHandle,
        format: TextureFormat,
    ) -> DeviceResult<RenderTargetId>;

    /// Create a depth target
    fn create_depth_target(&mut self, size: Extent2D) -> DeviceResult<DepthTargetId>;

    /// Bind colour and depth targets and clear both
    fn set_and_clear_render_target(
        &mut self,
        target: RenderTargetId,
        depth: DepthTargetId,
        clear_color: [f32; 4],
    ) -> DeviceResult<()>;

    /// Set the rasterizer viewport
    fn set_viewport(&mut self, viewport: Viewport);

    /// Release a render-target view
    fn release_render_target(&mut self, target: RenderTargetId);

    /// Release a depth target
    fn release_depth_target(&mut self, depth: DepthTargetId);

    /// Release the device and its window
    fn release_device(&mut self);
}

/// Produces a fresh runtime binding and graphics device per session
pub trait BackendFactory {
    /// Create the runtime binding
    fn create_runtime(&self) -> Box<dyn VrRuntime>;

    /// Create the graphics device
    fn create_device(&self) -> Box<dyn GraphicsDevice>;
}
