//! Plain data exchanged with VR runtimes and graphics devices

use bitflags::bitflags;
use std::fmt;

use crate::foundation::math::{Pose, PoseState};

/// Number of eyes rendered per frame
pub const EYE_COUNT: usize = 2;

/// Auxiliary tracked objects a runtime can report
pub const MAX_AUXILIARY_OBJECTS: usize = 4;

/// Which eye a resource belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    /// Left eye
    Left,
    /// Right eye
    Right,
}

impl Eye {
    /// Both eyes in submission order
    pub const BOTH: [Self; EYE_COUNT] = [Self::Left, Self::Right];

    /// Array index of this eye
    pub fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent2D {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Extent2D {
    /// Create an extent
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both sides divided by `divisor`
    pub fn divided_by(self, divisor: u32) -> Self {
        let divisor = divisor.max(1);
        Self::new(self.width / divisor, self.height / divisor)
    }
}

/// Integer rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Recti {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Size
    pub size: Extent2D,
}

impl Recti {
    /// Rectangle anchored at the origin
    pub fn at_origin(size: Extent2D) -> Self {
        Self { x: 0, y: 0, size }
    }
}

/// Floating-point viewport handed to the graphics device
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl From<Recti> for Viewport {
    fn from(rect: Recti) -> Self {
        Self {
            x: rect.x as f32,
            y: rect.y as f32,
            width: rect.size.width as f32,
            height: rect.size.height as f32,
        }
    }
}

/// Field of view as tangents of the half angles
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FovPort {
    /// Tangent of the upward half angle
    pub up_tan: f32,
    /// Tangent of the downward half angle
    pub down_tan: f32,
    /// Tangent of the leftward half angle
    pub left_tan: f32,
    /// Tangent of the rightward half angle
    pub right_tan: f32,
}

impl FovPort {
    /// Symmetric field of view with the same tangent on every side
    pub fn symmetric(tan: f32) -> Self {
        Self {
            up_tan: tan,
            down_tan: tan,
            left_tan: tan,
            right_tan: tan,
        }
    }
}

/// Static description of the connected headset
#[derive(Debug, Clone, PartialEq)]
pub struct HmdDescriptor {
    /// Product name reported by the runtime
    pub product_name: String,
    /// Native panel resolution, both eyes combined
    pub resolution: Extent2D,
    /// Default per-eye field of view
    pub default_eye_fov: [FovPort; EYE_COUNT],
}

/// Per-eye rendering description
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeRenderDesc {
    /// Offset from the centre of the head to this eye
    pub hmd_to_eye_pose: Pose,
}

/// Reference frame poses are expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingOrigin {
    /// Origin at the initial eye height
    EyeLevel,
    /// Origin on the floor
    FloorLevel,
}

/// Pixel format of swap-chain images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    /// 8-bit RGBA, sRGB encoded
    Rgba8UnormSrgb,
    /// 8-bit RGBA, linear
    Rgba8Unorm,
    /// 32-bit float depth
    D32Float,
}

/// Creation parameters for one eye's swap chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainDesc {
    /// Image format as stored by the runtime
    pub format: TextureFormat,
    /// Format of the views the device binds
    pub view_format: TextureFormat,
    /// Image size
    pub size: Extent2D,
    /// Array layers
    pub array_size: u32,
    /// Mip levels
    pub mip_levels: u32,
    /// MSAA samples
    pub sample_count: u32,
    /// Image is bound as a render target
    pub render_target: bool,
}

impl SwapChainDesc {
    /// The eye buffer layout used by the session: sRGB, single layer, no MSAA
    pub fn eye_buffer(size: Extent2D) -> Self {
        Self {
            format: TextureFormat::Rgba8UnormSrgb,
            view_format: TextureFormat::Rgba8Unorm,
            size,
            array_size: 1,
            mip_levels: 1,
            sample_count: 1,
            render_target: true,
        }
    }
}

/// Graphics adapter the runtime wants the device created on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AdapterId(pub u64);

/// Handle to a runtime swap chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapChainId(pub u64);

/// Handle to one swap-chain image owned by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Handle to a device render-target view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetId(pub u64);

/// Handle to a device depth-stencil view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthTargetId(pub u64);

/// Predicted eye poses for a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyePoses {
    /// Pose per eye
    pub poses: [Pose; EYE_COUNT],
    /// Time the poses were sampled at
    pub sample_time: f64,
}

/// The single eye-FOV layer submitted each frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EyeFovLayer {
    /// Swap chain per eye
    pub color_texture: [Option<SwapChainId>; EYE_COUNT],
    /// Viewport per eye
    pub viewport: [Recti; EYE_COUNT],
    /// Field of view per eye
    pub fov: [FovPort; EYE_COUNT],
    /// Pose each eye was rendered with
    pub render_pose: [Pose; EYE_COUNT],
    /// Sample time of the render poses
    pub sensor_sample_time: f64,
}

/// Predicted tracking state of the headset and hand controllers
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackingState {
    /// Headset pose
    pub head_pose: PoseState,
    /// Left and right hand controller poses
    pub hand_poses: [PoseState; 2],
}

/// Devices that can be queried individually
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackedDevice {
    /// Headset
    Hmd,
    /// Left hand controller
    LeftHand,
    /// Right hand controller
    RightHand,
    /// Auxiliary tracked object by slot
    Object(u8),
}

impl fmt::Display for TrackedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hmd => write!(f, "HMD"),
            Self::LeftHand => write!(f, "left hand"),
            Self::RightHand => write!(f, "right hand"),
            Self::Object(index) => write!(f, "object {index}"),
        }
    }
}

bitflags! {
    /// Connected controller types as reported by the runtime
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ConnectedDevices: u32 {
        /// Left touch controller
        const LEFT_TOUCH = 0x0001;
        /// Right touch controller
        const RIGHT_TOUCH = 0x0002;
        /// Remote
        const REMOTE = 0x0004;
        /// Gamepad
        const XBOX = 0x0010;
        /// Auxiliary object 0
        const OBJECT0 = 0x0100;
        /// Auxiliary object 1
        const OBJECT1 = 0x0200;
        /// Auxiliary object 2
        const OBJECT2 = 0x0400;
        /// Auxiliary object 3
        const OBJECT3 = 0x0800;
        /// Both touch controllers
        const TOUCH = Self::LEFT_TOUCH.bits() | Self::RIGHT_TOUCH.bits();
    }
}

impl ConnectedDevices {
    const OBJECT_SHIFT: u32 = 8;

    /// Auxiliary object slots that are connected, lowest first
    pub fn auxiliary_objects(self) -> impl Iterator<Item = u8> {
        let mask = (self.bits() >> Self::OBJECT_SHIFT) & 0xf;
        (0..MAX_AUXILIARY_OBJECTS as u8).filter(move |slot| mask & (1 << slot) != 0)
    }

    /// Number of connected auxiliary objects
    pub fn auxiliary_count(self) -> usize {
        self.auxiliary_objects().count()
    }

    /// Flag for auxiliary object `slot`
    pub fn object(slot: u8) -> Self {
        Self::from_bits_truncate(1 << (Self::OBJECT_SHIFT + u32::from(slot)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auxiliary_objects_are_read_as_a_mask() {
        let devices = ConnectedDevices::TOUCH | ConnectedDevices::OBJECT0 | ConnectedDevices::OBJECT2;
        assert_eq!(devices.auxiliary_objects().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(devices.auxiliary_count(), 2);
        assert_eq!(ConnectedDevices::TOUCH.auxiliary_count(), 0);
        assert_eq!(ConnectedDevices::object(3), ConnectedDevices::OBJECT3);
    }

    #[test]
    fn test_extent_division_and_viewport() {
        let half = Extent2D::new(2160, 1200).divided_by(2);
        assert_eq!(half, Extent2D::new(1080, 600));
        assert_eq!(Extent2D::new(10, 10).divided_by(0), Extent2D::new(10, 10));

        let viewport = Viewport::from(Recti::at_origin(half));
        assert_eq!(viewport.width, 1080.0);
        assert_eq!(viewport.x, 0.0);
    }
}
