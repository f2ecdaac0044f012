//! Per-eye render resources

use crate::backend::{
    DepthTargetId, Extent2D, Eye, FovPort, GraphicsDevice, RenderTargetId, Recti, SwapChainDesc,
    SwapChainId, VrRuntime,
};
use crate::foundation::math::Pose;

use super::SessionError;

/// Everything needed to render and submit one eye
///
/// Created once per session from the HMD descriptor and never resized.
#[derive(Debug, Clone, PartialEq)]
pub struct EyeRenderState {
    /// Which eye
    pub eye: Eye,
    /// Viewport into the eye texture
    pub viewport: Recti,
    /// Field of view the eye is rendered with
    pub fov: FovPort,
    /// Offset from the head centre to the eye
    pub hmd_to_eye: Pose,
    /// Runtime swap chain backing the eye
    pub swap_chain: SwapChainId,
    /// One render-target view per swap-chain image
    pub render_targets: Vec<RenderTargetId>,
    /// Depth target shared by all images
    pub depth_target: DepthTargetId,
}

impl EyeRenderState {
    /// Allocate the swap chain, views and depth target for one eye
    ///
    /// On failure everything allocated so far is released again.
    pub fn create(
        eye: Eye,
        fov: FovPort,
        pixels_per_display_pixel: f32,
        runtime: &mut dyn VrRuntime,
        device: &mut dyn GraphicsDevice,
    ) -> Result<Self, SessionError> {
        let setup = |source| SessionError::EyeSetup { eye, source };

        let ideal_size = runtime
            .fov_texture_size(eye, fov, pixels_per_display_pixel)
            .map_err(setup)?;
        let hmd_to_eye = runtime.eye_render_desc(eye, fov).map_err(setup)?.hmd_to_eye_pose;

        let desc = SwapChainDesc::eye_buffer(ideal_size);
        let swap_chain = runtime
            .create_swap_chain(&desc)
            .map_err(|source| SessionError::SwapChainCreate { eye, source })?;

        let targets = match Self::create_views(eye, swap_chain, &desc, ideal_size, runtime, device) {
            Ok(targets) => targets,
            Err(err) => {
                runtime.destroy_swap_chain(swap_chain);
                return Err(err);
            }
        };
        let (render_targets, depth_target) = targets;

        log::debug!(
            "Eye {eye}: {}x{} swap chain with {} images",
            ideal_size.width,
            ideal_size.height,
            render_targets.len()
        );

        Ok(Self {
            eye,
            viewport: Recti::at_origin(ideal_size),
            fov,
            hmd_to_eye,
            swap_chain,
            render_targets,
            depth_target,
        })
    }

    fn create_views(
        eye: Eye,
        swap_chain: SwapChainId,
        desc: &SwapChainDesc,
        size: Extent2D,
        runtime: &mut dyn VrRuntime,
        device: &mut dyn GraphicsDevice,
    ) -> Result<(Vec<RenderTargetId>, DepthTargetId), SessionError> {
        let mut render_targets = Vec::new();
        let result = (|| {
            let length = runtime
                .swap_chain_length(swap_chain)
                .map_err(|source| SessionError::EyeSetup { eye, source })?;

            for index in 0..length {
                let texture = runtime
                    .swap_chain_buffer(swap_chain, index)
                    .map_err(|source| SessionError::EyeSetup { eye, source })?;
                let target = device
                    .create_render_target(texture, desc.view_format)
                    .map_err(|source| SessionError::RenderTargetCreate { eye, source })?;
                render_targets.push(target);
            }

            device
                .create_depth_target(size)
                .map_err(|source| SessionError::DepthTargetCreate { eye, source })
        })();

        match result {
            Ok(depth_target) => Ok((render_targets, depth_target)),
            Err(err) => {
                for target in render_targets {
                    device.release_render_target(target);
                }
                Err(err)
            }
        }
    }

    /// Render-target view for a swap-chain image index
    pub fn render_target(&self, index: usize) -> Option<RenderTargetId> {
        self.render_targets.get(index).copied()
    }

    /// Release every resource owned by this eye
    pub fn release(self, runtime: &mut dyn VrRuntime, device: &mut dyn GraphicsDevice) {
        for target in self.render_targets {
            device.release_render_target(target);
        }
        device.release_depth_target(self.depth_target);
        runtime.destroy_swap_chain(self.swap_chain);
    }
}
