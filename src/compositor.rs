//! Synchronous eye-texture submission.
//!
//! Runs on the thread that owns the GL context, never on the pose worker.

use crate::error::CompositorError;
use crate::types::{Eye, Texture, TextureBounds};
use crate::Result;

pub const GL_TEXTURE_2D: u32 = 0x0DE1;
pub const GL_TEXTURE_2D_MULTISAMPLE: u32 = 0x9100;
pub const GL_TEXTURE_CUBE_MAP: u32 = 0x8513;

/// Texture targets whose binding is restored after submission.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureTarget {
    Texture2D,
    Texture2DMultisample,
    CubeMap,
}

impl TextureTarget {
    pub const RESTORED: [TextureTarget; 3] = [
        TextureTarget::Texture2D,
        TextureTarget::Texture2DMultisample,
        TextureTarget::CubeMap,
    ];

    pub fn gl_enum(self) -> u32 {
        match self {
            TextureTarget::Texture2D => GL_TEXTURE_2D,
            TextureTarget::Texture2DMultisample => GL_TEXTURE_2D_MULTISAMPLE,
            TextureTarget::CubeMap => GL_TEXTURE_CUBE_MAP,
        }
    }
}

/// The VR compositor's submission interface.
pub trait Compositor {
    fn submit(
        &mut self,
        eye: Eye,
        texture: &Texture,
        bounds: &TextureBounds,
    ) -> std::result::Result<(), CompositorError>;

    /// Signal that both eyes for this frame have been submitted.
    fn post_present_handoff(&mut self);
}

/// The host GL context's record of texture bindings on its active unit.
pub trait GlContext {
    /// Binding the host recorded for `target`, if any.
    fn texture_binding(&self, target: TextureTarget) -> Option<u32>;

    /// Bind `texture` to `target` on the active unit (`0` unbinds).
    fn bind_texture(&mut self, target: TextureTarget, texture: u32);
}

/// Submit a side-by-side stereo texture, left half then right half.
///
/// The host's 2D, multisample and cube-map bindings are restored afterwards
/// whether or not submission succeeded, since the compositor may have
/// rebound them.
pub fn submit_texture(
    compositor: &mut dyn Compositor,
    gl: &mut dyn GlContext,
    texture: Texture,
) -> Result<()> {
    let result = submit_eyes(compositor, &texture);
    restore_texture_bindings(gl);
    result
}

fn submit_eyes(compositor: &mut dyn Compositor, texture: &Texture) -> Result<()> {
    let halves = [
        (Eye::Left, TextureBounds::LEFT_HALF),
        (Eye::Right, TextureBounds::RIGHT_HALF),
    ];

    for (eye, bounds) in halves {
        match compositor.submit(eye, texture, &bounds) {
            Ok(()) => {}
            // Losing VR focus is routine (another app took over): not an error,
            // but the rest of this frame is skipped.
            Err(CompositorError::DoNotHaveFocus) => {
                log::debug!("Compositor does not have focus, skipping {:?} eye", eye);
                return Ok(());
            }
            Err(e) => {
                log::warn!("Compositor rejected {:?} eye texture: {}", eye, e);
                return Err(e.into());
            }
        }
    }

    compositor.post_present_handoff();
    Ok(())
}

/// Rebind every restored target to the host's recorded binding, or `0`.
pub fn restore_texture_bindings(gl: &mut dyn GlContext) {
    for target in TextureTarget::RESTORED {
        let binding = gl.texture_binding(target).unwrap_or(0);
        gl.bind_texture(target, binding);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VrPoseError;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeCompositor {
        submitted: Vec<(Eye, TextureBounds)>,
        handoffs: usize,
        fail_with: HashMap<usize, CompositorError>,
        frame_open: bool,
    }

    impl Compositor for FakeCompositor {
        fn submit(
            &mut self,
            eye: Eye,
            _texture: &Texture,
            bounds: &TextureBounds,
        ) -> std::result::Result<(), CompositorError> {
            if let Some(err) = self.fail_with.get(&self.submitted.len()) {
                return Err(*err);
            }
            // Same eye twice in one frame is rejected like the real compositor.
            if self.frame_open && self.submitted.iter().any(|(e, _)| *e == eye) {
                return Err(CompositorError::AlreadySubmitted);
            }
            self.frame_open = true;
            self.submitted.push((eye, *bounds));
            Ok(())
        }

        fn post_present_handoff(&mut self) {
            self.handoffs += 1;
        }
    }

    #[derive(Default)]
    struct FakeGl {
        recorded: HashMap<u32, u32>,
        binds: Vec<(TextureTarget, u32)>,
    }

    impl GlContext for FakeGl {
        fn texture_binding(&self, target: TextureTarget) -> Option<u32> {
            self.recorded.get(&target.gl_enum()).copied()
        }

        fn bind_texture(&mut self, target: TextureTarget, texture: u32) {
            self.binds.push((target, texture));
        }
    }

    fn gl_with_2d_binding() -> FakeGl {
        let mut gl = FakeGl::default();
        gl.recorded.insert(GL_TEXTURE_2D, 42);
        gl
    }

    #[test]
    fn test_submits_both_halves() {
        let mut compositor = FakeCompositor::default();
        let mut gl = gl_with_2d_binding();

        submit_texture(&mut compositor, &mut gl, Texture::gl(7)).unwrap();

        assert_eq!(
            compositor.submitted,
            vec![
                (Eye::Left, TextureBounds::LEFT_HALF),
                (Eye::Right, TextureBounds::RIGHT_HALF),
            ]
        );
        assert_eq!(compositor.handoffs, 1);
        assert_eq!(
            gl.binds,
            vec![
                (TextureTarget::Texture2D, 42),
                (TextureTarget::Texture2DMultisample, 0),
                (TextureTarget::CubeMap, 0),
            ]
        );
    }

    #[test]
    fn test_double_submit_reports_already_submitted_and_restores() {
        let mut compositor = FakeCompositor::default();
        let mut gl = gl_with_2d_binding();

        submit_texture(&mut compositor, &mut gl, Texture::gl(7)).unwrap();
        gl.binds.clear();

        let err = submit_texture(&mut compositor, &mut gl, Texture::gl(7)).unwrap_err();
        assert!(matches!(
            err,
            VrPoseError::Compositor(CompositorError::AlreadySubmitted)
        ));
        assert_eq!(compositor.handoffs, 1);
        assert_eq!(gl.binds.len(), 3);
        assert_eq!(gl.binds[0], (TextureTarget::Texture2D, 42));
    }

    #[test]
    fn test_focus_loss_is_swallowed() {
        let mut compositor = FakeCompositor::default();
        compositor
            .fail_with
            .insert(0, CompositorError::DoNotHaveFocus);
        let mut gl = FakeGl::default();

        submit_texture(&mut compositor, &mut gl, Texture::gl(3)).unwrap();
        assert!(compositor.submitted.is_empty());
        assert_eq!(compositor.handoffs, 0);
        assert_eq!(gl.binds.len(), 3);
    }

    #[test]
    fn test_right_eye_failure_propagates() {
        let mut compositor = FakeCompositor::default();
        compositor.fail_with.insert(1, CompositorError::InvalidBounds);
        let mut gl = FakeGl::default();

        let err = submit_texture(&mut compositor, &mut gl, Texture::gl(3)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Compositor error: VRCompositorError_InvalidBounds"
        );
        assert_eq!(compositor.submitted.len(), 1);
        assert_eq!(gl.binds.len(), 3);
    }

    #[test]
    fn test_unknown_code_propagates() {
        let mut compositor = FakeCompositor::default();
        compositor.fail_with.insert(0, CompositorError::Unknown(999));
        let mut gl = FakeGl::default();

        let err = submit_texture(&mut compositor, &mut gl, Texture::gl(3)).unwrap_err();
        assert!(matches!(
            err,
            VrPoseError::Compositor(CompositorError::Unknown(999))
        ));
    }
}
