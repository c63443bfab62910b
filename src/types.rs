/// Number of tracked-device slots a pose sample carries.
pub const MAX_TRACKED_DEVICE_COUNT: usize = 16;

/// Number of floats in one output matrix (4x4).
pub const MATRIX_LEN: usize = 16;

/// 3x4 device-to-tracking-space transform, indexed `m[row][col]`.
/// Column 3 holds the translation.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HmdMatrix34 {
    pub m: [[f32; 4]; 3],
}

impl HmdMatrix34 {
    pub const IDENTITY: HmdMatrix34 = HmdMatrix34 {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ],
    };
}

/// One per-device record of a pose sample.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedDevicePose {
    pub device_to_absolute_tracking: HmdMatrix34,
    pub pose_is_valid: bool,
}

impl TrackedDevicePose {
    pub const INVALID: TrackedDevicePose = TrackedDevicePose {
        device_to_absolute_tracking: HmdMatrix34::IDENTITY,
        pose_is_valid: false,
    };

    pub fn valid(matrix: HmdMatrix34) -> Self {
        Self {
            device_to_absolute_tracking: matrix,
            pose_is_valid: true,
        }
    }
}

impl Default for TrackedDevicePose {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Class of the device occupying a tracking slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Invalid = 0,
    Hmd = 1,
    Controller = 2,
    Other = 3,
}

impl DeviceClass {
    /// Map an OpenVR `ETrackedDeviceClass` value. Trackers, reference stations
    /// and display redirects all collapse into `Other`.
    pub fn from_raw(raw: i32) -> DeviceClass {
        match raw {
            0 => DeviceClass::Invalid,
            1 => DeviceClass::Hmd,
            2 => DeviceClass::Controller,
            _ => DeviceClass::Other,
        }
    }
}

/// Hand assignment of a controller.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerRole {
    None = 0,
    Left = 1,
    Right = 2,
}

impl ControllerRole {
    pub fn from_raw(raw: i32) -> ControllerRole {
        match raw {
            1 => ControllerRole::Left,
            2 => ControllerRole::Right,
            _ => ControllerRole::None,
        }
    }
}

bitflags::bitflags! {
    /// Roles that received pose data in a frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[repr(C)]
    pub struct Tracked: u32 {
        const HMD              = 1 << 0;
        const LEFT_CONTROLLER  = 1 << 1;
        const RIGHT_CONTROLLER = 1 << 2;
    }
}

/// The three caller-owned output matrices of a pose request.
///
/// A frame is moved into [`crate::PosePipeline::submit`] and handed back to the
/// completion once the worker has written it. Roles without a valid device
/// read as all-NaN.
#[derive(Debug, Clone, Copy)]
pub struct PoseFrame {
    pub hmd: [f32; MATRIX_LEN],
    pub left_controller: [f32; MATRIX_LEN],
    pub right_controller: [f32; MATRIX_LEN],
    tracked: Tracked,
}

impl PoseFrame {
    pub fn new() -> Self {
        Self {
            hmd: [f32::NAN; MATRIX_LEN],
            left_controller: [f32::NAN; MATRIX_LEN],
            right_controller: [f32::NAN; MATRIX_LEN],
            tracked: Tracked::empty(),
        }
    }

    /// Roles written by the last transform.
    pub fn tracked(&self) -> Tracked {
        self.tracked
    }

    /// Fill every matrix with NaN and clear the tracked set.
    pub fn reset(&mut self) {
        self.hmd.fill(f32::NAN);
        self.left_controller.fill(f32::NAN);
        self.right_controller.fill(f32::NAN);
        self.tracked = Tracked::empty();
    }

    pub(crate) fn slot_mut(&mut self, role: Tracked) -> Option<&mut [f32; MATRIX_LEN]> {
        let buf = if role == Tracked::HMD {
            &mut self.hmd
        } else if role == Tracked::LEFT_CONTROLLER {
            &mut self.left_controller
        } else if role == Tracked::RIGHT_CONTROLLER {
            &mut self.right_controller
        } else {
            return None;
        };
        self.tracked.insert(role);
        Some(buf)
    }
}

impl Default for PoseFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Eye selector for texture submission.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Left = 0,
    Right = 1,
}

/// UV sub-rectangle of a texture, `(u_min, v_min)` to `(u_max, v_max)`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureBounds {
    pub u_min: f32,
    pub v_min: f32,
    pub u_max: f32,
    pub v_max: f32,
}

impl TextureBounds {
    /// Left half of a side-by-side stereo texture.
    pub const LEFT_HALF: TextureBounds = TextureBounds {
        u_min: 0.0,
        v_min: 0.0,
        u_max: 0.5,
        v_max: 1.0,
    };

    /// Right half of a side-by-side stereo texture.
    pub const RIGHT_HALF: TextureBounds = TextureBounds {
        u_min: 0.5,
        v_min: 0.0,
        u_max: 1.0,
        v_max: 1.0,
    };
}

/// Color space tag attached to a submitted texture.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    Auto = 0,
    #[default]
    Gamma = 1,
    Linear = 2,
}

/// An OpenGL texture handed to the compositor.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Texture {
    pub handle: u32,
    pub color_space: ColorSpace,
}

impl Texture {
    pub fn gl(handle: u32) -> Self {
        Self {
            handle,
            color_space: ColorSpace::Gamma,
        }
    }
}
