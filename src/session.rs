use crate::types::{ControllerRole, DeviceClass, TrackedDevicePose};
use crate::{Result, VrPoseError};

/// Read-only device classification supplied by the host's VR session.
///
/// Called from the worker thread while it transforms a sample.
pub trait DeviceSession: Send + Sync {
    /// Class of the device in `slot`.
    fn device_class(&self, slot: u32) -> DeviceClass;

    /// Hand assignment of the controller in `slot`.
    fn controller_role(&self, slot: u32) -> ControllerRole;
}

/// The blocking hardware pose query.
///
/// Owned by exactly one thread at a time; `&mut self` keeps concurrent
/// callers out.
pub trait PoseSource: Send {
    /// Block until the device publishes the next poses and write one record
    /// per slot into `poses`.
    fn query_poses(&mut self, poses: &mut [TrackedDevicePose]) -> Result<()>;
}

impl<S: DeviceSession + ?Sized> DeviceSession for std::sync::Arc<S> {
    fn device_class(&self, slot: u32) -> DeviceClass {
        (**self).device_class(slot)
    }

    fn controller_role(&self, slot: u32) -> ControllerRole {
        (**self).controller_role(slot)
    }
}

impl<P: PoseSource + ?Sized> PoseSource for Box<P> {
    fn query_poses(&mut self, poses: &mut [TrackedDevicePose]) -> Result<()> {
        (**self).query_poses(poses)
    }
}

/// Turn an optional collaborator handle into a value or `HardwareUnavailable`.
///
/// Mirrors the host API where acquiring the compositor or system interface
/// returns null when no runtime is present.
pub fn acquire<T>(handle: Option<T>, what: &str) -> Result<T> {
    handle.ok_or_else(|| {
        log::warn!("Unable to acquire {}", what);
        VrPoseError::HardwareUnavailable(format!("unable to initialize {}", what))
    })
}
