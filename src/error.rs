use std::cell::RefCell;
use std::ffi::{c_char, CString};

/// Errors surfaced by the pose pipeline and the texture submission path.
#[derive(Debug, thiserror::Error)]
pub enum VrPoseError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Hardware unavailable: {0}")]
    HardwareUnavailable(String),

    #[error("Compositor error: {0}")]
    Compositor(#[from] CompositorError),

    #[error("Pose worker terminated unexpectedly")]
    WorkerFatal,

    #[error("Pose pipeline has been shut down")]
    ShutDown,

    #[error("Failed to spawn pose worker: {0}")]
    WorkerSpawn(String),

    #[error("Device pose query failed: {0}")]
    DeviceQuery(String),
}

/// Failure codes reported by a compositor when submitting an eye texture.
///
/// Discriminants follow the OpenVR `EVRCompositorError` numbering so raw codes
/// coming through the C API map one to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CompositorError {
    #[error("VRCompositorError_RequestFailed")]
    RequestFailed,

    #[error("VRCompositorError_IncompatibleVersion")]
    IncompatibleVersion,

    #[error("VRCompositorError_DoNotHaveFocus")]
    DoNotHaveFocus,

    #[error("VRCompositorError_InvalidTexture")]
    InvalidTexture,

    #[error("VRCompositorError_IsNotSceneApplication")]
    IsNotSceneApplication,

    #[error("VRCompositorError_TextureIsOnWrongDevice")]
    TextureIsOnWrongDevice,

    #[error("VRCompositorError_TextureUsesUnsupportedFormat")]
    TextureUsesUnsupportedFormat,

    #[error("VRCompositorError_SharedTexturesNotSupported")]
    SharedTexturesNotSupported,

    #[error("VRCompositorError_IndexOutOfRange")]
    IndexOutOfRange,

    #[error("VRCompositorError_AlreadySubmitted")]
    AlreadySubmitted,

    #[error("VRCompositorError_InvalidBounds")]
    InvalidBounds,

    #[error("unknown (code {0})")]
    Unknown(i32),
}

impl CompositorError {
    /// Map a raw compositor return code. `0` means success and yields `None`.
    pub fn from_code(code: i32) -> Option<CompositorError> {
        let err = match code {
            0 => return None,
            1 => CompositorError::RequestFailed,
            100 => CompositorError::IncompatibleVersion,
            101 => CompositorError::DoNotHaveFocus,
            102 => CompositorError::InvalidTexture,
            103 => CompositorError::IsNotSceneApplication,
            104 => CompositorError::TextureIsOnWrongDevice,
            105 => CompositorError::TextureUsesUnsupportedFormat,
            106 => CompositorError::SharedTexturesNotSupported,
            107 => CompositorError::IndexOutOfRange,
            108 => CompositorError::AlreadySubmitted,
            109 => CompositorError::InvalidBounds,
            other => CompositorError::Unknown(other),
        };
        Some(err)
    }

    /// Raw code for this error.
    pub fn code(&self) -> i32 {
        match *self {
            CompositorError::RequestFailed => 1,
            CompositorError::IncompatibleVersion => 100,
            CompositorError::DoNotHaveFocus => 101,
            CompositorError::InvalidTexture => 102,
            CompositorError::IsNotSceneApplication => 103,
            CompositorError::TextureIsOnWrongDevice => 104,
            CompositorError::TextureUsesUnsupportedFormat => 105,
            CompositorError::SharedTexturesNotSupported => 106,
            CompositorError::IndexOutOfRange => 107,
            CompositorError::AlreadySubmitted => 108,
            CompositorError::InvalidBounds => 109,
            CompositorError::Unknown(code) => code,
        }
    }
}

thread_local! {
    static LAST_MESSAGE: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Per-thread last-error storage for the C FFI layer.
///
/// Each thread sees only the errors raised by its own calls, so a pointer from
/// [`as_ptr`](Self::as_ptr) stays valid until that same thread records the
/// next error.
pub(crate) struct LastError;

impl LastError {
    pub const fn new() -> Self {
        LastError
    }

    pub fn set(&self, err: &VrPoseError) {
        let text = err.to_string().replace('\0', " ");
        let message = CString::new(text).ok();
        LAST_MESSAGE.with(|slot| *slot.borrow_mut() = message);
    }

    pub fn as_ptr(&self) -> *const c_char {
        LAST_MESSAGE.with(|slot| match slot.borrow().as_ref() {
            Some(msg) => msg.as_ptr(),
            None => std::ptr::null(),
        })
    }

    #[cfg(test)]
    pub fn message(&self) -> String {
        LAST_MESSAGE.with(|slot| {
            slot.borrow()
                .as_ref()
                .map(|m| m.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }
}
