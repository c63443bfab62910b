//! C FFI layer for vrpose.
//!
//! Provides an opaque handle-based API for C/C++ hosts. The host supplies the
//! device, compositor and GL collaborators as callback tables. The generated C
//! header is written to `include/vrpose.h` by cbindgen.

use crate::compositor::{self, Compositor, GlContext, TextureTarget};
use crate::config::PipelineConfig;
use crate::dispatch::{Dispatcher, LoopWaker};
use crate::error::{CompositorError, LastError};
use crate::pipeline::PosePipeline;
use crate::session::{self, DeviceSession, PoseSource};
use crate::types::{
    ControllerRole, DeviceClass, Eye, PoseFrame, Texture, TextureBounds, TrackedDevicePose,
    MATRIX_LEN,
};
use crate::{Result, VrPoseError};
use std::ffi::{c_char, c_int, c_void};

/// Last error message for C consumers.
static LAST_ERROR: LastError = LastError::new();

/// Blocking pose query. Writes `count` records, returns 0 on success.
pub type VrpQueryPosesFn = Option<
    unsafe extern "C" fn(user_data: *mut c_void, poses: *mut TrackedDevicePose, count: u32) -> c_int,
>;
/// Returns an `ETrackedDeviceClass` value for `slot`.
pub type VrpDeviceClassFn =
    Option<unsafe extern "C" fn(user_data: *mut c_void, slot: u32) -> c_int>;
/// Returns an `ETrackedControllerRole` value for `slot`.
pub type VrpControllerRoleFn =
    Option<unsafe extern "C" fn(user_data: *mut c_void, slot: u32) -> c_int>;
/// Wakes the host event loop; may be called from any thread.
pub type VrpWakeFn = Option<unsafe extern "C" fn(user_data: *mut c_void)>;
/// Completion callback, run inside `vrp_dispatch`.
pub type VrpCompleteFn = Option<unsafe extern "C" fn(user_data: *mut c_void)>;

/// Device collaborators. `query_poses` runs on the worker thread; the
/// classification callbacks run there too and must be safe to call from it.
#[repr(C)]
pub struct VrpDeviceCallbacks {
    pub user_data: *mut c_void,
    pub query_poses: VrpQueryPosesFn,
    pub device_class: VrpDeviceClassFn,
    pub controller_role: VrpControllerRoleFn,
}

/// Compositor collaborator. `submit` returns an `EVRCompositorError` code.
#[repr(C)]
pub struct VrpCompositorCallbacks {
    pub user_data: *mut c_void,
    pub submit: Option<
        unsafe extern "C" fn(
            user_data: *mut c_void,
            eye: Eye,
            texture: *const Texture,
            bounds: *const TextureBounds,
        ) -> c_int,
    >,
    pub post_present_handoff: Option<unsafe extern "C" fn(user_data: *mut c_void)>,
}

/// GL context collaborator. `texture_binding` returns false when the host has
/// no binding recorded for `target` (a GL enum).
#[repr(C)]
pub struct VrpGlCallbacks {
    pub user_data: *mut c_void,
    pub texture_binding: Option<
        unsafe extern "C" fn(user_data: *mut c_void, target: u32, texture: *mut u32) -> bool,
    >,
    pub bind_texture:
        Option<unsafe extern "C" fn(user_data: *mut c_void, target: u32, texture: u32)>,
}

/// Opaque pipeline handle for C consumers.
pub struct VrpPipeline {
    pipeline: PosePipeline,
    dispatcher: Dispatcher,
}

/// Host pointer handed back to host callbacks; the host guarantees it may be
/// used from the threads the callbacks are documented to run on.
#[derive(Clone, Copy)]
struct UserData(*mut c_void);

unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

impl UserData {
    fn get(self) -> *mut c_void {
        self.0
    }
}

struct HostSource {
    query: unsafe extern "C" fn(*mut c_void, *mut TrackedDevicePose, u32) -> c_int,
    user: UserData,
}

impl PoseSource for HostSource {
    fn query_poses(&mut self, poses: &mut [TrackedDevicePose]) -> Result<()> {
        let rc = unsafe { (self.query)(self.user.get(), poses.as_mut_ptr(), poses.len() as u32) };
        if rc != 0 {
            return Err(VrPoseError::DeviceQuery(format!("query_poses returned {}", rc)));
        }
        Ok(())
    }
}

struct HostSession {
    device_class: unsafe extern "C" fn(*mut c_void, u32) -> c_int,
    controller_role: unsafe extern "C" fn(*mut c_void, u32) -> c_int,
    user: UserData,
}

impl DeviceSession for HostSession {
    fn device_class(&self, slot: u32) -> DeviceClass {
        DeviceClass::from_raw(unsafe { (self.device_class)(self.user.get(), slot) })
    }

    fn controller_role(&self, slot: u32) -> ControllerRole {
        ControllerRole::from_raw(unsafe { (self.controller_role)(self.user.get(), slot) })
    }
}

struct HostWaker {
    wake: unsafe extern "C" fn(*mut c_void),
    user: UserData,
}

impl LoopWaker for HostWaker {
    fn wake(&self) {
        unsafe { (self.wake)(self.user.get()) }
    }
}

/// Caller buffers plus the callback to run once they are filled.
struct HostCompletion {
    hmd: *mut f32,
    left: *mut f32,
    right: *mut f32,
    callback: unsafe extern "C" fn(*mut c_void),
    user: UserData,
}

// The buffers are only touched in `deliver`, which runs inside `vrp_dispatch`
// on the host's loop thread.
unsafe impl Send for HostCompletion {}

impl HostCompletion {
    fn deliver(self, frame: PoseFrame) {
        unsafe {
            std::ptr::copy_nonoverlapping(frame.hmd.as_ptr(), self.hmd, MATRIX_LEN);
            std::ptr::copy_nonoverlapping(frame.left_controller.as_ptr(), self.left, MATRIX_LEN);
            std::ptr::copy_nonoverlapping(frame.right_controller.as_ptr(), self.right, MATRIX_LEN);
            (self.callback)(self.user.get());
        }
    }
}

struct HostCompositor<'a>(&'a VrpCompositorCallbacks);

impl Compositor for HostCompositor<'_> {
    fn submit(
        &mut self,
        eye: Eye,
        texture: &Texture,
        bounds: &TextureBounds,
    ) -> std::result::Result<(), CompositorError> {
        let Some(submit) = self.0.submit else {
            return Err(CompositorError::RequestFailed);
        };
        let code = unsafe { submit(self.0.user_data, eye, texture, bounds) };
        match CompositorError::from_code(code) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    fn post_present_handoff(&mut self) {
        if let Some(handoff) = self.0.post_present_handoff {
            unsafe { handoff(self.0.user_data) }
        }
    }
}

struct HostGl<'a>(&'a VrpGlCallbacks);

impl GlContext for HostGl<'_> {
    fn texture_binding(&self, target: TextureTarget) -> Option<u32> {
        let query = self.0.texture_binding?;
        let mut texture = 0u32;
        let found = unsafe { query(self.0.user_data, target.gl_enum(), &mut texture) };
        found.then_some(texture)
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: u32) {
        if let Some(bind) = self.0.bind_texture {
            unsafe { bind(self.0.user_data, target.gl_enum(), texture) }
        }
    }
}

fn report<T>(result: Result<T>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            LAST_ERROR.set(&e);
            None
        }
    }
}

fn invalid(msg: &str) -> VrPoseError {
    VrPoseError::InvalidArgument(msg.to_string())
}

unsafe fn create_pipeline(
    callbacks: *const VrpDeviceCallbacks,
    wake: VrpWakeFn,
    wake_data: *mut c_void,
) -> Result<VrpPipeline> {
    if callbacks.is_null() {
        return Err(invalid("device callbacks are null"));
    }
    let wake = wake.ok_or_else(|| invalid("wake callback is null"))?;
    let callbacks = &*callbacks;
    let user = UserData(callbacks.user_data);

    let source = HostSource {
        query: session::acquire(callbacks.query_poses, "pose query")?,
        user,
    };
    let session = HostSession {
        device_class: session::acquire(callbacks.device_class, "VR system")?,
        controller_role: session::acquire(callbacks.controller_role, "VR system")?,
        user,
    };
    let waker = HostWaker {
        wake,
        user: UserData(wake_data),
    };

    let pipeline = PosePipeline::with_config(PipelineConfig::from_env(), source, session, waker)?;
    let dispatcher = pipeline.dispatcher();
    Ok(VrpPipeline {
        pipeline,
        dispatcher,
    })
}

/// Create a pose pipeline. The worker thread starts on the first request.
/// Returns NULL on error (check vrp_last_error()).
///
/// # Safety
/// `callbacks` must point to a valid `VrpDeviceCallbacks`, or be null.
/// `wake` may be called from the worker thread with `wake_data`.
#[no_mangle]
pub unsafe extern "C" fn vrp_pipeline_create(
    callbacks: *const VrpDeviceCallbacks,
    wake: VrpWakeFn,
    wake_data: *mut c_void,
) -> *mut VrpPipeline {
    match report(create_pipeline(callbacks, wake, wake_data)) {
        Some(p) => Box::into_raw(Box::new(p)),
        None => std::ptr::null_mut(),
    }
}

/// Queue a pose request.
///
/// The three buffers of `len` floats (must be 16) are filled and `callback`
/// is invoked from a later `vrp_dispatch` call. Do not read the buffers
/// before then. Returns 0 on success, -1 on error.
///
/// # Safety
/// `pipeline` must be a valid handle or null. The buffers must stay valid
/// until the callback has run.
#[no_mangle]
pub unsafe extern "C" fn vrp_request_poses(
    pipeline: *mut VrpPipeline,
    hmd: *mut f32,
    left_controller: *mut f32,
    right_controller: *mut f32,
    len: usize,
    callback: VrpCompleteFn,
    user_data: *mut c_void,
) -> c_int {
    let result = (|| -> Result<()> {
        if pipeline.is_null() {
            return Err(invalid("pipeline is null"));
        }
        if hmd.is_null() || left_controller.is_null() || right_controller.is_null() {
            return Err(invalid("pose buffers must not be null"));
        }
        if len != MATRIX_LEN {
            return Err(VrPoseError::InvalidArgument(format!(
                "pose buffers must hold {} floats, got {}",
                MATRIX_LEN, len
            )));
        }
        let callback = callback.ok_or_else(|| invalid("completion callback is null"))?;
        let completion = HostCompletion {
            hmd,
            left: left_controller,
            right: right_controller,
            callback,
            user: UserData(user_data),
        };
        (*pipeline)
            .pipeline
            .submit(PoseFrame::new(), move |frame| completion.deliver(frame))
    })();

    match report(result) {
        Some(()) => 0,
        None => -1,
    }
}

/// Deliver every completed request. Call on the event-loop thread after the
/// wake callback fired. Returns the number delivered, or -1 on error
/// (the worker has died).
///
/// # Safety
/// `pipeline` must be a valid handle, or null.
#[no_mangle]
pub unsafe extern "C" fn vrp_dispatch(pipeline: *mut VrpPipeline) -> c_int {
    if pipeline.is_null() {
        LAST_ERROR.set(&invalid("pipeline is null"));
        return -1;
    }
    match report((*pipeline).dispatcher.dispatch()) {
        Some(n) => n as c_int,
        None => -1,
    }
}

/// Worker state: 0 idle, 1 running, 2 stopping, 3 stopped, 4 dead.
/// Returns -1 for a null handle.
///
/// # Safety
/// `pipeline` must be a valid handle, or null.
#[no_mangle]
pub unsafe extern "C" fn vrp_worker_state(pipeline: *const VrpPipeline) -> c_int {
    if pipeline.is_null() {
        return -1;
    }
    (*pipeline).pipeline.worker_state() as c_int
}

/// Stop accepting requests; the worker exits after the queued ones.
///
/// # Safety
/// `pipeline` must be a valid handle, or null.
#[no_mangle]
pub unsafe extern "C" fn vrp_shutdown(pipeline: *mut VrpPipeline) {
    if !pipeline.is_null() {
        (*pipeline).pipeline.shutdown();
    }
}

/// Shut down, join the worker and free the handle. Undelivered callbacks are
/// dropped without running.
///
/// # Safety
/// `pipeline` must be a pointer returned by `vrp_pipeline_create`, or null.
#[no_mangle]
pub unsafe extern "C" fn vrp_pipeline_destroy(pipeline: *mut VrpPipeline) {
    if !pipeline.is_null() {
        drop(Box::from_raw(pipeline));
    }
}

/// Submit a side-by-side stereo texture and restore the GL texture bindings.
/// Returns 0 on success (including lost focus), -1 on error.
///
/// # Safety
/// `compositor` and `gl` must point to valid callback tables, or be null.
/// Must be called on the thread owning the GL context.
#[no_mangle]
pub unsafe extern "C" fn vrp_submit_texture(
    compositor: *const VrpCompositorCallbacks,
    gl: *const VrpGlCallbacks,
    texture: u32,
) -> c_int {
    let result = (|| -> Result<()> {
        let compositor = session::acquire(compositor.as_ref(), "VR compositor")?;
        let gl = gl.as_ref().ok_or_else(|| invalid("GL context is null"))?;
        compositor::submit_texture(
            &mut HostCompositor(compositor),
            &mut HostGl(gl),
            Texture::gl(texture),
        )
    })();

    match report(result) {
        Some(()) => 0,
        None => -1,
    }
}

/// Get the last error raised on the calling thread. Returns NULL if none.
/// The returned pointer is valid until the next failing vrpose call on the
/// same thread.
#[no_mangle]
pub extern "C" fn vrp_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HmdMatrix34;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    unsafe extern "C" fn query_hmd(
        _user: *mut c_void,
        poses: *mut TrackedDevicePose,
        count: u32,
    ) -> c_int {
        let poses = std::slice::from_raw_parts_mut(poses, count as usize);
        let mut m = HmdMatrix34::IDENTITY;
        m.m[0][3] = 2.5;
        poses[0] = TrackedDevicePose::valid(m);
        0
    }

    unsafe extern "C" fn class_hmd_at_zero(_user: *mut c_void, slot: u32) -> c_int {
        if slot == 0 {
            1
        } else {
            0
        }
    }

    unsafe extern "C" fn role_none(_user: *mut c_void, _slot: u32) -> c_int {
        0
    }

    unsafe extern "C" fn count_call(user: *mut c_void) {
        (*(user as *const AtomicUsize)).fetch_add(1, Ordering::SeqCst);
    }

    fn device_callbacks() -> VrpDeviceCallbacks {
        VrpDeviceCallbacks {
            user_data: std::ptr::null_mut(),
            query_poses: Some(query_hmd),
            device_class: Some(class_hmd_at_zero),
            controller_role: Some(role_none),
        }
    }

    #[test]
    fn test_request_roundtrip() {
        let wakes = AtomicUsize::new(0);
        let completions = AtomicUsize::new(0);
        let callbacks = device_callbacks();

        unsafe {
            let p = vrp_pipeline_create(
                &callbacks,
                Some(count_call),
                &wakes as *const AtomicUsize as *mut c_void,
            );
            assert!(!p.is_null());

            let mut hmd = [0.0f32; 16];
            let mut left = [0.0f32; 16];
            let mut right = [0.0f32; 16];
            let rc = vrp_request_poses(
                p,
                hmd.as_mut_ptr(),
                left.as_mut_ptr(),
                right.as_mut_ptr(),
                16,
                Some(count_call),
                &completions as *const AtomicUsize as *mut c_void,
            );
            assert_eq!(rc, 0);

            let deadline = Instant::now() + Duration::from_secs(5);
            while completions.load(Ordering::SeqCst) == 0 {
                assert!(Instant::now() < deadline, "completion never delivered");
                assert!(vrp_dispatch(p) >= 0);
                std::thread::sleep(Duration::from_millis(1));
            }

            assert_eq!(hmd[12], 2.5);
            assert_eq!(hmd[15], 1.0);
            assert!(left.iter().all(|v| v.is_nan()));
            assert!(right.iter().all(|v| v.is_nan()));
            assert!(wakes.load(Ordering::SeqCst) >= 1);

            vrp_shutdown(p);
            assert!(vrp_worker_state(p) >= 2);
            vrp_pipeline_destroy(p);
        }
    }

    #[test]
    fn test_argument_errors() {
        let callbacks = device_callbacks();
        unsafe {
            let p = vrp_pipeline_create(&callbacks, Some(count_call), std::ptr::null_mut());
            assert!(!p.is_null());

            let mut buf = [0.0f32; 16];
            let rc = vrp_request_poses(
                p,
                buf.as_mut_ptr(),
                std::ptr::null_mut(),
                buf.as_mut_ptr(),
                16,
                Some(count_call),
                std::ptr::null_mut(),
            );
            assert_eq!(rc, -1);
            assert!(LAST_ERROR.message().starts_with("Invalid argument"));

            let rc = vrp_request_poses(
                p,
                buf.as_mut_ptr(),
                buf.as_mut_ptr(),
                buf.as_mut_ptr(),
                12,
                Some(count_call),
                std::ptr::null_mut(),
            );
            assert_eq!(rc, -1);
            assert!(!vrp_last_error().is_null());

            // Nothing was queued, so the worker never started.
            assert_eq!(vrp_worker_state(p), 0);
            vrp_pipeline_destroy(p);

            let mut missing = device_callbacks();
            missing.device_class = None;
            let p = vrp_pipeline_create(&missing, Some(count_call), std::ptr::null_mut());
            assert!(p.is_null());
            assert!(LAST_ERROR.message().starts_with("Hardware unavailable"));

            assert_eq!(vrp_dispatch(std::ptr::null_mut()), -1);
            assert_eq!(vrp_worker_state(std::ptr::null()), -1);
        }
    }

    unsafe extern "C" fn submit_already_submitted(
        _user: *mut c_void,
        _eye: Eye,
        _texture: *const Texture,
        _bounds: *const TextureBounds,
    ) -> c_int {
        108
    }

    unsafe extern "C" fn no_binding(_user: *mut c_void, _target: u32, _texture: *mut u32) -> bool {
        false
    }

    unsafe extern "C" fn record_bind(user: *mut c_void, _target: u32, _texture: u32) {
        (*(user as *const AtomicUsize)).fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_submit_texture_error_still_restores() {
        let binds = AtomicUsize::new(0);
        let compositor = VrpCompositorCallbacks {
            user_data: std::ptr::null_mut(),
            submit: Some(submit_already_submitted),
            post_present_handoff: None,
        };
        let gl = VrpGlCallbacks {
            user_data: &binds as *const AtomicUsize as *mut c_void,
            texture_binding: Some(no_binding),
            bind_texture: Some(record_bind),
        };

        unsafe {
            assert_eq!(vrp_submit_texture(&compositor, &gl, 5), -1);
            assert_eq!(
                LAST_ERROR.message(),
                "Compositor error: VRCompositorError_AlreadySubmitted"
            );
            assert_eq!(vrp_submit_texture(std::ptr::null(), &gl, 5), -1);
            assert!(LAST_ERROR.message().starts_with("Hardware unavailable"));
        }
        assert_eq!(binds.load(Ordering::SeqCst), 3);
    }
}
