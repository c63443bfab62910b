//! Conversion of a raw device pose sample into the three output matrices.
//!
//! Output layout: element `col * 4 + row` holds source `m[row][col]` for the
//! three source rows, and elements 3, 7, 11 and 15 are fixed to `0, 0, 0, 1`.
//! Read column-major this is the usual homogeneous 4x4 with the translation in
//! elements 12..15; read row-major, the fourth column is `(0, 0, 0, 1)` and the
//! first three columns are the transposed 3x4 source block.

use crate::session::{DeviceSession, PoseSource};
use crate::types::{
    ControllerRole, DeviceClass, HmdMatrix34, PoseFrame, Tracked, TrackedDevicePose,
    MATRIX_LEN, MAX_TRACKED_DEVICE_COUNT,
};
use crate::Result;

/// One hardware query result: a validity flag and transform per slot.
#[derive(Debug, Clone, Copy)]
pub struct PoseSample {
    poses: [TrackedDevicePose; MAX_TRACKED_DEVICE_COUNT],
}

impl PoseSample {
    /// A sample with every slot invalid.
    pub fn new() -> Self {
        Self {
            poses: [TrackedDevicePose::INVALID; MAX_TRACKED_DEVICE_COUNT],
        }
    }

    pub fn poses(&self) -> &[TrackedDevicePose] {
        &self.poses
    }

    /// Replace the pose in `slot`. Out-of-range slots are ignored.
    pub fn set(&mut self, slot: usize, pose: TrackedDevicePose) {
        if let Some(p) = self.poses.get_mut(slot) {
            *p = pose;
        }
    }

    /// Run the blocking query for the first `slots` slots.
    ///
    /// Slots beyond `slots` stay invalid.
    pub fn query(source: &mut dyn PoseSource, slots: usize) -> Result<PoseSample> {
        let mut sample = PoseSample::new();
        let slots = slots.min(MAX_TRACKED_DEVICE_COUNT);
        source.query_poses(&mut sample.poses[..slots])?;
        Ok(sample)
    }
}

impl Default for PoseSample {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `matrix` into `out` as a 4x4 homogeneous matrix (see module docs).
pub fn to_homogeneous(matrix: &HmdMatrix34, out: &mut [f32; MATRIX_LEN]) {
    for col in 0..4 {
        for row in 0..3 {
            out[col * 4 + row] = matrix.m[row][col];
        }
        out[col * 4 + 3] = 0.0;
    }
    out[15] = 1.0;
}

/// Role a device slot feeds, if any.
fn classify(session: &dyn DeviceSession, slot: u32) -> Option<Tracked> {
    match session.device_class(slot) {
        DeviceClass::Hmd => Some(Tracked::HMD),
        DeviceClass::Controller => match session.controller_role(slot) {
            ControllerRole::Left => Some(Tracked::LEFT_CONTROLLER),
            ControllerRole::Right => Some(Tracked::RIGHT_CONTROLLER),
            ControllerRole::None => None,
        },
        DeviceClass::Other | DeviceClass::Invalid => None,
    }
}

/// Fill `frame` from `sample`.
///
/// Every matrix is reset to NaN first; roles without a valid device keep the
/// NaN fill. When two valid slots map to the same role the later slot wins.
pub fn apply(sample: &PoseSample, session: &dyn DeviceSession, frame: &mut PoseFrame) {
    frame.reset();

    for (slot, pose) in sample.poses().iter().enumerate() {
        if !pose.pose_is_valid {
            continue;
        }
        let Some(role) = classify(session, slot as u32) else {
            continue;
        };
        if let Some(out) = frame.slot_mut(role) {
            to_homogeneous(&pose.device_to_absolute_tracking, out);
        }
    }
}

/// Query the device and transform on the calling thread.
///
/// Blocks on the hardware; never call this from the event loop. A failed
/// query leaves `frame` all-NaN and returns the error.
pub fn wait_get_poses(
    source: &mut dyn PoseSource,
    session: &dyn DeviceSession,
    slots: usize,
    frame: &mut PoseFrame,
) -> Result<()> {
    match PoseSample::query(source, slots) {
        Ok(sample) => {
            apply(&sample, session, frame);
            Ok(())
        }
        Err(e) => {
            frame.reset();
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VrPoseError;

    struct Roles(Vec<(DeviceClass, ControllerRole)>);

    impl DeviceSession for Roles {
        fn device_class(&self, slot: u32) -> DeviceClass {
            self.0
                .get(slot as usize)
                .map(|r| r.0)
                .unwrap_or(DeviceClass::Invalid)
        }

        fn controller_role(&self, slot: u32) -> ControllerRole {
            self.0
                .get(slot as usize)
                .map(|r| r.1)
                .unwrap_or(ControllerRole::None)
        }
    }

    fn standard_roles() -> Roles {
        Roles(vec![
            (DeviceClass::Hmd, ControllerRole::None),
            (DeviceClass::Controller, ControllerRole::Left),
            (DeviceClass::Controller, ControllerRole::Right),
            (DeviceClass::Other, ControllerRole::None),
        ])
    }

    fn matrix(seed: f32) -> HmdMatrix34 {
        let mut m = [[0.0f32; 4]; 3];
        for (row, r) in m.iter_mut().enumerate() {
            for (col, v) in r.iter_mut().enumerate() {
                *v = seed + (row * 4 + col) as f32;
            }
        }
        HmdMatrix34 { m }
    }

    fn assert_transposed(out: &[f32; MATRIX_LEN], src: &HmdMatrix34) {
        for col in 0..4 {
            for row in 0..3 {
                assert_eq!(out[col * 4 + row], src.m[row][col]);
            }
        }
        assert_eq!([out[3], out[7], out[11], out[15]], [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_to_homogeneous_identity() {
        let mut out = [f32::NAN; MATRIX_LEN];
        to_homogeneous(&HmdMatrix34::IDENTITY, &mut out);
        let expected = [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        assert_eq!(out, expected);
    }

    #[test]
    fn test_translation_lands_in_elements_12_to_14() {
        let mut src = HmdMatrix34::IDENTITY;
        src.m[0][3] = 1.5;
        src.m[1][3] = -2.0;
        src.m[2][3] = 0.25;
        let mut out = [0.0; MATRIX_LEN];
        to_homogeneous(&src, &mut out);
        assert_eq!(&out[12..16], &[1.5, -2.0, 0.25, 1.0]);
    }

    #[test]
    fn test_all_roles_tracked() {
        let mut sample = PoseSample::new();
        sample.set(0, TrackedDevicePose::valid(matrix(0.0)));
        sample.set(1, TrackedDevicePose::valid(matrix(100.0)));
        sample.set(2, TrackedDevicePose::valid(matrix(200.0)));
        sample.set(3, TrackedDevicePose::valid(matrix(300.0)));

        let mut frame = PoseFrame::new();
        apply(&sample, &standard_roles(), &mut frame);

        assert_transposed(&frame.hmd, &matrix(0.0));
        assert_transposed(&frame.left_controller, &matrix(100.0));
        assert_transposed(&frame.right_controller, &matrix(200.0));
        assert_eq!(frame.tracked(), Tracked::all());
    }

    #[test]
    fn test_invalid_slots_leave_nan() {
        let mut sample = PoseSample::new();
        sample.set(0, TrackedDevicePose::valid(matrix(0.0)));
        sample.set(
            2,
            TrackedDevicePose {
                device_to_absolute_tracking: matrix(5.0),
                pose_is_valid: false,
            },
        );

        let mut frame = PoseFrame::new();
        apply(&sample, &standard_roles(), &mut frame);

        assert_transposed(&frame.hmd, &matrix(0.0));
        assert!(frame.left_controller.iter().all(|v| v.is_nan()));
        assert!(frame.right_controller.iter().all(|v| v.is_nan()));
        assert_eq!(frame.tracked(), Tracked::HMD);
    }

    #[test]
    fn test_stale_data_is_cleared() {
        let mut frame = PoseFrame::new();
        frame.hmd = [3.0; MATRIX_LEN];
        frame.left_controller = [4.0; MATRIX_LEN];

        apply(&PoseSample::new(), &standard_roles(), &mut frame);

        assert!(frame.hmd.iter().all(|v| v.is_nan()));
        assert!(frame.left_controller.iter().all(|v| v.is_nan()));
        assert!(frame.right_controller.iter().all(|v| v.is_nan()));
        assert!(frame.tracked().is_empty());
    }

    #[test]
    fn test_roleless_controller_ignored() {
        let roles = Roles(vec![(DeviceClass::Controller, ControllerRole::None)]);
        let mut sample = PoseSample::new();
        sample.set(0, TrackedDevicePose::valid(matrix(1.0)));

        let mut frame = PoseFrame::new();
        apply(&sample, &roles, &mut frame);
        assert!(frame.tracked().is_empty());
    }

    #[test]
    fn test_apply_is_deterministic() {
        let mut sample = PoseSample::new();
        sample.set(0, TrackedDevicePose::valid(matrix(0.5)));
        sample.set(1, TrackedDevicePose::valid(matrix(-7.25)));

        let mut a = PoseFrame::new();
        let mut b = PoseFrame::new();
        apply(&sample, &standard_roles(), &mut a);
        apply(&sample, &standard_roles(), &mut b);

        let bits = |f: &PoseFrame| -> Vec<u32> {
            f.hmd
                .iter()
                .chain(&f.left_controller)
                .chain(&f.right_controller)
                .map(|v| v.to_bits())
                .collect()
        };
        assert_eq!(bits(&a), bits(&b));
    }

    struct Scripted(Option<HmdMatrix34>);

    impl PoseSource for Scripted {
        fn query_poses(&mut self, poses: &mut [TrackedDevicePose]) -> Result<()> {
            match self.0 {
                Some(m) => {
                    poses[0] = TrackedDevicePose::valid(m);
                    Ok(())
                }
                None => Err(VrPoseError::DeviceQuery("tracking lost".into())),
            }
        }
    }

    #[test]
    fn test_wait_get_poses() {
        let mut source = Scripted(Some(matrix(9.0)));
        let mut frame = PoseFrame::new();
        wait_get_poses(&mut source, &standard_roles(), 4, &mut frame).unwrap();
        assert_transposed(&frame.hmd, &matrix(9.0));

        let mut failing = Scripted(None);
        let err = wait_get_poses(&mut failing, &standard_roles(), 4, &mut frame).unwrap_err();
        assert!(matches!(err, VrPoseError::DeviceQuery(_)));
        assert!(frame.hmd.iter().all(|v| v.is_nan()));
    }
}
