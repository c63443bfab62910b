//! Drive the pose pipeline from a hand-written event loop with a simulated
//! headset and controllers.
//!
//! Usage: cargo run --example poll
//! RUST_LOG=debug shows worker lifecycle messages.

use std::time::{Duration, Instant};
use vrpose::{
    ControllerRole, DeviceClass, DeviceSession, HmdMatrix34, PipelineConfig, PoseFrame,
    PosePipeline, PoseSource, Tracked, TrackedDevicePose,
};

/// Headset at slot 0, controllers at 1 and 2. The right controller drops out
/// every fourth frame.
struct SimulatedRig {
    epoch: Instant,
    frame: u64,
}

impl PoseSource for SimulatedRig {
    fn query_poses(&mut self, poses: &mut [TrackedDevicePose]) -> vrpose::Result<()> {
        // ~90 Hz vsync wait
        std::thread::sleep(Duration::from_millis(11));
        self.frame += 1;

        let t = self.epoch.elapsed().as_secs_f32();
        let mut head = HmdMatrix34::IDENTITY;
        head.m[0][3] = (t * 0.5).sin() * 0.2;
        head.m[1][3] = 1.7;

        let mut left = HmdMatrix34::IDENTITY;
        left.m[0][3] = -0.25;
        left.m[1][3] = 1.1 + (t * 2.0).sin() * 0.05;

        let mut right = HmdMatrix34::IDENTITY;
        right.m[0][3] = 0.25;
        right.m[1][3] = 1.1;

        let rig = [
            TrackedDevicePose::valid(head),
            TrackedDevicePose::valid(left),
            TrackedDevicePose {
                device_to_absolute_tracking: right,
                pose_is_valid: self.frame % 4 != 0,
            },
        ];
        // VRPOSE_MAX_SLOTS may leave room for fewer devices than the rig has.
        for (slot, pose) in poses.iter_mut().zip(rig) {
            *slot = pose;
        }
        Ok(())
    }
}

struct RigLayout;

impl DeviceSession for RigLayout {
    fn device_class(&self, slot: u32) -> DeviceClass {
        match slot {
            0 => DeviceClass::Hmd,
            1 | 2 => DeviceClass::Controller,
            _ => DeviceClass::Invalid,
        }
    }

    fn controller_role(&self, slot: u32) -> ControllerRole {
        match slot {
            1 => ControllerRole::Left,
            2 => ControllerRole::Right,
            _ => ControllerRole::None,
        }
    }
}

fn main() {
    env_logger::init();

    let (waker, wakes) = vrpose::wake_channel();
    let rig = SimulatedRig {
        epoch: Instant::now(),
        frame: 0,
    };
    let config = PipelineConfig::from_env();
    let pipeline = match PosePipeline::with_config(config, rig, RigLayout, waker) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to create pipeline: {}", e);
            std::process::exit(1);
        }
    };
    let dispatcher = pipeline.dispatcher();

    // Two frames in flight, each completion resubmits its frame.
    let (done_tx, done_rx) = crossbeam_channel::unbounded::<PoseFrame>();
    for _ in 0..2 {
        let done = done_tx.clone();
        if let Err(e) = pipeline.submit(PoseFrame::new(), move |f| {
            let _ = done.send(f);
        }) {
            eprintln!("Submit failed: {}", e);
            std::process::exit(1);
        }
    }

    let start = Instant::now();
    let mut count: u64 = 0;
    let mut ticks: u64 = 0;

    while start.elapsed() < Duration::from_secs(3) {
        // The loop keeps ticking while the worker blocks on the device.
        ticks += 1;
        match wakes.wait_timeout(Duration::from_millis(2)) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                eprintln!("Wake channel closed: {}", e);
                break;
            }
        }
        if let Err(e) = dispatcher.dispatch() {
            eprintln!("Dispatch failed: {}", e);
            break;
        }

        while let Ok(frame) = done_rx.try_recv() {
            count += 1;
            if count % 30 == 1 {
                println!(
                    "#{:<4} head=[{:+.3}, {:+.3}, {:+.3}]  tracked={:?}",
                    count,
                    frame.hmd[12],
                    frame.hmd[13],
                    frame.hmd[14],
                    frame.tracked()
                );
            }
            if !frame.tracked().contains(Tracked::RIGHT_CONTROLLER) {
                log::debug!("right controller lost in frame {}", count);
            }

            let done = done_tx.clone();
            if let Err(e) = pipeline.submit(frame, move |f| {
                let _ = done.send(f);
            }) {
                eprintln!("Submit failed: {}", e);
                break;
            }
        }
    }

    pipeline.shutdown();
    let elapsed = start.elapsed().as_secs_f64();
    println!(
        "\nTotal: {} poses in {:.1}s ({:.1} Hz), {} loop ticks",
        count,
        elapsed,
        count as f64 / elapsed,
        ticks
    );
}
