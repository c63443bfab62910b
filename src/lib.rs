//! # vrpose - asynchronous pose requests for OpenVR-style tracking devices
//!
//! Keeps the blocking device pose query off the host's event-loop thread:
//! - Requests are queued from the loop and run in order on one worker thread
//! - Each result is a [`PoseFrame`] of three 4x4 matrices (HMD, left and right
//!   controller), NaN-filled for roles with no tracked device
//! - Completions are delivered back on the loop thread, in submission order
//! - Synchronous eye-texture submission with GL binding restoration
//! - C FFI for embedding in C/C++ hosts
//!
//! ## Quick Start
//! ```no_run
//! use vrpose::{wake_channel, PoseFrame, PosePipeline};
//! # fn run(source: impl vrpose::PoseSource + 'static, session: impl vrpose::DeviceSession + 'static) -> vrpose::Result<()> {
//! let (waker, wakes) = wake_channel();
//! let pipeline = PosePipeline::new(source, session, waker)?;
//! let dispatcher = pipeline.dispatcher();
//!
//! pipeline.submit(PoseFrame::new(), |frame| {
//!     println!("head: {:?}", &frame.hmd[12..15]);
//! })?;
//!
//! // Event loop
//! loop {
//!     wakes.wait()?;
//!     dispatcher.dispatch()?;
//! }
//! # }
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod session;
pub mod transform;
pub mod queue;
pub mod dispatch;
pub mod pipeline;
pub mod compositor;
pub mod ffi;

pub use compositor::{submit_texture, Compositor, GlContext};
pub use config::PipelineConfig;
pub use dispatch::{wake_channel, Dispatcher, LoopWaker, WakeReceiver, WakeSender};
pub use error::{CompositorError, VrPoseError};
pub use pipeline::{PosePipeline, WorkerState};
pub use session::{DeviceSession, PoseSource};
pub use transform::PoseSample;
pub use types::*;

/// Result type alias for vrpose operations.
pub type Result<T> = std::result::Result<T, VrPoseError>;
