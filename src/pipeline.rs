use crate::config::PipelineConfig;
use crate::dispatch::{Dispatcher, LoopWaker};
use crate::queue::{Job, PendingResponse, RequestQueue, ResponseQueue, WorkerContext};
use crate::session::{DeviceSession, PoseSource};
use crate::transform;
use crate::types::PoseFrame;
use crate::{Result, VrPoseError};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

/// Lifecycle of the pose worker thread.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Not spawned yet; the first submission starts it.
    Idle = 0,
    Running = 1,
    /// Shutdown sentinel queued; earlier requests still complete.
    Stopping = 2,
    Stopped = 3,
    /// A work item panicked and took the worker down.
    Dead = 4,
}

impl WorkerState {
    fn from_u8(raw: u8) -> WorkerState {
        match raw {
            0 => WorkerState::Idle,
            1 => WorkerState::Running,
            2 => WorkerState::Stopping,
            3 => WorkerState::Stopped,
            _ => WorkerState::Dead,
        }
    }
}

/// State shared between the submitting side, the worker and dispatchers.
pub(crate) struct Shared {
    pub(crate) requests: RequestQueue,
    pub(crate) responses: ResponseQueue,
    state: AtomicU8,
    waker: Box<dyn LoopWaker>,
}

impl Shared {
    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Device handles parked until the worker is spawned.
type DeviceParts = (Box<dyn PoseSource>, Arc<dyn DeviceSession>);

struct Lifecycle {
    device: Option<DeviceParts>,
    thread: Option<JoinHandle<()>>,
}

/// Asynchronous pose-request pipeline.
///
/// Requests are queued from the event-loop thread, executed in order on a
/// single worker thread that owns the blocking device query, and delivered
/// back through a [`Dispatcher`] after the [`LoopWaker`] fires.
///
/// The worker is spawned on the first [`submit`](Self::submit) and never
/// restarted. Dropping the pipeline shuts the worker down and joins it.
pub struct PosePipeline {
    shared: Arc<Shared>,
    config: PipelineConfig,
    lifecycle: Mutex<Lifecycle>,
}

impl PosePipeline {
    /// Create a pipeline with the default configuration.
    pub fn new<S, D, W>(source: S, session: D, waker: W) -> Result<PosePipeline>
    where
        S: PoseSource + 'static,
        D: DeviceSession + 'static,
        W: LoopWaker + 'static,
    {
        Self::with_config(PipelineConfig::default(), source, session, waker)
    }

    pub fn with_config<S, D, W>(
        config: PipelineConfig,
        source: S,
        session: D,
        waker: W,
    ) -> Result<PosePipeline>
    where
        S: PoseSource + 'static,
        D: DeviceSession + 'static,
        W: LoopWaker + 'static,
    {
        config.validate()?;

        let shared = Arc::new(Shared {
            requests: RequestQueue::new(),
            responses: ResponseQueue::new(),
            state: AtomicU8::new(WorkerState::Idle as u8),
            waker: Box::new(waker),
        });

        let session: Arc<dyn DeviceSession> = Arc::new(session);
        Ok(PosePipeline {
            shared,
            config,
            lifecycle: Mutex::new(Lifecycle {
                device: Some((Box::new(source), session)),
                thread: None,
            }),
        })
    }

    /// Handle for delivering completions. Create it on the event-loop thread.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.shared.clone())
    }

    /// Queue a pose request.
    ///
    /// `frame` is moved to the worker, filled there, and handed back to
    /// `on_complete` when the dispatcher delivers it. Completions run in
    /// submission order. Fails with `ShutDown` after [`shutdown`](Self::shutdown)
    /// and with `WorkerFatal` once the worker has died.
    pub fn submit<F>(&self, frame: PoseFrame, on_complete: F) -> Result<()>
    where
        F: FnOnce(PoseFrame) + Send + 'static,
    {
        let mut lifecycle = self.lock_lifecycle();
        match self.shared.state() {
            WorkerState::Idle => self.spawn_worker(&mut lifecycle)?,
            WorkerState::Running => {}
            WorkerState::Stopping | WorkerState::Stopped => return Err(VrPoseError::ShutDown),
            WorkerState::Dead => return Err(VrPoseError::WorkerFatal),
        }

        // Response first: its queue position is fixed before the worker can
        // possibly finish the request.
        let (response, frame_tx) = PendingResponse::new(Box::new(on_complete));
        self.shared.responses.push(response);
        self.shared.requests.push(Job::Run(Box::new(move |ctx: &mut WorkerContext<'_>| {
            let mut frame = frame;
            if let Err(e) =
                transform::wait_get_poses(&mut *ctx.source, ctx.session, ctx.max_slots, &mut frame)
            {
                log::warn!("Pose query failed, delivering empty frame: {}", e);
            }
            let _ = frame_tx.send(frame);
        })));
        Ok(())
    }

    /// Ask the worker to exit once the requests already queued have run.
    ///
    /// Does not block. Later submissions fail with `ShutDown`.
    pub fn shutdown(&self) {
        let mut lifecycle = self.lock_lifecycle();
        match self.shared.state() {
            WorkerState::Idle => {
                lifecycle.device = None;
                self.shared.set_state(WorkerState::Stopped);
                log::debug!("Pose pipeline shut down before the worker started");
            }
            WorkerState::Running => {
                if self
                    .shared
                    .transition(WorkerState::Running, WorkerState::Stopping)
                {
                    self.shared.requests.push(Job::Shutdown);
                    log::info!("Pose worker shutdown requested");
                }
            }
            WorkerState::Stopping | WorkerState::Stopped | WorkerState::Dead => {}
        }
    }

    pub fn worker_state(&self) -> WorkerState {
        self.shared.state()
    }

    /// `Err(WorkerFatal)` if the worker died inside a work item.
    pub fn check_worker(&self) -> Result<()> {
        match self.shared.state() {
            WorkerState::Dead => Err(VrPoseError::WorkerFatal),
            _ => Ok(()),
        }
    }

    /// Check if the pipeline still accepts submissions.
    pub fn is_active(&self) -> bool {
        matches!(
            self.shared.state(),
            WorkerState::Idle | WorkerState::Running
        )
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spawn_worker(&self, lifecycle: &mut Lifecycle) -> Result<()> {
        let (source, session) = lifecycle.device.take().ok_or(VrPoseError::WorkerFatal)?;
        let shared = self.shared.clone();
        let max_slots = self.config.max_slots;

        let mut builder = std::thread::Builder::new().name(self.config.thread_name.clone());
        if let Some(size) = self.config.stack_size {
            builder = builder.stack_size(size);
        }

        // Set before spawning so the exit guard always has the last word.
        self.shared.set_state(WorkerState::Running);
        let thread = builder
            .spawn(move || worker_loop(shared, source, session, max_slots))
            .map_err(|e| {
                self.shared.set_state(WorkerState::Dead);
                VrPoseError::WorkerSpawn(e.to_string())
            })?;

        lifecycle.thread = Some(thread);
        Ok(())
    }
}

impl Drop for PosePipeline {
    fn drop(&mut self) {
        self.shutdown();
        let thread = self.lock_lifecycle().thread.take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                log::warn!("Pose worker exited by panic");
            }
        }
        let discarded = self.shared.requests.clear();
        if discarded > 0 {
            log::debug!("Discarded {} unexecuted pose requests", discarded);
        }
    }
}

/// Records how the worker left its loop and wakes the event loop so the
/// dispatcher can observe it.
struct ExitGuard<'a> {
    shared: &'a Shared,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            log::error!("Pose worker died inside a work item; pending requests will not complete");
            self.shared.set_state(WorkerState::Dead);
        } else {
            log::info!("Pose worker stopped");
            self.shared.set_state(WorkerState::Stopped);
        }
        self.shared.waker.wake();
    }
}

/// The worker loop runs in a dedicated thread.
///
/// Waits on the request signal, pops one job, and runs it outside the queue
/// lock. The shutdown sentinel ends the loop; a wake with nothing queued is
/// ignored. Panics in a job are not caught.
fn worker_loop(
    shared: Arc<Shared>,
    mut source: Box<dyn PoseSource>,
    session: Arc<dyn DeviceSession>,
    max_slots: usize,
) {
    let _guard = ExitGuard { shared: &shared };
    log::info!("Pose worker started (maxSlots={})", max_slots);

    loop {
        shared.requests.wait();

        match shared.requests.pop() {
            Some(Job::Run(request)) => {
                let mut ctx = WorkerContext {
                    source: &mut *source,
                    session: &*session,
                    max_slots,
                };
                request(&mut ctx);
                shared.waker.wake();
            }
            Some(Job::Shutdown) => {
                log::info!("Pose worker stopping (shutdown requested)");
                break;
            }
            None => log::trace!("Pose worker woke with an empty queue"),
        }
    }
}
