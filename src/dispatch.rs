//! Delivery of completed pose requests on the host event-loop thread.

use crate::pipeline::{Shared, WorkerState};
use crate::queue::Head;
use crate::{Result, VrPoseError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

/// Cross-thread signal that asks the event loop to run [`Dispatcher::dispatch`].
///
/// Called from the worker thread once per completed request. Implementations
/// may coalesce signals.
pub trait LoopWaker: Send + Sync {
    fn wake(&self);
}

impl<F> LoopWaker for F
where
    F: Fn() + Send + Sync,
{
    fn wake(&self) {
        self()
    }
}

/// Create a coalescing wake channel for hosts without their own async handle.
///
/// Any number of wakes between two waits collapse into one.
pub fn wake_channel() -> (WakeSender, WakeReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (WakeSender { tx }, WakeReceiver { rx })
}

/// Worker-side end of [`wake_channel`].
#[derive(Clone)]
pub struct WakeSender {
    tx: Sender<()>,
}

impl LoopWaker for WakeSender {
    fn wake(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                log::trace!("Wake receiver gone, dropping wake");
            }
        }
    }
}

/// Loop-side end of [`wake_channel`].
pub struct WakeReceiver {
    rx: Receiver<()>,
}

impl WakeReceiver {
    /// Block until woken. Fails once every sender is gone.
    pub fn wait(&self) -> Result<()> {
        self.rx.recv().map_err(|_| VrPoseError::ShutDown)
    }

    /// Block until woken or `timeout` elapses. Returns whether a wake arrived.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => Ok(true),
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Err(VrPoseError::ShutDown),
        }
    }

    /// Consume a pending wake without blocking.
    pub fn try_wait(&self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

/// Delivers completions in submission order.
///
/// Not `Send`: it stays on the thread that created it, which should be the
/// event-loop thread.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
    _loop_thread: PhantomData<Rc<()>>,
}

impl Dispatcher {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            _loop_thread: PhantomData,
        }
    }

    /// Run every completion whose frame is ready, oldest first.
    ///
    /// Drains all ready responses so coalesced wakes never strand one.
    /// Callbacks run outside the queue lock. Returns the number delivered, or
    /// `WorkerFatal` once the worker has died, after discarding the requests
    /// that can no longer complete.
    pub fn dispatch(&self) -> Result<usize> {
        let mut delivered = self.drain_ready();

        if self.shared.state() == WorkerState::Dead {
            // Dead is stored after the worker's last frame send, so a second
            // drain sees every request that finished before the panic.
            delivered += self.drain_ready();
            let requests = self.shared.requests.clear();
            let responses = self.shared.responses.clear();
            log::error!(
                "Pose worker is dead: delivered {}, discarded {} queued requests and {} responses",
                delivered,
                requests,
                responses
            );
            return Err(VrPoseError::WorkerFatal);
        }

        if delivered > 0 {
            log::trace!("Delivered {} pose responses", delivered);
        }
        Ok(delivered)
    }

    fn drain_ready(&self) -> usize {
        let mut delivered = 0;
        loop {
            match self.shared.responses.pop_ready() {
                Head::Ready(response, frame) => {
                    response.complete(frame);
                    delivered += 1;
                }
                Head::Orphaned => {
                    log::warn!("Discarding pose response whose request never completed");
                }
                Head::Pending | Head::Empty => return delivered,
            }
        }
    }

    /// Responses submitted but not yet delivered.
    pub fn pending(&self) -> usize {
        self.shared.responses.len()
    }
}
