use crate::types::PoseFrame;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Worker-side view of the device handed to each queued request.
pub struct WorkerContext<'a> {
    pub source: &'a mut dyn crate::session::PoseSource,
    pub session: &'a dyn crate::session::DeviceSession,
    pub max_slots: usize,
}

/// A unit of work executed once on the worker thread.
pub type PendingRequest = Box<dyn FnOnce(&mut WorkerContext<'_>) + Send + 'static>;

/// Completion handle invoked on the loop thread with the filled frame.
pub type Completion = Box<dyn FnOnce(PoseFrame) + Send + 'static>;

/// Item travelling through the request queue.
pub enum Job {
    Run(PendingRequest),
    /// Sentinel: the worker exits when it dequeues this.
    Shutdown,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // Queue locks never span user code; a poisoned queue is still consistent.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// FIFO of pending work plus a counting signal the worker blocks on.
///
/// Each `push` posts the signal once; each `wait` consumes one post.
pub struct RequestQueue {
    items: Mutex<VecDeque<Job>>,
    signal_tx: Sender<()>,
    signal_rx: Receiver<()>,
}

impl RequestQueue {
    pub fn new() -> Self {
        let (signal_tx, signal_rx) = crossbeam_channel::unbounded();
        Self {
            items: Mutex::new(VecDeque::new()),
            signal_tx,
            signal_rx,
        }
    }

    /// Append `job` and post the signal once.
    pub fn push(&self, job: Job) {
        lock(&self.items).push_back(job);
        // Both ends live in `self`, so the channel cannot be disconnected.
        let _ = self.signal_tx.send(());
    }

    /// Block until the signal has been posted, then consume one post.
    pub fn wait(&self) {
        let _ = self.signal_rx.recv();
    }

    /// Pop the head, if any.
    pub fn pop(&self) -> Option<Job> {
        lock(&self.items).pop_front()
    }

    /// Drop every queued job. Returns how many were discarded.
    pub fn clear(&self) -> usize {
        let mut items = lock(&self.items);
        let n = items.len();
        items.clear();
        n
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// A completion waiting for its frame.
///
/// Queued at submission time, so its position matches the request's position
/// in the request queue.
pub struct PendingResponse {
    completion: Completion,
    frame: Receiver<PoseFrame>,
}

impl PendingResponse {
    /// Build a response and the sender the matching request fills.
    pub fn new(completion: Completion) -> (PendingResponse, Sender<PoseFrame>) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (
            PendingResponse {
                completion,
                frame: rx,
            },
            tx,
        )
    }

    pub fn complete(self, frame: PoseFrame) {
        (self.completion)(frame)
    }
}

/// State of the response at the head of the queue.
pub enum Head {
    /// Frame delivered; the response has been removed.
    Ready(PendingResponse, PoseFrame),
    /// Head still waiting on the worker.
    Pending,
    /// The head's request was dropped without producing a frame.
    Orphaned,
    Empty,
}

/// FIFO of completions, delivered strictly in submission order.
pub struct ResponseQueue {
    items: Mutex<VecDeque<PendingResponse>>,
}

impl ResponseQueue {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, response: PendingResponse) {
        lock(&self.items).push_back(response);
    }

    /// Pop the head if its frame has arrived.
    ///
    /// An orphaned head is removed as well, so the queue never wedges behind it.
    pub fn pop_ready(&self) -> Head {
        let mut items = lock(&self.items);
        let Some(head) = items.front() else {
            return Head::Empty;
        };
        match head.frame.try_recv() {
            Ok(frame) => match items.pop_front() {
                Some(response) => Head::Ready(response, frame),
                None => Head::Empty,
            },
            Err(TryRecvError::Empty) => Head::Pending,
            Err(TryRecvError::Disconnected) => {
                items.pop_front();
                Head::Orphaned
            }
        }
    }

    /// Drop every queued response. Returns how many were discarded.
    pub fn clear(&self) -> usize {
        let mut items = lock(&self.items);
        let n = items.len();
        items.clear();
        n
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResponseQueue {
    fn default() -> Self {
        Self::new()
    }
}
