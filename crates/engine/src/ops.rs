//! The asynchronous operation queue.
//!
//! Control verbs are enqueued as [`Op`] values; the engine dequeues them
//! between iteration blocks (and while paused, where the queue's condvar is
//! the engine's sole wake-up source). Each op can carry a one-shot
//! completion channel delivering its [`OpReply`].

use std::collections::VecDeque;
use std::fmt;

use agents::Agent;
use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};
use types::AgentId;

/// A control verb for the engine.
pub enum Op {
    /// Leave the pre-start wait and enter the main loop.
    Start,
    /// Add iterations (unbounded when `None`) and transition to RUNNING.
    Run(Option<u64>),
    /// Zero out pending iterations; PAUSED at the next block boundary.
    Pause,
    /// Insert an agent into the population.
    AddAgent(Box<dyn Agent>),
    /// Make the main loop exit.
    Shutdown,
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Start => write!(f, "Start"),
            Op::Run(count) => write!(f, "Run({count:?})"),
            Op::Pause => write!(f, "Pause"),
            Op::AddAgent(_) => write!(f, "AddAgent"),
            Op::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// The value an op resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpReply {
    Done,
    AgentAdded(AgentId),
}

/// An op plus its optional completion slot.
pub struct QueuedOp {
    pub op: Op,
    pub done: Option<Sender<OpReply>>,
}

/// FIFO of pending ops with a condvar to wake a sleeping engine.
#[derive(Default)]
pub struct OpQueue {
    queue: Mutex<VecDeque<QueuedOp>>,
    available: Condvar,
}

impl OpQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue and wake the engine if it is waiting.
    pub fn push(&self, op: QueuedOp) {
        self.queue.lock().push_back(op);
        self.available.notify_one();
    }

    /// Block until at least one op is queued, then drain the queue.
    pub fn wait_drain(&self) -> Vec<QueuedOp> {
        let mut queue = self.queue.lock();
        while queue.is_empty() {
            self.available.wait(&mut queue);
        }
        queue.drain(..).collect()
    }

    /// Drain whatever is queued without blocking; empty when the queue lock
    /// is contended.
    pub fn try_drain(&self) -> Vec<QueuedOp> {
        match self.queue.try_lock() {
            Some(mut queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
