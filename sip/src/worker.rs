use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use async_channel::{Receiver, Sender};

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

const SIGNAL_QUEUE_DEPTH: usize = 16;

/// Signals the dispatcher delivers to transaction workers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerSignal {
    /// The transaction identified by `token` was evicted by the expiry
    /// sweep. The worker should unwind.
    Expired { token: u64 },
}

/// The receiving side of a worker, held by the task that drives one or
/// more transactions.
pub struct Worker {
    pub handle: WorkerHandle,
    pub signals: Receiver<WorkerSignal>,
}

impl Worker {
    pub fn new() -> Worker {
        let (sender, signals) = async_channel::bounded(SIGNAL_QUEUE_DEPTH);
        let handle = WorkerHandle {
            id: NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed),
            sender,
        };
        Worker { handle, signals }
    }
}

impl Default for Worker {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable identity of a worker, stored on transaction records.
/// Equality and hashing use the id only, so a handle stays equal to
/// itself after the worker side has gone away.
#[derive(Clone, Debug)]
pub struct WorkerHandle {
    id: u64,
    sender: Sender<WorkerSignal>,
}

impl WorkerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn alive(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Non-blocking delivery. A full queue or a dead worker drops the
    /// signal.
    pub fn signal(&self, signal: WorkerSignal) {
        let _ = self.sender.try_send(signal);
    }
}

impl PartialEq for WorkerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WorkerHandle {}

impl Hash for WorkerHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "worker-{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_reaches_a_live_worker() {
        let worker = Worker::new();
        worker
            .handle
            .signal(WorkerSignal::Expired { token: 7 });
        assert_eq!(
            worker.signals.try_recv().unwrap(),
            WorkerSignal::Expired { token: 7 }
        );
    }

    #[test]
    fn dead_worker_swallows_signals() {
        let worker = Worker::new();
        let handle = worker.handle.clone();
        assert!(handle.alive());
        drop(worker);
        assert!(!handle.alive());
        handle.signal(WorkerSignal::Expired { token: 1 });
    }

    #[test]
    fn handles_compare_by_id() {
        let a = Worker::new();
        let b = Worker::new();
        assert_eq!(a.handle, a.handle.clone());
        assert_ne!(a.handle, b.handle);
    }
}
