use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

/// Stable integer handle identifying a worker for its lifetime in the
/// table; reused once the record that held it is reaped.
pub type ThreadHandle = i32;

/// `Pending < Running < {Cancelled, Finished}` (spec.md §8's monotone
/// partial order — `rank` makes that order mechanically checkable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Pending,
    Running,
    Cancelled,
    Finished,
}

impl ThreadState {
    pub fn rank(self) -> u8 {
        match self {
            ThreadState::Pending => 0,
            ThreadState::Running => 1,
            ThreadState::Cancelled | ThreadState::Finished => 2,
        }
    }
}

/// One worker's bookkeeping. `state` lives behind its own lock (spec.md
/// §5's "each record carries its own recursive mutex for per-record
/// transitions") so the decorator running on the worker thread can flip
/// `Running`/`Finished` without taking the whole table lock.
///
/// Cancellation is cooperative, not a forced unwind: `cancel_requested` is
/// the flag `kill` sets and [`crate::cancellable_sleep`]/the decorator poll,
/// since a `pthread_cancel`-driven unwind through `std::thread`'s own
/// `catch_unwind` bootstrap is a foreign exception Rust cannot catch and
/// aborts the process instead of just the one worker.
pub(crate) struct ThreadRecord {
    pub(crate) name: String,
    pub(crate) state: Arc<Mutex<ThreadState>>,
    pub(crate) cancel_requested: Arc<AtomicBool>,
    pub(crate) join_handle: Option<JoinHandle<()>>,
    pub(crate) pthread_id: libc::pthread_t,
}
