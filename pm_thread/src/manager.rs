use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, OnceLock};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use rand::Rng;

use pm_log::{log_event, log_warn, Level};
use pm_store::Hash;

use crate::error::ThreadError;
use crate::funnel;
use crate::record::{ThreadHandle, ThreadRecord, ThreadState};

const THREAD_TABLE_CAPACITY: usize = 256;

struct Config {
    use_sigint_handler: bool,
    use_sigquit_handler: bool,
}

struct Table {
    records: Hash<ThreadRecord>,
    next_handle: ThreadHandle,
}

static CONFIG: Mutex<Config> = Mutex::new(Config {
    use_sigint_handler: true,
    use_sigquit_handler: true,
});

static FIRST_EXECUTE_DONE: AtomicBool = AtomicBool::new(false);

// A reentrant lock around a `RefCell`: `kill_all`/`wait_all` acquire it
// once and operate on the borrowed `Table` directly through private
// `_locked` helpers rather than recursing into the public `kill`/`wait`
// entry points, so the same thread never attempts a second `borrow_mut`
// while the first is live. Kept as a reentrant mutex anyway (spec.md §9
// "recursive locking") so a default `SIGINT` dump running on the manager
// thread can walk the table without needing to reason about whether some
// other path on that same thread already holds it.
static TABLE: LazyLock<ReentrantMutex<RefCell<Table>>> = LazyLock::new(|| {
    ReentrantMutex::new(RefCell::new(Table {
        records: Hash::new(THREAD_TABLE_CAPACITY),
        next_handle: 0,
    }))
});

thread_local! {
    static CURRENT_HANDLE: RefCell<Option<ThreadHandle>> = const { RefCell::new(None) };
    static CURRENT_CANCEL_FLAG: RefCell<Option<Arc<AtomicBool>>> = const { RefCell::new(None) };
}

/// Enable or disable the default `SIGINT` handler (dumps every live thread
/// record). Consulted only on the first [`execute`] call; calling this
/// afterward is a logged no-op (spec.md §4.4/§9 "global mutable flags").
pub fn use_sigint_handler(enable: bool) {
    set_config_flag(|c| c.use_sigint_handler = enable, "use_sigint_handler");
}

/// Enable or disable the default `SIGQUIT` handler (`kill_all`). Consulted
/// only on the first [`execute`] call.
pub fn use_sigquit_handler(enable: bool) {
    set_config_flag(|c| c.use_sigquit_handler = enable, "use_sigquit_handler");
}

fn set_config_flag(f: impl FnOnce(&mut Config), name: &str) {
    if FIRST_EXECUTE_DONE.load(Ordering::SeqCst) {
        log_warn!("pm_thread::{name} called after first execute; ignored");
        return;
    }
    f(&mut CONFIG.lock());
}

fn ensure_first_execute_setup() {
    if FIRST_EXECUTE_DONE.swap(true, Ordering::SeqCst) {
        return;
    }
    funnel::ensure_funnel_started();
    let cfg = CONFIG.lock();
    if cfg.use_sigint_handler {
        funnel::install_signal_handler(libc::SIGINT, default_sigint_handler);
    }
    if cfg.use_sigquit_handler {
        funnel::install_signal_handler(libc::SIGQUIT, default_sigquit_handler);
    }
}

fn default_sigint_handler() {
    dump_all();
}

fn default_sigquit_handler() {
    let _ = kill_all();
}

fn dump_all() {
    let guard = TABLE.lock();
    let table = guard.borrow();
    table.records.for_each(|handle, record| {
        let state = *record.state.lock();
        log_event(
            Level::Info,
            format!("thread handle={handle} name={} state={state:?}", record.name),
        )
        .ok();
    });
}

fn random_name() -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

fn allocate_handle(table: &mut Table) -> Result<ThreadHandle, ThreadError> {
    for _ in 0..THREAD_TABLE_CAPACITY {
        let candidate = table.next_handle;
        table.next_handle = (table.next_handle + 1) % THREAD_TABLE_CAPACITY as i32;
        if table.records.get(candidate).is_none() {
            return Ok(candidate);
        }
    }
    Err(ThreadError::TableFull)
}

/// Dedicated real-time signal used only to interrupt a worker's blocking
/// `nanosleep` when it's killed; never exposed through
/// [`crate::install_signal_handler`] (that API refuses anything above
/// signal 15). A forced-unwind `pthread_cancel` through `std::thread`'s own
/// `catch_unwind` bootstrap is a foreign exception Rust cannot catch and
/// aborts the whole process rather than just the one worker, so
/// cancellation here is cooperative: `kill` flips a flag and nudges the
/// worker's `nanosleep` awake with this signal; the worker notices the flag
/// at its next cancellation point instead of being forcibly unwound.
fn cancel_wake_signal() -> libc::c_int {
    unsafe { libc::SIGRTMIN() }
}

extern "C" fn cancel_wake_noop(_sig: libc::c_int) {}

static CANCEL_SIGNAL_READY: OnceLock<()> = OnceLock::new();

fn ensure_cancel_signal_installed() {
    CANCEL_SIGNAL_READY.get_or_init(|| unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = cancel_wake_noop as usize;
        libc::sigemptyset(&mut action.sa_mask);
        // No SA_RESTART: nanosleep must return EINTR, not transparently
        // resume, or a killed worker's sleep would never notice the flag.
        action.sa_flags = 0;
        libc::sigaction(cancel_wake_signal(), &action, std::ptr::null_mut());
    });
}

/// Blocks every signal on the calling thread except [`cancel_wake_signal`],
/// which must stay deliverable so `kill` can interrupt a blocked
/// `nanosleep`.
fn block_all_signals_except_cancel_wake() {
    unsafe {
        let mut full: libc::sigset_t = std::mem::zeroed();
        libc::sigfillset(&mut full);
        libc::sigdelset(&mut full, cancel_wake_signal());
        libc::pthread_sigmask(libc::SIG_SETMASK, &full, std::ptr::null_mut());
    }
}

fn decorator(
    handle: ThreadHandle,
    state: Arc<Mutex<ThreadState>>,
    cancel_flag: Arc<AtomicBool>,
    func: Box<dyn FnOnce() + Send>,
) {
    block_all_signals_except_cancel_wake();
    CURRENT_HANDLE.with(|c| *c.borrow_mut() = Some(handle));
    CURRENT_CANCEL_FLAG.with(|c| *c.borrow_mut() = Some(Arc::clone(&cancel_flag)));

    {
        let mut s = state.lock();
        // A `kill` that lands before the worker even started already moved
        // the record to Cancelled; don't let the decorator stomp that back
        // to Running.
        if *s != ThreadState::Cancelled {
            *s = ThreadState::Running;
        }
    }

    if !cancel_flag.load(Ordering::SeqCst) {
        func();
    }
    exit();
}

/// Spawn `func` on a new OS thread wrapped in the fixed decorator
/// (signal-blocking, TLS handle stash, state transition, then `func`, then
/// [`exit`]) and return its handle.
pub fn execute(func: impl FnOnce() + Send + 'static) -> Result<ThreadHandle, ThreadError> {
    ensure_first_execute_setup();
    ensure_cancel_signal_installed();

    let guard = TABLE.lock();
    let mut table = guard.borrow_mut();
    let handle = allocate_handle(&mut table)?;
    let name = random_name();
    let state = Arc::new(Mutex::new(ThreadState::Pending));
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let state_for_worker = Arc::clone(&state);
    let cancel_for_worker = Arc::clone(&cancel_flag);

    let boxed_func: Box<dyn FnOnce() + Send> = Box::new(func);
    let join_handle = std::thread::Builder::new()
        .name(name.clone())
        .spawn(move || decorator(handle, state_for_worker, cancel_for_worker, boxed_func))
        .map_err(|e| ThreadError::SpawnFailed { source: e })?;

    let pthread_id = {
        use std::os::unix::thread::JoinHandleExt;
        join_handle.as_pthread_t()
    };

    table.records.insert(
        handle,
        ThreadRecord {
            name,
            state,
            cancel_requested: cancel_flag,
            join_handle: Some(join_handle),
            pthread_id,
        },
    );

    Ok(handle)
}

fn wait_locked(table: &mut Table, handle: ThreadHandle) -> Result<(), ThreadError> {
    let record = table
        .records
        .get_mut(handle)
        .ok_or(ThreadError::UnknownHandle { handle })?;
    let is_finished = matches!(*record.state.lock(), ThreadState::Finished);
    if !is_finished {
        if let Some(jh) = record.join_handle.take() {
            if jh.join().is_err() {
                log_warn!("pm_thread: worker {handle} panicked before being joined");
            }
        }
    }
    table.records.remove(handle);
    Ok(())
}

/// Join the underlying OS thread (unless it's already `Finished`) and
/// remove its record from the table regardless.
pub fn wait(handle: ThreadHandle) -> Result<(), ThreadError> {
    let guard = TABLE.lock();
    let mut table = guard.borrow_mut();
    wait_locked(&mut table, handle)
}

/// Wait on every live handle, in table order. Errors if no record existed
/// at all.
pub fn wait_all() -> Result<(), ThreadError> {
    let guard = TABLE.lock();
    let mut table = guard.borrow_mut();
    let handles = live_handles(&table);
    if handles.is_empty() {
        return Err(ThreadError::NoLiveThreads);
    }
    for handle in handles {
        let _ = wait_locked(&mut table, handle);
    }
    Ok(())
}

fn kill_locked(table: &mut Table, handle: ThreadHandle) -> Result<(), ThreadError> {
    let record = table
        .records
        .get_mut(handle)
        .ok_or(ThreadError::UnknownHandle { handle })?;
    let mut state = record.state.lock();
    match *state {
        ThreadState::Pending | ThreadState::Running => {
            record.cancel_requested.store(true, Ordering::SeqCst);
            unsafe {
                libc::pthread_kill(record.pthread_id, cancel_wake_signal());
            }
            *state = ThreadState::Cancelled;
            Ok(())
        }
        ThreadState::Cancelled | ThreadState::Finished => {
            Err(ThreadError::AlreadyTerminal { handle })
        }
    }
}

/// Request deferred cancellation of `handle`'s thread if it's
/// `Pending`/`Running`. Flips the worker's cancel flag and nudges it awake
/// if it's blocked in [`cancellable_sleep`]; the worker itself notices the
/// flag at its next cancellation point rather than being forcibly unwound.
/// Does not remove the record; a subsequent [`wait`] is required to reap
/// it.
pub fn kill(handle: ThreadHandle) -> Result<(), ThreadError> {
    let guard = TABLE.lock();
    let mut table = guard.borrow_mut();
    kill_locked(&mut table, handle)
}

/// Kill every live handle. Ok if at least one was eligible.
pub fn kill_all() -> Result<(), ThreadError> {
    let guard = TABLE.lock();
    let mut table = guard.borrow_mut();
    let handles = live_handles(&table);
    let mut any = false;
    for handle in handles {
        if kill_locked(&mut table, handle).is_ok() {
            any = true;
        }
    }
    if any {
        Ok(())
    } else {
        Err(ThreadError::NoLiveThreads)
    }
}

fn live_handles(table: &Table) -> Vec<ThreadHandle> {
    let mut handles = Vec::new();
    table.records.for_each(|handle, _| handles.push(handle));
    handles
}

/// Mark the calling worker `Finished` and terminate its OS thread. Called
/// by the decorator after `func` returns, and may be called by user code
/// from within a worker for an early exit. Leaves an already-`Cancelled`
/// record alone — `kill` already moved it to its terminal state and this
/// shouldn't relabel it `Finished`.
pub fn exit() -> ! {
    let handle = CURRENT_HANDLE.with(|c| *c.borrow());
    if let Some(handle) = handle {
        let guard = TABLE.lock();
        let table = guard.borrow();
        if let Some(record) = table.records.get(handle) {
            let mut state = record.state.lock();
            if *state != ThreadState::Cancelled {
                *state = ThreadState::Finished;
            }
        }
    }
    unsafe { libc::pthread_exit(std::ptr::null_mut()) }
}

/// Whether the calling worker's handle has been [`kill`]ed. Checked by
/// [`cancellable_sleep`] and meant to be checked by worker bodies themselves
/// right after a sleep returns early, so a cancelled worker can skip
/// whatever it was about to do rather than run it anyway.
pub fn is_canceled() -> bool {
    CURRENT_CANCEL_FLAG.with(|c| {
        c.borrow()
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    })
}

/// A cancellation point: sleeps for `duration`, returning early the moment
/// the calling worker is [`kill`]ed. `kill` nudges a blocked `nanosleep`
/// awake with a dedicated real-time signal; an `EINTR` unrelated to
/// cancellation just restarts the sleep with the remaining time.
pub fn cancellable_sleep(duration: Duration) {
    if is_canceled() {
        return;
    }
    let mut req = libc::timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: duration.subsec_nanos() as libc::c_long,
    };
    let mut rem = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    loop {
        let rc = unsafe { libc::nanosleep(&req, &mut rem) };
        if rc == 0 {
            return;
        }
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            if is_canceled() {
                return;
            }
            req = rem;
            continue;
        }
        return;
    }
}
