//! The signal funnel: a self-pipe plus a dedicated manager thread that
//! converts asynchronous signal delivery into synchronous callback
//! dispatch (spec.md §4.4/§9 "handler dispatch via self-pipe").
//!
//! The OS-level handler (`trampoline`) is the only code that runs in true
//! signal-handler context; it performs a single `write(2)` of the signal
//! number and nothing else, preserving async-signal-safety. Everything a
//! user callback might want to do — logging, allocation, taking a lock —
//! happens afterward on the manager thread, which never holds a lock on
//! entry.

use std::collections::HashMap;
use std::io::Read;
use std::os::fd::{FromRawFd, RawFd};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

type Callback = Arc<dyn Fn() + Send + Sync>;

static PIPE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);
static CALLBACKS: OnceLock<Mutex<HashMap<i32, Callback>>> = OnceLock::new();
static FUNNEL_STARTED: OnceLock<()> = OnceLock::new();

fn callbacks() -> &'static Mutex<HashMap<i32, Callback>> {
    CALLBACKS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Highest signal number this layer will install a handler for (spec.md
/// §4.4: "refuses `sig > 15`").
const MAX_SIGNAL: i32 = 15;

/// Idempotently bring up the self-pipe and its manager thread. Called from
/// `install_signal_handler` and from `pm_thread::execute` on first use.
pub(crate) fn ensure_funnel_started() {
    FUNNEL_STARTED.get_or_init(|| {
        let mut fds = [0i32; 2];
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
        if rc != 0 {
            panic!(
                "pm_thread: failed to create self-pipe: {}",
                std::io::Error::last_os_error()
            );
        }
        let (read_fd, write_fd) = (fds[0], fds[1]);
        unsafe {
            let flags = libc::fcntl(write_fd, libc::F_GETFL);
            libc::fcntl(write_fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
        PIPE_WRITE_FD.store(write_fd, Ordering::SeqCst);

        std::thread::Builder::new()
            .name("pm_thread-funnel".into())
            .spawn(move || funnel_loop(read_fd))
            .expect("pm_thread: failed to spawn signal funnel manager thread");
    });
}

fn funnel_loop(read_fd: RawFd) {
    let mut file = unsafe { std::fs::File::from_raw_fd(read_fd) };
    let mut byte = [0u8; 1];
    loop {
        match file.read(&mut byte) {
            Ok(0) => continue,
            Ok(_) => {
                let sig = byte[0] as i32;
                let callback = callbacks().lock().unwrap().get(&sig).cloned();
                if let Some(cb) = callback {
                    cb();
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::error!(error = %e, "pm_thread signal funnel read failed");
            }
        }
    }
}

/// The single process-wide OS signal handler. Async-signal-safe: loads an
/// atomic and issues one `write(2)`, nothing more.
extern "C" fn trampoline(sig: libc::c_int) {
    let fd = PIPE_WRITE_FD.load(Ordering::Relaxed);
    if fd >= 0 {
        let byte = sig as u8;
        unsafe {
            libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
        }
    }
}

/// Unblock `sig` on the caller, install the fixed trampoline as its OS
/// handler (with every other signal blocked during its execution and
/// interrupted syscalls restarted), and register `callback` in the
/// dispatch table, replacing any existing entry for `sig`.
pub fn install_signal_handler(sig: i32, callback: impl Fn() + Send + Sync + 'static) -> bool {
    if !(1..=MAX_SIGNAL).contains(&sig) {
        return false;
    }
    ensure_funnel_started();
    callbacks().lock().unwrap().insert(sig, Arc::new(callback));

    unsafe {
        let mut mask: libc::sigset_t = std::mem::zeroed();
        libc::sigfillset(&mut mask);

        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = trampoline as usize;
        action.sa_mask = mask;
        action.sa_flags = libc::SA_RESTART;

        if libc::sigaction(sig, &action, std::ptr::null_mut()) != 0 {
            callbacks().lock().unwrap().remove(&sig);
            return false;
        }

        let mut unblock: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut unblock);
        libc::sigaddset(&mut unblock, sig);
        libc::pthread_sigmask(libc::SIG_UNBLOCK, &unblock, std::ptr::null_mut());
    }
    true
}

/// Block `sig` on the caller and remove it from the dispatch table.
pub fn uninstall_signal_handler(sig: i32) -> bool {
    if !(1..=MAX_SIGNAL).contains(&sig) {
        return false;
    }
    unsafe {
        let mut block: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut block);
        libc::sigaddset(&mut block, sig);
        libc::pthread_sigmask(libc::SIG_BLOCK, &block, std::ptr::null_mut());
    }
    callbacks().lock().unwrap().remove(&sig).is_some()
}
