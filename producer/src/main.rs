//! `producer`: parses a task script and schedules timed writes into the
//! shared point region, restarting from the top of the script on `SIGHUP`
//! and shutting down cleanly on `SIGINT`/`SIGQUIT`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use pm_config::{ProducerArgs, MAX_NUM_POINTS, SHM_KEY};
use pm_log::Level;
use pm_point::{Point, PointTask};

/// The rendezvous: `woken` distinguishes "something happened" from a
/// spurious wakeup; `reinstall` is the flag the main loop checks to decide
/// whether to run the script again from the top (spec.md §4.6).
struct Rendezvous {
    woken: bool,
    reinstall: bool,
}

struct Shared {
    state: Mutex<Rendezvous>,
    cvar: Condvar,
    /// Base address of the connected region, as `usize` so it can live
    /// behind an atomic shared with the signal handlers. Zero means "not
    /// yet connected".
    base_addr: AtomicUsize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    let args = ProducerArgs::parse();

    pm_log::set_logfile(pm_config::default_log_path("producer"))
        .context("opening producer log file")?;
    pm_log::also_print_log(!args.quiet);

    pm_thread::use_sigint_handler(false);
    pm_thread::use_sigquit_handler(false);
    pm_shm::use_semaphores(false);
    block_all_signals_on_main_thread();

    let shared = Arc::new(Shared {
        state: Mutex::new(Rendezvous {
            woken: false,
            reinstall: false,
        }),
        cvar: Condvar::new(),
        base_addr: AtomicUsize::new(0),
    });
    install_handlers(&shared);

    let tasks = pm_point::parse_script(&args.script)
        .with_context(|| format!("reading script {}", args.script.display()))?;
    for task in &tasks {
        pm_point::show_task(task);
    }

    let size = MAX_NUM_POINTS * std::mem::size_of::<Point>();
    let Some(base) = pm_shm::connect(SHM_KEY, size) else {
        pm_log::log_event(Level::Fatal, "could not attach to the shared point region".to_string()).ok();
        std::process::exit(1);
    };
    shared.base_addr.store(base as usize, Ordering::SeqCst);

    run_rendezvous_loop(&shared, &tasks, base as usize)?;

    pm_thread::uninstall_signal_handler(libc::SIGHUP);
    if let Err(e) = pm_shm::destroy(SHM_KEY) {
        pm_log::log_event(Level::Warning, format!("destroy on exit: {e}")).ok();
    }
    Ok(())
}

fn run_rendezvous_loop(
    shared: &Arc<Shared>,
    tasks: &[PointTask],
    base: usize,
) -> anyhow::Result<()> {
    loop {
        {
            let mut state = shared.state.lock().unwrap();
            state.woken = false;
            state.reinstall = false;
        }

        let worker_tasks = tasks.to_vec();
        let worker_shared = Arc::clone(shared);
        pm_thread::execute(move || run_worker(base, &worker_tasks, &worker_shared))
            .context("starting producer worker thread")?;

        {
            let mut state = shared.state.lock().unwrap();
            while !state.woken {
                state = shared.cvar.wait(state).unwrap();
            }
        }

        // Idempotent: a naturally finished worker is merely reaped.
        let _ = pm_thread::kill_all();
        let _ = pm_thread::wait_all();

        let reinstall = shared.state.lock().unwrap().reinstall;
        if !reinstall {
            break;
        }
    }
    Ok(())
}

fn run_worker(base: usize, tasks: &[PointTask], shared: &Shared) {
    for task in tasks {
        pm_thread::cancellable_sleep(Duration::from_secs(task.delay_seconds()));
        if pm_thread::is_canceled() {
            // A `kill` cut the sleep short; leave the region untouched and
            // let the decorator reap this worker as Cancelled.
            return;
        }

        pm_shm::lock(SHM_KEY);
        let ptr = base as *mut Point;
        if task.is_install() {
            pm_point::install(ptr, task.index, task.point);
        } else {
            pm_point::invalidate(ptr, task.index);
        }
        pm_point::show_points(ptr as *const Point, MAX_NUM_POINTS);
        pm_shm::unlock(SHM_KEY);
    }

    let mut state = shared.state.lock().unwrap();
    state.woken = true;
    shared.cvar.notify_one();
}

fn install_handlers(shared: &Arc<Shared>) {
    let for_sigint = Arc::clone(shared);
    pm_thread::install_signal_handler(libc::SIGINT, move || graceful_exit(&for_sigint));

    let for_sigquit = Arc::clone(shared);
    pm_thread::install_signal_handler(libc::SIGQUIT, move || graceful_exit(&for_sigquit));

    let for_sighup = Arc::clone(shared);
    pm_thread::install_signal_handler(libc::SIGHUP, move || restart(&for_sighup));
}

/// Runs on `pm_thread`'s manager thread, never on the signal-handling
/// thread itself (spec.md §4.4's funnel).
fn graceful_exit(shared: &Shared) {
    pm_log::log_event(Level::Info, "graceful_exit: shutting down".to_string()).ok();
    let _ = pm_thread::kill_all();
    let mut state = shared.state.lock().unwrap();
    state.reinstall = false;
    state.woken = true;
    shared.cvar.notify_one();
}

/// Also runs on the manager thread. Zero-fills the whole region directly
/// rather than per-slot `invalidate`, matching the legacy `memset`-the-
/// whole-segment restart behavior.
fn restart(shared: &Shared) {
    pm_log::log_event(Level::Info, "restart: reinstalling from the top of the script".to_string()).ok();
    let addr = shared.base_addr.load(Ordering::SeqCst);
    if addr != 0 {
        let ptr = addr as *mut Point;
        unsafe {
            std::ptr::write_bytes(ptr, 0, MAX_NUM_POINTS);
        }
    }
    let mut state = shared.state.lock().unwrap();
    state.reinstall = true;
    state.woken = true;
    shared.cvar.notify_one();
}

fn block_all_signals_on_main_thread() {
    unsafe {
        let mut full: libc::sigset_t = std::mem::zeroed();
        libc::sigfillset(&mut full);
        libc::pthread_sigmask(libc::SIG_SETMASK, &full, std::ptr::null_mut());
    }
}
