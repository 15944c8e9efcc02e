//! `observer`: attaches to the shared point region and periodically
//! reports aggregate statistics until its observation window elapses or
//! it's asked to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;

use pm_config::{ObserverArgs, MAX_NUM_POINTS, SHM_KEY};
use pm_log::Level;
use pm_point::Point;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    let args = ObserverArgs::parse();
    if let Some(0) = args.seconds {
        eprintln!("observer: seconds must be a positive integer");
        std::process::exit(-1);
    }

    pm_log::set_logfile(pm_config::default_log_path("observer"))
        .unwrap_or_else(|e| eprintln!("observer: could not open log file: {e}"));
    pm_log::also_print_log(true);

    let running = Arc::new(AtomicBool::new(true));
    let for_sigint = Arc::clone(&running);
    pm_thread::install_signal_handler(libc::SIGINT, move || {
        for_sigint.store(false, Ordering::SeqCst);
    });
    let for_sigquit = Arc::clone(&running);
    pm_thread::install_signal_handler(libc::SIGQUIT, move || {
        for_sigquit.store(false, Ordering::SeqCst);
    });

    let size = MAX_NUM_POINTS * std::mem::size_of::<Point>();
    let Some(addr) = pm_shm::connect(SHM_KEY, size) else {
        pm_log::log_event(Level::Fatal, "could not attach to the shared point region".to_string()).ok();
        std::process::exit(1);
    };

    let seconds = args.resolved_seconds();
    let deadline = Instant::now() + Duration::from_secs(seconds as u64);

    while running.load(Ordering::SeqCst) && Instant::now() < deadline {
        pm_shm::lock(SHM_KEY);
        pm_point::show_points(addr as *const Point, MAX_NUM_POINTS);
        pm_shm::unlock(SHM_KEY);
        pm_thread::cancellable_sleep(Duration::from_secs(1));
    }

    // Never destroy: another process (or a later producer) may still be
    // attached to the region (spec.md §4.7).
    if let Err(e) = pm_shm::detach(addr) {
        pm_log::log_event(Level::Warning, format!("detach on exit: {e}")).ok();
    }

    Ok(())
}
