//! Handle-addressed worker pool and the signal funnel that feeds it.
//!
//! Owns every worker task in the process: stable integer handles, a
//! post-exit state that persists until explicitly reaped, and a self-pipe
//! that converts asynchronous signal delivery into synchronous dispatch on
//! a dedicated manager thread, so user-installed handlers may safely
//! allocate, log, or lock.

mod error;
mod funnel;
mod manager;
mod record;

pub use error::ThreadError;
pub use funnel::{install_signal_handler, uninstall_signal_handler};
pub use manager::{
    cancellable_sleep, execute, exit, is_canceled, kill, kill_all, use_sigint_handler,
    use_sigquit_handler, wait, wait_all,
};
pub use record::{ThreadHandle, ThreadState};
