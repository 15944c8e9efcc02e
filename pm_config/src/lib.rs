//! Shared configuration surface for both binaries: the fixed shared-memory
//! key, the point-array bound, CLI argument shapes, and default log path
//! resolution.

use std::path::PathBuf;

use clap::Parser;

/// Shared-memory key both peers must agree on (spec.md §6's example key,
/// used here as the actual default).
pub const SHM_KEY: i32 = 8675309;

/// Number of `Point` slots in the shared region.
pub const MAX_NUM_POINTS: usize = 20;

/// Default observation window for `observer` when no argument is given.
///
/// spec.md §2/§4.7 call "a value >= 30" typical while the legacy
/// `monitor_shm.c` this was distilled from hard-codes 600 seconds; this
/// rewrite picks the shorter default so a quick interactive run doesn't
/// wait ten minutes (see DESIGN.md, Open Question OQ-2).
pub const DEFAULT_OBSERVER_SECONDS: u32 = 30;

/// Environment variable overriding the default `/var/log/point-monitor`
/// directory — not present in the legacy tool, added so the log contract
/// is testable without root.
pub const LOG_DIR_ENV_VAR: &str = "POINT_MONITOR_LOG_DIR";

/// `producer <script-path> [-q]`.
#[derive(Parser, Debug)]
#[command(name = "producer", about = "Schedule timed writes into the shared point region")]
pub struct ProducerArgs {
    /// Path to the task script to parse and run.
    pub script: PathBuf,

    /// Suppress mirroring log lines to stdout.
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

/// `observer [<seconds>]`.
#[derive(Parser, Debug)]
#[command(name = "observer", about = "Periodically report aggregate statistics over the shared point region")]
pub struct ObserverArgs {
    /// How long to observe, in seconds. Must be positive.
    pub seconds: Option<u32>,
}

impl ObserverArgs {
    /// Resolve the effective observation window, applying
    /// [`DEFAULT_OBSERVER_SECONDS`] when no argument was given.
    pub fn resolved_seconds(&self) -> u32 {
        self.seconds.unwrap_or(DEFAULT_OBSERVER_SECONDS)
    }
}

/// Default log file path for `program` (`producer` or `observer`):
/// `$POINT_MONITOR_LOG_DIR/<program>.log` if set, else
/// `/var/log/point-monitor/<program>.log`.
pub fn default_log_path(program: &str) -> PathBuf {
    let dir = std::env::var(LOG_DIR_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/log/point-monitor"));
    dir.join(format!("{program}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Both cases share the process-global `LOG_DIR_ENV_VAR`, so they run as
    // one test — `cargo test` runs tests from the same binary concurrently
    // by default, and two tests mutating the same env var would race.
    #[test]
    fn default_log_path_env_override_and_fallback() {
        std::env::set_var(LOG_DIR_ENV_VAR, "/tmp/pm-test-logs");
        assert_eq!(
            default_log_path("producer"),
            PathBuf::from("/tmp/pm-test-logs/producer.log")
        );

        std::env::remove_var(LOG_DIR_ENV_VAR);
        assert_eq!(
            default_log_path("observer"),
            PathBuf::from("/var/log/point-monitor/observer.log")
        );
    }

    #[test]
    fn observer_args_default_seconds() {
        let args = ObserverArgs { seconds: None };
        assert_eq!(args.resolved_seconds(), DEFAULT_OBSERVER_SECONDS);
        let args = ObserverArgs { seconds: Some(45) };
        assert_eq!(args.resolved_seconds(), 45);
    }
}
