//! Append-only, timestamped log sink shared by every `point-monitor` binary.
//!
//! Every [`log_event`] call produces exactly one line of the form
//! `HH:MM:SS.mmm  LEVEL   | <message>\n`, appended to the currently open
//! log file with a single `write(2)` syscall so concurrent writers in other
//! processes never interleave mid-line. If no file has been opened yet, the
//! first call lazily opens a default path. This mirrors
//! `original_source/src/lib/log_mgr/log_mgr.c` line for line in contract,
//! rewritten around a `Mutex<Option<File>>` instead of a bare static fd.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use colored::Colorize;

/// Severity of a logged line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Routine, informational event.
    Info,
    /// Recoverable error — the caller continues.
    Warning,
    /// Unrecoverable error — the caller is expected to exit soon after.
    Fatal,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Fatal => "FATAL",
        }
    }
}

/// A single formatted line exceeding this many bytes is truncated with a
/// trailing marker rather than risk a short, non-atomic `write(2)`.
const MAX_LINE_BYTES: usize = 4096;

struct LogState {
    file: Option<File>,
    also_print: AtomicBool,
}

static STATE: LazyLock<Mutex<LogState>> = LazyLock::new(|| {
    Mutex::new(LogState {
        file: None,
        also_print: AtomicBool::new(false),
    })
});

/// Default log file used when no caller has opened one yet: first
/// `/var/log/point-monitor/point-monitor.log`, falling back to
/// `./point-monitor.log` if that directory isn't writable (common outside
/// of a production host, e.g. under test).
fn default_log_path() -> PathBuf {
    let system_path = PathBuf::from("/var/log/point-monitor/point-monitor.log");
    if let Some(parent) = system_path.parent() {
        if std::fs::create_dir_all(parent).is_ok() {
            return system_path;
        }
    }
    PathBuf::from("point-monitor.log")
}

/// Open (creating if necessary) `path` as the active log file, replacing
/// and closing whatever was open before.
pub fn set_logfile(path: impl AsRef<Path>) -> io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_ref())?;

    let mut state = STATE.lock().unwrap();
    state.file = Some(file);
    Ok(())
}

/// Close the currently open log file, if any. The next [`log_event`] call
/// will reopen the default path.
pub fn close_logfile() {
    let mut state = STATE.lock().unwrap();
    state.file = None;
}

/// Enable or disable mirroring log lines to stdout (colorized by level when
/// stdout is a terminal). Purely cosmetic; never part of the file contract.
pub fn also_print_log(enable: bool) {
    STATE.lock().unwrap().also_print.store(enable, Ordering::Relaxed);
}

/// Format and append one log line.
///
/// Returns an error only if the write to the log file failed; formatting
/// and the optional stdout mirror never fail this call.
pub fn log_event(level: Level, message: impl AsRef<str>) -> io::Result<()> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let total_secs = now.as_secs();
    let millis = now.subsec_millis();
    let hours = (total_secs / 3600) % 24;
    let minutes = (total_secs / 60) % 60;
    let seconds = total_secs % 60;

    let mut line = format!(
        "{:02}:{:02}:{:02}.{:03}  {:<7} | {}",
        hours,
        minutes,
        seconds,
        millis,
        level.label(),
        message.as_ref()
    );
    if line.len() > MAX_LINE_BYTES {
        line.truncate(MAX_LINE_BYTES - 4);
        line.push_str("...\n");
    } else {
        line.push('\n');
    }

    let mut state = STATE.lock().unwrap();
    if state.file.is_none() {
        let opened = set_logfile_locked(&mut state, &default_log_path());
        if let Err(e) = opened {
            eprintln!("pm_log: could not open default log file: {e}");
        }
    }

    let also_print = state.also_print.load(Ordering::Relaxed);
    let result = if let Some(file) = state.file.as_ref() {
        write_line_atomically(file, line.as_bytes())
    } else {
        Ok(())
    };

    if also_print {
        mirror_to_stdout(level, &line);
    }

    result
}

fn set_logfile_locked(state: &mut LogState, path: &Path) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    state.file = Some(file);
    Ok(())
}

/// Issue exactly one `write(2)` for the whole rendered line, so that a
/// concurrent writer in another process can never observe a half-written
/// line from this one.
fn write_line_atomically(file: &File, bytes: &[u8]) -> io::Result<()> {
    let written = unsafe {
        libc::write(
            file.as_raw_fd(),
            bytes.as_ptr() as *const libc::c_void,
            bytes.len(),
        )
    };
    if written < 0 {
        return Err(io::Error::last_os_error());
    }
    if written as usize != bytes.len() {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            "short write to log file",
        ));
    }
    Ok(())
}

fn mirror_to_stdout(level: Level, line: &str) {
    let stdout_is_tty = unsafe { libc::isatty(libc::STDOUT_FILENO) } != 0;
    if !stdout_is_tty {
        print!("{line}");
        let _ = io::stdout().flush();
        return;
    }
    let colored_line = match level {
        Level::Fatal => line.red().to_string(),
        Level::Warning => line.yellow().to_string(),
        Level::Info => line.normal().to_string(),
    };
    print!("{colored_line}");
    let _ = io::stdout().flush();
}

/// Log an [`Level::Info`] line, `format!`-style.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        let _ = $crate::log_event($crate::Level::Info, format!($($arg)*));
    };
}

/// Log a [`Level::Warning`] line, `format!`-style.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        let _ = $crate::log_event($crate::Level::Warning, format!($($arg)*));
    };
}

/// Log a [`Level::Fatal`] line, `format!`-style.
#[macro_export]
macro_rules! log_fatal {
    ($($arg:tt)*) => {
        let _ = $crate::log_event($crate::Level::Fatal, format!($($arg)*));
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    // All four tests below drive the same process-global `STATE` through
    // `set_logfile`/`log_event`; `cargo test` runs them concurrently by
    // default, so each grabs this lock first to avoid one test's
    // `set_logfile` swapping the fd out from under another mid-sequence.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn read_file(path: &Path) -> String {
        let mut s = String::new();
        File::open(path).unwrap().read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn log_event_appends_one_line_per_call() {
        let _guard = TEST_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        set_logfile(&path).unwrap();
        also_print_log(false);

        log_event(Level::Info, "hello").unwrap();
        log_event(Level::Warning, "careful").unwrap();

        let contents = read_file(&path);
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO"));
        assert!(lines[0].contains("hello"));
        assert!(lines[1].contains("WARNING"));
        assert!(lines[1].contains("careful"));

        close_logfile();
    }

    #[test]
    fn line_format_matches_contract() {
        let _guard = TEST_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fmt.log");
        set_logfile(&path).unwrap();
        also_print_log(false);

        log_event(Level::Fatal, "boom").unwrap();
        let contents = read_file(&path);
        let line = contents.lines().next().unwrap();

        // HH:MM:SS.mmm  LEVEL   | message
        let parts: Vec<&str> = line.splitn(2, " | ").collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1], "boom");
        let timestamp_and_level = parts[0];
        assert!(timestamp_and_level.contains("FATAL"));
        assert_eq!(&timestamp_and_level[2..3], ":");
        assert_eq!(&timestamp_and_level[5..6], ":");

        close_logfile();
    }

    #[test]
    fn reopening_closes_prior_descriptor() {
        let _guard = TEST_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.log");
        let second = dir.path().join("second.log");

        set_logfile(&first).unwrap();
        log_event(Level::Info, "to first").unwrap();

        set_logfile(&second).unwrap();
        log_event(Level::Info, "to second").unwrap();

        assert!(read_file(&first).contains("to first"));
        assert!(read_file(&second).contains("to second"));
        assert!(!read_file(&second).contains("to first"));

        close_logfile();
    }

    #[test]
    fn macros_format_like_format_macro() {
        let _guard = TEST_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macro.log");
        set_logfile(&path).unwrap();
        also_print_log(false);

        log_info!("count={}", 42);
        let contents = read_file(&path);
        assert!(contents.contains("count=42"));

        close_logfile();
    }
}
