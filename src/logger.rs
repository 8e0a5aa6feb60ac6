//! Structured logging with box-drawing output and runtime verbosity.
//!
//! Log lines always go to standard error, because standard output may be the
//! data sink. When the daemon detaches, [`Log::start_file_logging`] reroutes every
//! line through a channel to a writer thread that appends to a log file.
//!
//! ## Logging Conventions
//!
//! - **`log_block_start!`**: opens a new conceptual block (startup phases, state
//!   changes). Prints an empty pipe `┃` for spacing, then `┣ message`.
//! - **`log_decorated!`**: a line belonging to the current block, `┣ message`.
//! - **`log_indented!`**: nested detail under the previous line, `┃   message`.
//! - **`log_pipe!`**: a lone `┃` used before a semantic-level message that starts
//!   its own block.
//! - **`log_version!`** / **`log_end!`**: the startup header and the final `╹`.
//! - **`log_info!`, `log_warning!`, `log_error!`, `log_critical!`**: semantic levels
//!   with a coloured `[LEVEL]` tag, always printed.
//! - **`log_debug!`** prints at verbosity 1 and above, **`log_trace!`** at 2 and above.
//!   Verbosity starts at the number of `-d` flags and is moved at runtime with
//!   SIGUSR1 (raise) and SIGUSR2 (lower).

use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{Sender, channel};

use anyhow::Context;

/// Highest verbosity level SIGUSR1 can raise to.
pub const MAX_VERBOSITY: u8 = 3;

static VERBOSITY: AtomicU8 = AtomicU8::new(0);

// Set once when the detached daemon starts writing to its log file
static LOG_CHANNEL: OnceLock<Sender<LogMessage>> = OnceLock::new();

enum LogMessage {
    Formatted(String),
    Shutdown,
}

/// Process-wide logging controls used by the logging macros.
pub struct Log;

impl Log {
    /// Set the verbosity level, clamped to [`MAX_VERBOSITY`].
    pub fn set_verbosity(level: u8) {
        VERBOSITY.store(level.min(MAX_VERBOSITY), Ordering::SeqCst);
    }

    pub fn verbosity() -> u8 {
        VERBOSITY.load(Ordering::SeqCst)
    }

    /// Raise verbosity by one step and return the new level.
    pub fn raise_verbosity() -> u8 {
        let previous = VERBOSITY
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |level| {
                Some((level + 1).min(MAX_VERBOSITY))
            })
            .unwrap_or(MAX_VERBOSITY);
        (previous + 1).min(MAX_VERBOSITY)
    }

    /// Lower verbosity by one step and return the new level.
    pub fn lower_verbosity() -> u8 {
        let previous = VERBOSITY
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |level| {
                Some(level.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    /// Whether a message that needs `min_verbosity` would currently be printed.
    pub fn allows(min_verbosity: u8) -> bool {
        Self::verbosity() >= min_verbosity
    }

    /// Route all further output to `path`, appending.
    ///
    /// Can only be started once per process. The returned guard must be kept alive
    /// for as long as logging should reach the file.
    pub fn start_file_logging(path: &Path) -> anyhow::Result<LoggerGuard> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;

        let (tx, rx) = channel();
        LOG_CHANNEL
            .set(tx.clone())
            .map_err(|_| anyhow::anyhow!("Logger channel already initialized"))?;

        let handle = std::thread::Builder::new()
            .name("log-writer".into())
            .spawn(move || {
                loop {
                    match rx.recv() {
                        Ok(LogMessage::Formatted(text)) => {
                            file.write_all(text.as_bytes())?;
                            file.flush()?;
                        }
                        Ok(LogMessage::Shutdown) | Err(_) => {
                            file.flush()?;
                            break;
                        }
                    }
                }
                Ok::<(), std::io::Error>(())
            })
            .context("failed to spawn log writer thread")?;

        Ok(LoggerGuard {
            tx,
            handle: Some(handle),
        })
    }

    /// Timestamp prefix, only used when writing to a log file.
    pub fn timestamp_prefix() -> String {
        if LOG_CHANNEL.get().is_some() {
            format!("[{}] ", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
        } else {
            String::new()
        }
    }

    /// Print one line made of `lead` followed by `message`.
    pub fn emit(lead: &str, message: &str) {
        let prefix = Self::timestamp_prefix();
        write_output(&format!("{prefix}{lead}{message}\n"));
    }

    /// Print a spacing pipe, then one line made of `lead` followed by `message`.
    pub fn emit_block(lead: &str, message: &str) {
        let prefix = Self::timestamp_prefix();
        write_output(&format!("{prefix}┃\n{prefix}{lead}{message}\n"));
    }
}

/// Keeps the file log writer alive; flushes and joins it on drop.
pub struct LoggerGuard {
    tx: Sender<LogMessage>,
    handle: Option<std::thread::JoinHandle<std::io::Result<()>>>,
}

impl Drop for LoggerGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(LogMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        // LOG_CHANNEL stays set; the process is exiting at this point
    }
}

fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == 'm' {
                    break;
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Route a formatted line to the file writer or to standard error.
pub fn write_output(text: &str) {
    if let Some(tx) = LOG_CHANNEL.get() {
        let _ = tx.send(LogMessage::Formatted(strip_ansi_codes(text)));
    } else {
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(text.as_bytes());
        let _ = stderr.flush();
    }
}

// # Logging Macros

/// Log a line that belongs to the current block.
#[macro_export]
macro_rules! log_decorated {
    ($fmt:literal $($arg:tt)*) => {{
        if $crate::logger::Log::allows(0) {
            $crate::logger::Log::emit("┣ ", &format!($fmt $($arg)*));
        }
    }};
    ($expr:expr) => {{
        if $crate::logger::Log::allows(0) {
            $crate::logger::Log::emit("┣ ", &$expr.to_string());
        }
    }};
}

/// Log an indented detail line.
#[macro_export]
macro_rules! log_indented {
    ($fmt:literal $($arg:tt)*) => {{
        if $crate::logger::Log::allows(0) {
            $crate::logger::Log::emit("┃   ", &format!($fmt $($arg)*));
        }
    }};
    ($expr:expr) => {{
        if $crate::logger::Log::allows(0) {
            $crate::logger::Log::emit("┃   ", &$expr.to_string());
        }
    }};
}

/// Log a lone pipe for vertical spacing.
#[macro_export]
macro_rules! log_pipe {
    () => {{
        if $crate::logger::Log::allows(0) {
            $crate::logger::Log::emit("┃", "");
        }
    }};
}

/// Start a new block of related log lines.
#[macro_export]
macro_rules! log_block_start {
    ($fmt:literal $($arg:tt)*) => {{
        if $crate::logger::Log::allows(0) {
            $crate::logger::Log::emit_block("┣ ", &format!($fmt $($arg)*));
        }
    }};
    ($expr:expr) => {{
        if $crate::logger::Log::allows(0) {
            $crate::logger::Log::emit_block("┣ ", &$expr.to_string());
        }
    }};
}

/// Log the startup header.
#[macro_export]
macro_rules! log_version {
    () => {{
        if $crate::logger::Log::allows(0) {
            let version = env!("CARGO_PKG_VERSION");
            $crate::logger::Log::emit("┏ ", &format!("weatherboard v{version} ━━╸"));
        }
    }};
}

/// Log the final termination marker.
#[macro_export]
macro_rules! log_end {
    () => {{
        if $crate::logger::Log::allows(0) {
            $crate::logger::Log::emit("╹", "");
        }
    }};
}

#[macro_export]
macro_rules! log_warning {
    ($fmt:literal $($arg:tt)*) => {{
        if $crate::logger::Log::allows(0) {
            $crate::logger::Log::emit("┣[\x1b[33mWARNING\x1b[0m] ", &format!($fmt $($arg)*));
        }
    }};
    ($expr:expr) => {{
        if $crate::logger::Log::allows(0) {
            $crate::logger::Log::emit("┣[\x1b[33mWARNING\x1b[0m] ", &$expr.to_string());
        }
    }};
}

#[macro_export]
macro_rules! log_error {
    ($fmt:literal $($arg:tt)*) => {{
        if $crate::logger::Log::allows(0) {
            $crate::logger::Log::emit("┣[\x1b[31mERROR\x1b[0m] ", &format!($fmt $($arg)*));
        }
    }};
    ($expr:expr) => {{
        if $crate::logger::Log::allows(0) {
            $crate::logger::Log::emit("┣[\x1b[31mERROR\x1b[0m] ", &$expr.to_string());
        }
    }};
}

/// Log an error that ends the flow: a spacing pipe, then `┗[ERROR] message`.
#[macro_export]
macro_rules! log_error_exit {
    ($fmt:literal $($arg:tt)*) => {{
        if $crate::logger::Log::allows(0) {
            $crate::logger::Log::emit_block("┗[\x1b[31mERROR\x1b[0m] ", &format!($fmt $($arg)*));
        }
    }};
    ($expr:expr) => {{
        if $crate::logger::Log::allows(0) {
            $crate::logger::Log::emit_block("┗[\x1b[31mERROR\x1b[0m] ", &$expr.to_string());
        }
    }};
}

#[macro_export]
macro_rules! log_info {
    ($fmt:literal $($arg:tt)*) => {{
        if $crate::logger::Log::allows(0) {
            $crate::logger::Log::emit("┣[\x1b[32mINFO\x1b[0m] ", &format!($fmt $($arg)*));
        }
    }};
    ($expr:expr) => {{
        if $crate::logger::Log::allows(0) {
            $crate::logger::Log::emit("┣[\x1b[32mINFO\x1b[0m] ", &$expr.to_string());
        }
    }};
}

/// Debug detail, printed at verbosity 1 and above.
#[macro_export]
macro_rules! log_debug {
    ($fmt:literal $($arg:tt)*) => {{
        if $crate::logger::Log::allows(1) {
            $crate::logger::Log::emit("┣[\x1b[32mDEBUG\x1b[0m] ", &format!($fmt $($arg)*));
        }
    }};
    ($expr:expr) => {{
        if $crate::logger::Log::allows(1) {
            $crate::logger::Log::emit("┣[\x1b[32mDEBUG\x1b[0m] ", &$expr.to_string());
        }
    }};
}

/// Per-cycle detail, printed at verbosity 2 and above.
#[macro_export]
macro_rules! log_trace {
    ($fmt:literal $($arg:tt)*) => {{
        if $crate::logger::Log::allows(2) {
            $crate::logger::Log::emit("┣[\x1b[36mTRACE\x1b[0m] ", &format!($fmt $($arg)*));
        }
    }};
    ($expr:expr) => {{
        if $crate::logger::Log::allows(2) {
            $crate::logger::Log::emit("┣[\x1b[36mTRACE\x1b[0m] ", &$expr.to_string());
        }
    }};
}

#[macro_export]
macro_rules! log_critical {
    ($fmt:literal $($arg:tt)*) => {{
        if $crate::logger::Log::allows(0) {
            $crate::logger::Log::emit("┣[\x1b[31mCRITICAL\x1b[0m] ", &format!($fmt $($arg)*));
        }
    }};
    ($expr:expr) => {{
        if $crate::logger::Log::allows(0) {
            $crate::logger::Log::emit("┣[\x1b[31mCRITICAL\x1b[0m] ", &$expr.to_string());
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_strips_colour_codes() {
        let text = "┣[\x1b[31mERROR\x1b[0m] bus fault";
        assert_eq!(strip_ansi_codes(text), "┣[ERROR] bus fault");
    }

    #[test]
    fn test_keeps_non_colour_escapes_intact() {
        assert_eq!(strip_ansi_codes("a\x1bb"), "a\x1bb");
    }

    #[test]
    #[serial]
    fn test_verbosity_saturates_at_both_ends() {
        Log::set_verbosity(0);
        assert_eq!(Log::lower_verbosity(), 0);

        assert_eq!(Log::raise_verbosity(), 1);
        assert!(Log::allows(1));
        assert!(!Log::allows(2));

        Log::set_verbosity(MAX_VERBOSITY);
        assert_eq!(Log::raise_verbosity(), MAX_VERBOSITY);
        assert_eq!(Log::lower_verbosity(), MAX_VERBOSITY - 1);

        Log::set_verbosity(0);
    }

    #[test]
    #[serial]
    fn test_set_verbosity_clamps() {
        Log::set_verbosity(42);
        assert_eq!(Log::verbosity(), MAX_VERBOSITY);
        Log::set_verbosity(0);
    }
}
