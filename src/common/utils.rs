//! Process and filesystem helpers shared by the daemon and the control commands.

use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

/// Directory holding the PID file and the background log.
///
/// Uses `XDG_RUNTIME_DIR` when available, `/tmp` otherwise.
pub fn runtime_dir() -> PathBuf {
    dirs::runtime_dir().unwrap_or_else(|| PathBuf::from("/tmp"))
}

/// Base name of the program as invoked, used as the default identity.
pub fn program_name(argv0: &str) -> String {
    Path::new(argv0)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}

/// Check whether a process with `pid` exists.
///
/// Probes with signal 0; `EPERM` still means the process is alive.
pub fn is_process_running(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None::<Signal>) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}
