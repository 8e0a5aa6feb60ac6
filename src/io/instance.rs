//! Daemon identity and the PID-file singleton.
//!
//! The PID file is the single source of truth for "is an instance running".
//! A starting daemon takes an exclusive `flock` on it before touching anything
//! else, truncates it, and writes its PID only when startup has completed. A
//! locked file therefore means a live owner, and an empty locked file means an
//! owner that is still starting. The lock dies with the process, so a crashed
//! daemon never blocks the next start.

use anyhow::{Context, Result};
use fs2::FileExt;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::common::constants::PROCESS_POLL_INTERVAL;
use crate::common::utils;

/// Where an instance named `ident` keeps its state.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonIdentity {
    pub ident: String,
    pub pid_path: PathBuf,
    /// Log file used once the daemon detaches.
    pub log_path: PathBuf,
    /// Directory the detached daemon runs in: the executable's own directory.
    pub working_dir: PathBuf,
}

impl DaemonIdentity {
    /// Identity rooted in the user's runtime directory.
    pub fn resolve(ident: &str) -> Result<Self> {
        let exe = std::env::current_exe().context("Failed to get current executable path")?;
        let working_dir = exe
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        Ok(Self::in_dir(ident, &utils::runtime_dir(), working_dir))
    }

    pub fn in_dir(ident: &str, runtime_dir: &Path, working_dir: PathBuf) -> Self {
        Self {
            ident: ident.to_string(),
            pid_path: runtime_dir.join(format!("{ident}.pid")),
            log_path: runtime_dir.join(format!("{ident}.log")),
            working_dir,
        }
    }
}

/// Another process holds the PID file.
#[derive(Debug)]
pub enum InstanceError {
    /// A live daemon owns the file.
    AlreadyRunning { pid: u32 },
    /// The file is locked but no PID has been written yet.
    Starting,
    Io(io::Error),
}

impl fmt::Display for InstanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceError::AlreadyRunning { pid } => write!(f, "already running (PID: {pid})"),
            InstanceError::Starting => f.write_str("another instance is starting"),
            InstanceError::Io(e) => write!(f, "PID file error: {e}"),
        }
    }
}

impl std::error::Error for InstanceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InstanceError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for InstanceError {
    fn from(e: io::Error) -> Self {
        InstanceError::Io(e)
    }
}

/// Exclusive ownership of a PID file. Dropping it removes the file.
#[derive(Debug)]
pub struct PidFile {
    file: File,
    path: PathBuf,
}

impl PidFile {
    /// Lock the PID file at `path`.
    ///
    /// The file is opened without truncation, so a refused attempt leaves the
    /// owner's contents untouched.
    pub fn acquire(path: &Path) -> Result<Self, InstanceError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(match read_pid(path) {
                Some(pid) if utils::is_process_running(pid) => {
                    InstanceError::AlreadyRunning { pid }
                }
                _ => InstanceError::Starting,
            });
        }

        // Stale contents from a crashed owner must not look like a live PID
        file.set_len(0)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `pid`; this marks startup as complete.
    pub fn write_pid(&mut self, pid: u32) -> io::Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        writeln!(self.file, "{pid}")?;
        self.file.flush()?;
        self.file.sync_all()
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        // Remove while still holding the lock, then release it
        let _ = std::fs::remove_file(&self.path);
        let _ = FileExt::unlock(&self.file);
    }
}

/// PID recorded in the file at `path`, if any.
pub fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|contents| contents.trim().parse::<u32>().ok())
        .filter(|pid| *pid > 0)
}

/// PID of the live instance registered at `path`.
pub fn running_instance(path: &Path) -> Option<u32> {
    read_pid(path).filter(|pid| utils::is_process_running(*pid))
}

/// Deliver `signal` to `pid`.
pub fn send_signal(pid: u32, signal: Signal) -> Result<()> {
    let raw = i32::try_from(pid).context("PID out of range")?;
    kill(Pid::from_raw(raw), signal)
        .with_context(|| format!("Failed to send {signal} to process {pid}"))
}

/// Poll until `pid` is gone or `timeout` passes; returns whether it exited.
pub fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !utils::is_process_running(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(PROCESS_POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_identity_paths_follow_ident() {
        let identity = DaemonIdentity::in_dir("porch", Path::new("/run/user/1000"), "/opt".into());
        assert_eq!(identity.pid_path, PathBuf::from("/run/user/1000/porch.pid"));
        assert_eq!(identity.log_path, PathBuf::from("/run/user/1000/porch.log"));
        assert_eq!(identity.working_dir, PathBuf::from("/opt"));
    }

    #[test]
    fn test_pid_written_on_ready_and_removed_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wb.pid");

        let mut pid_file = PidFile::acquire(&path).unwrap();
        assert_eq!(read_pid(&path), None);

        pid_file.write_pid(std::process::id()).unwrap();
        assert_eq!(running_instance(&path), Some(std::process::id()));

        drop(pid_file);
        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_reports_live_owner_without_overwriting() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wb.pid");

        let mut owner = PidFile::acquire(&path).unwrap();
        owner.write_pid(std::process::id()).unwrap();

        match PidFile::acquire(&path) {
            Err(InstanceError::AlreadyRunning { pid }) => assert_eq!(pid, std::process::id()),
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("{}\n", std::process::id())
        );
    }

    #[test]
    fn test_locked_file_without_pid_is_starting() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wb.pid");

        let _owner = PidFile::acquire(&path).unwrap();
        assert!(matches!(
            PidFile::acquire(&path),
            Err(InstanceError::Starting)
        ));
    }

    #[test]
    fn test_stale_unlocked_file_is_taken_over() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wb.pid");
        fs::write(&path, "999999999\n").unwrap();

        let pid_file = PidFile::acquire(&path).unwrap();
        assert_eq!(read_pid(pid_file.path()), None);
    }

    #[test]
    fn test_read_pid_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wb.pid");

        assert_eq!(read_pid(&path), None);
        fs::write(&path, "not a pid").unwrap();
        assert_eq!(read_pid(&path), None);
        fs::write(&path, "0\n").unwrap();
        assert_eq!(read_pid(&path), None);
        fs::write(&path, " 4242 \n").unwrap();
        assert_eq!(read_pid(&path), Some(4242));
    }

    #[test]
    fn test_wait_for_exit_times_out_for_live_process() {
        assert!(!wait_for_exit(
            std::process::id(),
            Duration::from_millis(150)
        ));
    }
}
