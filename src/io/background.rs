//! Two-phase detach: re-exec as a child, wait for its readiness marker.
//!
//! The parent starts its own executable again with the original arguments plus
//! the internal child marker, with standard streams on `/dev/null`. The child
//! starts a new session, changes into the identity's working directory and runs
//! the normal startup. Writing its PID into the locked PID file is the last
//! startup step, so the parent treats "the PID file names my child" as success.

use anyhow::{Context, Result};
use std::fmt;
use std::io;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::common::constants::{CHILD_FLAG, EXIT_FAILURE, EXIT_HANDSHAKE_TIMEOUT};
use crate::io::instance::read_pid;

#[derive(Debug)]
pub enum BackgroundError {
    Spawn(io::Error),
    /// The child exited before reporting readiness.
    ChildFailed { status: ExitStatus },
    /// No readiness marker within the deadline.
    Timeout,
}

impl BackgroundError {
    /// Exit status the waiting parent reports.
    pub fn exit_code(&self) -> i32 {
        match self {
            BackgroundError::Timeout => EXIT_HANDSHAKE_TIMEOUT,
            BackgroundError::Spawn(_) | BackgroundError::ChildFailed { .. } => EXIT_FAILURE,
        }
    }
}

impl fmt::Display for BackgroundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackgroundError::Spawn(e) => write!(f, "failed to start background process: {e}"),
            BackgroundError::ChildFailed { status } => {
                write!(f, "background process exited during startup ({status})")
            }
            BackgroundError::Timeout => {
                f.write_str("background process did not report readiness in time")
            }
        }
    }
}

impl std::error::Error for BackgroundError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackgroundError::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

/// Re-execute the running binary as the background child.
///
/// `args` excludes the program name.
pub fn spawn_child<S: AsRef<str>>(args: &[S]) -> Result<Child, BackgroundError> {
    let exe = std::env::current_exe().map_err(BackgroundError::Spawn)?;
    Command::new(exe)
        .args(args.iter().map(AsRef::as_ref))
        .arg(CHILD_FLAG)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(BackgroundError::Spawn)
}

/// Block until `pid_path` names `child`, the child exits, or `timeout` passes.
pub fn wait_ready(
    child: &mut Child,
    pid_path: &Path,
    timeout: Duration,
    poll: Duration,
) -> Result<u32, BackgroundError> {
    let deadline = Instant::now() + timeout;
    loop {
        if read_pid(pid_path) == Some(child.id()) {
            return Ok(child.id());
        }
        match child.try_wait() {
            Ok(Some(status)) => return Err(BackgroundError::ChildFailed { status }),
            Ok(None) => {}
            Err(e) => return Err(BackgroundError::Spawn(e)),
        }
        if Instant::now() >= deadline {
            return Err(BackgroundError::Timeout);
        }
        std::thread::sleep(poll);
    }
}

/// First step of the child: leave the parent's session and terminal.
pub fn enter_background(working_dir: &Path) -> Result<()> {
    nix::unistd::setsid().context("Failed to start a new session")?;
    std::env::set_current_dir(working_dir).with_context(|| {
        format!(
            "Failed to change into working directory {}",
            working_dir.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    const POLL: Duration = Duration::from_millis(20);

    fn shell(script: &str) -> Child {
        Command::new("sh").arg("-c").arg(script).spawn().unwrap()
    }

    #[test]
    #[serial]
    fn test_child_writing_its_pid_is_ready() {
        let dir = tempdir().unwrap();
        let pid_path = dir.path().join("wb.pid");
        let mut child = shell(&format!(
            "echo $$ > {}; sleep 2",
            pid_path.display()
        ));

        let pid = wait_ready(&mut child, &pid_path, Duration::from_secs(5), POLL).unwrap();
        assert_eq!(pid, child.id());

        let _ = child.kill();
        let _ = child.wait();
    }

    #[test]
    #[serial]
    fn test_child_exiting_early_is_a_failure() {
        let dir = tempdir().unwrap();
        let mut child = shell("exit 3");

        let err = wait_ready(
            &mut child,
            &dir.path().join("wb.pid"),
            Duration::from_secs(5),
            POLL,
        )
        .unwrap_err();
        match &err {
            BackgroundError::ChildFailed { status } => assert_eq!(status.code(), Some(3)),
            other => panic!("expected ChildFailed, got {other:?}"),
        }
        assert_eq!(err.exit_code(), EXIT_FAILURE);
    }

    #[test]
    #[serial]
    fn test_silent_child_times_out() {
        let dir = tempdir().unwrap();
        let mut child = shell("sleep 5");

        let err = wait_ready(
            &mut child,
            &dir.path().join("wb.pid"),
            Duration::from_millis(200),
            POLL,
        )
        .unwrap_err();
        assert!(matches!(err, BackgroundError::Timeout));
        assert_eq!(err.exit_code(), EXIT_HANDSHAKE_TIMEOUT);

        let _ = child.kill();
        let _ = child.wait();
    }

    #[test]
    #[serial]
    fn test_pid_of_another_process_is_not_readiness() {
        let dir = tempdir().unwrap();
        let pid_path = dir.path().join("wb.pid");
        std::fs::write(&pid_path, format!("{}\n", std::process::id())).unwrap();
        let mut child = shell("sleep 5");

        let err = wait_ready(&mut child, &pid_path, Duration::from_millis(200), POLL);
        assert!(matches!(err, Err(BackgroundError::Timeout)));

        let _ = child.kill();
        let _ = child.wait();
    }
}
