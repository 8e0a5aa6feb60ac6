//! Implementation of the shutdown command.
//!
//! Sends SIGTERM to the running instance and waits for it to exit, polling
//! every 100 ms for up to [`SHUTDOWN_WAIT_TIMEOUT`].

use anyhow::Result;
use nix::sys::signal::Signal;

use crate::common::constants::*;
use crate::io::instance::{self, DaemonIdentity};

/// Result of asking an instance to stop.
#[derive(Debug, PartialEq)]
pub enum ShutdownResult {
    Stopped { pid: u32 },
    /// Signalled, but still alive when the wait ran out.
    StillRunning { pid: u32 },
    NoInstanceRunning,
}

/// Signal the instance and wait for it.
pub fn stop_instance(identity: &DaemonIdentity) -> Result<ShutdownResult> {
    let Some(pid) = instance::running_instance(&identity.pid_path) else {
        return Ok(ShutdownResult::NoInstanceRunning);
    };

    log_block_start!("Stopping {} (PID: {pid})...", identity.ident);
    instance::send_signal(pid, Signal::SIGTERM)?;
    log_debug!("SIGTERM sent to process {pid}");

    if instance::wait_for_exit(pid, SHUTDOWN_WAIT_TIMEOUT) {
        Ok(ShutdownResult::Stopped { pid })
    } else {
        Ok(ShutdownResult::StillRunning { pid })
    }
}

pub fn handle_shutdown_command(identity: &DaemonIdentity) -> Result<i32> {
    let code = report(&stop_instance(identity)?, &identity.ident);
    log_end!();
    Ok(code)
}

/// Log the outcome and map it to an exit status.
pub(crate) fn report(result: &ShutdownResult, ident: &str) -> i32 {
    match result {
        ShutdownResult::Stopped { .. } => {
            log_decorated!("Process terminated successfully");
            EXIT_SUCCESS
        }
        ShutdownResult::StillRunning { pid } => {
            log_pipe!();
            log_warning!("Process {pid} did not terminate within the expected time");
            log_indented!("The termination signal was sent, but it may still be shutting down");
            EXIT_FAILURE
        }
        ShutdownResult::NoInstanceRunning => {
            log_error_exit!("{ident} isn't running");
            EXIT_NOT_RUNNING
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::process::Command;
    use tempfile::tempdir;

    #[test]
    fn test_no_pid_file_means_not_running() {
        let dir = tempdir().unwrap();
        let identity = DaemonIdentity::in_dir("wb", dir.path(), dir.path().to_path_buf());
        assert_eq!(
            stop_instance(&identity).unwrap(),
            ShutdownResult::NoInstanceRunning
        );
        assert_eq!(handle_shutdown_command(&identity).unwrap(), EXIT_NOT_RUNNING);
    }

    #[test]
    fn test_stale_pid_means_not_running() {
        let dir = tempdir().unwrap();
        let identity = DaemonIdentity::in_dir("wb", dir.path(), dir.path().to_path_buf());
        std::fs::write(&identity.pid_path, "999999999\n").unwrap();
        assert_eq!(
            stop_instance(&identity).unwrap(),
            ShutdownResult::NoInstanceRunning
        );
    }

    #[test]
    #[serial]
    fn test_running_process_is_terminated() {
        let dir = tempdir().unwrap();
        let identity = DaemonIdentity::in_dir("wb", dir.path(), dir.path().to_path_buf());

        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        std::fs::write(&identity.pid_path, format!("{}\n", child.id())).unwrap();

        // Reap concurrently so the terminated child does not linger as a zombie
        let pid = child.id();
        let waiter = std::thread::spawn(move || child.wait());

        assert_eq!(
            stop_instance(&identity).unwrap(),
            ShutdownResult::Stopped { pid }
        );
        assert!(waiter.join().unwrap().is_ok());
    }
}
