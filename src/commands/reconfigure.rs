//! Implementation of the reconfigure command: SIGHUP to the running instance.

use anyhow::Result;
use nix::sys::signal::Signal;

use crate::common::constants::{EXIT_NOT_RUNNING, EXIT_SUCCESS};
use crate::io::instance::{self, DaemonIdentity};

pub fn handle_reconfigure_command(identity: &DaemonIdentity) -> Result<i32> {
    let Some(pid) = instance::running_instance(&identity.pid_path) else {
        log_error_exit!("{} isn't running", identity.ident);
        log_end!();
        return Ok(EXIT_NOT_RUNNING);
    };

    instance::send_signal(pid, Signal::SIGHUP)?;
    log_block_start!("Sent reconfigure request to {} (PID: {pid})", identity.ident);
    log_end!();
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_instance_is_not_running() {
        let dir = tempdir().unwrap();
        let identity = DaemonIdentity::in_dir("wb", dir.path(), dir.path().to_path_buf());
        assert_eq!(
            handle_reconfigure_command(&identity).unwrap(),
            EXIT_NOT_RUNNING
        );
    }
}
