//! Implementation of the restart command.
//!
//! Restart is shutdown followed by exit: the invoking service manager or
//! script starts the next instance with a fresh invocation.

use anyhow::Result;

use super::shutdown::{self, ShutdownResult};
use crate::io::instance::DaemonIdentity;

pub fn handle_restart_command(identity: &DaemonIdentity) -> Result<i32> {
    let result = shutdown::stop_instance(identity)?;
    let code = shutdown::report(&result, &identity.ident);

    if matches!(result, ShutdownResult::Stopped { .. }) {
        log_indented!("Start a new instance to complete the restart");
    }
    log_end!();
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::EXIT_NOT_RUNNING;
    use tempfile::tempdir;

    #[test]
    fn test_restart_without_instance_is_not_running() {
        let dir = tempdir().unwrap();
        let identity = DaemonIdentity::in_dir("wb", dir.path(), dir.path().to_path_buf());
        assert_eq!(handle_restart_command(&identity).unwrap(), EXIT_NOT_RUNNING);
    }
}
