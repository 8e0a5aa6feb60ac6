//! Implementation of the check command.
//!
//! Reports whether the PID file names a live process. The instance itself is
//! never contacted, and the exit status is always [`EXIT_CHECK_ALIVE`].

use crate::common::constants::EXIT_CHECK_ALIVE;
use crate::io::instance::{self, DaemonIdentity};

pub fn handle_check_command(identity: &DaemonIdentity) -> i32 {
    match instance::running_instance(&identity.pid_path) {
        Some(pid) => {
            log_block_start!("{} is running (PID: {pid})", identity.ident);
        }
        None => {
            log_block_start!("{} is not running", identity.ident);
        }
    }
    log_end!();
    EXIT_CHECK_ALIVE
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_check_reports_fixed_code_either_way() {
        let dir = tempdir().unwrap();
        let identity = DaemonIdentity::in_dir("wb", dir.path(), dir.path().to_path_buf());
        assert_eq!(handle_check_command(&identity), EXIT_CHECK_ALIVE);

        std::fs::write(&identity.pid_path, format!("{}\n", std::process::id())).unwrap();
        assert_eq!(handle_check_command(&identity), EXIT_CHECK_ALIVE);
    }
}
