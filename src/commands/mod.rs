//! Control verbs sent to an already running instance with `-k`.
//!
//! Each verb lives in its own submodule. A handler locates the instance
//! through its PID file and returns the process exit status for the invocation.

pub mod check;
pub mod reconfigure;
pub mod restart;
pub mod shutdown;

use anyhow::Result;
use std::fmt;

use crate::io::instance::DaemonIdentity;

/// The closed set of control verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlVerb {
    Reconfigure,
    Shutdown,
    Restart,
    Check,
}

impl ControlVerb {
    pub const NAMES: [&'static str; 4] = ["reconfigure", "shutdown", "restart", "check"];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "reconfigure" => Some(ControlVerb::Reconfigure),
            "shutdown" => Some(ControlVerb::Shutdown),
            "restart" => Some(ControlVerb::Restart),
            "check" => Some(ControlVerb::Check),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlVerb::Reconfigure => "reconfigure",
            ControlVerb::Shutdown => "shutdown",
            ControlVerb::Restart => "restart",
            ControlVerb::Check => "check",
        }
    }
}

impl fmt::Display for ControlVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run `verb` against the instance described by `identity`.
pub fn dispatch(verb: ControlVerb, identity: &DaemonIdentity) -> Result<i32> {
    log_version!();
    log_debug!("Using PID file {}", identity.pid_path.display());

    match verb {
        ControlVerb::Reconfigure => reconfigure::handle_reconfigure_command(identity),
        ControlVerb::Shutdown => shutdown::handle_shutdown_command(identity),
        ControlVerb::Restart => restart::handle_restart_command(identity),
        ControlVerb::Check => Ok(check::handle_check_command(identity)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_name_parses_back() {
        for name in ControlVerb::NAMES {
            let verb = ControlVerb::parse(name).unwrap();
            assert_eq!(verb.as_str(), name);
        }
        assert_eq!(ControlVerb::parse("Shutdown"), None);
        assert_eq!(ControlVerb::parse(""), None);
    }
}
