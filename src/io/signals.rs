//! Signal delivery for the daemon controller.
//!
//! signal-hook's self-pipe catches signals; a listener thread turns each one
//! into a [`ControlEvent`] on a channel. The controller blocks on that channel,
//! so nothing beyond flag-setting ever runs in signal-handler context.

use anyhow::{Context, Result};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use signal_hook::consts::signal::{
    SIGCHLD, SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGUSR1, SIGUSR2,
};
use signal_hook::iterator::{Handle, Signals};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::{self, JoinHandle};

/// Signals the daemon reacts to.
pub const HANDLED_SIGNALS: [i32; 7] = [SIGINT, SIGTERM, SIGQUIT, SIGHUP, SIGUSR1, SIGUSR2, SIGCHLD];

/// What the controller should do about a delivered signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// SIGINT, SIGTERM or SIGQUIT.
    Shutdown { signal: i32 },
    RaiseVerbosity,
    LowerVerbosity,
    /// SIGHUP; logged only.
    Hangup,
    ChildExited,
    Other(i32),
}

impl ControlEvent {
    pub fn from_signal(signal: i32) -> Self {
        match signal {
            SIGINT | SIGTERM | SIGQUIT => ControlEvent::Shutdown { signal },
            SIGUSR1 => ControlEvent::RaiseVerbosity,
            SIGUSR2 => ControlEvent::LowerVerbosity,
            SIGHUP => ControlEvent::Hangup,
            SIGCHLD => ControlEvent::ChildExited,
            other => ControlEvent::Other(other),
        }
    }
}

/// Human-readable signal name for log lines.
pub fn signal_name(signal: i32) -> String {
    nix::sys::signal::Signal::try_from(signal)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| format!("signal {signal}"))
}

/// Installed signal handlers and the thread forwarding them.
pub struct SignalListener {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalListener {
    /// Install handlers for [`HANDLED_SIGNALS`] and forward them to `sender`.
    pub fn install(sender: Sender<ControlEvent>) -> Result<Self> {
        let mut signals =
            Signals::new(HANDLED_SIGNALS).context("failed to register signal handlers")?;
        let handle = signals.handle();

        let thread = thread::Builder::new()
            .name("signal-listener".into())
            .spawn(move || {
                for signal in signals.forever() {
                    if sender.send(ControlEvent::from_signal(signal)).is_err() {
                        break;
                    }
                }
            })
            .context("failed to spawn signal listener thread")?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// Install handlers and return the receiving end as well.
    pub fn channel() -> Result<(Self, Receiver<ControlEvent>)> {
        let (tx, rx) = channel();
        Ok((Self::install(tx)?, rx))
    }

    /// Stop forwarding and join the listener thread.
    pub fn close(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reap every exited child without blocking; returns `(pid, exit code)` pairs.
///
/// A child killed by a signal reports `128 + signal`, as a shell would.
pub fn reap_children() -> Vec<(i32, i32)> {
    let mut reaped = Vec::new();
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(pid, code)) => reaped.push((pid.as_raw(), code)),
            Ok(WaitStatus::Signaled(pid, signal, _)) => {
                reaped.push((pid.as_raw(), 128 + signal as i32))
            }
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(_) => continue,
        }
    }
    reaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_signals_map_to_shutdown() {
        for signal in [SIGINT, SIGTERM, SIGQUIT] {
            assert_eq!(
                ControlEvent::from_signal(signal),
                ControlEvent::Shutdown { signal }
            );
        }
    }

    #[test]
    fn test_control_signals_map_to_events() {
        assert_eq!(ControlEvent::from_signal(SIGUSR1), ControlEvent::RaiseVerbosity);
        assert_eq!(ControlEvent::from_signal(SIGUSR2), ControlEvent::LowerVerbosity);
        assert_eq!(ControlEvent::from_signal(SIGHUP), ControlEvent::Hangup);
        assert_eq!(ControlEvent::from_signal(SIGCHLD), ControlEvent::ChildExited);
        assert_eq!(
            ControlEvent::from_signal(signal_hook::consts::SIGWINCH),
            ControlEvent::Other(signal_hook::consts::SIGWINCH)
        );
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(signal_name(SIGTERM), "SIGTERM");
        assert_eq!(signal_name(12345), "signal 12345");
    }
}
