//! Daemon lifecycle: the controller's signal-wait loop and the sampling loop.
//!
//! Two threads of control share one process. The [`sampler::Sampler`] owns all
//! sensor and output work; the [`Controller`] blocks on the signal channel and
//! only ever touches the shared stop flag. Shutdown always joins the sampler
//! before its sink is closed.

pub mod sampler;

use anyhow::{Result, anyhow};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::common::constants::CONTROL_WAIT_TIMEOUT;
use crate::io::signals::{ControlEvent, reap_children, signal_name};
use crate::logger::Log;
use crate::output::OutputSink;

/// Lifecycle phase of the daemon process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    SingletonCheck,
    Foreground,
    Background,
    Running,
    Stopping,
    Terminated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Starting => "starting",
            Phase::SingletonCheck => "singleton check",
            Phase::Foreground => "foreground",
            Phase::Background => "background",
            Phase::Running => "running",
            Phase::Stopping => "stopping",
            Phase::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Why the controller left its wait loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Signal(i32),
    /// The sampling thread stopped itself because its output was closed.
    OutputClosed,
    /// The sampling thread ended on its own.
    SamplerExited,
    /// Nothing can deliver signals any more.
    ChannelClosed,
}

/// Reaction to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Stop,
}

/// Signal-driven supervisor of the sampling thread.
pub struct Controller {
    events: Receiver<ControlEvent>,
    running: Arc<AtomicBool>,
    wait: Duration,
    phase: Phase,
}

impl Controller {
    /// `running` is the sampler's stop flag.
    pub fn new(events: Receiver<ControlEvent>, running: Arc<AtomicBool>) -> Self {
        Self {
            events,
            running,
            wait: CONTROL_WAIT_TIMEOUT,
            phase: Phase::Running,
        }
    }

    /// Override how long one wait blocks before re-checking the sampler.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Apply one event.
    pub fn handle(&mut self, event: ControlEvent) -> Disposition {
        match event {
            ControlEvent::Shutdown { signal } => {
                log_block_start!("Received {}, shutting down...", signal_name(signal));
                return Disposition::Stop;
            }
            ControlEvent::RaiseVerbosity => {
                log_pipe!();
                log_info!("Log verbosity raised to {}", Log::raise_verbosity());
            }
            ControlEvent::LowerVerbosity => {
                log_pipe!();
                log_info!("Log verbosity lowered to {}", Log::lower_verbosity());
            }
            ControlEvent::Hangup => {
                log_pipe!();
                log_info!("Received SIGHUP, nothing to reconfigure");
            }
            ControlEvent::ChildExited => {
                for (pid, code) in reap_children() {
                    log_debug!("Child process {pid} exited with status {code}");
                }
            }
            ControlEvent::Other(signal) => {
                log_pipe!();
                log_warning!("Ignoring unexpected {}", signal_name(signal));
            }
        }
        Disposition::Continue
    }

    /// Block on signals until one asks to stop or the sampler dies.
    pub fn supervise(&mut self, sampler: &JoinHandle<OutputSink>) -> StopReason {
        self.phase = Phase::Running;
        loop {
            if sampler.is_finished() {
                if !self.running.load(Ordering::SeqCst) {
                    return StopReason::OutputClosed;
                }
                log_pipe!();
                log_critical!("Sampling thread ended unexpectedly");
                return StopReason::SamplerExited;
            }

            match self.events.recv_timeout(self.wait) {
                Ok(event) => match (self.handle(event), event) {
                    (Disposition::Stop, ControlEvent::Shutdown { signal }) => {
                        return StopReason::Signal(signal);
                    }
                    _ => continue,
                },
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    log_warning!("Signal channel closed");
                    return StopReason::ChannelClosed;
                }
            }
        }
    }

    /// Clear the stop flag and wait for the sampler to finish its cycle.
    ///
    /// Returns the sink so the caller can close it after the join.
    pub fn stop(&mut self, sampler: JoinHandle<OutputSink>) -> Result<OutputSink> {
        self.phase = Phase::Stopping;
        self.running.store(false, Ordering::SeqCst);
        sampler
            .join()
            .map_err(|_| anyhow!("sampling thread panicked"))
    }

    /// Mark the end of the lifecycle.
    pub fn finish(&mut self) {
        self.phase = Phase::Terminated;
    }
}
