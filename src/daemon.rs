//! Process startup and teardown around the sampling loop.
//!
//! [`launch`] takes a parsed `Run` invocation through the early phases:
//! configuration, the advisory singleton check and, unless `-f` was given, the
//! detach handshake. [`Daemon::run`] is the live instance itself. Startup order
//! matters:
//!
//! 1. lock the PID file (a conflict leaves everything untouched)
//! 2. install signal handlers
//! 3. open the sensors (fatal on failure)
//! 4. open the output sink (retried lazily on failure)
//! 5. connect the publisher, if configured
//! 6. write the PID, which marks startup as complete
//! 7. start the sampler and supervise it until a stop signal

use anyhow::{Context, Result};
use std::time::Duration;

use crate::args::RunArgs;
use crate::common::constants::*;
use crate::config::{self, Config, MqttTarget, RunConfig};
use crate::core::sampler::Sampler;
use crate::core::{Controller, Phase, StopReason};
use crate::io::background::{self, BackgroundError};
use crate::io::instance::{self, DaemonIdentity, InstanceError, PidFile};
use crate::io::signals::SignalListener;
use crate::logger::Log;
use crate::output::{Destination, OutputSink};
use crate::publish::mqtt::MqttTransport;
use crate::publish::{PublishError, Publisher, Transport};
use crate::sensors::{self, SensorError, SensorSuite};

type SensorOpener = Box<dyn FnOnce(&RunConfig) -> Result<Box<dyn SensorSuite>, SensorError>>;
type TransportConnector =
    Box<dyn FnOnce(&MqttTarget, &str) -> Result<Box<dyn Transport>, PublishError>>;

/// One live daemon instance.
pub struct Daemon {
    config: RunConfig,
    identity: DaemonIdentity,
    open_sensors: SensorOpener,
    connect_transport: TransportConnector,
    tick: Duration,
    show_headers: bool,
}

impl Daemon {
    /// A daemon on the real bus device and broker.
    pub fn new(config: RunConfig, identity: DaemonIdentity) -> Self {
        Self {
            config,
            identity,
            open_sensors: Box::new(|config: &RunConfig| {
                sensors::open_board(&config.device, config.sea_level_hpa)
            }),
            connect_transport: Box::new(|target: &MqttTarget, client_id: &str| {
                MqttTransport::connect(&target.host, target.port, client_id)
                    .map(|transport| Box::new(transport) as Box<dyn Transport>)
            }),
            tick: SAMPLING_TICK,
            show_headers: true,
        }
    }

    /// Replace the sensor opener.
    pub fn with_sensors<F>(mut self, open: F) -> Self
    where
        F: FnOnce(&RunConfig) -> Result<Box<dyn SensorSuite>, SensorError> + 'static,
    {
        self.open_sensors = Box::new(open);
        self
    }

    /// Replace the broker connector.
    pub fn with_transport<F>(mut self, connect: F) -> Self
    where
        F: FnOnce(&MqttTarget, &str) -> Result<Box<dyn Transport>, PublishError> + 'static,
    {
        self.connect_transport = Box::new(connect);
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn without_headers(mut self) -> Self {
        self.show_headers = false;
        self
    }

    /// Run until stopped; returns the process exit status.
    pub fn run(self) -> Result<i32> {
        let Daemon {
            config,
            identity,
            open_sensors,
            connect_transport,
            tick,
            show_headers,
        } = self;

        if show_headers {
            log_version!();
        }
        enter(Phase::SingletonCheck);

        let mut pid_file = match PidFile::acquire(&identity.pid_path) {
            Ok(pid_file) => pid_file,
            Err(InstanceError::Io(e)) => {
                return Err(e).with_context(|| {
                    format!("Failed to create PID file {}", identity.pid_path.display())
                });
            }
            Err(conflict) => {
                report_conflict(&identity, &conflict);
                return Ok(EXIT_FAILURE);
            }
        };

        config.log_summary();

        let (mut listener, events) = SignalListener::channel()?;

        let sensors = open_sensors(&config).context("Failed to initialize sensors")?;
        log_block_start!("Sensors ready on {}", config.device.display());

        let sink = match OutputSink::open(config.destination.clone()) {
            Ok(sink) => sink,
            Err(e) => {
                log_pipe!();
                log_warning!("{e}");
                log_indented!("Retrying when the first sample is written");
                OutputSink::unopened(config.destination.clone())
            }
        };

        let publisher = config.mqtt.as_ref().and_then(|target| {
            match connect_transport(target, &identity.ident) {
                Ok(transport) => Some(Publisher::new(transport, target.location.clone())),
                Err(e) => {
                    log_pipe!();
                    log_warning!("Publishing disabled: {e}");
                    None
                }
            }
        });

        let sampler = Sampler::new(
            sensors,
            sink,
            publisher,
            config.format,
            config.interval,
        )
        .with_tick(tick);
        let running = sampler.stop_flag();

        pid_file
            .write_pid(std::process::id())
            .context("Failed to write PID file")?;
        let handle = sampler.spawn().context("Failed to start sampling thread")?;
        log_block_start!(
            "{} running (PID: {})",
            identity.ident,
            std::process::id()
        );

        let mut controller = Controller::new(events, running);
        let reason = controller.supervise(&handle);

        let mut sink = controller.stop(handle)?;
        sink.close();
        listener.close();
        drop(pid_file);
        controller.finish();

        log_block_start!("Stopped");
        log_end!();

        Ok(match reason {
            StopReason::SamplerExited => EXIT_FAILURE,
            StopReason::Signal(_) | StopReason::OutputClosed | StopReason::ChannelClosed => {
                EXIT_SUCCESS
            }
        })
    }
}

fn enter(phase: Phase) {
    log_debug!("Entering {phase} phase");
}

fn report_conflict(identity: &DaemonIdentity, conflict: &InstanceError) {
    log_pipe!();
    log_error!("Cannot start {}: {conflict}", identity.ident);
    log_indented!("PID file: {}", identity.pid_path.display());
    log_indented!("Stop it first with: -i {} -k shutdown", identity.ident);
    log_end!();
}

/// Start the daemon for a parsed `Run` invocation. `argv` is the full
/// original argument vector, reused when re-executing as the background child.
pub fn launch(args: RunArgs, argv: &[String]) -> Result<i32> {
    Log::set_verbosity(args.verbosity);
    enter(Phase::Starting);

    let invocation_dir = std::env::current_dir().context("Failed to read working directory")?;
    let file_layer = match &args.config_path {
        Some(path) => config::load_from_path(path)?,
        None => Config::default(),
    };
    let config = RunConfig::resolve(
        file_layer.merge(args.overrides),
        args.verbosity,
        &invocation_dir,
    )?;
    let identity = DaemonIdentity::resolve(&args.ident)?;

    if args.child {
        background::enter_background(&identity.working_dir)?;
        let _log_guard = Log::start_file_logging(&identity.log_path)?;
        enter(Phase::Background);
        return Daemon::new(config, identity).run();
    }

    log_version!();
    enter(Phase::SingletonCheck);
    if let Some(pid) = instance::running_instance(&identity.pid_path) {
        report_conflict(&identity, &InstanceError::AlreadyRunning { pid });
        return Ok(EXIT_FAILURE);
    }

    if config.foreground {
        enter(Phase::Foreground);
        return Daemon::new(config, identity).without_headers().run();
    }

    detach(&config, &identity, argv)
}

fn detach(config: &RunConfig, identity: &DaemonIdentity, argv: &[String]) -> Result<i32> {
    log_block_start!("Starting in the background...");
    if config.destination == Destination::Stdout {
        log_warning!("Standard output is discarded once detached");
        log_indented!("Use -f to stay in the foreground, or -F <format>:<path>");
    }

    let mut child = background::spawn_child(argv.get(1..).unwrap_or_default())?;
    let result = background::wait_ready(
        &mut child,
        &identity.pid_path,
        BACKGROUND_READY_TIMEOUT,
        PROCESS_POLL_INTERVAL,
    );

    match result {
        Ok(pid) => {
            log_decorated!("{} running in the background (PID: {pid})", identity.ident);
            log_indented!("Log: {}", identity.log_path.display());
            log_end!();
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            log_error_exit!("{e}");
            if matches!(e, BackgroundError::ChildFailed { .. }) {
                log_indented!("See {} for details", identity.log_path.display());
            }
            log_end!();
            Ok(e.exit_code())
        }
    }
}
