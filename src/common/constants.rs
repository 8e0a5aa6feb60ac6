//! Compiled-in defaults, limits and process exit codes.

use std::time::Duration;

// # Defaults

/// Bus device both sensor chips hang off.
pub const DEFAULT_DEVICE: &str = "/dev/i2c-1";

/// Sea-level reference pressure for the altitude estimate, in hPa.
pub const DEFAULT_SEA_LEVEL_HPA: f64 = 1024.25;

/// Time between two samples.
pub const DEFAULT_INTERVAL_SECS: u64 = 20;

/// Sleep granularity of the sampling loop; a stop request is honoured within one tick.
pub const SAMPLING_TICK: Duration = Duration::from_secs(1);

/// Topic root used when publishing is enabled without `-t`.
pub const DEFAULT_MQTT_LOCATION: &str = "home";

pub const DEFAULT_MQTT_PORT: u16 = 1883;

pub const MQTT_KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Longest a reconnect attempt waits for the broker's acknowledgement.
pub const MQTT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Output token meaning "standard output".
pub const STDOUT_TOKEN: &str = "-";

// # Limits

pub const MINIMUM_SEA_LEVEL_HPA: f64 = 300.0;
pub const MAXIMUM_SEA_LEVEL_HPA: f64 = 1200.0;
pub const MINIMUM_INTERVAL_SECS: u64 = 1;
pub const MAXIMUM_INTERVAL_SECS: u64 = 3600;

// # Control plane timing

/// How long the controller blocks waiting for a signal before re-checking the sampler.
pub const CONTROL_WAIT_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a detaching parent waits for the child's readiness marker.
pub const BACKGROUND_READY_TIMEOUT: Duration = Duration::from_secs(20);

/// Poll step used by every bounded wait on another process.
pub const PROCESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long `-k shutdown` waits for the instance to exit.
pub const SHUTDOWN_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

// # Exit codes

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
/// A control verb was addressed to no live instance.
pub const EXIT_NOT_RUNNING: i32 = 1;
/// Reported by `-k check`, which never contacts the running process.
pub const EXIT_CHECK_ALIVE: i32 = 0;
/// The detached child never reported readiness.
pub const EXIT_HANDSHAKE_TIMEOUT: i32 = 255;

/// Internal marker passed to the re-executed background child.
pub const CHILD_FLAG: &str = "--child";
