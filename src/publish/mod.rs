//! Optional publishing of each metric to a broker.
//!
//! The [`Publisher`] keeps a health flag for its transport. The first failed
//! publish marks the connection unhealthy and suppresses every further publish
//! until a reconnect succeeds. The sampling loop calls
//! [`Publisher::maintain`] once per cycle, which makes at most one reconnect
//! attempt, so an unreachable broker sees one attempt per sampling interval.

pub mod mqtt;

use std::fmt;

use crate::sensors::ReadingSnapshot;

/// Failure reported by a [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub enum PublishError {
    /// The link to the broker is down.
    NotConnected,
    /// The client refused the request.
    Rejected(String),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::NotConnected => f.write_str("not connected to broker"),
            PublishError::Rejected(reason) => write!(f, "publish rejected: {reason}"),
        }
    }
}

impl std::error::Error for PublishError {}

/// Broker session primitives the publisher is built on.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError>;

    /// Tear the session down and establish a new one.
    fn reconnect(&mut self) -> Result<(), PublishError>;

    /// Human-readable broker address for log lines.
    fn endpoint(&self) -> String;
}

/// Metric names in publish order; topics are `<location>/weather/<metric>`.
pub const METRICS: [&str; 7] = [
    "temperature",
    "humidity",
    "pressure",
    "altitude",
    "uv_index",
    "visible",
    "ir",
];

fn metric_values(snapshot: &ReadingSnapshot) -> [f64; 7] {
    [
        snapshot.temperature,
        snapshot.humidity,
        snapshot.pressure,
        snapshot.altitude,
        snapshot.uv_index,
        snapshot.visible,
        snapshot.ir,
    ]
}

/// Publishes snapshots metric by metric and tracks connection health.
pub struct Publisher {
    transport: Box<dyn Transport>,
    location: String,
    healthy: bool,
}

impl Publisher {
    pub fn new(transport: Box<dyn Transport>, location: impl Into<String>) -> Self {
        Self {
            transport,
            location: location.into(),
            healthy: true,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub fn topic(&self, metric: &str) -> String {
        format!("{}/weather/{metric}", self.location)
    }

    /// Publish one value as two-decimal text. Does nothing while unhealthy.
    pub fn publish(&mut self, metric: &str, value: f64) {
        if !self.healthy {
            return;
        }

        let topic = self.topic(metric);
        let payload = format!("{value:.2}");
        match self.transport.publish(&topic, &payload) {
            Ok(()) => log_trace!("Published {topic} = {payload}"),
            Err(e) => {
                self.healthy = false;
                log_pipe!();
                log_error!("Publishing to {} failed: {e}", self.transport.endpoint());
                log_indented!("Suppressing publishes until the broker is reachable again");
            }
        }
    }

    /// Publish every metric of `snapshot`, one call per metric.
    pub fn publish_snapshot(&mut self, snapshot: &ReadingSnapshot) {
        for (metric, value) in METRICS.iter().zip(metric_values(snapshot)) {
            self.publish(metric, value);
        }
    }

    /// Make exactly one reconnect attempt if the connection is unhealthy.
    pub fn maintain(&mut self) {
        if self.healthy {
            return;
        }

        match self.transport.reconnect() {
            Ok(()) => {
                self.healthy = true;
                log_pipe!();
                log_info!("Reconnected to {}", self.transport.endpoint());
            }
            Err(e) => {
                log_debug!("Reconnect to {} failed: {e}", self.transport.endpoint());
            }
        }
    }
}
