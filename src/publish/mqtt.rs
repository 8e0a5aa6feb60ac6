//! MQTT transport on the synchronous rumqttc client.
//!
//! The rumqttc event loop only makes progress while its `Connection` is being
//! iterated, so each session owns a driver thread that iterates it. The first
//! connection error clears the shared link flag and ends that thread; the
//! session is then dead until [`Transport::reconnect`] builds a new one, which
//! only counts as reconnected once the broker acknowledges it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};

use super::{PublishError, Transport};
use crate::common::constants::{MQTT_CONNECT_TIMEOUT, MQTT_KEEP_ALIVE, PROCESS_POLL_INTERVAL};

/// Requests buffered between the publisher and the event loop.
const REQUEST_CAPACITY: usize = 10;

struct Session {
    client: Client,
    link_up: Arc<AtomicBool>,
    established: Arc<AtomicBool>,
    driver: Option<JoinHandle<()>>,
}

impl Session {
    fn start(options: MqttOptions) -> Result<Self, PublishError> {
        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        // Optimistic until the event loop reports otherwise
        let link_up = Arc::new(AtomicBool::new(true));
        let established = Arc::new(AtomicBool::new(false));

        let flags = (Arc::clone(&link_up), Arc::clone(&established));
        let driver = std::thread::Builder::new()
            .name("mqtt-driver".into())
            .spawn(move || drive(connection, flags.0, flags.1))
            .map_err(|e| PublishError::Rejected(format!("failed to spawn mqtt driver: {e}")))?;

        Ok(Self {
            client,
            link_up,
            established,
            driver: Some(driver),
        })
    }

    fn is_up(&self) -> bool {
        self.link_up.load(Ordering::SeqCst)
    }

    /// Block until the broker acknowledges the session, the link fails or
    /// `timeout` passes.
    fn await_established(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.established.load(Ordering::SeqCst) {
                return true;
            }
            if !self.is_up() {
                return false;
            }
            std::thread::sleep(PROCESS_POLL_INTERVAL);
        }
        self.established.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        let _ = self.client.try_disconnect();
        self.link_up.store(false, Ordering::SeqCst);
        if let Some(driver) = self.driver.take() {
            // The driver exits once the disconnect is processed or the link fails
            if driver.is_finished() {
                let _ = driver.join();
            }
        }
    }
}

fn drive(mut connection: Connection, link_up: Arc<AtomicBool>, established: Arc<AtomicBool>) {
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                link_up.store(true, Ordering::SeqCst);
                established.store(true, Ordering::SeqCst);
                log_debug!("MQTT session established");
            }
            Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                link_up.store(false, Ordering::SeqCst);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                link_up.store(false, Ordering::SeqCst);
                log_debug!("MQTT connection lost: {e}");
                break;
            }
        }
    }
}

/// Broker connection publishing at QoS 0 without retain.
pub struct MqttTransport {
    host: String,
    port: u16,
    client_id: String,
    session: Session,
}

impl MqttTransport {
    /// Start a session with the broker at `host:port`.
    ///
    /// The handshake happens on the driver thread, so an unreachable broker
    /// shows up as a failure of the first publish rather than here.
    pub fn connect(host: &str, port: u16, client_id: &str) -> Result<Self, PublishError> {
        let session = Session::start(options(client_id, host, port))?;
        Ok(Self {
            host: host.to_string(),
            port,
            client_id: client_id.to_string(),
            session,
        })
    }
}

fn options(client_id: &str, host: &str, port: u16) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, host, port);
    options.set_keep_alive(MQTT_KEEP_ALIVE);
    options.set_clean_session(true);
    options
}

impl Transport for MqttTransport {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError> {
        if !self.session.is_up() {
            return Err(PublishError::NotConnected);
        }
        self.session
            .client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .map_err(|e| PublishError::Rejected(e.to_string()))
    }

    fn reconnect(&mut self) -> Result<(), PublishError> {
        self.session.stop();
        self.session = Session::start(options(&self.client_id, &self.host, self.port))?;
        if self.session.await_established(MQTT_CONNECT_TIMEOUT) {
            Ok(())
        } else {
            Err(PublishError::NotConnected)
        }
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.session.stop();
    }
}
