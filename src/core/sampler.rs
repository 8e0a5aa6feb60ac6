//! The sampling loop.
//!
//! Runs on its own thread and is the only code touching the sensor bus, the
//! output sink and the publisher. Each cycle:
//!
//! 1. reopens a file sink whose file has gone away
//! 2. reads every sensor; a failed read skips the rest of this cycle only
//! 3. renders the snapshot and writes it to the sink; a closed standard
//!    output stops the loop
//! 4. publishes each metric, then makes one reconnect attempt if unhealthy
//! 5. sleeps for the interval in short ticks, watching the stop flag

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::common::constants::SAMPLING_TICK;
use crate::output::{self, OutputFormat, OutputSink};
use crate::publish::Publisher;
use crate::sensors::SensorSuite;

/// How one cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Written,
    /// The sensors failed; nothing was rendered or published.
    SensorFailed,
    /// The snapshot was read but could not be written.
    OutputFailed,
    /// The output can never be written again; the loop stops.
    OutputClosed,
}

pub struct Sampler {
    sensors: Box<dyn SensorSuite>,
    sink: OutputSink,
    publisher: Option<Publisher>,
    format: OutputFormat,
    interval: Duration,
    tick: Duration,
    running: Arc<AtomicBool>,
}

impl Sampler {
    pub fn new(
        sensors: Box<dyn SensorSuite>,
        sink: OutputSink,
        publisher: Option<Publisher>,
        format: OutputFormat,
        interval: Duration,
    ) -> Self {
        Self {
            sensors,
            sink,
            publisher,
            format,
            interval,
            tick: SAMPLING_TICK,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Override the sleep granularity.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    /// Shared flag; storing `false` stops the loop within one tick.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run one cycle without the trailing sleep.
    pub fn run_once(&mut self) -> CycleOutcome {
        if self.sink.is_file_backed() && !self.sink.is_healthy() {
            log_decorated!("Output {} is gone, reopening", self.sink.destination());
            if let Err(e) = self.sink.reopen() {
                log_warning!("{e}");
            }
        }

        let snapshot = match self.sensors.read_all() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log_error!("Sensor read failed: {e}");
                log_indented!("Skipping this cycle");
                return CycleOutcome::SensorFailed;
            }
        };
        log_trace!(
            "Read {:.2} 'C, {:.2} %, {:.2} hPa",
            snapshot.temperature,
            snapshot.humidity,
            snapshot.pressure
        );

        let outcome = match output::render(self.format, &snapshot) {
            Ok(bytes) => match self.sink.write(&bytes) {
                Ok(()) => CycleOutcome::Written,
                Err(e) if e.is_terminal() => {
                    log_block_start!("Output closed ({e}), stopping");
                    self.running.store(false, Ordering::SeqCst);
                    return CycleOutcome::OutputClosed;
                }
                Err(e) => {
                    log_error!("{e}");
                    CycleOutcome::OutputFailed
                }
            },
            Err(e) => {
                log_error!("Failed to render readings: {e}");
                CycleOutcome::OutputFailed
            }
        };

        if let Some(publisher) = self.publisher.as_mut() {
            publisher.publish_snapshot(&snapshot);
            publisher.maintain();
        }

        outcome
    }

    /// Loop until the stop flag clears; hands the sink back for closing.
    pub fn run(mut self) -> OutputSink {
        log_debug!(
            "Sampling every {}s to {}",
            self.interval.as_secs(),
            self.sink.destination()
        );

        while self.running.load(Ordering::SeqCst) {
            self.run_once();
            self.sleep_interval();
        }

        log_debug!("Sampling loop stopped");
        self.sink
    }

    /// Start [`Sampler::run`] on a named thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<OutputSink>> {
        std::thread::Builder::new()
            .name("sampler".into())
            .spawn(move || self.run())
    }

    fn sleep_interval(&self) {
        let mut remaining = self.interval;
        while !remaining.is_zero() && self.running.load(Ordering::SeqCst) {
            let step = remaining.min(self.tick);
            std::thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
    }
}
