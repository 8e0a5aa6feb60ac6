//! Scripted sensor suite for exercising the sampling loop without hardware.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Local;

use super::{RawReadings, ReadingSnapshot, SensorError, SensorSuite};
use crate::common::constants::DEFAULT_SEA_LEVEL_HPA;

/// Replays queued results, then keeps returning `steady`.
pub struct FakeSensors {
    script: VecDeque<Result<RawReadings, SensorError>>,
    steady: RawReadings,
    sea_level_hpa: f64,
    reads: Arc<AtomicUsize>,
}

impl FakeSensors {
    pub fn steady(raw: RawReadings) -> Self {
        Self {
            script: VecDeque::new(),
            steady: raw,
            sea_level_hpa: DEFAULT_SEA_LEVEL_HPA,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue results returned before the steady readings.
    pub fn with_script(
        mut self,
        script: impl IntoIterator<Item = Result<RawReadings, SensorError>>,
    ) -> Self {
        self.script.extend(script);
        self
    }

    /// Counter of `read_all` calls, shared with the caller.
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reads)
    }
}

impl SensorSuite for FakeSensors {
    fn read_all(&mut self) -> Result<ReadingSnapshot, SensorError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let raw = self.script.pop_front().unwrap_or(Ok(self.steady))?;
        Ok(ReadingSnapshot::from_raw(&raw, self.sea_level_hpa, Local::now()))
    }
}
