//! Sensor access: raw register encodings in, physical units out.
//!
//! The sampling loop only sees [`SensorSuite::read_all`]. The board adapter
//! combines one burst read of the BME280 with three reads of the SI1132 and
//! converts the fixed-point values:
//!
//! | Quantity | Raw encoding | Unit |
//! | --- | --- | --- |
//! | temperature | hundredths of a degree | °C |
//! | humidity | 1/1024ths of a percent | %RH |
//! | pressure | hundredths of a hPa | hPa |
//! | UV index | index x 100 | - |
//! | visible / IR | already lux | lux |
//!
//! Altitude is derived from pressure with the barometric formula against a
//! configured sea-level reference.

pub mod bme280;
pub mod si1132;
#[cfg(any(test, feature = "testing-support"))]
pub mod testing;

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Local};
use embedded_hal::i2c::{ErrorKind, I2c};

use bme280::Bme280;
use si1132::Si1132;

/// Failure talking to one of the chips.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorError {
    /// The bus device could not be opened.
    Open { device: String, reason: String },
    /// A transaction failed on the bus.
    Bus { chip: &'static str, kind: ErrorKind },
    /// Something else answered at the chip's address.
    ChipId {
        chip: &'static str,
        expected: u8,
        found: u8,
    },
}

impl SensorError {
    pub(crate) fn bus<E: embedded_hal::i2c::Error>(chip: &'static str, error: E) -> Self {
        SensorError::Bus {
            chip,
            kind: error.kind(),
        }
    }
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::Open { device, reason } => {
                write!(f, "failed to open bus device {device}: {reason}")
            }
            SensorError::Bus { chip, kind } => write!(f, "{chip} bus transaction failed: {kind:?}"),
            SensorError::ChipId {
                chip,
                expected,
                found,
            } => write!(
                f,
                "{chip} not detected (expected id {expected:#04x}, found {found:#04x})"
            ),
        }
    }
}

impl std::error::Error for SensorError {}

/// Values exactly as the drivers report them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReadings {
    /// Hundredths of a hPa.
    pub pressure: u32,
    /// Hundredths of a degree Celsius.
    pub temperature: i32,
    /// 1/1024ths of a percent.
    pub humidity: u32,
    /// UV index x 100.
    pub uv: u16,
    /// Lux.
    pub visible: f64,
    /// Lux.
    pub ir: f64,
}

pub fn temperature_celsius(raw: i32) -> f64 {
    f64::from(raw) / 100.0
}

pub fn humidity_percent(raw: u32) -> f64 {
    f64::from(raw) / 1024.0
}

pub fn pressure_hpa(raw: u32) -> f64 {
    f64::from(raw) / 100.0
}

pub fn uv_index(raw: u16) -> f64 {
    f64::from(raw) / 100.0
}

/// Altitude in metres for `pressure_hpa` against `sea_level_hpa`.
///
/// International barometric formula; strictly decreasing in pressure.
pub fn altitude_m(pressure_hpa: f64, sea_level_hpa: f64) -> f64 {
    44330.0 * (1.0 - (pressure_hpa / sea_level_hpa).powf(0.1903))
}

/// One complete set of readings captured in a single cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingSnapshot {
    /// °C
    pub temperature: f64,
    /// %RH
    pub humidity: f64,
    /// hPa
    pub pressure: f64,
    /// m
    pub altitude: f64,
    pub uv_index: f64,
    /// lux
    pub visible: f64,
    /// lux
    pub ir: f64,
    pub captured_at: DateTime<Local>,
}

impl ReadingSnapshot {
    pub fn from_raw(raw: &RawReadings, sea_level_hpa: f64, captured_at: DateTime<Local>) -> Self {
        let pressure = pressure_hpa(raw.pressure);
        Self {
            temperature: temperature_celsius(raw.temperature),
            humidity: humidity_percent(raw.humidity),
            pressure,
            altitude: altitude_m(pressure, sea_level_hpa),
            uv_index: uv_index(raw.uv),
            visible: raw.visible,
            ir: raw.ir,
            captured_at,
        }
    }
}

/// Source of complete snapshots; only the sampling loop calls it.
pub trait SensorSuite: Send {
    /// Read every sensor once.
    ///
    /// Either all values come from this read or an error is returned; a failed
    /// read never yields a partial or stale snapshot.
    fn read_all(&mut self) -> Result<ReadingSnapshot, SensorError>;
}

/// The weather board: BME280 and SI1132 sharing one bus.
pub struct WeatherBoard<A, B> {
    environment: Bme280<A>,
    light: Si1132<B>,
    sea_level_hpa: f64,
}

impl<A: I2c, B: I2c> WeatherBoard<A, B> {
    pub fn new(environment: Bme280<A>, light: Si1132<B>, sea_level_hpa: f64) -> Self {
        Self {
            environment,
            light,
            sea_level_hpa,
        }
    }

    /// Read raw values: one combined BME280 read, then UV, visible and IR.
    pub fn read_raw(&mut self) -> Result<RawReadings, SensorError> {
        let env = self.environment.read_pressure_temperature_humidity()?;
        let uv = self.light.read_uv()?;
        let visible = self.light.read_visible()?;
        let ir = self.light.read_ir()?;

        Ok(RawReadings {
            pressure: env.pressure,
            temperature: env.temperature,
            humidity: env.humidity,
            uv,
            visible,
            ir,
        })
    }
}

impl<A, B> SensorSuite for WeatherBoard<A, B>
where
    A: I2c + Send,
    B: I2c + Send,
{
    fn read_all(&mut self) -> Result<ReadingSnapshot, SensorError> {
        let raw = self.read_raw()?;
        Ok(ReadingSnapshot::from_raw(
            &raw,
            self.sea_level_hpa,
            Local::now(),
        ))
    }
}

/// Open both chips on the Linux bus device at `device`.
pub fn open_board(
    device: &Path,
    sea_level_hpa: f64,
) -> Result<Box<dyn SensorSuite>, SensorError> {
    use linux_embedded_hal::I2cdev;

    let open = |device: &Path| {
        I2cdev::new(device).map_err(|e| SensorError::Open {
            device: device.display().to_string(),
            reason: e.to_string(),
        })
    };

    let light = Si1132::new(open(device)?)?;
    let environment = Bme280::new(open(device)?)?;

    Ok(Box::new(WeatherBoard::new(environment, light, sea_level_hpa)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawReadings {
        RawReadings {
            pressure: 101325,
            temperature: 2500,
            humidity: 51200,
            uv: 450,
            visible: 1200.0,
            ir: 800.0,
        }
    }

    #[test]
    fn test_converts_fixed_point_encodings() {
        assert_eq!(temperature_celsius(2500), 25.0);
        assert_eq!(temperature_celsius(-1234), -12.34);
        assert_eq!(humidity_percent(51200), 50.0);
        assert_eq!(pressure_hpa(101325), 1013.25);
        assert_eq!(uv_index(450), 4.5);
    }

    #[test]
    fn test_altitude_is_zero_at_reference_pressure() {
        assert_eq!(altitude_m(1024.25, 1024.25), 0.0);
        assert!(altitude_m(900.0, 1013.25) > 0.0);
        assert!(altitude_m(1030.0, 1013.25) < 0.0);
    }

    #[test]
    fn test_snapshot_carries_converted_values() {
        let at = Local::now();
        let snapshot = ReadingSnapshot::from_raw(&raw(), 1024.25, at);
        assert_eq!(snapshot.temperature, 25.0);
        assert_eq!(snapshot.humidity, 50.0);
        assert_eq!(snapshot.pressure, 1013.25);
        assert_eq!(snapshot.uv_index, 4.5);
        assert_eq!(snapshot.visible, 1200.0);
        assert_eq!(snapshot.ir, 800.0);
        assert_eq!(snapshot.altitude, altitude_m(1013.25, 1024.25));
        assert_eq!(snapshot.captured_at, at);
    }

    #[test]
    fn test_errors_render_chip_and_cause() {
        let err = SensorError::ChipId {
            chip: "bme280",
            expected: 0x60,
            found: 0x58,
        };
        assert_eq!(
            err.to_string(),
            "bme280 not detected (expected id 0x60, found 0x58)"
        );
    }
}
