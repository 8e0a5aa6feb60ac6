//! Rendering of one [`ReadingSnapshot`] as a text block or a JSON record.

use std::io::{self, Write};

use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use serde::{Serialize, Serializer};
use serde_json::value::RawValue;

use super::OutputFormat;
use crate::sensors::ReadingSnapshot;

const BRAND: &str = "ODROID";
const MODEL: &str = "WB2";
const DEVICE_ID: u32 = 0;
const CHANNEL: u32 = 1;
const BATTERY: &str = "OK";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render `snapshot` in `format`.
pub fn render(format: OutputFormat, snapshot: &ReadingSnapshot) -> io::Result<Vec<u8>> {
    match format {
        OutputFormat::Text => render_text(snapshot),
        OutputFormat::Json => render_structured(snapshot),
    }
}

/// Multi-line block for a terminal.
///
/// The first block starts with a home + clear-screen sequence and every line ends
/// with clear-to-end-of-line, so consecutive blocks overwrite each other in place.
pub fn render_text(snapshot: &ReadingSnapshot) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(256);
    queue!(out, MoveTo(0, 0), Clear(ClearType::All))?;

    line(&mut out, "======== si1132 ========")?;
    line(&mut out, &format!("UV_index : {:.2}", snapshot.uv_index))?;
    line(&mut out, &format!("Visible : {:.0} Lux", snapshot.visible))?;
    line(&mut out, &format!("IR : {:.0} Lux", snapshot.ir))?;
    line(&mut out, "======== bme280 ========")?;
    line(&mut out, &format!("temperature : {:.2} 'C", snapshot.temperature))?;
    line(&mut out, &format!("humidity : {:.2} %", snapshot.humidity))?;
    line(&mut out, &format!("pressure : {:.2} hPa", snapshot.pressure))?;
    line(&mut out, &format!("altitude : {:.2} m", snapshot.altitude))?;

    Ok(out)
}

fn line(out: &mut Vec<u8>, text: &str) -> io::Result<()> {
    out.write_all(text.as_bytes())?;
    queue!(out, Clear(ClearType::UntilNewLine))?;
    out.write_all(b"\n")
}

/// Number rendered with a fixed count of decimals, `null` when not finite.
struct Fixed<const DECIMALS: usize>(f64);

impl<const DECIMALS: usize> Serialize for Fixed<DECIMALS> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if !self.0.is_finite() {
            return serializer.serialize_none();
        }
        let raw = RawValue::from_string(format!("{:.*}", DECIMALS, self.0))
            .map_err(<S::Error as serde::ser::Error>::custom)?;
        raw.serialize(serializer)
    }
}

#[derive(Serialize)]
struct Record {
    time: String,
    brand: &'static str,
    model: &'static str,
    id: u32,
    channel: u32,
    battery: &'static str,
    #[serde(rename = "temperature_C")]
    temperature_c: Fixed<2>,
    humidity: Fixed<2>,
    pressure: Fixed<2>,
    altitude: Fixed<2>,
    uv_index: Fixed<2>,
    visible: Fixed<0>,
    ir: Fixed<0>,
}

impl Record {
    fn new(snapshot: &ReadingSnapshot) -> Self {
        Self {
            time: snapshot.captured_at.format(TIME_FORMAT).to_string(),
            brand: BRAND,
            model: MODEL,
            id: DEVICE_ID,
            channel: CHANNEL,
            battery: BATTERY,
            temperature_c: Fixed(snapshot.temperature),
            humidity: Fixed(snapshot.humidity),
            pressure: Fixed(snapshot.pressure),
            altitude: Fixed(snapshot.altitude),
            uv_index: Fixed(snapshot.uv_index),
            visible: Fixed(snapshot.visible),
            ir: Fixed(snapshot.ir),
        }
    }
}

/// One self-contained, newline-terminated JSON record.
pub fn render_structured(snapshot: &ReadingSnapshot) -> io::Result<Vec<u8>> {
    let mut out = serde_json::to_vec(&Record::new(snapshot))?;
    out.push(b'\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn snapshot() -> ReadingSnapshot {
        ReadingSnapshot {
            temperature: 25.0,
            humidity: 50.0,
            pressure: 1013.25,
            altitude: 92.4567,
            uv_index: 4.5,
            visible: 1200.0,
            ir: 800.0,
            captured_at: Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 3).unwrap(),
        }
    }

    #[test]
    fn test_structured_record_has_fixed_field_order_and_precision() {
        let out = String::from_utf8(render_structured(&snapshot()).unwrap()).unwrap();
        assert_eq!(
            out,
            "{\"time\":\"2024-03-09 07:05:03\",\"brand\":\"ODROID\",\"model\":\"WB2\",\
             \"id\":0,\"channel\":1,\"battery\":\"OK\",\"temperature_C\":25.00,\
             \"humidity\":50.00,\"pressure\":1013.25,\"altitude\":92.46,\
             \"uv_index\":4.50,\"visible\":1200,\"ir\":800}\n"
        );
    }

    #[test]
    fn test_structured_record_is_valid_json() {
        let out = render_structured(&snapshot()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["temperature_C"].as_f64(), Some(25.0));
        assert_eq!(value["visible"].as_u64(), Some(1200));
    }

    #[test]
    fn test_non_finite_values_become_null() {
        let mut s = snapshot();
        s.altitude = f64::NAN;
        let out = render_structured(&s).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert!(value["altitude"].is_null());
    }

    #[test]
    fn test_text_block_clears_screen_once_and_every_line_end() {
        let out = String::from_utf8(render_text(&snapshot()).unwrap()).unwrap();

        assert_eq!(out.matches("\x1b[2J").count(), 1);
        assert!(out.find("\x1b[2J").unwrap() < out.find("si1132").unwrap());
        assert_eq!(out.lines().count(), 9);
        assert!(out.lines().all(|l| l.ends_with("\x1b[K")));
        assert!(out.contains("UV_index : 4.50\x1b[K"));
        assert!(out.contains("Visible : 1200 Lux\x1b[K"));
        assert!(out.contains("temperature : 25.00 'C\x1b[K"));
        assert!(out.contains("altitude : 92.46 m\x1b[K"));
    }

    #[test]
    fn test_rendering_is_idempotent() {
        let s = snapshot();
        for format in [OutputFormat::Text, OutputFormat::Json] {
            assert_eq!(render(format, &s).unwrap(), render(format, &s).unwrap());
        }
    }
}
