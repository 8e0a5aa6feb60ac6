use proptest::prelude::*;
use weatherboard::common::constants::{MAXIMUM_SEA_LEVEL_HPA, MINIMUM_SEA_LEVEL_HPA};
use weatherboard::output::{OutputFormat, render};
use weatherboard::sensors::{
    RawReadings, ReadingSnapshot, altitude_m, humidity_percent, pressure_hpa, temperature_celsius,
    uv_index,
};

/// Pressures a surface station can plausibly report, in hPa.
fn pressure_strategy() -> impl Strategy<Value = f64> {
    300.0..1100.0
}

fn sea_level_strategy() -> impl Strategy<Value = f64> {
    MINIMUM_SEA_LEVEL_HPA..=MAXIMUM_SEA_LEVEL_HPA
}

fn raw_strategy() -> impl Strategy<Value = RawReadings> {
    (
        30_000u32..110_000,
        -4_000i32..8_500,
        0u32..102_400,
        0u16..1_500,
        0.0f64..60_000.0,
        0.0f64..60_000.0,
    )
        .prop_map(|(pressure, temperature, humidity, uv, visible, ir)| RawReadings {
            pressure,
            temperature,
            humidity,
            uv,
            visible,
            ir,
        })
}

proptest! {
    /// Lower pressure always means higher altitude.
    #[test]
    fn test_altitude_decreases_with_pressure(
        low in pressure_strategy(),
        delta in 0.01f64..200.0,
        sea_level in sea_level_strategy(),
    ) {
        let high = low + delta;
        prop_assert!(altitude_m(low, sea_level) > altitude_m(high, sea_level));
    }

    /// Altitude is zero exactly at the reference pressure and its sign
    /// follows which side of the reference the reading falls on.
    #[test]
    fn test_altitude_sign_follows_reference(
        pressure in pressure_strategy(),
        sea_level in sea_level_strategy(),
    ) {
        prop_assert_eq!(altitude_m(sea_level, sea_level), 0.0);
        let altitude = altitude_m(pressure, sea_level);
        if pressure < sea_level {
            prop_assert!(altitude > 0.0);
        } else if pressure > sea_level {
            prop_assert!(altitude < 0.0);
        }
    }

    /// Fixed-point conversions are plain divisions of the raw encodings.
    #[test]
    fn test_conversions_scale_raw_values(raw in raw_strategy()) {
        prop_assert!((temperature_celsius(raw.temperature) * 100.0 - f64::from(raw.temperature)).abs() < 1e-9);
        prop_assert!((humidity_percent(raw.humidity) * 1024.0 - f64::from(raw.humidity)).abs() < 1e-9);
        prop_assert!((pressure_hpa(raw.pressure) * 100.0 - f64::from(raw.pressure)).abs() < 1e-9);
        prop_assert!((uv_index(raw.uv) * 100.0 - f64::from(raw.uv)).abs() < 1e-9);
    }

    /// Every snapshot of plausible readings renders to one valid JSON line.
    #[test]
    fn test_every_snapshot_renders_one_json_line(
        raw in raw_strategy(),
        sea_level in sea_level_strategy(),
    ) {
        let snapshot = ReadingSnapshot::from_raw(&raw, sea_level, chrono::Local::now());
        let out = render(OutputFormat::Json, &snapshot).unwrap();

        prop_assert_eq!(out.iter().filter(|&&b| b == b'\n').count(), 1);
        prop_assert_eq!(out.last(), Some(&b'\n'));
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        prop_assert!(value["temperature_C"].is_number());
        prop_assert!(value["altitude"].is_number());
    }
}
