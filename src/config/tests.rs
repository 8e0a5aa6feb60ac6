use super::loading::parse;
use super::*;
use std::fs;
use tempfile::tempdir;

fn cwd() -> PathBuf {
    PathBuf::from("/srv/weather")
}

#[test]
fn test_defaults_when_nothing_is_set() {
    let run = RunConfig::resolve(Config::default(), 0, &cwd()).unwrap();

    assert_eq!(run.device, PathBuf::from(DEFAULT_DEVICE));
    assert_eq!(run.format, OutputFormat::Text);
    assert_eq!(run.destination, Destination::Stdout);
    assert_eq!(run.sea_level_hpa, DEFAULT_SEA_LEVEL_HPA);
    assert_eq!(run.interval, Duration::from_secs(20));
    assert!(run.foreground);
    assert!(run.mqtt.is_none());
}

#[test]
fn test_stdout_output_stays_in_foreground() {
    let structured = Config {
        format: Some(OutputFormat::Json),
        output: Some("-".to_string()),
        ..Default::default()
    };
    let run = RunConfig::resolve(structured, 0, &cwd()).unwrap();
    assert_eq!(run.destination, Destination::Stdout);
    assert!(run.foreground);
}

#[test]
fn test_file_output_detaches_unless_told_otherwise() {
    let to_file = Config {
        output: Some("weather.json".to_string()),
        ..Default::default()
    };
    assert!(!RunConfig::resolve(to_file.clone(), 0, &cwd()).unwrap().foreground);

    let pinned = Config {
        foreground: Some(true),
        ..to_file
    };
    assert!(RunConfig::resolve(pinned, 0, &cwd()).unwrap().foreground);
}

#[test]
fn test_explicit_detach_onto_stdout_is_honoured() {
    let detached = Config {
        foreground: Some(false),
        ..Default::default()
    };
    assert!(!RunConfig::resolve(detached, 0, &cwd()).unwrap().foreground);
}

#[test]
fn test_flag_layer_overrides_file_layer() {
    let file = Config {
        device: Some(PathBuf::from("/dev/i2c-0")),
        format: Some(OutputFormat::Text),
        interval: Some(60),
        ..Default::default()
    };
    let flags = Config {
        format: Some(OutputFormat::Json),
        ..Default::default()
    };

    let merged = file.merge(flags);
    assert_eq!(merged.device, Some(PathBuf::from("/dev/i2c-0")));
    assert_eq!(merged.format, Some(OutputFormat::Json));
    assert_eq!(merged.interval, Some(60));
}

#[test]
fn test_relative_output_is_anchored_at_invocation_dir() {
    let config = Config {
        output: Some("logs/weather.json".into()),
        ..Default::default()
    };
    let run = RunConfig::resolve(config, 0, &cwd()).unwrap();
    assert_eq!(
        run.destination,
        Destination::File(PathBuf::from("/srv/weather/logs/weather.json"))
    );
}

#[test]
fn test_absolute_output_and_dash_are_kept() {
    let absolute = Config {
        output: Some("/var/log/weather.json".into()),
        ..Default::default()
    };
    let run = RunConfig::resolve(absolute, 0, &cwd()).unwrap();
    assert_eq!(
        run.destination,
        Destination::File(PathBuf::from("/var/log/weather.json"))
    );

    let dash = Config {
        output: Some("-".into()),
        ..Default::default()
    };
    let run = RunConfig::resolve(dash, 0, &cwd()).unwrap();
    assert_eq!(run.destination, Destination::Stdout);
}

#[test]
fn test_mqtt_enabled_by_host_with_default_port_and_location() {
    let config = Config {
        mqtt_host: Some("broker.lan".into()),
        ..Default::default()
    };
    let run = RunConfig::resolve(config, 2, &cwd()).unwrap();
    assert_eq!(run.verbosity, 2);
    assert_eq!(
        run.mqtt,
        Some(MqttTarget {
            host: "broker.lan".into(),
            port: DEFAULT_MQTT_PORT,
            location: DEFAULT_MQTT_LOCATION.into(),
        })
    );
}

#[test]
fn test_location_without_host_does_not_enable_publishing() {
    let config = Config {
        mqtt_location: Some("garden".into()),
        ..Default::default()
    };
    let run = RunConfig::resolve(config, 0, &cwd()).unwrap();
    assert!(run.mqtt.is_none());
}

#[test]
fn test_validation_rejects_out_of_range_values() {
    let sea_level = Config {
        sea_level_hpa: Some(1500.0),
        ..Default::default()
    };
    assert_eq!(
        validate_config(&sea_level),
        Err(ConfigError::SeaLevelOutOfRange(1500.0))
    );

    for interval in [0, 3601] {
        let config = Config {
            interval: Some(interval),
            ..Default::default()
        };
        assert_eq!(
            validate_config(&config),
            Err(ConfigError::IntervalOutOfRange(interval))
        );
    }

    let port = Config {
        mqtt_port: Some(0),
        ..Default::default()
    };
    assert_eq!(validate_config(&port), Err(ConfigError::ZeroMqttPort));

    let device = Config {
        device: Some(PathBuf::new()),
        ..Default::default()
    };
    assert_eq!(validate_config(&device), Err(ConfigError::EmptyDevice));
}

#[test]
fn test_validation_boundaries_are_inclusive() {
    let config = Config {
        sea_level_hpa: Some(MINIMUM_SEA_LEVEL_HPA),
        interval: Some(MAXIMUM_INTERVAL_SECS),
        ..Default::default()
    };
    assert!(validate_config(&config).is_ok());
}

#[test]
fn test_wildcard_locations_are_rejected() {
    for location in ["", "home/#", "+/garden"] {
        let config = Config {
            mqtt_location: Some(location.into()),
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidLocation(_))
        ));
    }
}

#[test]
fn test_parse_full_file() {
    let config = parse(
        r#"
        device = "/dev/i2c-0"
        format = "json"
        output = "/tmp/weather.json"
        sea_level_hpa = 1013.25
        interval = 30
        foreground = true
        mqtt_host = "broker.lan"
        mqtt_port = 8883
        mqtt_location = "garden"
        "#,
    )
    .unwrap();

    assert_eq!(config.format, Some(OutputFormat::Json));
    assert_eq!(config.sea_level_hpa, Some(1013.25));
    assert_eq!(config.interval, Some(30));
    assert_eq!(config.foreground, Some(true));
    assert_eq!(config.mqtt_port, Some(8883));
}

#[test]
fn test_parse_rejects_unknown_keys_and_formats() {
    assert!(parse("intervall = 30").is_err());
    assert!(parse("format = \"xml\"").is_err());
}

#[test]
fn test_load_from_path_reports_file_in_errors() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("weather.toml");

    let missing = load_from_path(&path).unwrap_err();
    assert!(format!("{missing:#}").contains("weather.toml"));

    fs::write(&path, "interval = 0\n").unwrap();
    let invalid = load_from_path(&path).unwrap_err();
    assert!(format!("{invalid:#}").contains("interval (0 s)"));

    fs::write(&path, "interval = 5\n").unwrap();
    assert_eq!(load_from_path(&path).unwrap().interval, Some(5));
}
