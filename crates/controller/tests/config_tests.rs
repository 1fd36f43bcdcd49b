//! Integration tests for configuration parsing
//!
//! Tests controller configuration parsing, including:
//! - Minimal and full config files
//! - Defaults for omitted sections
//! - Save/load through a file
//! - Invalid configuration handling

use controller::config::ControllerConfig;
use std::time::Duration;
use tempfile::tempdir;

const MINIMAL_CONFIG: &str = r#"
[controller]
log_level = "info"
auto_connect = false
device_index = 0
"#;

const FULL_CONFIG: &str = r#"
[controller]
log_level = "debug"
auto_connect = true
device_index = 1
roster_path = "/etc/msa-usb/roster.toml"

[usb]
filters = ["0x0547:0x1015", "0x0547:*"]
interface = 0
out_endpoint = 0x02
in_endpoint = 0x86
timeout_ms = 250

[timing]
write_read_delay_us = 400
stop_timeout_ms = 2000

[scan]
adc_averaging = 8
inverted = true
"#;

mod parsing {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ControllerConfig::parse(MINIMAL_CONFIG).unwrap();

        assert!(!config.controller.auto_connect);
        assert_eq!(config.usb.filters, vec!["0x0547:0x1015".to_string()]);
        assert_eq!(config.timing.write_read_delay_us, 100);
        assert_eq!(config.timing.stop_timeout_ms, 1000);
        assert_eq!(config.scan.adc_averaging, 0);
        assert!(!config.scan.inverted);
        assert!(config.controller.roster_path().is_none());
    }

    #[test]
    fn test_full_config() {
        let config = ControllerConfig::parse(FULL_CONFIG).unwrap();

        assert_eq!(config.controller.log_level, "debug");
        assert_eq!(config.controller.device_index, 1);
        assert_eq!(
            config.controller.roster_path().unwrap().to_str(),
            Some("/etc/msa-usb/roster.toml")
        );

        let usb = config.usb.settings();
        assert_eq!(usb.filters.len(), 2);
        assert_eq!(usb.in_endpoint, 0x86);
        assert_eq!(usb.timeout, Duration::from_millis(250));

        let timing = config.timing.timing();
        assert_eq!(timing.write_read_delay, Duration::from_micros(400));
        assert_eq!(timing.stop_timeout, Duration::from_secs(2));

        let definition = config.scan.definition(50);
        assert_eq!(definition.number_of_steps, 50);
        assert_eq!(definition.adc_averaging, 8);
        assert!(definition.inverted);
    }

    #[test]
    fn test_empty_config_is_default() {
        let config = ControllerConfig::parse("").unwrap();
        assert_eq!(config.controller.log_level, "info");
        assert!(config.controller.auto_connect);
    }
}

mod invalid {
    use super::*;

    #[test]
    fn test_bad_log_level() {
        let text = MINIMAL_CONFIG.replace("\"info\"", "\"loud\"");
        let err = ControllerConfig::parse(&text).unwrap_err();
        assert!(err.to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_bad_filter() {
        let text = FULL_CONFIG.replace("\"0x0547:*\"", "\"0547\"");
        assert!(ControllerConfig::parse(&text).is_err());
    }

    #[test]
    fn test_zero_timeout() {
        let text = FULL_CONFIG.replace("timeout_ms = 250", "timeout_ms = 0");
        assert!(ControllerConfig::parse(&text).is_err());
    }

    #[test]
    fn test_swapped_endpoints() {
        let text = FULL_CONFIG
            .replace("out_endpoint = 0x02", "out_endpoint = 0x86")
            .replace("in_endpoint = 0x86", "in_endpoint = 0x02");
        assert!(ControllerConfig::parse(&text).is_err());
    }

    #[test]
    fn test_malformed_toml() {
        assert!(ControllerConfig::parse("[controller").is_err());
    }
}

mod files {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("controller.toml");

        let mut config = ControllerConfig::parse(FULL_CONFIG).unwrap();
        config.timing.write_read_delay_us = 321;
        config.save(&path).unwrap();

        let loaded = ControllerConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.timing.write_read_delay_us, 321);
        assert_eq!(loaded.usb.filters, config.usb.filters);
        assert_eq!(loaded.scan.adc_averaging, 8);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempdir().unwrap();
        let result = ControllerConfig::load(Some(dir.path().join("missing.toml")));
        assert!(result.is_err());
    }
}
