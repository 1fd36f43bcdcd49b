//! Controller configuration management

use crate::instrument::Timing;
use crate::scan::ScanDefinition;
use crate::usb::{DEFAULT_INSTRUMENT_FILTER, UsbSettings};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub controller: ControllerSettings,
    #[serde(default)]
    pub usb: UsbConfig,
    #[serde(default)]
    pub timing: TimingSettings,
    #[serde(default)]
    pub scan: ScanSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSettings {
    pub log_level: String,
    /// Open the instrument at startup and again whenever it re-appears
    pub auto_connect: bool,
    /// Index into the list of matching instruments
    pub device_index: usize,
    /// Device roster file (`~` is expanded)
    #[serde(default)]
    pub roster_path: Option<String>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            auto_connect: true,
            device_index: 0,
            roster_path: None,
        }
    }
}

impl ControllerSettings {
    pub fn roster_path(&self) -> Option<PathBuf> {
        self.roster_path
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbConfig {
    /// Matching devices (VID:PID, `*` wildcards)
    pub filters: Vec<String>,
    pub interface: u8,
    pub out_endpoint: u8,
    pub in_endpoint: u8,
    pub timeout_ms: u64,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            filters: vec![DEFAULT_INSTRUMENT_FILTER.to_string()],
            interface: 0,
            out_endpoint: 0x02,
            in_endpoint: 0x86,
            timeout_ms: 1000,
        }
    }
}

impl UsbConfig {
    pub fn settings(&self) -> UsbSettings {
        UsbSettings {
            filters: self.filters.clone(),
            interface: self.interface,
            out_endpoint: self.out_endpoint,
            in_endpoint: self.in_endpoint,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Pause between a step's write and its ADC read
    #[serde(default = "TimingSettings::default_write_read_delay")]
    pub write_read_delay_us: u64,
    /// Bound on waiting for the stepper to stop
    #[serde(default = "TimingSettings::default_stop_timeout")]
    pub stop_timeout_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            write_read_delay_us: Self::default_write_read_delay(),
            stop_timeout_ms: Self::default_stop_timeout(),
        }
    }
}

impl TimingSettings {
    fn default_write_read_delay() -> u64 {
        100
    }

    fn default_stop_timeout() -> u64 {
        1000
    }

    pub fn timing(&self) -> Timing {
        Timing {
            write_read_delay: Duration::from_micros(self.write_read_delay_us),
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Averaging count sent with every ADC trigger
    #[serde(default)]
    pub adc_averaging: u8,
    #[serde(default)]
    pub inverted: bool,
}

impl ScanSettings {
    pub fn definition(&self, number_of_steps: u32) -> ScanDefinition {
        ScanDefinition {
            number_of_steps,
            inverted: self.inverted,
            adc_averaging: self.adc_averaging,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/msa-usb/controller.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate TOML configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: ControllerConfig =
            toml::from_str(content).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("msa-usb").join("controller.toml")
        } else {
            PathBuf::from(".config/msa-usb/controller.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.controller.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.controller.log_level,
                valid_levels.join(", ")
            ));
        }

        for filter in &self.usb.filters {
            Self::validate_filter(filter)?;
        }

        if self.usb.out_endpoint & 0x80 != 0 {
            return Err(anyhow!(
                "out_endpoint {:#04x} is an IN endpoint",
                self.usb.out_endpoint
            ));
        }
        if self.usb.in_endpoint & 0x80 == 0 {
            return Err(anyhow!(
                "in_endpoint {:#04x} is an OUT endpoint",
                self.usb.in_endpoint
            ));
        }
        if self.usb.timeout_ms == 0 {
            return Err(anyhow!("usb.timeout_ms must be greater than 0"));
        }
        if self.timing.stop_timeout_ms == 0 {
            return Err(anyhow!("timing.stop_timeout_ms must be greater than 0"));
        }

        Ok(())
    }

    /// Validate a USB device filter pattern (VID:PID)
    pub fn validate_filter(filter: &str) -> Result<()> {
        let parts: Vec<&str> = filter.split(':').collect();
        if parts.len() != 2 {
            return Err(anyhow!(
                "Invalid filter format '{}', expected VID:PID (e.g., '0x0547:0x1015' or '0x0547:*')",
                filter
            ));
        }

        let (vid, pid) = (parts[0], parts[1]);
        if vid != "*" {
            Self::validate_hex_id(vid, "VID")?;
        }
        if pid != "*" {
            Self::validate_hex_id(pid, "PID")?;
        }

        Ok(())
    }

    /// Validate a hex ID (VID or PID)
    fn validate_hex_id(id: &str, name: &str) -> Result<()> {
        let Some(hex_part) = id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) else {
            return Err(anyhow!(
                "Invalid {} '{}', must start with '0x' (e.g., '0x0547')",
                name,
                id
            ));
        };

        if hex_part.is_empty() || hex_part.len() > 4 {
            return Err(anyhow!(
                "Invalid {} '{}', hex part must be 1-4 digits",
                name,
                id
            ));
        }

        u16::from_str_radix(hex_part, 16)
            .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))?;

        Ok(())
    }
}
