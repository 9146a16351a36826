use clap::ArgMatches;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::channels::ChannelConfig;
use crate::modbus::client::validate_link_parameters;
use crate::registers::{DataType, RegisterEntry, RegisterMap, WordOrder, MAX_CHANNELS};
use crate::utils::error::AcquisitionError;

pub const DEFAULT_BAUDRATE: u32 = 9600;
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 100;
pub const DEFAULT_CHANNEL_COUNT: usize = 3;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_SINK_QUEUE_CAPACITY: usize = 64;
pub const LOG_DIRECTORY: &str = "logs";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub serial: SerialConfig,
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub registers: Vec<RegisterEntry>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub timeout_ms: u64,
    pub parity: ParityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    Modbus,
    RawSerial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    pub mode: AcquisitionMode,
    pub polling_interval_ms: u64,
    pub failure_threshold: u32,
    pub word_order: WordOrder,
    pub sink_queue_capacity: usize,
    /// Channels expected per line in raw serial mode.
    pub raw_channel_count: usize,
    pub raw_read_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub csv_enabled: bool,
    pub directory: String,
}

impl Default for Config {
    fn default() -> Self {
        let channels = (0..DEFAULT_CHANNEL_COUNT)
            .map(|i| ChannelConfig::new(i, format!("Channel {}", i + 1)))
            .collect();

        let registers = vec![
            RegisterEntry::new(1, 100, DataType::Float32, "Channel 1"),
            RegisterEntry::new(1, 102, DataType::Float32, "Channel 2"),
            RegisterEntry::new(2, 0, DataType::Int16, "Channel 3"),
        ];

        Self {
            serial: SerialConfig {
                port: default_port().to_string(),
                baud_rate: DEFAULT_BAUDRATE,
                timeout_ms: DEFAULT_TIMEOUT_MS,
                parity: ParityConfig::None,
            },
            acquisition: AcquisitionConfig {
                mode: AcquisitionMode::Modbus,
                polling_interval_ms: DEFAULT_POLLING_INTERVAL_MS,
                failure_threshold: DEFAULT_FAILURE_THRESHOLD,
                word_order: WordOrder::HighFirst,
                sink_queue_capacity: DEFAULT_SINK_QUEUE_CAPACITY,
                raw_channel_count: DEFAULT_CHANNEL_COUNT,
                raw_read_bytes: 256,
            },
            channels,
            registers,
            logging: LoggingConfig {
                csv_enabled: true,
                directory: LOG_DIRECTORY.to_string(),
            },
        }
    }
}

fn default_port() -> &'static str {
    if cfg!(target_os = "linux") {
        "/dev/ttyUSB0"
    } else if cfg!(target_os = "windows") {
        "COM1"
    } else if cfg!(target_os = "macos") {
        "/dev/tty.usbserial-0001"
    } else {
        "/dev/ttyS0"
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AcquisitionError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AcquisitionError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)?;
        info!("📄 Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), AcquisitionError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AcquisitionError::Config(format!("Cannot create {}: {}", parent.display(), e)))?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| AcquisitionError::Config(format!("Cannot write {}: {}", path.display(), e)))?;
        Ok(())
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.serial.timeout_ms)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.acquisition.polling_interval_ms)
    }

    /// Applies command line overrides. Arguments a subcommand does not
    /// define are skipped.
    pub fn apply_matches(&mut self, matches: &ArgMatches) -> Result<(), AcquisitionError> {
        if let Some(port) = string_arg(matches, "port") {
            self.serial.port = port.clone();
        }
        if let Some(baud) = string_arg(matches, "baud") {
            self.serial.baud_rate = parse_arg("baud", baud)?;
        }
        if let Some(interval) = string_arg(matches, "interval-ms") {
            self.acquisition.polling_interval_ms = parse_arg("interval-ms", interval)?;
        }
        if let Some(dir) = string_arg(matches, "log-dir") {
            self.logging.directory = dir.clone();
        }
        if matches.try_get_one::<bool>("no-log").ok().flatten() == Some(&true) {
            self.logging.csv_enabled = false;
        }
        Ok(())
    }

    /// Checks everything a session depends on and returns the register map snapshot.
    pub fn validate(&self) -> Result<RegisterMap, AcquisitionError> {
        validate_link_parameters(self.serial.baud_rate, self.io_timeout())
            .map_err(|e| AcquisitionError::ConfigurationInvalid(e.to_string()))?;

        let acq = &self.acquisition;
        if acq.polling_interval_ms == 0 {
            return Err(AcquisitionError::ConfigurationInvalid(
                "polling_interval_ms must be greater than 0".to_string(),
            ));
        }
        if acq.failure_threshold == 0 {
            return Err(AcquisitionError::ConfigurationInvalid(
                "failure_threshold must be at least 1".to_string(),
            ));
        }
        if acq.sink_queue_capacity == 0 {
            return Err(AcquisitionError::ConfigurationInvalid(
                "sink_queue_capacity must be at least 1".to_string(),
            ));
        }
        if acq.mode == AcquisitionMode::RawSerial
            && (acq.raw_channel_count == 0 || acq.raw_channel_count > MAX_CHANNELS)
        {
            return Err(AcquisitionError::ConfigurationInvalid(format!(
                "raw_channel_count must be 1-{}",
                MAX_CHANNELS
            )));
        }

        validate_channels(&self.channels)?;

        let map = RegisterMap::new(self.registers.clone())?;
        if acq.mode == AcquisitionMode::Modbus && map.enabled_count() == 0 {
            warn!("⚠️  Modbus mode with no enabled register entries");
        }
        Ok(map)
    }
}

fn string_arg<'a>(matches: &'a ArgMatches, id: &str) -> Option<&'a String> {
    matches.try_get_one::<String>(id).ok().flatten()
}

fn parse_arg<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, AcquisitionError> {
    value
        .trim()
        .parse()
        .map_err(|_| AcquisitionError::InvalidParameter(format!("--{}: cannot parse '{}'", name, value)))
}

pub fn validate_channels(channels: &[ChannelConfig]) -> Result<(), AcquisitionError> {
    let mut seen = HashSet::new();
    for channel in channels {
        if channel.index >= MAX_CHANNELS {
            return Err(AcquisitionError::ConfigurationInvalid(format!(
                "Channel index {} out of range 0-{}",
                channel.index,
                MAX_CHANNELS - 1
            )));
        }
        if !seen.insert(channel.index) {
            return Err(AcquisitionError::ConfigurationInvalid(format!(
                "Channel index {} configured twice",
                channel.index
            )));
        }
        for (label, value) in [("zero", channel.zero), ("multiplier", channel.multiplier), ("gain", channel.gain)] {
            if !value.is_finite() {
                return Err(AcquisitionError::ConfigurationInvalid(format!(
                    "Channel {} {} must be finite",
                    channel.index, label
                )));
            }
        }
    }
    Ok(())
}
