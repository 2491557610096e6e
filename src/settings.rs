use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, StimError};
use crate::io::serial::{LinkConfig, Parity, DEFAULT_BAUD_RATE};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConsoleSettings {
    /// Last port the operator connected to
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// In0 / In1 comparator levels, re-sent on every connect
    #[serde(default)]
    pub trigger_thresholds: [i32; 2],
    /// TOML program bank loaded at startup
    #[serde(default)]
    pub programs_file: Option<String>,
    /// Directory for log files (None = stderr only)
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_read_timeout_ms() -> u64 {
    100
}
fn default_poll_interval_ms() -> u64 {
    10
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::None,
            read_timeout_ms: default_read_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            trigger_thresholds: [0, 0],
            programs_file: None,
            log_dir: None,
        }
    }
}

impl ConsoleSettings {
    /// Link parameters for `port` using the stored line settings.
    pub fn link_config(&self, port: &str) -> LinkConfig {
        LinkConfig {
            port: port.to_string(),
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

pub fn settings_path() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| StimError::Settings("No config directory on this platform".to_string()))?
        .join("stimpulser");

    std::fs::create_dir_all(&dir)
        .map_err(|e| StimError::Settings(format!("Failed to create config dir: {}", e)))?;

    Ok(dir.join("settings.json"))
}

/// Load settings from the platform config dir, writing defaults on first run.
pub fn load_settings() -> Result<ConsoleSettings> {
    load_settings_from(&settings_path()?)
}

pub fn save_settings(settings: &ConsoleSettings) -> Result<()> {
    save_settings_to(&settings_path()?, settings)
}

pub fn load_settings_from(path: &Path) -> Result<ConsoleSettings> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StimError::Settings(format!("Failed to read settings: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| StimError::Settings(format!("Failed to parse settings: {}", e)))
    } else {
        let settings = ConsoleSettings::default();
        save_settings_to(path, &settings)?;
        tlog!(settings: "Created default settings at {}", path.display());
        Ok(settings)
    }
}

pub fn save_settings_to(path: &Path, settings: &ConsoleSettings) -> Result<()> {
    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| StimError::Settings(format!("Failed to serialize settings: {}", e)))?;

    std::fs::write(path, content)
        .map_err(|e| StimError::Settings(format!("Failed to write settings: {}", e)))
}
