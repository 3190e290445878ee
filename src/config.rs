use crate::suggest::{HOLD_SECS, REPEAT_BIAS, Selector};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level powertop configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PowertopConfig {
    pub interval: IntervalConfig,
    pub selection: SelectionConfig,
    pub display: DisplayConfig,
    pub probes: ProbeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    /// First interval in interactive mode; later ones adapt to idle depth.
    pub interactive_secs: f64,
    /// Length of the single dump-mode interval.
    pub dump_secs: f64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            interactive_secs: 5.0,
            dump_secs: 15.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Extra weight the previously shown suggestion gets while held.
    pub repeat_bias: u64,
    /// Seconds a newly shown suggestion stays favoured.
    pub hold_secs: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            repeat_bias: REPEAT_BIAS,
            hold_secs: HOLD_SECS,
        }
    }
}

impl SelectionConfig {
    pub fn selector(&self) -> Selector {
        Selector {
            repeat_bias: self.repeat_bias,
            hold_secs: self.hold_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Wakeup lines shown in interactive mode.
    pub top_lines: usize,
    /// Start with the pid column visible.
    pub show_pids: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            top_lines: 10,
            show_pids: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Probe names that never run, e.g. `["nmi-watchdog", "usb-activity"]`.
    pub disabled: Vec<String>,
}

const SYSTEM_CONFIG: &str = "/etc/powertop/config.toml";

fn load_system() -> Option<toml::Value> {
    let path = Path::new(SYSTEM_CONFIG);
    let content = std::fs::read_to_string(path).ok()?;
    parse_value(path, &content)
}

/// ~/.config/powertop/config.toml
fn load_user() -> Option<toml::Value> {
    let path = dirs::config_dir()?.join("powertop").join("config.toml");
    let content = std::fs::read_to_string(&path).ok()?;
    parse_value(&path, &content)
}

fn parse_value(path: &Path, content: &str) -> Option<toml::Value> {
    match toml::from_str(content) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("ignoring config at {}: {}", path.display(), e);
            None
        }
    }
}

/// Recursively merge two TOML values. Tables are merged key-by-key;
/// all other types in `overlay` replace `base`.
fn merge_values(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_values(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

fn load_from_path(path: &Path) -> PowertopConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            log::warn!("failed to parse config at {}: {}", path.display(), e);
            PowertopConfig::default()
        }),
        Err(e) => {
            log::warn!("failed to read config at {}: {}", path.display(), e);
            PowertopConfig::default()
        }
    }
}

/// Load the merged config: system defaults, then user overrides.
/// If `override_path` is provided, use only that file instead.
pub fn load(override_path: Option<&PathBuf>) -> PowertopConfig {
    if let Some(path) = override_path {
        return load_from_path(path);
    }

    let merged = match (load_system(), load_user()) {
        (Some(s), Some(u)) => Some(merge_values(s, u)),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    };

    match merged {
        Some(value) => value.try_into().unwrap_or_else(|e| {
            log::warn!("failed to deserialize config: {}", e);
            PowertopConfig::default()
        }),
        None => PowertopConfig::default(),
    }
}
