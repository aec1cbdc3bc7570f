//! Configuration loading and management

use super::schema::Config;
use super::validate::validate_config;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Configuration loader
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Create a new config loader with the default config directory
    pub fn new() -> Self {
        let config_dir = dirs::home_dir()
            .map(|h| h.join(".courier"))
            .unwrap_or_else(|| PathBuf::from(".courier"));

        Self { config_dir }
    }

    /// Create a new config loader with a custom config directory
    pub fn with_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            config_dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Load configuration from file and environment
    pub fn load(&self) -> crate::Result<Config> {
        let config_path = self.config_dir.join("config.json");
        let mut merged = serde_json::to_value(Config::default())?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let mut file_value: Value = serde_json::from_str(&content)?;
            if let Some(messenger) = file_value.get_mut("messenger") {
                snake_case_keys(messenger);
            }
            overlay_sections(&mut merged, file_value);
        }

        apply_env_overrides(&mut merged);

        let config: Config = serde_json::from_value(merged)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &Config) -> crate::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        let config_path = self.config_dir.join("config.json");
        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Prefix of `COURIER__SECTION__KEY` environment overrides
const ENV_PREFIX: &str = "COURIER__";

// Sections are flat, so a file section replaces defaults field by field.
fn overlay_sections(base: &mut Value, overlay: Value) {
    let (Some(base), Value::Object(overlay)) = (base.as_object_mut(), overlay) else {
        return;
    };
    for (name, section) in overlay {
        match (base.get_mut(&name).and_then(Value::as_object_mut), section) {
            (Some(target), Value::Object(fields)) => target.extend(fields),
            _ => warn!(section = %name, "Ignoring unknown config section"),
        }
    }
}

// `autoActive` and `timeout` must land on the same keys as the serialized defaults.
fn snake_case_keys(value: &mut Value) {
    let Some(map) = value.as_object_mut() else {
        return;
    };
    let entries = std::mem::take(map);
    for (key, value) in entries {
        let key = match key.as_str() {
            "timeout" => "timeout_ms".to_string(),
            _ => to_snake_case(&key),
        };
        map.insert(key, value);
    }
}

fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            if !out.is_empty() {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// JSON literals keep their type; anything else is a string
fn parse_env_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn apply_env_overrides(config: &mut Value) {
    for (key, raw) in std::env::vars() {
        let Some((section, field)) = key
            .strip_prefix(ENV_PREFIX)
            .and_then(|rest| rest.split_once("__"))
        else {
            continue;
        };
        let section_key = section.to_ascii_lowercase();
        let Some(target) = config.get_mut(&section_key).and_then(Value::as_object_mut) else {
            warn!(variable = %key, "Ignoring override for unknown config section");
            continue;
        };
        target.insert(field.to_ascii_lowercase(), parse_env_value(&raw));
    }
}
