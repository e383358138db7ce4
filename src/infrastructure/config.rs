use crate::domain::models::{is_allowed_duration, Section};
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const PLANNER_JSON: &str = "planner.json";
const SUPPORTED_SCHEMA: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlannerConfig {
    pub schema: u8,
    pub timezone: String,
    pub data_service_url: String,
    pub undo_window_seconds: u64,
    pub calendar_window_days: u32,
    pub default_section: Section,
    pub default_duration_minutes: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            schema: 1,
            timezone: "UTC".to_string(),
            data_service_url: "http://127.0.0.1:8787/api/".to_string(),
            undo_window_seconds: 10,
            calendar_window_days: 7,
            default_section: Section::Inbox,
            default_duration_minutes: 30,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<(), InfraError> {
        self.time_zone()?;
        if self.data_service_url.trim().is_empty() {
            return Err(InfraError::InvalidConfig(
                "dataServiceUrl must not be empty".to_string(),
            ));
        }
        if self.undo_window_seconds == 0 {
            return Err(InfraError::InvalidConfig(
                "undoWindowSeconds must be > 0".to_string(),
            ));
        }
        if !is_allowed_duration(self.default_duration_minutes) {
            return Err(InfraError::InvalidConfig(format!(
                "defaultDurationMinutes {} is not an allowed duration",
                self.default_duration_minutes
            )));
        }
        Ok(())
    }

    pub fn time_zone(&self) -> Result<Tz, InfraError> {
        self.timezone.trim().parse::<Tz>().map_err(|error| {
            InfraError::InvalidConfig(format!("unknown timezone '{}': {error}", self.timezone))
        })
    }
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(PLANNER_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&PlannerConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

/// Loads `planner.json`, filling absent keys from the defaults.
pub fn load_planner_config(config_dir: &Path) -> Result<PlannerConfig, InfraError> {
    let path = config_dir.join(PLANNER_JSON);
    let mut merged = serde_json::to_value(PlannerConfig::default())?;
    let overrides = read_config(&path)?;
    if let (Some(target), Some(source)) = (merged.as_object_mut(), overrides.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }

    let config: PlannerConfig = serde_json::from_value(merged).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid {}: {error}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

pub fn save_planner_config(config_dir: &Path, config: &PlannerConfig) -> Result<(), InfraError> {
    config.validate()?;
    let formatted = serde_json::to_string_pretty(config)?;
    fs::write(config_dir.join(PLANNER_JSON), format!("{formatted}\n"))?;
    Ok(())
}
