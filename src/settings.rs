use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ResumenError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    /// Currency every stored amount is also expressed in, when a rate
    /// is available.
    #[serde(default = "default_reference_currency")]
    pub reference_currency: String,
    /// Deterministic extractions at or above this confidence are never
    /// escalated.
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: u8,
    /// Per-owner cap on enhanced extractions per calendar month.
    #[serde(default = "default_monthly_ai_quota")]
    pub monthly_ai_quota: i64,
}

fn default_reference_currency() -> String {
    "USD".to_string()
}

fn default_escalation_threshold() -> u8 {
    60
}

fn default_monthly_ai_quota() -> i64 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            reference_currency: default_reference_currency(),
            escalation_threshold: default_escalation_threshold(),
            monthly_ai_quota: default_monthly_ai_quota(),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("resumen")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("resumen")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| ResumenError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn db_path(settings: &Settings) -> PathBuf {
    PathBuf::from(&settings.data_dir).join("resumen.db")
}
