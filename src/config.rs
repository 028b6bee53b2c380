// ⚙️ Application configuration
// JSON file (OPSBOARD_CONFIG) with environment overrides.

use crate::importer::ImportConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "OPSBOARD_CONFIG";
pub const DB_ENV: &str = "OPSBOARD_DB";
pub const ADDR_ENV: &str = "OPSBOARD_ADDR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub bind_addr: String,
    pub import: ImportConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from("opsboard.db"),
            bind_addr: "0.0.0.0:3000".to_string(),
            import: ImportConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Defaults, then the OPSBOARD_CONFIG file, then OPSBOARD_DB / OPSBOARD_ADDR
    pub fn load() -> Result<Self> {
        Self::load_from(|key| std::env::var(key).ok())
    }

    pub fn load_from<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match var(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => AppConfig::default(),
        };

        if let Some(db) = var(DB_ENV) {
            config.database_path = PathBuf::from(db);
        }
        if let Some(addr) = var(ADDR_ENV) {
            config.bind_addr = addr;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::load_from(|_| None).unwrap();
        assert_eq!(config.database_path, PathBuf::from("opsboard.db"));
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.import.sales_sheet, "Sales plan regions");
    }

    #[test]
    fn test_file_then_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opsboard.json");
        fs::write(
            &path,
            r#"{"database_path": "/tmp/board.db", "bind_addr": "127.0.0.1:8080",
                "import": {"expense_region": "kz"}}"#,
        )
        .unwrap();

        let vars = env(&[
            (CONFIG_ENV, path.to_str().unwrap()),
            (ADDR_ENV, "127.0.0.1:9000"),
        ]);
        let config = AppConfig::load_from(|key| vars.get(key).cloned()).unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/board.db"));
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.import.expense_region_code(), Some("kz"));
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let vars = env(&[(CONFIG_ENV, "/nonexistent/opsboard.json")]);
        assert!(AppConfig::load_from(|key| vars.get(key).cloned()).is_err());
    }
}
