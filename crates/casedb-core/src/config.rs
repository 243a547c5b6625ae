//! Case database configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CaseDbError, Result};

/// Settings applied when a case is created or opened
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseDbConfig {
    /// Login recorded on tags created in this session
    pub examiner_login: String,
    /// Sector size passed to the image backend
    pub sector_size: u32,
    /// Time zone stored for new data sources
    pub time_zone: String,
    /// Optional NSRL md5 list
    pub nsrl_db_path: Option<PathBuf>,
    /// Optional known-bad md5 list
    pub known_bad_db_path: Option<PathBuf>,
    /// Maximum number of image handles kept open
    pub handle_cache_capacity: usize,
    /// Hash image content while adding an image
    pub compute_image_hashes: bool,
}

impl Default for CaseDbConfig {
    fn default() -> Self {
        let examiner_login = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "examiner".to_string());

        Self {
            examiner_login,
            sector_size: 512,
            time_zone: "UTC".to_string(),
            nsrl_db_path: None,
            known_bad_db_path: None,
            handle_cache_capacity: 16,
            compute_image_hashes: false,
        }
    }
}

impl CaseDbConfig {
    /// Get the default config path (~/.casedb/config.json)
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| CaseDbError::core("Could not determine home directory"))?;

        Ok(home.join(".casedb").join("config.json"))
    }

    /// Load a config file, falling back to defaults when it does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let config: CaseDbConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write this config as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject settings the backend cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.sector_size == 0 || self.sector_size % 512 != 0 {
            return Err(CaseDbError::invalid(format!(
                "sector size must be a multiple of 512, got {}",
                self.sector_size
            )));
        }
        if self.handle_cache_capacity == 0 {
            return Err(CaseDbError::invalid("handle cache capacity must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = CaseDbConfig::load(temp_dir.path().join("none.json")).unwrap();
        assert_eq!(config.sector_size, 512);
        assert_eq!(config.time_zone, "UTC");
        assert!(!config.examiner_login.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.json");

        let mut config = CaseDbConfig::default();
        config.examiner_login = "jdoe".to_string();
        config.sector_size = 4096;
        config.save(&path).unwrap();

        let loaded = CaseDbConfig::load(&path).unwrap();
        assert_eq!(loaded.examiner_login, "jdoe");
        assert_eq!(loaded.sector_size, 4096);
    }

    #[test]
    fn test_partial_file_uses_defaults_for_rest() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{"time_zone": "America/New_York"}"#).unwrap();

        let loaded = CaseDbConfig::load(&path).unwrap();
        assert_eq!(loaded.time_zone, "America/New_York");
        assert_eq!(loaded.handle_cache_capacity, 16);
    }

    #[test]
    fn test_bad_sector_size_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{"sector_size": 100}"#).unwrap();

        let err = CaseDbConfig::load(&path).unwrap_err();
        assert!(err.is_data_error());
    }
}
