use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{CrewError, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub tools: ToolsConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Directory where per-run artifacts are written
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    pub default_model: String,
    pub temperature: f32,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    pub search_max_results: usize,
    pub scrape_max_chars: usize,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            llm: LlmConfig {
                default_model: "gemini-2.0-flash-lite".to_string(),
                temperature: 0.5,
                api_key: None,
                request_timeout_secs: 120,
            },
            tools: ToolsConfig {
                search_max_results: 5,
                scrape_max_chars: 3000,
                request_timeout_secs: 10,
            },
            output: OutputConfig {
                directory: PathBuf::from("./artifacts"),
            },
        }
    }
}

pub trait ConfigManager {
    fn load_config(&self) -> Result<Config>;
    fn save_config(&self, config: &Config) -> Result<()>;
    fn validate_config(&self, config: &Config) -> Result<()>;
}

pub struct FileConfigManager {
    config_path: PathBuf,
}

impl FileConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }
}

impl ConfigManager for FileConfigManager {
    fn load_config(&self) -> Result<Config> {
        info!("Loading configuration from {:?}", self.config_path);

        // check if config file exists, create default if not
        if !self.config_path.exists() {
            warn!(
                "Configuration file not found, creating default config at {:?}",
                self.config_path
            );
            self.create_default_config()?;
        }

        // read and parse the config file
        let config_content = fs::read_to_string(&self.config_path).map_err(|e| {
            CrewError::Configuration(format!("Failed to read config file: {}", e))
        })?;

        let config: Config = toml::from_str(&config_content).map_err(|e| {
            CrewError::Configuration(format!("Failed to parse TOML config: {}", e))
        })?;

        // validate the loaded config
        self.validate_config(&config)?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    fn save_config(&self, config: &Config) -> Result<()> {
        info!("Saving configuration to {:?}", self.config_path);

        let toml_content = toml::to_string_pretty(config)
            .map_err(|e| CrewError::Configuration(format!("Failed to serialize config: {}", e)))?;

        fs::write(&self.config_path, toml_content)
            .map_err(|e| CrewError::Configuration(format!("Failed to write config file: {}", e)))?;

        info!("Configuration saved successfully");
        Ok(())
    }

    fn validate_config(&self, config: &Config) -> Result<()> {
        debug!("Validating configuration");

        // checking server config
        if config.server.host.trim().is_empty() {
            return Err(CrewError::Configuration("server host cannot be empty".to_string()).into());
        }
        if config.server.port < 1024 {
            return Err(CrewError::Configuration(
                "server port must be between 1024 and 65535".to_string(),
            )
            .into());
        }

        // checking llm config
        if config.llm.default_model.trim().is_empty() {
            return Err(
                CrewError::Configuration("default_model cannot be empty".to_string()).into(),
            );
        }
        if !(0.0..=2.0).contains(&config.llm.temperature) {
            return Err(CrewError::Configuration(
                "temperature must be between 0.0 and 2.0".to_string(),
            )
            .into());
        }
        if config.llm.request_timeout_secs == 0 {
            return Err(CrewError::Configuration(
                "llm request_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }

        // checking tools config
        if config.tools.search_max_results == 0 {
            return Err(CrewError::Configuration(
                "search_max_results must be greater than 0".to_string(),
            )
            .into());
        }
        if config.tools.search_max_results > 25 {
            return Err(CrewError::Configuration(
                "search_max_results cannot exceed 25".to_string(),
            )
            .into());
        }
        if config.tools.scrape_max_chars < 100 {
            return Err(CrewError::Configuration(
                "scrape_max_chars must be at least 100".to_string(),
            )
            .into());
        }
        if config.tools.request_timeout_secs == 0 || config.tools.request_timeout_secs > 120 {
            return Err(CrewError::Configuration(
                "tools request_timeout_secs must be between 1 and 120".to_string(),
            )
            .into());
        }

        // checking output config
        if config.output.directory.as_os_str().is_empty() {
            return Err(CrewError::Configuration(
                "output directory cannot be empty".to_string(),
            )
            .into());
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

impl FileConfigManager {
    /// Create a default configuration file
    fn create_default_config(&self) -> Result<()> {
        let default_config = Config::default();
        let toml_content = toml::to_string_pretty(&default_config).map_err(|e| {
            CrewError::Configuration(format!("Failed to serialize default config: {}", e))
        })?;

        // Create parent directory if it doesn't exist
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CrewError::Configuration(format!("Failed to create config directory: {}", e))
            })?;
        }

        fs::write(&self.config_path, toml_content).map_err(|e| {
            CrewError::Configuration(format!("Failed to write default config: {}", e))
        })?;

        info!(
            "Default configuration file created at {:?}",
            self.config_path
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let manager = FileConfigManager::new(config_path.clone());

        let config = manager.load_config().unwrap();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.llm.default_model, "gemini-2.0-flash-lite");
        assert_eq!(config.tools.search_max_results, 5);
        assert!(config_path.exists());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let manager = FileConfigManager::new(config_path);

        let mut config = Config::default();
        config.server.port = 9000;
        config.tools.scrape_max_chars = 5000;
        manager.save_config(&config).unwrap();

        let loaded = manager.load_config().unwrap();
        assert_eq!(loaded.server.port, 9000);
        assert_eq!(loaded.tools.scrape_max_chars, 5000);
    }

    #[test]
    fn test_config_validation() {
        let manager = FileConfigManager::new(PathBuf::from("test.toml"));

        // Test valid config
        let valid_config = Config::default();
        assert!(manager.validate_config(&valid_config).is_ok());

        // Test invalid config - empty model
        let mut invalid_config = Config::default();
        invalid_config.llm.default_model.clear();
        assert!(manager.validate_config(&invalid_config).is_err());

        // Test invalid config - temperature out of range
        let mut invalid_config = Config::default();
        invalid_config.llm.temperature = 3.5;
        assert!(manager.validate_config(&invalid_config).is_err());

        // Test invalid config - zero search results
        let mut invalid_config = Config::default();
        invalid_config.tools.search_max_results = 0;
        assert!(manager.validate_config(&invalid_config).is_err());

        // Test invalid config - privileged port
        let mut invalid_config = Config::default();
        invalid_config.server.port = 80;
        assert!(manager.validate_config(&invalid_config).is_err());
    }
}
