//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::storage;

/// Errata configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseSection,
    pub catalog: CatalogSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// Path to the catalog database; defaults to the platform config dir
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSection {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseSection { path: None },
            catalog: CatalogSection {
                default_page_size: 20,
                max_page_size: 500,
            },
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("ERRATA_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("errata")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or create default if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            // Return default config without creating file
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.catalog.default_page_size == 0 || self.catalog.max_page_size == 0 {
            return Err(anyhow!("Page sizes must be at least 1"));
        }
        if self.catalog.default_page_size > self.catalog.max_page_size {
            return Err(anyhow!(
                "catalog.default_page_size ({}) cannot exceed catalog.max_page_size ({})",
                self.catalog.default_page_size,
                self.catalog.max_page_size
            ));
        }
        Ok(())
    }

    /// Resolve the catalog database path
    ///
    /// Precedence: `ERRATA_DATABASE` env var, then the configured path, then
    /// the platform default.
    pub fn resolved_database_path(&self) -> PathBuf {
        if let Ok(path) = env::var("ERRATA_DATABASE") {
            return PathBuf::from(path);
        }
        self.database
            .path
            .clone()
            .unwrap_or_else(storage::default_database_path)
    }

    /// All configuration keys, for `errata config list`
    pub fn keys() -> [&'static str; 3] {
        [
            "database.path",
            "catalog.default_page_size",
            "catalog.max_page_size",
        ]
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "database.path" => Ok(match &self.database.path {
                Some(path) => path.display().to_string(),
                None => format!(
                    "(default: {})",
                    storage::default_database_path().display()
                ),
            }),
            "catalog.default_page_size" => Ok(self.catalog.default_page_size.to_string()),
            "catalog.max_page_size" => Ok(self.catalog.max_page_size.to_string()),
            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `errata config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "database.path" => {
                self.database.path = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "catalog.default_page_size" => {
                self.catalog.default_page_size = value
                    .parse()
                    .with_context(|| format!("Invalid page size: {}", value))?;
            }
            "catalog.max_page_size" => {
                self.catalog.max_page_size = value
                    .parse()
                    .with_context(|| format!("Invalid page size: {}", value))?;
            }
            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `errata config list` to see available keys.",
                    key
                ));
            }
        }
        self.validate()
    }
}
