use crate::models::PatcherConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::fs;

/// Prefix of environment variables that override `Patcher.yaml`,
/// e.g. `SQMPATCH_PATCHER__MAX_CURATORS=4`.
pub const ENV_PREFIX: &str = "SQMPATCH";

/// Configuration manager for loading and saving the patcher settings.
///
/// Settings live in `Patcher.yaml` inside the configuration directory
/// (`Patcher Data` by default). Environment variables prefixed with
/// [`ENV_PREFIX`] are layered on top of the file.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager, creating `config_dir` if needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join("Patcher.yaml"),
            config_dir,
        })
    }

    /// Load the settings from `Patcher.yaml` and the process environment.
    ///
    /// A missing file yields the defaults.
    pub fn load_config(&self) -> Result<PatcherConfig> {
        self.load_config_with(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
    }

    /// Load the settings with an explicit environment source.
    pub fn load_config_with(&self, environment: Environment) -> Result<PatcherConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
        }

        let layered = Config::builder()
            .add_source(File::new(self.config_path.as_str(), FileFormat::Yaml).required(false))
            .add_source(environment)
            .build()
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: PatcherConfig = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        tracing::info!("Loaded config from {}", self.config_path);
        Ok(config)
    }

    /// Save the settings to `Patcher.yaml`.
    pub fn save_config(&self, config: &PatcherConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }
}
