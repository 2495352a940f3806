//! Project configuration loaded from `htc-forge.yaml`.
//!
//! The file has three optional sections (`partition`, `bundle`, `render`) and
//! a top-level `output_dir` where the rendered artifacts are written. Render
//! parameters are validated when rendering, after command-line overrides
//! have been applied.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::partition::PartitionConfig;
use crate::render::{RenderParameters, TextResource};

/// Default config file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "htc-forge.yaml";

/// Input bundling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleSettings {
    pub enabled: bool,
}

impl Default for BundleSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Render section: the parameter set plus the install script location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(flatten)]
    pub params: RenderParameters,
    /// Script appended to the Dockerfile.
    pub install_script: Option<PathBuf>,
}

impl RenderSettings {
    /// Load the install script named in the config, if any.
    pub fn load_install_script(&self) -> Option<Result<TextResource, crate::error::RenderError>> {
        self.install_script.as_ref().map(TextResource::from_path)
    }
}

/// Top-level project configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub output_dir: PathBuf,
    pub partition: Option<PartitionConfig>,
    pub bundle: BundleSettings,
    pub render: Option<RenderSettings>,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("job"),
            partition: None,
            bundle: BundleSettings::default(),
            render: None,
        }
    }
}

impl ForgeConfig {
    /// Parse a config from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: ForgeConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: ForgeConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation("output_dir must not be empty".to_string()));
        }
        if let Some(partition) = &self.partition {
            if partition.group_by.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "partition.group_by must not be empty".to_string(),
                ));
            }
            partition
                .delimiter_byte()
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
        }
        Ok(())
    }

    pub fn partition(&self) -> Result<&PartitionConfig, ConfigError> {
        self.partition
            .as_ref()
            .ok_or_else(|| ConfigError::Validation("missing 'partition' section".to_string()))
    }

    pub fn render(&self) -> Result<&RenderSettings, ConfigError> {
        self.render
            .as_ref()
            .ok_or_else(|| ConfigError::Validation("missing 'render' section".to_string()))
    }

    /// Location of the input archive: inside the artifact directory, under
    /// the name the submit descriptor transfers.
    pub fn input_archive_path(&self) -> Option<PathBuf> {
        self.render
            .as_ref()
            .map(|render| self.output_dir.join(&render.params.files.input_archive))
    }
}
