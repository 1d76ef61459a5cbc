use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::ConfigError;

/// Structure representing the application configuration. Contains pathing and shank information
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub session_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub atlas_path: PathBuf,
    pub structure_tree_path: PathBuf,
    pub histology_path: Option<PathBuf>,
    pub shank_index: usize,
}

impl Default for Config {
    /// Generate a new Config object. All paths will be empty/invalid
    fn default() -> Self {
        Self {
            session_path: PathBuf::from("None"),
            output_path: None,
            atlas_path: PathBuf::from("None"),
            structure_tree_path: PathBuf::from("None"),
            histology_path: None,
            shank_index: 0,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// Get the session directory, checking that it exists
    pub fn get_session_directory(&self) -> Result<&Path, ConfigError> {
        if self.session_path.exists() {
            Ok(&self.session_path)
        } else {
            Err(ConfigError::BadFilePath(self.session_path.clone()))
        }
    }

    /// Directory that channel locations and new alignments are written to.
    ///
    /// Falls back to the session directory. The directory is not required to exist yet.
    pub fn get_output_directory(&self) -> &Path {
        self.output_path.as_deref().unwrap_or(&self.session_path)
    }

    pub fn has_histology(&self) -> bool {
        self.histology_path.is_some()
    }
}
