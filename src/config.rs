use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Construction-time settings for a movement value estimator, loadable from TOML.
///
/// `name` disambiguates multiple estimators in one process (e.g. the online and
/// target networks of a double-Q setup); it is recorded in checkpoint metadata
/// and should differ per instance so their artifacts stay apart.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Feature screen height (y axis).
    pub screen_rows: usize,
    /// Feature screen width (x axis).
    pub screen_cols: usize,
    pub learning_rate: f64,
    /// Default destination for `save_checkpoint`.
    pub checkpoint_dir: PathBuf,
    /// Destination of the scalar summary stream.
    pub summary_path: PathBuf,
    pub name: String,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            screen_rows: 64,
            screen_cols: 64,
            learning_rate: 1e-4,
            checkpoint_dir: PathBuf::from("checkpoints/dqn"),
            summary_path: PathBuf::from("summaries/dqn.jsonl"),
            name: "DQN".to_string(),
        }
    }
}

impl EstimatorConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: EstimatorConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            eprintln!(
                "Warning: config file '{}' not found, using defaults",
                path.display()
            );
            Ok(Self::default())
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.screen_rows == 0 {
            return Err(ConfigError::Validation("screen_rows must be > 0".into()));
        }
        if self.screen_cols == 0 {
            return Err(ConfigError::Validation("screen_cols must be > 0".into()));
        }
        if self.learning_rate <= 0.0 {
            return Err(ConfigError::Validation("learning_rate must be > 0".into()));
        }
        if self.name.is_empty() {
            return Err(ConfigError::Validation("name must not be empty".into()));
        }
        Ok(())
    }

    /// Number of spatial cells, i.e. the length of a flattened action vector.
    pub fn action_len(&self) -> usize {
        self.screen_rows * self.screen_cols
    }

    /// Generate a TOML string with all default values (useful for creating
    /// example config files).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&EstimatorConfig::default()).expect("default config serializes")
    }
}
