use std::path::PathBuf;

/// Errors that can occur during checkpoint save/restore.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("checkpoint not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read checkpoint metadata from {path}: {source}")]
    MetadataRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse checkpoint metadata from {path}: {source}")]
    MetadataParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to save network weights: {0}")]
    ModelSave(String),

    #[error("failed to load network weights: {0}")]
    ModelLoad(String),

    #[error(
        "checkpoint was saved for a {found_rows}x{found_cols} screen but this \
         network is built for {expected_rows}x{expected_cols}"
    )]
    SchemaMismatch {
        expected_rows: usize,
        expected_cols: usize,
        found_rows: usize,
        found_cols: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by estimator operations.
#[derive(Debug, thiserror::Error)]
pub enum EstimatorError {
    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("parameters are not initialized (call initialize_parameters or restore first)")]
    Uninitialized,

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}
