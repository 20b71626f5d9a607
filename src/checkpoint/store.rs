use std::fs;
use std::path::Path;

use crate::checkpoint::metadata::CheckpointMetadata;
use crate::error::PersistenceError;

/// Metadata file name inside a checkpoint directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Weight file stem inside a checkpoint directory (the recorder adds its own
/// extension).
pub const WEIGHTS_FILE: &str = "weights";

/// Write a checkpoint directory atomically.
///
/// `write_weights` receives a staging directory; once it and the metadata are
/// fully written, the staging directory is renamed over `dest` in one step, so
/// readers never observe a half-written checkpoint.
pub fn write_checkpoint<F>(
    dest: &Path,
    metadata: &CheckpointMetadata,
    write_weights: F,
) -> Result<(), PersistenceError>
where
    F: FnOnce(&Path) -> Result<(), PersistenceError>,
{
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "checkpoint".to_string());
    let tmp_dir = dest.with_file_name(format!("{}.tmp", file_name));

    fs::create_dir_all(&tmp_dir)?;

    write_weights(&tmp_dir)?;

    let meta_json = serde_json::to_string_pretty(metadata)?;
    fs::write(tmp_dir.join(METADATA_FILE), meta_json)?;

    // Atomic rename
    if dest.exists() {
        fs::remove_dir_all(dest)?;
    }
    fs::rename(&tmp_dir, dest)?;

    Ok(())
}

/// Read checkpoint metadata from a checkpoint directory.
pub fn read_metadata(src: &Path) -> Result<CheckpointMetadata, PersistenceError> {
    if !src.exists() {
        return Err(PersistenceError::NotFound(src.to_path_buf()));
    }
    let meta_path = src.join(METADATA_FILE);
    let meta_json = fs::read_to_string(&meta_path).map_err(|e| PersistenceError::MetadataRead {
        path: meta_path.clone(),
        source: e,
    })?;
    let metadata: CheckpointMetadata =
        serde_json::from_str(&meta_json).map_err(|e| PersistenceError::MetadataParse {
            path: meta_path,
            source: e,
        })?;
    Ok(metadata)
}
