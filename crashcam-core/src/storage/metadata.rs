use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::models::error::CrashCamError;
use crate::models::snapshot::RecordingSnapshot;

/// Write the snapshot as one line of JSON to `path`.
pub fn write_snapshot(snapshot: &RecordingSnapshot, path: &Path) -> Result<(), CrashCamError> {
    let json = snapshot
        .to_json()
        .map_err(|e| CrashCamError::StorageError(format!("failed to serialize metadata: {}", e)))?;
    let mut file = File::create(path)
        .map_err(|e| CrashCamError::StorageError(format!("failed to create metadata file: {}", e)))?;
    writeln!(file, "{}", json)
        .and_then(|_| file.sync_all())
        .map_err(|e| CrashCamError::StorageError(format!("failed to write metadata: {}", e)))?;
    Ok(())
}

/// Read a snapshot written by `write_snapshot`.
pub fn read_snapshot(path: &Path) -> Result<RecordingSnapshot, CrashCamError> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| CrashCamError::StorageError(format!("failed to read metadata: {}", e)))?;
    let snapshot: RecordingSnapshot = serde_json::from_str(json.trim())
        .map_err(|e| CrashCamError::StorageError(format!("failed to parse metadata: {}", e)))?;
    Ok(snapshot)
}
