use std::path::PathBuf;

use crate::models::error::CrashCamError;

/// Allocates the files a persistence job reads and writes.
///
/// Every `create_*` call returns the path of a slot for `tag`, creating
/// parent directories as needed. All operations are synchronous.
pub trait StorageGateway: Send + Sync {
    /// Plaintext JSON metadata for the recording.
    fn create_readable_metadata_file(&self, tag: &str) -> Result<PathBuf, CrashCamError>;

    fn create_encrypted_meta_file(&self, tag: &str) -> Result<PathBuf, CrashCamError>;

    fn create_encrypted_symmetric_key_file(&self, tag: &str) -> Result<PathBuf, CrashCamError>;

    fn create_encrypted_video_file(&self, tag: &str) -> Result<PathBuf, CrashCamError>;

    /// A fresh scratch path inside the temp scope `scope` (a persistence
    /// job id). Each call returns a distinct path.
    fn temp_video_file(&self, scope: &str) -> Result<PathBuf, CrashCamError>;

    /// Delete every scratch file handed out for `scope`. Other scopes are
    /// untouched, so concurrent jobs sharing one gateway stay independent.
    fn delete_current_temp_data(&self, scope: &str) -> Result<(), CrashCamError>;

    /// Remove whatever exists of the artifact set for `tag`.
    fn delete_artifact_set(&self, tag: &str) -> Result<(), CrashCamError>;
}
