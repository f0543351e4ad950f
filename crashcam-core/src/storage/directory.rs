use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::error::CrashCamError;
use crate::models::persist_report::ArtifactSet;
use crate::models::snapshot::RecordingSnapshot;
use crate::storage::metadata;
use crate::traits::storage_gateway::StorageGateway;

const VIDEOS_DIR: &str = "videos";
const METADATA_DIR: &str = "metadata";
const KEYS_DIR: &str = "keys";
const TEMP_DIR: &str = "temp";

/// Directory-backed `StorageGateway`.
///
/// ## Layout
/// ```text
/// <root>/videos/video_<tag>.enc
/// <root>/metadata/meta_<tag>.enc
/// <root>/metadata/meta_<tag>.json
/// <root>/keys/key_<tag>.key
/// <root>/temp/<instance uuid>/<scope>/video_<n>.tmp
/// ```
/// Scratch files live under a per-scope directory, so jobs sharing one
/// instance never delete each other's scratch files.
pub struct DirectoryStorage {
    root: PathBuf,
    temp_dir: PathBuf,
    next_temp: AtomicU64,
}

impl DirectoryStorage {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CrashCamError> {
        let root = root.into();
        for dir in [VIDEOS_DIR, METADATA_DIR, KEYS_DIR] {
            fs::create_dir_all(root.join(dir))
                .map_err(|e| CrashCamError::io("failed to create storage directory", e))?;
        }
        let temp_dir = root
            .join(TEMP_DIR)
            .join(uuid::Uuid::new_v4().to_string());

        Ok(Self {
            root,
            temp_dir,
            next_temp: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Paths of the artifact set for `tag`, whether or not the files exist.
    pub fn artifact_set(&self, tag: &str) -> ArtifactSet {
        ArtifactSet {
            tag: tag.to_string(),
            readable_metadata: self.root.join(METADATA_DIR).join(format!("meta_{}.json", tag)),
            encrypted_metadata: self.root.join(METADATA_DIR).join(format!("meta_{}.enc", tag)),
            encrypted_key: self.root.join(KEYS_DIR).join(format!("key_{}.key", tag)),
            encrypted_video: self.root.join(VIDEOS_DIR).join(format!("video_{}.enc", tag)),
        }
    }

    /// Tags with a complete artifact set, oldest first.
    pub fn list_tags(&self) -> Result<Vec<String>, CrashCamError> {
        let entries = fs::read_dir(self.root.join(VIDEOS_DIR))
            .map_err(|e| CrashCamError::io("failed to list videos", e))?;

        let mut tags: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let tag = name.strip_prefix("video_")?.strip_suffix(".enc")?;
                Some(tag.to_string())
            })
            .filter(|tag| self.artifact_set(tag).is_complete())
            .collect();

        tags.sort_by(|a, b| match (a.parse::<i64>(), b.parse::<i64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.cmp(b),
        });
        Ok(tags)
    }

    pub fn read_readable_metadata(&self, tag: &str) -> Result<RecordingSnapshot, CrashCamError> {
        metadata::read_snapshot(&self.artifact_set(tag).readable_metadata)
    }

    /// Scratch directory of `scope`.
    pub fn temp_scope_dir(&self, scope: &str) -> Result<PathBuf, CrashCamError> {
        if scope.is_empty() || scope == "." || scope == ".." || scope.contains(['/', '\\']) {
            return Err(CrashCamError::StorageError(format!(
                "invalid temp scope: {:?}",
                scope
            )));
        }
        Ok(self.temp_dir.join(scope))
    }

    fn ensure_parent(path: PathBuf) -> Result<PathBuf, CrashCamError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CrashCamError::io("failed to create directory", e))?;
        }
        Ok(path)
    }
}

impl StorageGateway for DirectoryStorage {
    fn create_readable_metadata_file(&self, tag: &str) -> Result<PathBuf, CrashCamError> {
        Self::ensure_parent(self.artifact_set(tag).readable_metadata)
    }

    fn create_encrypted_meta_file(&self, tag: &str) -> Result<PathBuf, CrashCamError> {
        Self::ensure_parent(self.artifact_set(tag).encrypted_metadata)
    }

    fn create_encrypted_symmetric_key_file(&self, tag: &str) -> Result<PathBuf, CrashCamError> {
        Self::ensure_parent(self.artifact_set(tag).encrypted_key)
    }

    fn create_encrypted_video_file(&self, tag: &str) -> Result<PathBuf, CrashCamError> {
        Self::ensure_parent(self.artifact_set(tag).encrypted_video)
    }

    fn temp_video_file(&self, scope: &str) -> Result<PathBuf, CrashCamError> {
        let n = self.next_temp.fetch_add(1, Ordering::SeqCst);
        Self::ensure_parent(self.temp_scope_dir(scope)?.join(format!("video_{}.tmp", n)))
    }

    fn delete_current_temp_data(&self, scope: &str) -> Result<(), CrashCamError> {
        match fs::remove_dir_all(self.temp_scope_dir(scope)?) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                Err(CrashCamError::io("failed to delete temp data", e))
            }
            _ => Ok(()),
        }
    }

    fn delete_artifact_set(&self, tag: &str) -> Result<(), CrashCamError> {
        for path in self.artifact_set(tag).paths() {
            match fs::remove_file(path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => {
                    return Err(CrashCamError::io("failed to delete artifact", e));
                }
                _ => {}
            }
        }
        Ok(())
    }
}
