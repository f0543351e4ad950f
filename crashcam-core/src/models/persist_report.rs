use std::path::PathBuf;

/// The four files persisted for one recording tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    pub tag: String,
    pub readable_metadata: PathBuf,
    pub encrypted_metadata: PathBuf,
    pub encrypted_key: PathBuf,
    pub encrypted_video: PathBuf,
}

impl ArtifactSet {
    pub fn paths(&self) -> [&PathBuf; 4] {
        [
            &self.readable_metadata,
            &self.encrypted_metadata,
            &self.encrypted_key,
            &self.encrypted_video,
        ]
    }

    pub fn is_complete(&self) -> bool {
        self.paths().iter().all(|p| p.is_file())
    }
}

/// Result of a successful persistence job.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistReport {
    pub job_id: String,
    pub artifacts: ArtifactSet,
    pub fragment_count: usize,
    pub encrypted_video_bytes: u64,
    /// SHA-256 of the persisted encrypted video, lowercase hex.
    pub checksum: String,
    pub algorithm: String,
}
