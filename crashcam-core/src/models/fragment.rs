use std::path::{Path, PathBuf};

/// Reference to a fragment file owned by the ring buffer.
///
/// Sequence is implied by FIFO order; the file name keys the readiness table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FragmentHandle {
    path: PathBuf,
    name: String,
}

impl FragmentHandle {
    /// Returns `None` if `path` has no UTF-8 file name.
    pub fn new(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let name = path.file_name()?.to_str()?.to_string();
        Some(Self { path, name })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name relative to the watched directory.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Whether `name` is a fragment file directly inside the watched directory.
///
/// Rejects anything containing a path separator (subdirectory entries) and
/// names not ending in `.<suffix>`.
pub fn accepts_fragment_name(name: &str, suffix: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    match name.strip_suffix(suffix) {
        Some(stem) => stem.len() > 1 && stem.ends_with('.'),
        None => false,
    }
}

/// Maps an absolute event path to a fragment name, if it is a direct child of
/// `directory` and passes `accepts_fragment_name`.
pub fn fragment_name_in(directory: &Path, path: &Path, suffix: &str) -> Option<String> {
    let relative = path.strip_prefix(directory).ok()?;
    let name = relative.to_str()?;
    accepts_fragment_name(name, suffix).then(|| name.to_string())
}
