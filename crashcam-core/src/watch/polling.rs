//! Portable write-completion detection by polling file sizes.
//!
//! A fragment counts as fully written once its size is non-zero and has not
//! changed between two consecutive scans.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::error::CrashCamError;
use crate::models::fragment::accepts_fragment_name;
use crate::traits::fragment_watcher::{FragmentReadyCallback, FragmentWatcher};

pub struct PollingWatcher {
    interval: Duration,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl PollingWatcher {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }
}

impl Default for PollingWatcher {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

impl FragmentWatcher for PollingWatcher {
    fn start(
        &mut self,
        directory: &Path,
        suffix: &str,
        callback: FragmentReadyCallback,
    ) -> Result<(), CrashCamError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CrashCamError::ConfigurationFailed(
                "watcher already running".into(),
            ));
        }
        if !directory.is_dir() {
            return Err(CrashCamError::StorageError(format!(
                "not a directory: {}",
                directory.display()
            )));
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let mut scanner = SizeScanner::new(directory.to_path_buf(), suffix.to_string());
        let interval = self.interval;

        let handle = thread::Builder::new()
            .name("fragment-poller".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    for name in scanner.scan() {
                        callback(&name);
                    }
                    thread::sleep(interval);
                }
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                CrashCamError::ConfigurationFailed(format!("failed to spawn poller thread: {}", e))
            })?;

        *self.handle.lock() = Some(handle);
        log::info!("polling {} for finished *.{} fragments", directory.display(), suffix);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PollingWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Tracks fragment sizes across scans.
struct SizeScanner {
    directory: PathBuf,
    suffix: String,
    last_sizes: HashMap<String, u64>,
    reported: HashSet<String>,
}

impl SizeScanner {
    fn new(directory: PathBuf, suffix: String) -> Self {
        Self {
            directory,
            suffix,
            last_sizes: HashMap::new(),
            reported: HashSet::new(),
        }
    }

    /// Names that became stable since the previous scan.
    fn scan(&mut self) -> Vec<String> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("failed to scan {}: {}", self.directory.display(), e);
                return Vec::new();
            }
        };

        let mut sizes = HashMap::new();
        for entry in entries.flatten() {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !accepts_fragment_name(&name, &self.suffix) {
                continue;
            }
            match entry.metadata() {
                Ok(meta) if meta.is_file() => {
                    sizes.insert(name, meta.len());
                }
                _ => {}
            }
        }

        let mut ready = Vec::new();
        for (name, size) in &sizes {
            let previous = self.last_sizes.get(name).copied();
            if previous != Some(*size) {
                // Grew or was rewritten since it was reported.
                self.reported.remove(name);
                continue;
            }
            if *size > 0 && self.reported.insert(name.clone()) {
                ready.push(name.clone());
            }
        }

        self.reported.retain(|name| sizes.contains_key(name));
        self.last_sizes = sizes;
        ready.sort();
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn reports_after_size_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let mut scanner = SizeScanner::new(dir.path().to_path_buf(), "ccf".into());

        fs::write(dir.path().join("fragment_0.ccf"), b"abc").unwrap();
        assert!(scanner.scan().is_empty());
        assert_eq!(scanner.scan(), vec!["fragment_0.ccf".to_string()]);
        // Reported once only.
        assert!(scanner.scan().is_empty());
    }

    #[test]
    fn growing_file_is_not_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fragment_0.ccf");
        let mut scanner = SizeScanner::new(dir.path().to_path_buf(), "ccf".into());

        fs::write(&path, b"a").unwrap();
        scanner.scan();
        fs::write(&path, b"ab").unwrap();
        assert!(scanner.scan().is_empty());
        assert_eq!(scanner.scan().len(), 1);
    }

    #[test]
    fn ignores_empty_foreign_and_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("empty.ccf"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"text").unwrap();
        fs::create_dir(dir.path().join("nested.ccf")).unwrap();
        fs::write(dir.path().join("nested.ccf").join("inner.ccf"), b"x").unwrap();

        let mut scanner = SizeScanner::new(dir.path().to_path_buf(), "ccf".into());
        scanner.scan();
        assert!(scanner.scan().is_empty());
    }

    #[test]
    fn watcher_thread_delivers_names() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let callback: FragmentReadyCallback = Arc::new(move |name: &str| {
            let _ = tx.lock().send(name.to_string());
        });

        let mut watcher = PollingWatcher::new(Duration::from_millis(10));
        watcher.start(dir.path(), "ccf", callback).unwrap();
        fs::write(dir.path().join("fragment_4.ccf"), b"data").unwrap();

        let name = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(name, "fragment_4.ccf");
        watcher.stop();
    }

    #[test]
    fn start_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = PollingWatcher::default();
        let callback: FragmentReadyCallback = Arc::new(|_: &str| {});
        assert!(watcher
            .start(&dir.path().join("absent"), "ccf", callback)
            .is_err());
    }
}
