use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crashcam_core::models::error::CrashCamError;
use crashcam_core::models::fragment::fragment_name_in;
use crashcam_core::traits::fragment_watcher::{FragmentReadyCallback, FragmentWatcher};

/// How often the event thread checks whether it should exit.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// `FragmentWatcher` backed by inotify close-after-write events.
///
/// Only direct children of the watched directory are reported; the watch is
/// not recursive and paths with separators are filtered out.
pub struct InotifyWatcher {
    watcher: Option<RecommendedWatcher>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl InotifyWatcher {
    pub fn new() -> Self {
        Self {
            watcher: None,
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for InotifyWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentWatcher for InotifyWatcher {
    fn start(
        &mut self,
        directory: &Path,
        suffix: &str,
        callback: FragmentReadyCallback,
    ) -> Result<(), CrashCamError> {
        if self.is_running() {
            return Err(CrashCamError::ConfigurationFailed(
                "watcher already running".into(),
            ));
        }

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Err(e) = tx.send(res) {
                log::error!("failed to forward watch event: {}", e);
            }
        })
        .map_err(|e| CrashCamError::ConfigurationFailed(format!("failed to create watcher: {}", e)))?;

        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .map_err(|e| {
                CrashCamError::StorageError(format!(
                    "failed to watch {}: {}",
                    directory.display(),
                    e
                ))
            })?;

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let directory_buf = directory.to_path_buf();
        let suffix_owned = suffix.to_string();

        let handle = thread::Builder::new()
            .name("fragment-inotify".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    match rx.recv_timeout(STOP_POLL_INTERVAL) {
                        Ok(Ok(event)) => {
                            for name in finished_fragments(&event, &directory_buf, &suffix_owned) {
                                callback(&name);
                            }
                        }
                        Ok(Err(e)) => log::warn!("watch error: {}", e),
                        Err(mpsc::RecvTimeoutError::Timeout) => {}
                        Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                CrashCamError::ConfigurationFailed(format!("failed to spawn watcher thread: {}", e))
            })?;

        self.watcher = Some(watcher);
        *self.handle.lock() = Some(handle);
        log::info!("watching {} for closed *.{} fragments", directory.display(), suffix);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Dropping the watcher disconnects the event channel.
        self.watcher = None;
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                log::error!("fragment watcher thread panicked");
            }
        }
    }
}

impl Drop for InotifyWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fragment names whose writer just closed them.
fn finished_fragments(event: &Event, directory: &Path, suffix: &str) -> Vec<String> {
    match event.kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => event
            .paths
            .iter()
            .filter_map(|path: &PathBuf| fragment_name_in(directory, path, suffix))
            .collect(),
        _ => Vec::new(),
    }
}
