use std::path::Path;
use std::sync::Arc;

use crate::models::error::CrashCamError;

/// Callback invoked with the file name of a fragment whose write completed.
pub type FragmentReadyCallback = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// Source of write-completion events for one fragment directory.
///
/// Implemented by:
/// - `PollingWatcher` (portable, size-stability polling)
/// - `InotifyWatcher` (Linux, `IN_CLOSE_WRITE`)
pub trait FragmentWatcher: Send {
    /// Start watching `directory` for finished `*.<suffix>` files directly
    /// inside it. The callback fires on the watcher's own thread.
    fn start(
        &mut self,
        directory: &Path,
        suffix: &str,
        callback: FragmentReadyCallback,
    ) -> Result<(), CrashCamError>;

    /// Stop watching and release resources. Idempotent.
    fn stop(&mut self);
}
