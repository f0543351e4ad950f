//! # crashcam-inotify
//!
//! Linux write-completion backend for crashcam.
//!
//! Provides:
//! - `InotifyWatcher`: reports fragments on `IN_CLOSE_WRITE`, the moment the
//!   recorder closes a fragment file it had open for writing
//!
//! On other platforms use `crashcam_core::PollingWatcher`.
//!
//! ## Usage
//! ```ignore
//! use crashcam_core::{FragmentRingBuffer, RingBufferConfiguration};
//! use crashcam_inotify::InotifyWatcher;
//!
//! let buffer = FragmentRingBuffer::with_watcher(config, Box::new(InotifyWatcher::new()))?;
//! ```

#[cfg(target_os = "linux")]
pub mod inotify_watcher;

#[cfg(target_os = "linux")]
pub use inotify_watcher::InotifyWatcher;
