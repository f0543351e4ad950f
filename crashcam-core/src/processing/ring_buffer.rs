use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;

use crate::models::config::RingBufferConfiguration;
use crate::models::error::CrashCamError;
use crate::models::fragment::FragmentHandle;
use crate::processing::readiness::ReadinessTable;
use crate::traits::fragment_watcher::{FragmentReadyCallback, FragmentWatcher};

/// Bounded FIFO of video fragment files with write-completion tracking.
///
/// Share as `Arc<FragmentRingBuffer>`: the producer calls `put`, the
/// persistence pipeline calls `drain` and `flush_all`, and the watcher thread
/// feeds the readiness table.
///
/// Overflow behavior: the oldest fragment is removed before the new one is
/// appended, under the same lock, so `len()` never exceeds `capacity()`. The
/// evicted file is deleted right after the lock is released.
pub struct FragmentRingBuffer {
    config: RingBufferConfiguration,
    queue: Mutex<VecDeque<FragmentHandle>>,
    readiness: ReadinessTable,
    watcher: Mutex<Option<Box<dyn FragmentWatcher>>>,
    next_sequence: AtomicU64,
    destroyed: AtomicBool,
}

impl FragmentRingBuffer {
    /// Buffer without a watcher. Readiness must be signalled through
    /// `mark_ready`.
    pub fn new(config: RingBufferConfiguration) -> Result<Self, CrashCamError> {
        config.validate().map_err(CrashCamError::ConfigurationFailed)?;
        fs::create_dir_all(&config.directory)
            .map_err(|e| CrashCamError::io("failed to create fragment directory", e))?;
        let first_sequence = highest_sequence(&config)?.map_or(0, |n| n + 1);

        Ok(Self {
            queue: Mutex::new(VecDeque::with_capacity(config.capacity)),
            readiness: ReadinessTable::new(),
            watcher: Mutex::new(None),
            next_sequence: AtomicU64::new(first_sequence),
            destroyed: AtomicBool::new(false),
            config,
        })
    }

    /// Buffer whose readiness table is fed by `watcher`.
    pub fn with_watcher(
        config: RingBufferConfiguration,
        mut watcher: Box<dyn FragmentWatcher>,
    ) -> Result<Self, CrashCamError> {
        let buffer = Self::new(config)?;

        let readiness = buffer.readiness.clone();
        let callback: FragmentReadyCallback = Arc::new(move |name: &str| {
            log::debug!("fragment {} fully written", name);
            readiness.mark_ready(name);
        });
        watcher.start(&buffer.config.directory, &buffer.config.suffix, callback)?;

        *buffer.watcher.lock() = Some(watcher);
        Ok(buffer)
    }

    /// Logical capacity in fragments.
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    pub fn suffix(&self) -> &str {
        &self.config.suffix
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Allocate the path for the next fragment: `<prefix><sequence>.<suffix>`.
    ///
    /// The sequence continues after the highest one found in the directory
    /// when the buffer was created, so a replacement buffer on the same
    /// directory never reuses a name still held by its predecessor.
    pub fn next_fragment_path(&self) -> PathBuf {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        self.config.directory.join(format!(
            "{}{}.{}",
            self.config.prefix, sequence, self.config.suffix
        ))
    }

    /// Enqueue a fragment, evicting and deleting the oldest one if full.
    ///
    /// Returns the evicted handle, whose file has already been deleted.
    pub fn put(&self, handle: FragmentHandle) -> Result<Option<FragmentHandle>, CrashCamError> {
        if self.is_destroyed() {
            return Err(CrashCamError::BufferDestroyed);
        }

        let evicted = {
            let mut queue = self.queue.lock();
            let evicted = if queue.len() >= self.config.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(handle);
            evicted
        };

        if let Some(ref old) = evicted {
            self.readiness.remove(old.name());
            if let Err(e) = remove_fragment_file(old.path()) {
                log::warn!("failed to delete evicted fragment {}: {}", old.path().display(), e);
            }
        }
        Ok(evicted)
    }

    /// Remove and return the oldest fragment. Its file is kept.
    pub fn pop(&self) -> Option<FragmentHandle> {
        let handle = self.queue.lock().pop_front()?;
        self.readiness.remove(handle.name());
        Some(handle)
    }

    /// FIFO copy of the currently buffered handles, ready or not.
    pub fn handles(&self) -> Vec<FragmentHandle> {
        self.queue.lock().iter().cloned().collect()
    }

    /// Signal that the fragment named `name` is fully written.
    pub fn mark_ready(&self, name: &str) {
        self.readiness.mark_ready(name);
    }

    pub fn is_ready(&self, handle: &FragmentHandle) -> bool {
        self.readiness.is_ready(handle.name())
    }

    /// FIFO copy of the fragments buffered at call time, returned once every
    /// one of them is fully written.
    ///
    /// Fragments put after the call are not waited for. A fragment evicted
    /// while waiting is dropped from the result, since its file is gone.
    /// Fails with `EmptyBuffer` if nothing is (or remains) buffered and with
    /// `Timeout` once the configured drain timeout expires.
    pub fn drain(&self) -> Result<Vec<FragmentHandle>, CrashCamError> {
        let deadline = Instant::now() + self.config.drain_timeout();
        let mut snapshot = self.handles();

        loop {
            {
                let queue = self.queue.lock();
                snapshot.retain(|h| queue.contains(h));
            }
            if snapshot.is_empty() {
                return Err(CrashCamError::EmptyBuffer);
            }

            if self.readiness.all_ready(snapshot.iter().map(|h| h.name())) {
                return Ok(snapshot);
            }

            if Instant::now() >= deadline {
                let pending: Vec<&str> = snapshot
                    .iter()
                    .filter(|h| !self.readiness.is_ready(h.name()))
                    .map(|h| h.name())
                    .collect();
                return Err(CrashCamError::Timeout(format!(
                    "fragments never finished writing: {}",
                    pending.join(", ")
                )));
            }

            log::debug!("waiting for {} buffered fragments to finish writing", snapshot.len());
            thread::sleep(self.config.ready_poll_interval());
        }
    }

    /// Delete every buffered fragment file and clear all state.
    pub fn flush_all(&self) {
        self.readiness.clear();

        let drained: Vec<FragmentHandle> = self.queue.lock().drain(..).collect();
        for handle in drained {
            if let Err(e) = remove_fragment_file(handle.path()) {
                log::warn!("failed to delete fragment {}: {}", handle.path().display(), e);
            }
        }
    }

    /// `flush_all` plus stopping the watcher. Terminal.
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.flush_all();
        if let Some(mut watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
    }
}

impl Drop for FragmentRingBuffer {
    fn drop(&mut self) {
        if let Some(mut watcher) = self.watcher.get_mut().take() {
            watcher.stop();
        }
    }
}

/// Highest `<prefix><n>.<suffix>` sequence number present in the directory.
fn highest_sequence(config: &RingBufferConfiguration) -> Result<Option<u64>, CrashCamError> {
    let entries = fs::read_dir(&config.directory)
        .map_err(|e| CrashCamError::io("failed to list fragment directory", e))?;

    let extension = format!(".{}", config.suffix);
    Ok(entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            name.strip_prefix(config.prefix.as_str())?
                .strip_suffix(extension.as_str())?
                .parse::<u64>()
                .ok()
        })
        .max())
}

fn remove_fragment_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const CAPACITY: usize = 3;

    fn buffer_in(dir: &Path) -> FragmentRingBuffer {
        FragmentRingBuffer::new(RingBufferConfiguration {
            capacity: CAPACITY,
            directory: dir.to_path_buf(),
            ready_poll_interval_ms: 5,
            drain_timeout_ms: 2_000,
            ..Default::default()
        })
        .unwrap()
    }

    fn write_fragments(buffer: &FragmentRingBuffer, count: usize) -> Vec<FragmentHandle> {
        (0..count)
            .map(|_| {
                let path = buffer.next_fragment_path();
                fs::write(&path, b"fragment").unwrap();
                FragmentHandle::new(path).unwrap()
            })
            .collect()
    }

    #[test]
    fn capacity_is_configured_value() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(buffer_in(dir.path()).capacity(), CAPACITY);
    }

    #[test]
    fn fragment_names_are_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer_in(dir.path());
        assert_eq!(buffer.next_fragment_path(), dir.path().join("fragment_0.ccf"));
        assert_eq!(buffer.next_fragment_path(), dir.path().join("fragment_1.ccf"));
    }

    #[test]
    fn put_up_to_capacity_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer_in(dir.path());
        let fragments = write_fragments(&buffer, CAPACITY);

        for f in &fragments {
            assert_eq!(buffer.put(f.clone()).unwrap(), None);
            buffer.mark_ready(f.name());
        }

        let drained = buffer.drain().unwrap();
        assert_eq!(drained, fragments);
        assert_eq!(buffer.pop().as_ref(), Some(&fragments[0]));
    }

    #[test]
    fn overflow_evicts_oldest_and_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer_in(dir.path());
        let fragments = write_fragments(&buffer, CAPACITY * 2);

        for f in &fragments {
            buffer.put(f.clone()).unwrap();
            buffer.mark_ready(f.name());
            assert!(buffer.len() <= CAPACITY);
        }

        assert_eq!(buffer.drain().unwrap(), fragments[CAPACITY..].to_vec());
        for f in &fragments[..CAPACITY] {
            assert!(!f.path().exists(), "{} should be deleted", f.name());
        }
        for f in &fragments[CAPACITY..] {
            assert!(f.path().exists());
        }
    }

    #[test]
    fn eviction_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer_in(dir.path());
        let fragments = write_fragments(&buffer, CAPACITY + 1);
        fs::remove_file(fragments[0].path()).unwrap();

        for f in &fragments {
            buffer.put(f.clone()).unwrap();
        }
        assert_eq!(buffer.handles(), fragments[1..].to_vec());
    }

    #[test]
    fn pop_is_fifo_and_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer_in(dir.path());
        let fragments = write_fragments(&buffer, CAPACITY);
        for f in &fragments {
            buffer.put(f.clone()).unwrap();
            buffer.mark_ready(f.name());
        }

        for f in &fragments {
            let popped = buffer.pop().unwrap();
            assert_eq!(&popped, f);
            assert!(popped.path().exists());
            assert!(!buffer.is_ready(&popped));
        }
        assert_eq!(buffer.pop(), None);
    }

    #[test]
    fn drain_on_empty_buffer_fails() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer_in(dir.path());
        assert_eq!(buffer.drain(), Err(CrashCamError::EmptyBuffer));
    }

    #[test]
    fn drain_waits_for_pending_writes() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = Arc::new(buffer_in(dir.path()));
        let fragments = write_fragments(&buffer, 2);
        for f in &fragments {
            buffer.put(f.clone()).unwrap();
        }
        buffer.mark_ready(fragments[0].name());

        let signaller = Arc::clone(&buffer);
        let late = fragments[1].name().to_string();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            signaller.mark_ready(&late);
        });

        let drained = buffer.drain().unwrap();
        handle.join().unwrap();
        assert_eq!(drained, fragments);
        assert!(drained.iter().all(|h| buffer.is_ready(h)));
    }

    #[test]
    fn drain_times_out_on_unfinished_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = FragmentRingBuffer::new(RingBufferConfiguration {
            capacity: CAPACITY,
            directory: dir.path().to_path_buf(),
            ready_poll_interval_ms: 5,
            drain_timeout_ms: 30,
            ..Default::default()
        })
        .unwrap();
        let fragments = write_fragments(&buffer, 1);
        buffer.put(fragments[0].clone()).unwrap();

        match buffer.drain() {
            Err(CrashCamError::Timeout(msg)) => assert!(msg.contains("fragment_0.ccf")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn flush_all_deletes_files_and_state() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer_in(dir.path());
        let fragments = write_fragments(&buffer, CAPACITY);
        for f in &fragments {
            buffer.put(f.clone()).unwrap();
            buffer.mark_ready(f.name());
        }

        buffer.flush_all();

        assert!(buffer.is_empty());
        for f in &fragments {
            assert!(!f.path().exists());
            assert!(!buffer.is_ready(f));
        }
        assert_eq!(buffer.drain(), Err(CrashCamError::EmptyBuffer));
    }

    #[test]
    fn destroy_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer_in(dir.path());
        let fragments = write_fragments(&buffer, CAPACITY + 1);
        for f in &fragments[..CAPACITY] {
            buffer.put(f.clone()).unwrap();
        }

        buffer.destroy();

        for f in &fragments[..CAPACITY] {
            assert!(!f.path().exists());
        }
        assert_eq!(
            buffer.put(fragments[CAPACITY].clone()),
            Err(CrashCamError::BufferDestroyed)
        );
        assert!(fragments[CAPACITY].path().exists());
    }

    #[test]
    fn drain_ignores_fragments_put_while_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = Arc::new(
            FragmentRingBuffer::new(RingBufferConfiguration {
                capacity: 64,
                directory: dir.path().to_path_buf(),
                ready_poll_interval_ms: 5,
                drain_timeout_ms: 2_000,
                ..Default::default()
            })
            .unwrap(),
        );
        let fragments = write_fragments(&buffer, 3);
        for f in &fragments {
            buffer.put(f.clone()).unwrap();
        }
        buffer.mark_ready(fragments[0].name());
        buffer.mark_ready(fragments[1].name());

        // Continuous capture: each tick finishes the previous fragment and
        // starts a new one, so some fragment is always being written.
        let running = Arc::new(AtomicBool::new(true));
        let producer = {
            let buffer = Arc::clone(&buffer);
            let running = Arc::clone(&running);
            let mut writing = fragments[2].clone();
            thread::spawn(move || {
                while running.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(10));
                    buffer.mark_ready(writing.name());
                    let path = buffer.next_fragment_path();
                    fs::write(&path, b"fragment").unwrap();
                    writing = FragmentHandle::new(path).unwrap();
                    buffer.put(writing.clone()).unwrap();
                }
            })
        };

        let drained = buffer.drain();
        running.store(false, Ordering::SeqCst);
        producer.join().unwrap();
        assert_eq!(drained.unwrap(), fragments);
    }

    #[test]
    fn drain_drops_fragments_evicted_while_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = Arc::new(buffer_in(dir.path()));
        let fragments = write_fragments(&buffer, CAPACITY + 1);
        for f in &fragments[..CAPACITY] {
            buffer.put(f.clone()).unwrap();
        }
        buffer.mark_ready(fragments[1].name());
        buffer.mark_ready(fragments[2].name());

        // The oldest never finishes; it is evicted instead.
        let producer = {
            let buffer = Arc::clone(&buffer);
            let newest = fragments[CAPACITY].clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                buffer.put(newest).unwrap();
            })
        };

        let drained = buffer.drain().unwrap();
        producer.join().unwrap();
        assert_eq!(drained, fragments[1..CAPACITY].to_vec());
    }

    #[test]
    fn sequence_continues_after_existing_fragments() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("fragment_7.ccf"), b"old").unwrap();
        fs::write(dir.path().join("fragment_2.ccf"), b"old").unwrap();
        fs::write(dir.path().join("fragment_99.txt"), b"other").unwrap();

        let first = buffer_in(dir.path());
        let held = first.next_fragment_path();
        assert_eq!(held, dir.path().join("fragment_8.ccf"));
        fs::write(&held, b"recording").unwrap();

        // A replacement buffer on the same directory picks fresh names.
        let second = buffer_in(dir.path());
        assert_eq!(second.next_fragment_path(), dir.path().join("fragment_9.ccf"));
    }

    #[derive(Default)]
    struct WatcherLog {
        started: Vec<(PathBuf, String)>,
        stops: usize,
        callback: Option<FragmentReadyCallback>,
    }

    struct RecordingWatcher {
        log: Arc<Mutex<WatcherLog>>,
    }

    impl FragmentWatcher for RecordingWatcher {
        fn start(
            &mut self,
            directory: &Path,
            suffix: &str,
            callback: FragmentReadyCallback,
        ) -> Result<(), CrashCamError> {
            let mut log = self.log.lock();
            log.started.push((directory.to_path_buf(), suffix.to_string()));
            log.callback = Some(callback);
            Ok(())
        }

        fn stop(&mut self) {
            self.log.lock().stops += 1;
        }
    }

    #[test]
    fn watcher_feeds_readiness_and_stops_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(WatcherLog::default()));
        let buffer = FragmentRingBuffer::with_watcher(
            RingBufferConfiguration {
                capacity: CAPACITY,
                directory: dir.path().to_path_buf(),
                suffix: "vid".into(),
                ready_poll_interval_ms: 5,
                drain_timeout_ms: 2_000,
                ..Default::default()
            },
            Box::new(RecordingWatcher { log: Arc::clone(&log) }),
        )
        .unwrap();
        assert_eq!(log.lock().started, vec![(dir.path().to_path_buf(), "vid".to_string())]);

        let fragments = write_fragments(&buffer, 2);
        for f in &fragments {
            buffer.put(f.clone()).unwrap();
        }
        let callback = log.lock().callback.clone().unwrap();
        for f in &fragments {
            callback(f.name());
        }
        assert_eq!(buffer.drain().unwrap(), fragments);

        buffer.destroy();
        assert_eq!(log.lock().stops, 1);
        drop(buffer);
        assert_eq!(log.lock().stops, 1);
    }

    #[test]
    fn drop_stops_watcher() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(WatcherLog::default()));
        let buffer = FragmentRingBuffer::with_watcher(
            RingBufferConfiguration {
                directory: dir.path().to_path_buf(),
                ..Default::default()
            },
            Box::new(RecordingWatcher { log: Arc::clone(&log) }),
        )
        .unwrap();

        drop(buffer);
        assert_eq!(log.lock().stops, 1);
    }

    #[test]
    fn rejects_zero_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let result = FragmentRingBuffer::new(RingBufferConfiguration {
            capacity: 0,
            directory: dir.path().to_path_buf(),
            ..Default::default()
        });
        assert!(matches!(result, Err(CrashCamError::ConfigurationFailed(_))));
    }
}
