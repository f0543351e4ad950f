use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::models::config::PersistConfiguration;
use crate::models::error::CrashCamError;
use crate::models::persist_report::{ArtifactSet, PersistReport};
use crate::models::snapshot::RecordingSnapshot;
use crate::models::state::PersistState;
use crate::pipeline::handoff::{handoff_pair, CancelToken, Handoff};
use crate::processing::concat;
use crate::processing::ring_buffer::FragmentRingBuffer;
use crate::storage::{checksum, metadata};
use crate::traits::crypto_provider::CryptoProvider;
use crate::traits::persist_callback::PersistCallback;
use crate::traits::storage_gateway::StorageGateway;

/// Message from a persist worker to the control thread.
#[derive(Debug)]
pub enum PersistEvent {
    /// Waiting window elapsed. The control thread must release the handoff
    /// once it no longer references the job's buffer and storage.
    Started(Handoff),
    /// Job finished; `true` on success.
    Stopped(bool),
}

/// Launches persistence jobs with injected storage and crypto.
///
/// Data flow of one job:
/// ```text
/// [trigger] → wait ½ window → handoff → metadata JSON → drain
///           → concat video tracks → encrypt → copy to tag slot → cleanup
/// ```
pub struct Persistor {
    config: PersistConfiguration,
    storage: Arc<dyn StorageGateway>,
    crypto: Arc<dyn CryptoProvider>,
}

impl Persistor {
    pub fn new(
        config: PersistConfiguration,
        storage: Arc<dyn StorageGateway>,
        crypto: Arc<dyn CryptoProvider>,
    ) -> Result<Self, CrashCamError> {
        config.validate().map_err(CrashCamError::ConfigurationFailed)?;
        Ok(Self {
            config,
            storage,
            crypto,
        })
    }

    pub fn config(&self) -> &PersistConfiguration {
        &self.config
    }

    /// Start a job on a dedicated worker thread.
    ///
    /// `snapshot` is validated only after the handoff, so a missing snapshot
    /// still produces `Started` followed by `Stopped(false)`.
    pub fn start(
        &self,
        buffer: Arc<FragmentRingBuffer>,
        snapshot: Option<RecordingSnapshot>,
    ) -> Result<PersistJob, CrashCamError> {
        let id = uuid::Uuid::new_v4().to_string();
        let state = Arc::new(Mutex::new(PersistState::Idle));
        let cancel = CancelToken::default();
        let (events_tx, events_rx) = mpsc::channel();

        let worker = Worker {
            id: id.clone(),
            config: self.config.clone(),
            storage: Arc::clone(&self.storage),
            crypto: Arc::clone(&self.crypto),
            buffer,
            state: Arc::clone(&state),
            cancel: cancel.clone(),
            events: events_tx,
        };

        let handle = thread::Builder::new()
            .name(format!("persist-{}", &id[..8]))
            .spawn(move || worker.run(snapshot))
            .map_err(|e| CrashCamError::ConfigurationFailed(format!("failed to spawn persist thread: {}", e)))?;

        log::info!("persist job {} started", id);
        Ok(PersistJob {
            id,
            state,
            cancel,
            events: events_rx,
            handle: Some(handle),
            stopped: None,
        })
    }
}

/// Handle to a running persistence job, owned by the control thread.
pub struct PersistJob {
    id: String,
    state: Arc<Mutex<PersistState>>,
    cancel: CancelToken,
    events: Receiver<PersistEvent>,
    handle: Option<thread::JoinHandle<Result<PersistReport, CrashCamError>>>,
    stopped: Option<bool>,
}

impl PersistJob {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> PersistState {
        self.state.lock().clone()
    }

    /// Cancel the job. Only takes effect before the handoff; returns whether
    /// it did. A cancelled job delivers no events.
    pub fn cancel(&self) -> bool {
        let state = self.state.lock();
        if !state.is_cancellable() {
            return false;
        }
        self.cancel.cancel();
        log::info!("persist job {} cancelled", self.id);
        true
    }

    /// Deliver every pending event to `callback` without blocking.
    ///
    /// Call from the control thread's event loop. Returns the number of
    /// events handled.
    pub fn dispatch(&mut self, callback: &mut dyn PersistCallback) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event, callback);
            handled += 1;
        }
        handled
    }

    /// Deliver events until the job stops. Returns `None` if the job ended
    /// without reporting (cancelled).
    pub fn wait(&mut self, callback: &mut dyn PersistCallback) -> Option<bool> {
        while self.stopped.is_none() {
            match self.events.recv() {
                Ok(event) => self.handle_event(event, callback),
                Err(_) => break,
            }
        }
        self.stopped
    }

    /// Result reported through `on_persisting_stopped`, once delivered.
    pub fn outcome(&self) -> Option<bool> {
        self.stopped
    }

    /// Wait for the worker to exit and return its detailed result.
    ///
    /// Does not deliver events: a job still waiting for the handoff fails
    /// with a timeout unless another thread dispatches them.
    pub fn join(mut self) -> Result<PersistReport, CrashCamError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| CrashCamError::WorkerPanicked)?,
            None => Err(CrashCamError::WorkerPanicked),
        }
    }

    fn handle_event(&mut self, event: PersistEvent, callback: &mut dyn PersistCallback) {
        match event {
            PersistEvent::Started(handoff) => {
                callback.on_persisting_started();
                handoff.release();
            }
            PersistEvent::Stopped(success) => {
                self.stopped = Some(success);
                callback.on_persisting_stopped(success);
            }
        }
    }
}

/// State moved onto the persist worker thread.
struct Worker {
    id: String,
    config: PersistConfiguration,
    storage: Arc<dyn StorageGateway>,
    crypto: Arc<dyn CryptoProvider>,
    buffer: Arc<FragmentRingBuffer>,
    state: Arc<Mutex<PersistState>>,
    cancel: CancelToken,
    events: Sender<PersistEvent>,
}

impl Worker {
    fn run(self, snapshot: Option<RecordingSnapshot>) -> Result<PersistReport, CrashCamError> {
        self.set_state(PersistState::WaitingWindow);
        if self.cancel.sleep(self.config.post_trigger_wait()) {
            return Err(self.fail_silently(CrashCamError::Cancelled));
        }

        {
            let mut state = self.state.lock();
            if self.cancel.is_cancelled() {
                *state = PersistState::Failed(CrashCamError::Cancelled);
                return Err(CrashCamError::Cancelled);
            }
            *state = PersistState::AwaitingHandoff;
        }

        let result = self.handoff().and_then(|_| {
            let mut tag = None;
            let result = self.persist(snapshot, &mut tag);
            if result.is_err() {
                self.rollback(tag.as_deref());
            }
            result
        });

        match &result {
            Ok(report) => {
                self.set_state(PersistState::Completed);
                log::info!(
                    "persist job {} completed: {} fragments, {} bytes, sha256 {}",
                    self.id,
                    report.fragment_count,
                    report.encrypted_video_bytes,
                    report.checksum
                );
            }
            Err(e) => {
                self.set_state(PersistState::Failed(e.clone()));
                log::warn!("persist job {} failed ({:?}): {}", self.id, e.class(), e);
            }
        }

        let _ = self.events.send(PersistEvent::Stopped(result.is_ok()));
        result
    }

    fn handoff(&self) -> Result<(), CrashCamError> {
        let (handoff, waiter) = handoff_pair();
        self.events
            .send(PersistEvent::Started(handoff))
            .map_err(|_| CrashCamError::HandoffBroken)?;
        log::debug!("persist job {} waiting for control thread", self.id);
        waiter.wait(self.config.handoff_timeout())
    }

    fn persist(
        &self,
        snapshot: Option<RecordingSnapshot>,
        tag_slot: &mut Option<String>,
    ) -> Result<PersistReport, CrashCamError> {
        let snapshot = snapshot.ok_or(CrashCamError::MissingMetadata)?;
        let tag = snapshot.tag();
        *tag_slot = Some(tag.clone());

        let readable_metadata = self.storage.create_readable_metadata_file(&tag)?;
        metadata::write_snapshot(&snapshot, &readable_metadata)?;

        self.set_state(PersistState::Draining);
        let fragments = self.buffer.drain()?;
        let fragment_paths: Vec<&Path> = fragments.iter().map(|f| f.path()).collect();

        self.set_state(PersistState::Concatenating);
        let concat_video = self.storage.temp_video_file(&self.id)?;
        let summary = concat::concat_video_fragments(&fragment_paths, &concat_video)?;
        log::debug!(
            "persist job {} concatenated {} samples from {} fragments",
            self.id,
            summary.sample_count,
            summary.fragment_count
        );

        self.set_state(PersistState::Encrypting);
        let encrypted_temp = self.storage.temp_video_file(&self.id)?;
        let encrypted_metadata = self.storage.create_encrypted_meta_file(&tag)?;
        let encrypted_key = self.storage.create_encrypted_symmetric_key_file(&tag)?;
        self.crypto
            .encrypt(
                &[concat_video.as_path(), readable_metadata.as_path()],
                &[encrypted_temp.as_path(), encrypted_metadata.as_path()],
                &self.config.public_key,
                &encrypted_key,
            )
            .map_err(CrashCamError::EncryptionFailed)?;

        self.set_state(PersistState::Persisting);
        let encrypted_video = self.storage.create_encrypted_video_file(&tag)?;
        let encrypted_video_bytes =
            copy_chunked(&encrypted_temp, &encrypted_video, self.config.copy_buffer_size)?;
        let checksum = checksum::sha256_file(&encrypted_video)?;

        self.set_state(PersistState::CleaningUp);
        self.storage.delete_current_temp_data(&self.id)?;
        self.buffer.flush_all();

        Ok(PersistReport {
            job_id: self.id.clone(),
            artifacts: ArtifactSet {
                tag,
                readable_metadata,
                encrypted_metadata,
                encrypted_key,
                encrypted_video,
            },
            fragment_count: fragments.len(),
            encrypted_video_bytes,
            checksum,
            algorithm: self.crypto.algorithm().to_string(),
        })
    }

    /// Remove scratch files and any partial artifact set. Fragments stay
    /// buffered.
    fn rollback(&self, tag: Option<&str>) {
        if let Err(e) = self.storage.delete_current_temp_data(&self.id) {
            log::warn!("persist job {}: temp cleanup failed: {}", self.id, e);
        }
        if let Some(tag) = tag {
            if let Err(e) = self.storage.delete_artifact_set(tag) {
                log::warn!("persist job {}: artifact cleanup for {} failed: {}", self.id, tag, e);
            }
        }
    }

    fn fail_silently(&self, error: CrashCamError) -> CrashCamError {
        self.set_state(PersistState::Failed(error.clone()));
        log::info!("persist job {} stopped before handoff: {}", self.id, error);
        error
    }

    fn set_state(&self, new_state: PersistState) {
        log::debug!("persist job {} -> {}", self.id, new_state.name());
        *self.state.lock() = new_state;
    }
}

/// Stream `src` into `dst` through a buffer of `buffer_size` bytes.
fn copy_chunked(src: &Path, dst: &Path, buffer_size: usize) -> Result<u64, CrashCamError> {
    let mut input = File::open(src).map_err(|e| CrashCamError::io("failed to open encrypted video", e))?;
    let mut output =
        File::create(dst).map_err(|e| CrashCamError::io("failed to create encrypted video", e))?;

    let mut buffer = vec![0u8; buffer_size];
    let mut total = 0u64;
    loop {
        let read = match input.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CrashCamError::io("failed to read encrypted video", e)),
        };
        output
            .write_all(&buffer[..read])
            .map_err(|e| CrashCamError::io("failed to write encrypted video", e))?;
        total += read as u64;
    }

    output
        .sync_all()
        .map_err(|e| CrashCamError::io("failed to sync encrypted video", e))?;
    Ok(total)
}
