//! # crashcam-core
//!
//! Platform-agnostic crash camera core library.
//!
//! Keeps the last few seconds of recorded video as a ring of fragment files
//! and, when a trigger fires, persists the window around it as an encrypted
//! artifact set. Platform backends supply fragment write-completion events
//! through the `FragmentWatcher` trait; `PollingWatcher` works everywhere.
//!
//! ## Architecture
//!
//! ```text
//! crashcam-core (this crate)
//! ├── traits/       ← StorageGateway, CryptoProvider, PersistCallback, FragmentWatcher
//! ├── models/       ← CrashCamError, PersistState, configurations, RecordingSnapshot, etc.
//! ├── processing/   ← FragmentRingBuffer, readiness table, fragment container, concatenation
//! ├── pipeline/     ← Persistor / PersistJob (trigger → encrypted artifact set)
//! ├── storage/      ← DirectoryStorage, HybridEncryptor, metadata, checksums
//! └── watch/        ← PollingWatcher
//! ```

pub mod models;
pub mod pipeline;
pub mod processing;
pub mod storage;
pub mod traits;
pub mod watch;

// Re-export key types at crate root for convenience.
pub use models::config::{PersistConfiguration, RingBufferConfiguration};
pub use models::error::{CrashCamError, FailureClass};
pub use models::fragment::FragmentHandle;
pub use models::persist_report::{ArtifactSet, PersistReport};
pub use models::snapshot::{GForce, RecordingSnapshot, TriggerType};
pub use models::state::PersistState;
pub use pipeline::handoff::Handoff;
pub use pipeline::persistor::{PersistEvent, PersistJob, Persistor};
pub use processing::ring_buffer::FragmentRingBuffer;
pub use storage::directory::DirectoryStorage;
pub use storage::hybrid_encryptor::{HybridDecryptor, HybridEncryptor};
pub use traits::crypto_provider::CryptoProvider;
pub use traits::fragment_watcher::{FragmentReadyCallback, FragmentWatcher};
pub use traits::persist_callback::PersistCallback;
pub use traits::storage_gateway::StorageGateway;
pub use watch::polling::PollingWatcher;
