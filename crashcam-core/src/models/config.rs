use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a `FragmentRingBuffer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingBufferConfiguration {
    /// Logical capacity in fragments. Never exceeded.
    pub capacity: usize,

    /// Directory the capture subsystem writes fragments into.
    pub directory: PathBuf,

    /// File name prefix for allocated fragment slots (default: "fragment_").
    pub prefix: String,

    /// Fragment file suffix without the dot (default: "ccf").
    pub suffix: String,

    /// Interval between readiness checks while draining.
    pub ready_poll_interval_ms: u64,

    /// Upper bound for a drain to wait on unfinished writes.
    pub drain_timeout_ms: u64,
}

impl RingBufferConfiguration {
    /// Sizes the buffer so that `window` worth of fragments of
    /// `fragment_length` each fits.
    pub fn for_window(directory: PathBuf, window: Duration, fragment_length: Duration) -> Self {
        let fragment_ms = fragment_length.as_millis().max(1);
        let capacity = window.as_millis().div_ceil(fragment_ms).max(1) as usize;
        Self {
            capacity,
            directory,
            ..Default::default()
        }
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("capacity must be positive".into());
        }
        if self.suffix.is_empty() || self.suffix.contains(['.', '/', '\\']) {
            return Err(format!("invalid fragment suffix: {:?}", self.suffix));
        }
        if self.prefix.contains(['/', '\\']) {
            return Err(format!("invalid fragment prefix: {:?}", self.prefix));
        }
        if self.ready_poll_interval_ms == 0 {
            return Err("ready poll interval must be positive".into());
        }
        if self.drain_timeout_ms < self.ready_poll_interval_ms {
            return Err("drain timeout must not be shorter than the poll interval".into());
        }
        Ok(())
    }
}

impl Default for RingBufferConfiguration {
    fn default() -> Self {
        Self {
            capacity: 10,
            directory: PathBuf::from("."),
            prefix: "fragment_".into(),
            suffix: "ccf".into(),
            ready_poll_interval_ms: 100,
            drain_timeout_ms: 30_000,
        }
    }
}

/// Configuration for the persistence pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfiguration {
    /// Recording window straddling the trigger. The pipeline waits half of
    /// it before draining.
    pub buffer_window_ms: u64,

    /// How long the pipeline waits for the control thread to take the handoff.
    pub handoff_timeout_ms: u64,

    /// Chunk size of the final encrypted-video copy.
    pub copy_buffer_size: usize,

    /// X25519 public key the recording is sealed for.
    pub public_key: [u8; 32],
}

impl PersistConfiguration {
    pub fn buffer_window(&self) -> Duration {
        Duration::from_millis(self.buffer_window_ms)
    }

    /// Half of the buffer window (rounded down to whole milliseconds).
    pub fn post_trigger_wait(&self) -> Duration {
        Duration::from_millis(self.buffer_window_ms / 2)
    }

    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_millis(self.handoff_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.handoff_timeout_ms == 0 {
            return Err("handoff timeout must be positive".into());
        }
        if self.copy_buffer_size == 0 {
            return Err("copy buffer size must be positive".into());
        }
        if self.public_key == [0u8; 32] {
            return Err("public key is not set".into());
        }
        Ok(())
    }
}

impl Default for PersistConfiguration {
    fn default() -> Self {
        Self {
            buffer_window_ms: 30_000,
            handoff_timeout_ms: 10_000,
            copy_buffer_size: 1024,
            public_key: [0u8; 32],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_sizing_rounds_up() {
        let config = RingBufferConfiguration::for_window(
            PathBuf::from("/tmp"),
            Duration::from_secs(30),
            Duration::from_secs(4),
        );
        assert_eq!(config.capacity, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_suffix() {
        let config = RingBufferConfiguration {
            suffix: "a/b".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RingBufferConfiguration {
            suffix: ".ccf".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn odd_window_halves_down() {
        let config = PersistConfiguration {
            buffer_window_ms: 9_000,
            ..Default::default()
        };
        assert_eq!(config.post_trigger_wait(), Duration::from_millis(4_500));

        let config = PersistConfiguration {
            buffer_window_ms: 9,
            ..Default::default()
        };
        assert_eq!(config.post_trigger_wait(), Duration::from_millis(4));
    }

    #[test]
    fn unset_public_key_is_rejected() {
        assert!(PersistConfiguration::default().validate().is_err());
        let config = PersistConfiguration {
            public_key: [7u8; 32],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn deserializes_partial_json() {
        let config: PersistConfiguration =
            serde_json::from_str(r#"{"buffer_window_ms": 10000}"#).unwrap();
        assert_eq!(config.buffer_window_ms, 10_000);
        assert_eq!(config.copy_buffer_size, 1024);
    }
}
