use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// What caused the recording to be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    /// Acceleration exceeded the configured threshold.
    Automatic,
    /// The user pressed the record button.
    Manual,
}

/// Acceleration at trigger time, in g.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GForce {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Metadata captured when a recording is triggered.
///
/// Immutable once handed to the pipeline. Its timestamp names the
/// persisted artifact set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSnapshot {
    /// Milliseconds since the Unix epoch.
    pub date: i64,
    pub trigger_type: TriggerType,
    pub g_force: GForce,
}

impl RecordingSnapshot {
    pub fn new(date: i64, trigger_type: TriggerType, g_force: GForce) -> Self {
        Self {
            date,
            trigger_type,
            g_force,
        }
    }

    /// Snapshot stamped with the current time.
    pub fn now(trigger_type: TriggerType, g_force: GForce) -> Self {
        Self::new(Utc::now().timestamp_millis(), trigger_type, g_force)
    }

    /// Tag naming the artifact set of this recording.
    pub fn tag(&self) -> String {
        self.date.to_string()
    }

    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.date).single()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_is_timestamp() {
        let snapshot = RecordingSnapshot::new(1_484_059_480_000, TriggerType::Manual, GForce::default());
        assert_eq!(snapshot.tag(), "1484059480000");
        assert_eq!(snapshot.recorded_at().map(|d| d.timestamp()), Some(1_484_059_480));
    }

    #[test]
    fn json_field_names() {
        let snapshot = RecordingSnapshot::new(
            42,
            TriggerType::Automatic,
            GForce { x: 0.5, y: -1.0, z: 9.0 },
        );
        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(json["date"], 42);
        assert_eq!(json["triggerType"], "automatic");
        assert_eq!(json["gForce"]["y"], -1.0);
    }
}
