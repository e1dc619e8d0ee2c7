//! Shared types for hubble
//!
//! This crate contains the data model passed between the log tokenizer, the
//! event classifier, the Kubernetes log source and the Nexus delivery client.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized second-precision format used for every `event_datetime`
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Serde adapter for `NaiveDateTime` values in [`DATETIME_FORMAT`]
pub mod datetime_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::DATETIME_FORMAT;

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(DATETIME_FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Log Types
// ============================================================================

/// A log line split into timestamp, level and free-text message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedLogRecord {
    /// Source timestamp, truncated to second precision
    pub timestamp: NaiveDateTime,

    /// Level token as written by the node (`INFO`, `WARN`, ...)
    pub level: String,

    /// Remainder of the line
    pub message: String,
}

// ============================================================================
// Event Types
// ============================================================================

/// Name of a classified node event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    Idle,
    Preparing,
    Syncing,
    Pending,
    Claim,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Preparing => "Preparing",
            Self::Syncing => "Syncing",
            Self::Pending => "Pending",
            Self::Claim => "Claim",
        }
    }

    /// Whether this event describes consensus sync state (vs. a claim)
    pub fn is_consensus(&self) -> bool {
        !matches!(self, Self::Claim)
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category an event is grouped under by Nexus
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EventType {
    #[default]
    Node,
    Container,
}

/// Sync-state telemetry carried by Idle/Preparing/Syncing/Pending events
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsensusData {
    pub status: String,
    pub peers: u64,
    pub best: u64,
    /// Only reported while preparing or syncing
    pub target: Option<u64>,
    pub finalized: u64,
    /// Blocks per second, only when the node prints it
    pub bps: Option<f64>,
    pub down_speed: f64,
    pub down_unit: String,
    pub up_speed: f64,
    pub up_unit: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClaimType {
    Vote,
    #[default]
    Block,
}

/// Block proposal or vote claimed for a slot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimData {
    pub slot: u64,
    pub claim_type: ClaimType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventData {
    Consensus(ConsensusData),
    Claim(ClaimData),
}

/// A typed telemetry record extracted from one log line
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    #[serde(rename = "event_name")]
    pub name: EventName,

    #[serde(rename = "event_type")]
    pub kind: EventType,

    #[serde(rename = "event_level")]
    pub level: String,

    #[serde(rename = "event_datetime", with = "datetime_format")]
    pub datetime: NaiveDateTime,

    /// Entity name the event is grouped and queried under
    #[serde(rename = "event_source")]
    pub source: String,

    #[serde(rename = "event_data")]
    pub data: EventData,
}

/// Where tailing restarts after a process restart
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ResumeCursor {
    /// No prior event known, read the whole log
    #[default]
    Epoch,
    /// Datetime of the most recently acknowledged event
    At(NaiveDateTime),
}

impl ResumeCursor {
    /// Cutoff to hand to a log source (`None` means from the beginning)
    pub fn since(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Epoch => None,
            Self::At(ts) => Some(ts.and_utc()),
        }
    }
}

impl std::fmt::Display for ResumeCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Epoch => f.write_str("epoch"),
            Self::At(ts) => write!(f, "{}", ts.format(DATETIME_FORMAT)),
        }
    }
}

/// Result of one push to the event endpoint
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryOutcome {
    /// Only a `201 Created` response counts as acknowledged
    pub acknowledged: bool,
    pub status: u16,
    pub raw_response: String,
}

// ============================================================================
// Kubernetes Resource Types
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PodStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

impl From<&str> for PodStatus {
    fn from(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub name: String,
    pub image: Option<String>,
    pub ready: bool,
    pub restart_count: i32,
}

impl ContainerInfo {
    pub fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }
}

/// Pod information
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub status: PodStatus,
    pub containers: Vec<ContainerInfo>,
    pub node_name: Option<String>,
    pub pod_ip: Option<String>,
    pub host_ip: Option<String>,
    #[serde(default, with = "optional_datetime_format")]
    pub started_at: Option<NaiveDateTime>,
}

impl PodInfo {
    pub fn new(name: String, namespace: String) -> Self {
        Self {
            name,
            namespace,
            ..Default::default()
        }
    }
}

mod optional_datetime_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::DATETIME_FORMAT;

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.collect_str(&ts.format(DATETIME_FORMAT)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerEventName {
    #[serde(rename = "Register Container")]
    Register,
    #[serde(rename = "Update Container")]
    Update,
}

/// Resource snapshot reported alongside the pod
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    /// Address of the host the agent was told it runs on
    pub server_ip: Option<String>,
    #[serde(flatten)]
    pub pod: PodInfo,
}

/// Periodic resource report for the monitored pod
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContainerEvent {
    #[serde(rename = "event_name")]
    pub name: ContainerEventName,

    #[serde(rename = "event_type")]
    pub kind: EventType,

    #[serde(rename = "event_level")]
    pub level: String,

    #[serde(rename = "event_datetime", with = "datetime_format")]
    pub datetime: NaiveDateTime,

    #[serde(rename = "event_source")]
    pub source: String,

    #[serde(rename = "event_data")]
    pub data: ContainerSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_classified_event_wire_format() {
        let event = ClassifiedEvent {
            name: EventName::Claim,
            kind: EventType::Node,
            level: "INFO".to_string(),
            datetime: at(12, 30, 5),
            source: "node-0".to_string(),
            data: EventData::Claim(ClaimData {
                slot: 42,
                claim_type: ClaimType::Vote,
            }),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_name"], "Claim");
        assert_eq!(value["event_type"], "Node");
        assert_eq!(value["event_datetime"], "2024-01-01 12:30:05");
        assert_eq!(value["event_source"], "node-0");
        assert_eq!(value["event_data"]["slot"], 42);
        assert_eq!(value["event_data"]["claim_type"], "Vote");
    }

    #[test]
    fn test_consensus_nulls_serialize() {
        let data = EventData::Consensus(ConsensusData {
            status: "Idle".to_string(),
            peers: 5,
            best: 1234,
            target: None,
            finalized: 1230,
            bps: None,
            down_speed: 12.3,
            down_unit: "kiB/s".to_string(),
            up_speed: 4.5,
            up_unit: "kiB/s".to_string(),
        });

        let value = serde_json::to_value(&data).unwrap();
        assert!(value["target"].is_null());
        assert!(value["bps"].is_null());
        assert_eq!(value["down_unit"], "kiB/s");
    }

    #[test]
    fn test_resume_cursor_since() {
        assert_eq!(ResumeCursor::Epoch.since(), None);
        let cursor = ResumeCursor::At(at(0, 0, 0));
        assert_eq!(cursor.since().unwrap().to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(cursor.to_string(), "2024-01-01 00:00:00");
    }

    #[test]
    fn test_container_event_names() {
        let value = serde_json::to_value(ContainerEventName::Register).unwrap();
        assert_eq!(value, "Register Container");
        assert!(EventName::Idle.is_consensus());
        assert!(!EventName::Claim.is_consensus());
    }

    #[test]
    fn test_pod_status_from_phase() {
        assert_eq!(PodStatus::from("Running"), PodStatus::Running);
        assert_eq!(PodStatus::from("CrashLoopBackOff"), PodStatus::Unknown);
    }
}
