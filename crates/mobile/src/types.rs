//! Shared types for the offline engine.
//!
//! Plain serde types only: everything here is persisted to the local store or
//! exchanged with the platform API, and must stay free of storage/network
//! dependencies.

use chrono::{DateTime, Utc};
use fieldserve_core::{JobId, JobStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sync marker of a cached job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Row mirrors the server state as of the last pull.
    Synced,
    /// Row was modified locally while a queued mutation is outstanding;
    /// excluded from the cache-replacement sweep.
    Dirty,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Dirty => "dirty",
        }
    }
}

/// A job record as returned by the platform API.
///
/// Matches the dispatch endpoint's response shape; fields the engine does not
/// interpret are captured in `extra` so the full payload survives the round
/// trip into the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub scheduled_at: DateTime<Utc>,
    pub status: JobStatus,
    #[serde(default)]
    pub description: String,
    pub client_name: String,
    pub address: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A denormalized job snapshot cached on the device.
///
/// One row per job id. `details` holds the full original payload for detail
/// views; the flat columns exist so list screens never touch JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedJob {
    pub id: JobId,
    pub scheduled_at: DateTime<Utc>,
    pub status: JobStatus,
    pub description: String,
    pub client_name: String,
    pub address: String,
    pub details: Value,
    pub sync_status: SyncStatus,
}

impl CachedJob {
    /// Build a server-confirmed cache row from an API record.
    pub fn from_record(record: &JobRecord) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: record.id,
            scheduled_at: record.scheduled_at,
            status: record.status,
            description: record.description.clone(),
            client_name: record.client_name.clone(),
            address: record.address.clone(),
            details: serde_json::to_value(record)?,
            sync_status: SyncStatus::Synced,
        })
    }
}

/// HTTP verb of a queued mutation (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutboxMethod {
    Post,
    Put,
    /// Multipart photo upload; the queue row holds the asset reference and
    /// text fields, encoding happens at replay time.
    Upload,
}

impl OutboxMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxMethod::Post => "POST",
            OutboxMethod::Put => "PUT",
            OutboxMethod::Upload => "UPLOAD",
        }
    }
}

impl core::str::FromStr for OutboxMethod {
    type Err = fieldserve_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "POST" => Ok(OutboxMethod::Post),
            "PUT" => Ok(OutboxMethod::Put),
            "UPLOAD" => Ok(OutboxMethod::Upload),
            other => Err(fieldserve_core::DomainError::validation(format!(
                "unknown outbox method: {other}"
            ))),
        }
    }
}

/// A durable record of one not-yet-confirmed mutation.
///
/// Entries are immutable once written; they are removed by the drainer after
/// a confirmed success or moved to [`FailedMutation`] on definitive
/// rejection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: i64,
    pub url: String,
    pub method: OutboxMethod,
    pub body: Value,
    pub created_at: DateTime<Utc>,
}

/// Reference to a binary asset on the device plus its text fields, queued for
/// a deferred multipart upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadAsset {
    /// Local file location (`file://...` or a plain path).
    pub uri: String,
    pub file_name: String,
    pub mime_type: String,
}

/// JSON body of an `UPLOAD` outbox entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadPayload {
    pub asset: UploadAsset,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// A mutation the server definitively rejected, parked for inspection.
///
/// `status_code` is `None` when no HTTP exchange happened (e.g. the upload's
/// source file disappeared before replay).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedMutation {
    pub id: i64,
    pub url: String,
    pub method: OutboxMethod,
    pub body: Value,
    pub status_code: Option<u16>,
    pub detail: String,
    pub failed_at: DateTime<Utc>,
}

/// Result of a write submitted through the mutation façade.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// Delivered immediately; carries the server response body.
    Sent(Value),
    /// Persisted to the outbox; the UI should show the "saved offline, will
    /// sync later" notice.
    Queued,
}

/// Per-pass accounting of an outbox drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub attempted: usize,
    pub delivered: usize,
    pub rejected: usize,
    pub deferred: usize,
}
