//! Mutation façade: the single entry point for technician-initiated writes.
//!
//! Decides synchronously whether a write goes over the wire now or into the
//! outbox. Callers receive [`MutationOutcome::Queued`] whenever the write was
//! deferred and are expected to surface the "saved offline, will sync later"
//! notice; no retry happens here — recovery is the next sync cycle's job.

use std::sync::Arc;

use fieldserve_core::{JobId, JobStatus};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::api::{ApiError, JobsApi, read_asset_bytes};
use crate::connectivity::ConnectivityProbe;
use crate::store::{MobileStore, StoreError};
use crate::types::{MutationOutcome, OutboxMethod, SyncStatus, UploadAsset, UploadPayload};

#[derive(Debug, Error)]
pub enum MutationError {
    /// The outbox write itself failed; the mutation is lost and the caller
    /// must tell the technician.
    #[error("failed to persist queued mutation: {0}")]
    Store(#[from] StoreError),

    /// The server rejected the mutation outright (4xx) during an immediate
    /// send. Not queued — the caller can correct and resubmit.
    #[error("server rejected the mutation: {0}")]
    Rejected(#[source] ApiError),

    /// The upload's source file could not be read.
    #[error("could not read upload asset {uri}: {source}")]
    Asset {
        uri: String,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct MutationFacade {
    store: Arc<MobileStore>,
    api: Arc<dyn JobsApi>,
    probe: Arc<dyn ConnectivityProbe>,
}

impl MutationFacade {
    pub fn new(
        store: Arc<MobileStore>,
        api: Arc<dyn JobsApi>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        Self { store, api, probe }
    }

    /// Submit a JSON mutation (`POST`/`PUT`).
    ///
    /// Online: send immediately, falling back to the outbox on transport or
    /// 5xx failure. Offline: queue without attempting the call.
    pub async fn submit(
        &self,
        method: OutboxMethod,
        endpoint: &str,
        body: Value,
    ) -> Result<MutationOutcome, MutationError> {
        if !self.probe.is_connected().await {
            let entry = self.store.enqueue_mutation(endpoint, method, &body).await?;
            info!(entry_id = entry.id, endpoint, "offline, mutation queued");
            return Ok(MutationOutcome::Queued);
        }

        match self.api.dispatch(method, endpoint, &body).await {
            Ok(response) => Ok(MutationOutcome::Sent(response)),
            Err(err @ ApiError::Rejected { .. }) => Err(MutationError::Rejected(err)),
            Err(err) => {
                warn!(endpoint, error = %err, "immediate send failed, queueing for next sync");
                self.store.enqueue_mutation(endpoint, method, &body).await?;
                Ok(MutationOutcome::Queued)
            }
        }
    }

    /// Submit a photo upload.
    ///
    /// Online: encode multipart and send now. Queued: persist the asset
    /// reference and fields as JSON under the `UPLOAD` verb; the multipart
    /// encoding happens at replay time, so the file must still exist on
    /// device then.
    pub async fn submit_upload(
        &self,
        endpoint: &str,
        asset: UploadAsset,
        fields: Map<String, Value>,
    ) -> Result<MutationOutcome, MutationError> {
        if self.probe.is_connected().await {
            let bytes = match read_asset_bytes(&asset).await {
                Ok(bytes) => bytes,
                Err(source) => {
                    return Err(MutationError::Asset {
                        uri: asset.uri,
                        source,
                    });
                }
            };

            match self.api.upload(endpoint, &asset, bytes, &fields).await {
                Ok(response) => return Ok(MutationOutcome::Sent(response)),
                Err(err @ ApiError::Rejected { .. }) => return Err(MutationError::Rejected(err)),
                Err(err) => {
                    warn!(endpoint, error = %err, "immediate upload failed, queueing for next sync");
                }
            }
        }

        let body = serde_json::to_value(UploadPayload { asset, fields })?;
        let entry = self
            .store
            .enqueue_mutation(endpoint, OutboxMethod::Upload, &body)
            .await?;
        info!(entry_id = entry.id, endpoint, "upload queued");
        Ok(MutationOutcome::Queued)
    }

    /// Record a status change for a job the technician is working.
    ///
    /// Updates the cached row as well so list/detail screens reflect the
    /// change immediately; a queued change marks the row dirty, which shields
    /// it from the next cache-replacement sweep until the server confirms.
    pub async fn set_job_status(
        &self,
        job: JobId,
        status: JobStatus,
    ) -> Result<MutationOutcome, MutationError> {
        let body = serde_json::json!({ "status": status });
        let outcome = self
            .submit(OutboxMethod::Put, &format!("/jobs/{job}/status"), body)
            .await?;

        let sync_status = match outcome {
            MutationOutcome::Sent(_) => SyncStatus::Synced,
            MutationOutcome::Queued => SyncStatus::Dirty,
        };
        if let Err(err) = self.store.update_job_status(job, status, sync_status).await {
            warn!(job_id = %job, error = %err, "failed to update cached job status");
        }

        Ok(outcome)
    }

    /// Attach a photo (with optional caption) to a job.
    pub async fn attach_job_photo(
        &self,
        job: JobId,
        asset: UploadAsset,
        caption: Option<String>,
    ) -> Result<MutationOutcome, MutationError> {
        let mut fields = Map::new();
        if let Some(caption) = caption {
            fields.insert("caption".to_string(), Value::String(caption));
        }
        self.submit_upload(&format!("/jobs/{job}/photos"), asset, fields)
            .await
    }
}
