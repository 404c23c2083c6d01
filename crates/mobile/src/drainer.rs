//! Outbox drainer: replays queued mutations oldest-first.
//!
//! Each entry is independent: a transient failure defers that entry to the
//! next sync cycle without aborting the pass, so the queue can develop gaps
//! (entry N deferred, entry N+1 delivered). A definitive rejection moves the
//! entry to the failed-mutation table — a poisoned head must never block
//! everything behind it.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::{ApiError, JobsApi, read_asset_bytes};
use crate::connectivity::ConnectivityProbe;
use crate::store::{MobileStore, StoreError};
use crate::types::{DrainReport, OutboxEntry, OutboxMethod, UploadPayload};

/// Why a replay did not deliver.
enum ReplayFailure {
    /// Transport or 5xx; the entry stays queued for the next cycle.
    Transient(ApiError),
    /// The server will never accept this entry (4xx), or it is unreplayable
    /// (missing upload file, corrupt payload). `status` is the HTTP code
    /// when one exists.
    Permanent {
        status: Option<u16>,
        detail: String,
    },
}

pub struct OutboxDrainer {
    store: Arc<MobileStore>,
    api: Arc<dyn JobsApi>,
    probe: Arc<dyn ConnectivityProbe>,
}

impl OutboxDrainer {
    pub fn new(
        store: Arc<MobileStore>,
        api: Arc<dyn JobsApi>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        Self { store, api, probe }
    }

    /// Run one drain pass. No-op when offline.
    ///
    /// Entries are attempted strictly in enqueue order, one attempt each.
    pub async fn drain(&self) -> Result<DrainReport, StoreError> {
        if !self.probe.is_connected().await {
            debug!("offline, skipping outbox drain");
            return Ok(DrainReport::default());
        }

        let entries = self.store.pending_mutations().await?;
        let mut report = DrainReport::default();

        for entry in entries {
            report.attempted += 1;

            match self.replay(&entry).await {
                Ok(_) => {
                    self.store.delete_mutation(entry.id).await?;
                    report.delivered += 1;
                    debug!(entry_id = entry.id, url = %entry.url, "queued mutation delivered");
                }
                Err(ReplayFailure::Permanent { status, detail }) => {
                    warn!(
                        entry_id = entry.id,
                        url = %entry.url,
                        status = ?status,
                        "mutation definitively rejected, parking in failed queue"
                    );
                    self.store.record_failed(&entry, status, &detail).await?;
                    self.store.delete_mutation(entry.id).await?;
                    report.rejected += 1;
                }
                Err(ReplayFailure::Transient(err)) => {
                    warn!(
                        entry_id = entry.id,
                        url = %entry.url,
                        error = %err,
                        "replay failed, leaving entry for next cycle"
                    );
                    report.deferred += 1;
                }
            }
        }

        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                delivered = report.delivered,
                rejected = report.rejected,
                deferred = report.deferred,
                "outbox drain finished"
            );
        }

        Ok(report)
    }

    async fn replay(&self, entry: &OutboxEntry) -> Result<Value, ReplayFailure> {
        match entry.method {
            OutboxMethod::Upload => self.replay_upload(entry).await,
            method => self
                .api
                .dispatch(method, &entry.url, &entry.body)
                .await
                .map_err(classify),
        }
    }

    /// Re-encode a queued upload into multipart now. The binary data lives on
    /// the device filesystem, not in the queue row, so the file has to still
    /// be there.
    async fn replay_upload(&self, entry: &OutboxEntry) -> Result<Value, ReplayFailure> {
        let payload: UploadPayload =
            serde_json::from_value(entry.body.clone()).map_err(|e| ReplayFailure::Permanent {
                status: None,
                detail: format!("corrupt upload payload: {e}"),
            })?;

        let bytes = read_asset_bytes(&payload.asset)
            .await
            .map_err(|e| ReplayFailure::Permanent {
                status: None,
                detail: format!("upload source {} unreadable: {e}", payload.asset.uri),
            })?;

        self.api
            .upload(&entry.url, &payload.asset, bytes, &payload.fields)
            .await
            .map_err(classify)
    }
}

fn classify(err: ApiError) -> ReplayFailure {
    match err {
        ApiError::Rejected { status, detail } => ReplayFailure::Permanent {
            status: Some(status),
            detail,
        },
        other => ReplayFailure::Transient(other),
    }
}
