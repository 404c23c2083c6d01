//! Sync orchestrator: one push-before-pull cycle against the platform API.
//!
//! The engine never merges server state with local state. A successful pull
//! wholesale-replaces the server-confirmed cache rows; everything else falls
//! back to whatever the cache already holds. Storage and remote failures are
//! handled here — nothing propagates to the UI layer except through the
//! returned summary.

use std::sync::Arc;

use fieldserve_core::TechnicianId;
use tracing::{debug, error, info, warn};

use crate::api::JobsApi;
use crate::connectivity::ConnectivityProbe;
use crate::drainer::OutboxDrainer;
use crate::store::{MobileStore, StoreError};
use crate::types::{CachedJob, DrainReport, JobRecord};

/// What one sync cycle did.
#[derive(Debug, Clone)]
pub struct SyncSummary {
    /// The job list to show: fresh after a successful pull, cached otherwise.
    pub jobs: Vec<CachedJob>,
    /// Outbox accounting, when a drain ran.
    pub drain: Option<DrainReport>,
    /// True when the cache was replaced from the server this cycle.
    pub refreshed: bool,
}

pub struct SyncEngine {
    store: Arc<MobileStore>,
    api: Arc<dyn JobsApi>,
    probe: Arc<dyn ConnectivityProbe>,
    drainer: OutboxDrainer,
    // Serializes overlapping sync requests: a second caller awaits the
    // first's completion instead of interleaving drains and cache sweeps.
    in_flight: tokio::sync::Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<MobileStore>,
        api: Arc<dyn JobsApi>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        let drainer = OutboxDrainer::new(store.clone(), api.clone(), probe.clone());
        Self {
            store,
            api,
            probe,
            drainer,
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one full sync cycle for a technician.
    ///
    /// Offline: no outbox or cache mutation, serves the existing cache.
    /// Online: drain the outbox first (so local edits are not clobbered by
    /// the pull), then fetch the authoritative job list and replace the
    /// server-confirmed cache rows.
    pub async fn sync_cycle(&self, technician: TechnicianId) -> SyncSummary {
        let _guard = self.in_flight.lock().await;

        if !self.probe.is_connected().await {
            debug!("offline, serving cached jobs");
            return SyncSummary {
                jobs: self.cached_or_empty().await,
                drain: None,
                refreshed: false,
            };
        }

        let drain = match self.drainer.drain().await {
            Ok(report) => Some(report),
            Err(err) => {
                error!(error = %err, "outbox drain failed");
                None
            }
        };

        let refreshed = match self.api.fetch_jobs(technician).await {
            Ok(records) => match self.refresh_cache(&records).await {
                Ok(()) => {
                    info!(jobs = records.len(), "job cache refreshed from server");
                    true
                }
                Err(err) => {
                    error!(error = %err, "failed to refresh job cache");
                    false
                }
            },
            Err(err) => {
                warn!(error = %err, "job fetch failed, falling back to cached jobs");
                false
            }
        };

        SyncSummary {
            jobs: self.cached_or_empty().await,
            drain,
            refreshed,
        }
    }

    /// Read the cache, degrading to an empty list on storage failure.
    pub async fn cached_or_empty(&self) -> Vec<CachedJob> {
        match self.store.cached_jobs().await {
            Ok(jobs) => jobs,
            Err(err) => {
                error!(error = %err, "failed to read job cache");
                Vec::new()
            }
        }
    }

    async fn refresh_cache(&self, records: &[JobRecord]) -> Result<(), StoreError> {
        let mut fresh = Vec::with_capacity(records.len());
        for record in records {
            fresh.push(CachedJob::from_record(record)?);
        }
        self.store.replace_synced_jobs(&fresh).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::api::mocks::{FakeJobsApi, RecordedCall};
    use crate::connectivity::mocks::StaticProbe;
    use crate::types::{OutboxMethod, SyncStatus};
    use chrono::{TimeZone, Utc};
    use fieldserve_core::{JobId, JobStatus, TechnicianId};
    use serde_json::json;
    use std::time::Duration;

    fn record(hour: u32) -> JobRecord {
        JobRecord {
            id: JobId::new(),
            scheduled_at: Utc.with_ymd_and_hms(2025, 6, 12, hour, 0, 0).unwrap(),
            status: JobStatus::Scheduled,
            description: "termite inspection".to_string(),
            client_name: "Okafor".to_string(),
            address: "3 Mill Creek Dr".to_string(),
            extra: serde_json::Map::new(),
        }
    }

    fn setup(probe: StaticProbe) -> (Arc<FakeJobsApi>, Arc<StaticProbe>) {
        (Arc::new(FakeJobsApi::new()), Arc::new(probe))
    }

    async fn engine(
        api: &Arc<FakeJobsApi>,
        probe: &Arc<StaticProbe>,
    ) -> (Arc<MobileStore>, SyncEngine) {
        let store = Arc::new(MobileStore::open_in_memory().await.unwrap());
        let engine = SyncEngine::new(store.clone(), api.clone(), probe.clone());
        (store, engine)
    }

    #[tokio::test]
    async fn offline_cycle_leaves_cache_untouched() {
        let (api, probe) = setup(StaticProbe::offline());
        let (store, engine) = engine(&api, &probe).await;

        let cached = CachedJob::from_record(&record(9)).unwrap();
        store.upsert_job(&cached).await.unwrap();
        let before = store.cached_jobs().await.unwrap();

        let summary = engine.sync_cycle(TechnicianId::new()).await;

        assert!(!summary.refreshed);
        assert!(summary.drain.is_none());
        assert_eq!(summary.jobs, before);
        assert_eq!(store.cached_jobs().await.unwrap(), before);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn successful_pull_replaces_cache_exactly() {
        let (api, probe) = setup(StaticProbe::online());
        let (store, engine) = engine(&api, &probe).await;

        let stale = CachedJob::from_record(&record(8)).unwrap();
        store.upsert_job(&stale).await.unwrap();

        let fresh = vec![record(10), record(14)];
        api.set_jobs(fresh.clone());

        let summary = engine.sync_cycle(TechnicianId::new()).await;

        assert!(summary.refreshed);
        let ids: Vec<_> = summary.jobs.iter().map(|j| j.id).collect();
        let expected: Vec<_> = fresh.iter().map(|r| r.id).collect();
        assert_eq!(ids, expected);
        assert!(!ids.contains(&stale.id));
    }

    #[tokio::test]
    async fn fetch_failure_falls_back_to_cache() {
        let (api, probe) = setup(StaticProbe::online());
        let (store, engine) = engine(&api, &probe).await;

        let cached = CachedJob::from_record(&record(9)).unwrap();
        store.upsert_job(&cached).await.unwrap();
        api.fail_fetch_with(ApiError::Server { status: 502 });

        let summary = engine.sync_cycle(TechnicianId::new()).await;

        assert!(!summary.refreshed);
        assert_eq!(summary.jobs.len(), 1);
        assert_eq!(summary.jobs[0].id, cached.id);
    }

    #[tokio::test]
    async fn outbox_is_drained_before_the_pull() {
        let (api, probe) = setup(StaticProbe::online());
        let (store, engine) = engine(&api, &probe).await;

        store
            .enqueue_mutation("/jobs/1/status", OutboxMethod::Put, &json!({"status": "EN_ROUTE"}))
            .await
            .unwrap();

        let summary = engine.sync_cycle(TechnicianId::new()).await;

        assert_eq!(summary.drain.map(|d| d.delivered), Some(1));

        let calls = api.calls();
        assert!(matches!(calls[0], RecordedCall::Dispatch { .. }));
        assert!(matches!(calls[1], RecordedCall::Fetch { .. }));
    }

    #[tokio::test]
    async fn dirty_rows_survive_the_pull() {
        let (api, probe) = setup(StaticProbe::online());
        let (store, engine) = engine(&api, &probe).await;

        let mut dirty = CachedJob::from_record(&record(7)).unwrap();
        dirty.status = JobStatus::InProgress;
        dirty.sync_status = SyncStatus::Dirty;
        store.upsert_job(&dirty).await.unwrap();

        api.set_jobs(vec![record(11)]);

        let summary = engine.sync_cycle(TechnicianId::new()).await;

        let ids: Vec<_> = summary.jobs.iter().map(|j| j.id).collect();
        assert!(ids.contains(&dirty.id));
        assert_eq!(summary.jobs.len(), 2);
    }

    #[tokio::test]
    async fn overlapping_cycles_are_serialized() {
        let (api, probe) = setup(StaticProbe::online());
        let (_store, engine) = engine(&api, &probe).await;

        api.slow_fetch(Duration::from_millis(20));

        let technician = TechnicianId::new();
        tokio::join!(
            engine.sync_cycle(technician),
            engine.sync_cycle(technician)
        );

        assert_eq!(api.max_concurrent_fetches(), 1);
        assert_eq!(api.calls().len(), 2);
    }
}
