//! `fieldserve-mobile`
//!
//! **Responsibility:** the technician mobile client's offline queue & sync
//! engine.
//!
//! This crate provides:
//! - A local SQLite store holding the job read cache and the durable outbox
//! - A connectivity probe against the platform API
//! - A mutation façade (send now or queue for later)
//! - An outbox drainer replaying queued mutations oldest-first
//! - A sync orchestrator (push-before-pull, cache replacement, offline
//!   fallback)
//! - A badge worker publishing the pending-mutation count for the UI
//!
//! The mobile client is a **thin shell** around the FieldServe API: the
//! server stays authoritative, the local cache is a fallback for reads, and
//! the outbox is the only durable record of unconfirmed writes.

pub mod api;
pub mod config;
pub mod connectivity;
pub mod drainer;
pub mod facade;
pub mod state;
pub mod store;
pub mod sync;
pub mod types;
pub mod worker;

pub use api::{ApiError, HttpJobsApi, JobsApi};
pub use config::MobileConfig;
pub use connectivity::{ConnectivityProbe, HttpProbe};
pub use drainer::OutboxDrainer;
pub use facade::{MutationError, MutationFacade};
pub use state::MobileState;
pub use store::{MobileStore, StoreError};
pub use sync::{SyncEngine, SyncSummary};
pub use types::{
    CachedJob, DrainReport, FailedMutation, JobRecord, MutationOutcome, OutboxEntry, OutboxMethod,
    SyncStatus, UploadAsset, UploadPayload,
};
pub use worker::BadgeWorker;
