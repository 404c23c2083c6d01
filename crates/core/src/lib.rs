//! `fieldserve-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns)
//! shared by the FieldServe platform crates: strongly-typed identifiers, the
//! job status state set, and the domain error model.

pub mod error;
pub mod id;
pub mod job;

pub use error::{DomainError, DomainResult};
pub use id::{ClientId, JobId, TechnicianId};
pub use job::JobStatus;
