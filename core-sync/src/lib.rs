//! # Sync Engine
//!
//! Reconciles the stored inventory with what each cloud vendor reports.
//!
//! ## Components
//!
//! - **Diff Engine** (`diff`): pure partition of cloud and stored snapshots
//! - **Sync Job State Machine** (`job`): validated phase transitions of a pass
//! - **Repository** (`repository`): persisted job history
//! - **Vendor Registry** (`registry`): `(vendor, kind)` to listing client
//! - **Sync Orchestrator** (`orchestrator`): fetch, diff and apply one pass
//! - **Relationship Propagator** (`relation`): re-derives resource/CVM edges
//! - **CVM Cascade** (`cascade`): instances with related resources, EIP binding
//! - **CMDB Bridge** (`cmdb`): mirrors converged hosts to the business CMDB

pub mod cascade;
pub mod cmdb;
pub mod diff;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod registry;
pub mod relation;
pub mod repository;

pub use cascade::{CascadeReport, CvmCascade};
pub use cmdb::CmdbBridge;
pub use diff::{diff, ChangePredicate, CloudSnapshot, FieldsChanged, StatusChanged, SyncPlan};
pub use error::{Result, SyncError};
pub use job::{SyncJob, SyncJobId, SyncPhase, SyncStats};
pub use orchestrator::{SyncOptions, SyncOrchestrator, SyncReport};
pub use registry::{VendorRegistry, VendorRegistryBuilder};
pub use relation::{EdgeDelta, RelationPropagator};
pub use repository::{SqliteSyncJobRepository, SyncJobRepository};
