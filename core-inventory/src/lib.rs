//! # Inventory Store
//!
//! System of record for resources discovered across cloud vendors.
//!
//! ## Overview
//!
//! This crate owns:
//! - SQLite schema and migrations for EIP, CVM, disk and network interface records
//! - Relationship edges linking each resource kind to CVM
//! - Repository traits the sync engine writes through
//! - Paged listing with conjunctive filters

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{InventoryError, Result};
pub use models::{
    resource_table, NewRelation, NewResource, RelationFilter, RelationKind, RelationRecord,
    ResourceFilter, ResourceRecord, ResourceUpdate,
};
pub use repositories::{
    Page, PageRequest, RelationStore, ResourceStore, SqliteRelationStore, SqliteResourceStore,
};
