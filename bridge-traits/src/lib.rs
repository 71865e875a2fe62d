//! # Bridge Traits
//!
//! Contracts between the reconciliation engine and everything outside it.
//!
//! ## Overview
//!
//! This crate defines the vendor-neutral data model and the traits the engine
//! depends on. Concrete implementations live in other crates:
//!
//! | Contract | Implementations |
//! |----------|-----------------|
//! | [`HttpClient`](http::HttpClient) | `bridge-native` (reqwest) |
//! | [`VendorResourceClient`](vendor::VendorResourceClient) | `provider-tcloud`, `provider-aws`, `provider-gcp`, `provider-azure`, `provider-huawei` |
//! | [`EipAssociationClient`](vendor::EipAssociationClient) | same provider crates |
//! | [`CmdbClient`](cmdb::CmdbClient) | `bridge-native` (API gateway) |
//!
//! ## Data Model
//!
//! - [`Vendor`](resource::Vendor) / [`ResourceKind`](resource::ResourceKind) - closed enums
//! - [`SyncScope`](resource::SyncScope) - account/region/zone bound of one pass
//! - [`CloudResource`](resource::CloudResource) - one item of a vendor listing
//! - [`Extension`](extension::Extension) - tagged union of vendor schemas
//!
//! ## Error Handling
//!
//! Transport-level failures use [`BridgeError`](error::BridgeError). Vendor
//! clients return [`VendorError`](error::VendorError), which the engine
//! surfaces to its caller unmodified.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync` so implementations can be shared across
//! tokio tasks behind `Arc`.

pub mod cmdb;
pub mod error;
pub mod extension;
pub mod http;
pub mod resource;
pub mod vendor;

pub use error::{BridgeError, VendorError};

// Re-export commonly used types
pub use cmdb::{CmdbClient, CmdbHost, CmdbHostStatus};
pub use extension::{Extension, ExtensionCodec};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use resource::{
    Attachment, CloudResource, RelatedResource, ResourceKind, ResourceRef, SyncScope, Vendor,
    UNASSIGNED_BUSINESS,
};
pub use vendor::{
    EipAssociation, EipAssociationClient, PageToken, ResourcePage, VendorResourceClient,
    VendorResult,
};
