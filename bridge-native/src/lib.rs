//! # Native Bridge Implementations
//!
//! Default implementations of bridge traits for server hosts.
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` (rustls, pooled connections)
//! - `CmdbClient` using the BlueKing API gateway over that HTTP client
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_native::{GatewayAuth, GatewayCmdbClient, ReqwestHttpClient};
//! use std::sync::Arc;
//!
//! let http = Arc::new(ReqwestHttpClient::new()?);
//! let cmdb = GatewayCmdbClient::new(http.clone(), "https://bkapi.example.com/api/cmdb", auth);
//! ```

mod cmdb;
mod http;

pub use cmdb::{GatewayAuth, GatewayCmdbClient};
pub use http::ReqwestHttpClient;
