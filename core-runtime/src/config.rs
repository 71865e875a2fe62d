//! # Engine Configuration Module
//!
//! Configuration for the reconciliation engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct an
//! [`EngineConfig`] holding the dependencies and settings of the engine. It
//! validates fail-fast so a misconfigured host stops at startup rather than in
//! the middle of a sync pass.
//!
//! ## Required Settings
//!
//! - `database_path` - SQLite system-of-record file
//!
//! ## Optional Settings (with defaults)
//!
//! - `HttpClient` - shared by vendor adapters and the CMDB client
//!   (native default: reqwest, behind the `native-shims` feature)
//! - [`SyncSettings`] - page sizes, chunking and per-call timeouts
//! - [`CmdbSettings`] - CMDB gateway; forwarding is skipped when absent
//! - [`VendorSettings`] - per-vendor credentials; vendors without credentials
//!   are not registered
//!
//! Every settings struct derives `Deserialize` so hosts can load them from a
//! JSON document.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{EngineConfig, TCloudCredentials, VendorSettings};
//!
//! let config = EngineConfig::builder()
//!     .database_path("/var/lib/hcm/inventory.db")
//!     .vendors(VendorSettings {
//!         tcloud: Some(TCloudCredentials::new("AKID...", "secret")),
//!         ..Default::default()
//!     })
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::http::HttpClient;
use bridge_traits::resource::{Vendor, CLOUD_ID_FILTER_LIMIT};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default number of store records fetched per page when loading a snapshot.
pub const DEFAULT_STORE_PAGE_SIZE: u32 = 500;

/// Default upper bound of one vendor call.
pub const DEFAULT_VENDOR_CALL_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Engine Config
// ============================================================================

/// Engine configuration. Use [`EngineConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct EngineConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// HTTP client used by vendor adapters and the CMDB client
    pub http_client: Arc<dyn HttpClient>,

    pub sync: SyncSettings,

    /// CMDB gateway (forwarding disabled when `None`)
    pub cmdb: Option<CmdbSettings>,

    pub vendors: VendorSettings,
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("database_path", &self.database_path)
            .field("http_client", &"HttpClient { ... }")
            .field("sync", &self.sync)
            .field("cmdb", &self.cmdb)
            .field("vendors", &self.vendors)
            .finish()
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - Sync settings are within bounds
    /// - CMDB settings are complete when present
    /// - At least one vendor has credentials
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        self.sync.validate()?;

        if let Some(cmdb) = &self.cmdb {
            cmdb.validate()?;
        }

        self.vendors.validate()?;

        if self.vendors.configured().is_empty() {
            return Err(Error::Config(
                "No vendor credentials configured. Provide at least one entry in VendorSettings."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Sync Settings
// ============================================================================

/// Tuning knobs of the sync orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Records per page when loading the stored snapshot
    pub store_page_size: u32,
    /// Cloud ids per vendor query in scoped re-syncs and verification
    pub cloud_id_chunk_size: usize,
    /// Upper bound of every single vendor call
    #[serde(with = "duration_secs")]
    pub vendor_call_timeout: Duration,
    /// Re-query the vendor before deleting records it no longer lists
    pub verify_before_delete: bool,
    /// Reconcile relationship edges after each successful pass
    pub propagate_relations: bool,
    /// Mirror converged hosts to the CMDB after each successful pass
    pub forward_to_cmdb: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            store_page_size: DEFAULT_STORE_PAGE_SIZE,
            cloud_id_chunk_size: CLOUD_ID_FILTER_LIMIT,
            vendor_call_timeout: DEFAULT_VENDOR_CALL_TIMEOUT,
            verify_before_delete: true,
            propagate_relations: true,
            forward_to_cmdb: true,
        }
    }
}

impl SyncSettings {
    pub fn with_store_page_size(mut self, size: u32) -> Self {
        self.store_page_size = size;
        self
    }

    pub fn with_vendor_call_timeout(mut self, timeout: Duration) -> Self {
        self.vendor_call_timeout = timeout;
        self
    }

    pub fn with_verify_before_delete(mut self, enabled: bool) -> Self {
        self.verify_before_delete = enabled;
        self
    }

    pub fn with_propagate_relations(mut self, enabled: bool) -> Self {
        self.propagate_relations = enabled;
        self
    }

    pub fn with_forward_to_cmdb(mut self, enabled: bool) -> Self {
        self.forward_to_cmdb = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.store_page_size == 0 || self.store_page_size > 1000 {
            return Err(Error::Config(format!(
                "store_page_size must be within 1..=1000 (got {})",
                self.store_page_size
            )));
        }

        if self.cloud_id_chunk_size == 0 || self.cloud_id_chunk_size > CLOUD_ID_FILTER_LIMIT {
            return Err(Error::Config(format!(
                "cloud_id_chunk_size must be within 1..={} (got {})",
                CLOUD_ID_FILTER_LIMIT, self.cloud_id_chunk_size
            )));
        }

        if self.vendor_call_timeout.is_zero() {
            return Err(Error::Config(
                "vendor_call_timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

// ============================================================================
// CMDB Settings
// ============================================================================

/// API gateway settings of the downstream CMDB.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct CmdbSettings {
    pub endpoint: String,
    pub app_code: String,
    pub app_secret: String,
    pub username: String,
}

impl fmt::Debug for CmdbSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmdbSettings")
            .field("endpoint", &self.endpoint)
            .field("app_code", &self.app_code)
            .field("app_secret", &"***")
            .field("username", &self.username)
            .finish()
    }
}

impl CmdbSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(Error::Config(format!(
                "CMDB endpoint must be an http(s) URL (got '{}')",
                self.endpoint
            )));
        }
        if self.app_code.is_empty() || self.app_secret.is_empty() {
            return Err(Error::Config(
                "CMDB app_code and app_secret are required".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Vendor Settings
// ============================================================================

/// TencentCloud API key pair.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TCloudCredentials {
    pub secret_id: String,
    pub secret_key: String,
    /// Override of the `tencentcloudapi.com` root domain
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl TCloudCredentials {
    pub fn new(secret_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
            endpoint: None,
        }
    }
}

/// AWS IAM access key.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
    /// Override of the regional EC2 endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            endpoint: None,
        }
    }
}

/// GCP project with a pre-issued OAuth access token.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct GcpCredentials {
    pub project_id: String,
    pub access_token: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl GcpCredentials {
    pub fn new(project_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            access_token: access_token.into(),
            endpoint: None,
        }
    }
}

/// Azure subscription with a pre-issued ARM access token.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AzureCredentials {
    pub subscription_id: String,
    pub access_token: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl AzureCredentials {
    pub fn new(subscription_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            access_token: access_token.into(),
            endpoint: None,
        }
    }
}

/// HuaWei Cloud AK/SK pair scoped to a project.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct HuaWeiCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub project_id: String,
    /// Override of the `myhuaweicloud.com` root domain
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl HuaWeiCredentials {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            project_id: project_id.into(),
            endpoint: None,
        }
    }
}

macro_rules! redacted_debug {
    ($ty:ident, [$($plain:ident),*], [$($secret:ident),*]) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty))
                    $(.field(stringify!($plain), &self.$plain))*
                    $(.field(stringify!($secret), &"***"))*
                    .finish()
            }
        }
    };
}

redacted_debug!(TCloudCredentials, [secret_id, endpoint], [secret_key]);
redacted_debug!(AwsCredentials, [access_key_id, endpoint], [secret_access_key, session_token]);
redacted_debug!(GcpCredentials, [project_id, endpoint], [access_token]);
redacted_debug!(AzureCredentials, [subscription_id, endpoint], [access_token]);
redacted_debug!(HuaWeiCredentials, [access_key, project_id, endpoint], [secret_key]);

/// Per-vendor credentials. A vendor without credentials is not registered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VendorSettings {
    pub tcloud: Option<TCloudCredentials>,
    pub aws: Option<AwsCredentials>,
    pub gcp: Option<GcpCredentials>,
    pub azure: Option<AzureCredentials>,
    pub huawei: Option<HuaWeiCredentials>,
}

impl VendorSettings {
    /// Vendors that have credentials.
    pub fn configured(&self) -> Vec<Vendor> {
        let mut vendors = Vec::new();
        if self.tcloud.is_some() {
            vendors.push(Vendor::TCloud);
        }
        if self.aws.is_some() {
            vendors.push(Vendor::Aws);
        }
        if self.gcp.is_some() {
            vendors.push(Vendor::Gcp);
        }
        if self.azure.is_some() {
            vendors.push(Vendor::Azure);
        }
        if self.huawei.is_some() {
            vendors.push(Vendor::HuaWei);
        }
        vendors
    }

    pub fn validate(&self) -> Result<()> {
        let blank = |vendor: Vendor, field: &str| {
            Error::Config(format!("{} credentials: {} must not be empty", vendor, field))
        };

        if let Some(c) = &self.tcloud {
            if c.secret_id.is_empty() || c.secret_key.is_empty() {
                return Err(blank(Vendor::TCloud, "secret_id/secret_key"));
            }
        }
        if let Some(c) = &self.aws {
            if c.access_key_id.is_empty() || c.secret_access_key.is_empty() {
                return Err(blank(Vendor::Aws, "access_key_id/secret_access_key"));
            }
        }
        if let Some(c) = &self.gcp {
            if c.project_id.is_empty() || c.access_token.is_empty() {
                return Err(blank(Vendor::Gcp, "project_id/access_token"));
            }
        }
        if let Some(c) = &self.azure {
            if c.subscription_id.is_empty() || c.access_token.is_empty() {
                return Err(blank(Vendor::Azure, "subscription_id/access_token"));
            }
        }
        if let Some(c) = &self.huawei {
            if c.access_key.is_empty() || c.secret_key.is_empty() || c.project_id.is_empty() {
                return Err(blank(Vendor::HuaWei, "access_key/secret_key/project_id"));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Default Bridges
// ============================================================================

#[cfg(feature = "native-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_native::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "native-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "An HttpClient implementation is required by vendor adapters. \
                  Enable the 'native-shims' feature to use the default ReqwestHttpClient, \
                  or inject one with .http_client()."
            .to_string(),
    })
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`EngineConfig`].
#[derive(Default)]
pub struct EngineConfigBuilder {
    database_path: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    sync: Option<SyncSettings>,
    cmdb: Option<CmdbSettings>,
    vendors: VendorSettings,
}

impl EngineConfigBuilder {
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn sync(mut self, settings: SyncSettings) -> Self {
        self.sync = Some(settings);
        self
    }

    pub fn cmdb(mut self, settings: CmdbSettings) -> Self {
        self.cmdb = Some(settings);
        self
    }

    pub fn vendors(mut self, settings: VendorSettings) -> Self {
        self.vendors = settings;
        self
    }

    /// Builds and validates the final `EngineConfig`.
    ///
    /// # Errors
    ///
    /// - `Error::Config` when `database_path` is missing or a setting is invalid
    /// - `Error::CapabilityMissing` when no HTTP client is injected and the
    ///   `native-shims` feature is disabled
    pub fn build(self) -> Result<EngineConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let config = EngineConfig {
            database_path,
            http_client,
            sync: self.sync.unwrap_or_default(),
            cmdb: self.cmdb,
            vendors: self.vendors,
        };

        config.validate()?;

        Ok(config)
    }
}
