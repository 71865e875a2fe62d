//! Core service façade and bootstrap helpers.
//!
//! This crate wires an [`EngineConfig`] into a running engine: the SQLite
//! pool, the vendor registry, the optional CMDB bridge, the orchestrator and
//! the CVM cascade. Vendor adapters are compiled in per cargo feature
//! (`tcloud`, `aws`, `gcp`, `azure`, `huawei`); the `native-shims` feature
//! provides the reqwest HTTP client and the API gateway CMDB client.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::cmdb::CmdbClient;
use bridge_traits::resource::{ResourceKind, SyncScope, Vendor};
use bridge_traits::vendor::{EipAssociation, EipAssociationClient, VendorResourceClient};
use core_inventory::db::{create_pool, DatabaseConfig};
use core_inventory::{
    Page, PageRequest, RelationStore, ResourceStore, SqliteRelationStore, SqliteResourceStore,
};
use core_runtime::config::{EngineConfig, VendorSettings};
use core_runtime::events::{EventBus, EventStream};
use core_sync::registry::ClientKey;
use core_sync::{
    CascadeReport, CmdbBridge, CvmCascade, SqliteSyncJobRepository, SyncJob, SyncJobRepository,
    SyncOptions, SyncOrchestrator, SyncReport, VendorRegistry, VendorRegistryBuilder,
};
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Builder for [`SyncService`].
///
/// ```ignore
/// let config = EngineConfig::builder()
///     .database_path("/var/lib/hcm/inventory.db")
///     .vendors(vendors)
///     .build()?;
/// let service = SyncService::builder(config).build().await?;
/// let report = service.sync(ResourceKind::Eip, &scope, &SyncOptions::default()).await?;
/// ```
pub struct SyncServiceBuilder {
    config: EngineConfig,
    pool: Option<SqlitePool>,
    event_bus: Option<EventBus>,
    cmdb_client: Option<Arc<dyn CmdbClient>>,
    extra_clients: Vec<Arc<dyn VendorResourceClient>>,
    extra_associations: Vec<Arc<dyn EipAssociationClient>>,
}

impl SyncServiceBuilder {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            pool: None,
            event_bus: None,
            cmdb_client: None,
            extra_clients: Vec::new(),
            extra_associations: Vec::new(),
        }
    }

    /// Use an already migrated pool instead of opening `database_path`.
    pub fn pool(mut self, pool: SqlitePool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// CMDB client used instead of the gateway client built from `config.cmdb`.
    pub fn cmdb_client(mut self, client: Arc<dyn CmdbClient>) -> Self {
        self.cmdb_client = Some(client);
        self
    }

    /// Register a listing client on top of the configured vendors. A client
    /// for an already registered `(vendor, kind)` replaces it.
    pub fn resource_client(mut self, client: Arc<dyn VendorResourceClient>) -> Self {
        self.extra_clients.push(client);
        self
    }

    pub fn association_client(mut self, client: Arc<dyn EipAssociationClient>) -> Self {
        self.extra_associations.push(client);
        self
    }

    /// # Errors
    ///
    /// - `CapabilityMissing` when a vendor has credentials but its feature is
    ///   not compiled in, or CMDB forwarding is on without a CMDB client
    /// - `Inventory` when the database cannot be opened or migrated
    pub async fn build(self) -> Result<SyncService> {
        let config = self.config;

        let mut registry = VendorRegistry::builder();
        registry = register_vendors(registry, &config)?;
        let registry = Arc::new(
            registry
                .with_clients(self.extra_clients)
                .with_associations(self.extra_associations)
                .build()?,
        );
        if registry.is_empty() {
            return Err(CoreError::InitializationFailed(
                "no vendor client registered".to_string(),
            ));
        }

        let pool = match self.pool {
            Some(pool) => pool,
            None => create_pool(DatabaseConfig::new(&config.database_path)).await?,
        };
        let event_bus = self.event_bus.unwrap_or_else(EventBus::default);

        let resources: Arc<dyn ResourceStore> = Arc::new(SqliteResourceStore::new(pool.clone()));
        let relations: Arc<dyn RelationStore> = Arc::new(SqliteRelationStore::new(pool.clone()));
        let jobs: Arc<dyn SyncJobRepository> = Arc::new(SqliteSyncJobRepository::new(pool.clone()));

        let cmdb = match self.cmdb_client {
            Some(client) => Some(client),
            None => default_cmdb_client(&config)?,
        }
        .map(|client| Arc::new(CmdbBridge::new(client, resources.clone(), event_bus.clone())));

        let mut orchestrator = SyncOrchestrator::new(
            registry.clone(),
            resources.clone(),
            relations,
            event_bus.clone(),
            config.sync.clone(),
        )
        .with_job_repository(jobs.clone());
        if let Some(bridge) = &cmdb {
            if config.sync.forward_to_cmdb {
                orchestrator = orchestrator.with_cmdb(bridge.clone());
            }
        }
        let orchestrator = Arc::new(orchestrator);
        let cascade = Arc::new(CvmCascade::new(orchestrator.clone()));

        info!(
            vendors = ?config.vendors.configured(),
            clients = registry.supported().len(),
            cmdb = cmdb.is_some(),
            "Sync service initialized"
        );

        Ok(SyncService {
            pool,
            event_bus,
            resources,
            jobs,
            cmdb,
            orchestrator,
            cascade,
        })
    }
}

fn missing_feature(vendor: Vendor) -> CoreError {
    CoreError::CapabilityMissing {
        capability: format!("{} adapter", vendor),
        message: format!(
            "credentials for {} are configured but the '{}' feature is disabled",
            vendor, vendor
        ),
    }
}

/// Adds one connector's clients for every vendor that has credentials.
fn register_vendors(
    mut registry: VendorRegistryBuilder,
    config: &EngineConfig,
) -> Result<VendorRegistryBuilder> {
    let VendorSettings {
        tcloud,
        aws,
        gcp,
        azure,
        huawei,
    } = &config.vendors;
    #[allow(unused_variables)]
    let (http, timeout) = (&config.http_client, config.sync.vendor_call_timeout);

    if let Some(credentials) = tcloud {
        #[cfg(feature = "tcloud")]
        {
            use provider_tcloud::{TCloudAssociationClient, TCloudConnector};
            let connector =
                Arc::new(TCloudConnector::new(http.clone(), credentials.clone()).with_timeout(timeout));
            registry = registry
                .with_clients(provider_tcloud::resource_clients(connector.clone()))
                .with_association(Arc::new(TCloudAssociationClient::new(connector)));
        }
        #[cfg(not(feature = "tcloud"))]
        {
            let _ = credentials;
            return Err(missing_feature(Vendor::TCloud));
        }
    }

    if let Some(credentials) = aws {
        #[cfg(feature = "aws")]
        {
            use provider_aws::{AwsAssociationClient, AwsConnector};
            let connector =
                Arc::new(AwsConnector::new(http.clone(), credentials.clone()).with_timeout(timeout));
            registry = registry
                .with_clients(provider_aws::resource_clients(connector.clone()))
                .with_association(Arc::new(AwsAssociationClient::new(connector)));
        }
        #[cfg(not(feature = "aws"))]
        {
            let _ = credentials;
            return Err(missing_feature(Vendor::Aws));
        }
    }

    if let Some(credentials) = gcp {
        #[cfg(feature = "gcp")]
        {
            use provider_gcp::{GcpAssociationClient, GcpConnector};
            let connector =
                Arc::new(GcpConnector::new(http.clone(), credentials.clone()).with_timeout(timeout));
            registry = registry
                .with_clients(provider_gcp::resource_clients(connector.clone()))
                .with_association(Arc::new(GcpAssociationClient::new(connector)));
        }
        #[cfg(not(feature = "gcp"))]
        {
            let _ = credentials;
            return Err(missing_feature(Vendor::Gcp));
        }
    }

    if let Some(credentials) = azure {
        #[cfg(feature = "azure")]
        {
            use provider_azure::{AzureAssociationClient, AzureConnector};
            let connector =
                Arc::new(AzureConnector::new(http.clone(), credentials.clone()).with_timeout(timeout));
            registry = registry
                .with_clients(provider_azure::resource_clients(connector.clone()))
                .with_association(Arc::new(AzureAssociationClient::new(connector)));
        }
        #[cfg(not(feature = "azure"))]
        {
            let _ = credentials;
            return Err(missing_feature(Vendor::Azure));
        }
    }

    if let Some(credentials) = huawei {
        #[cfg(feature = "huawei")]
        {
            use provider_huawei::{HuaWeiAssociationClient, HuaWeiConnector};
            let connector =
                Arc::new(HuaWeiConnector::new(http.clone(), credentials.clone()).with_timeout(timeout));
            registry = registry
                .with_clients(provider_huawei::resource_clients(connector.clone()))
                .with_association(Arc::new(HuaWeiAssociationClient::new(connector)));
        }
        #[cfg(not(feature = "huawei"))]
        {
            let _ = credentials;
            return Err(missing_feature(Vendor::HuaWei));
        }
    }

    Ok(registry)
}

#[cfg(feature = "native-shims")]
fn default_cmdb_client(config: &EngineConfig) -> Result<Option<Arc<dyn CmdbClient>>> {
    use bridge_native::{GatewayAuth, GatewayCmdbClient};

    Ok(config.cmdb.as_ref().map(|settings| {
        let auth = GatewayAuth {
            app_code: settings.app_code.clone(),
            app_secret: settings.app_secret.clone(),
            username: settings.username.clone(),
        };
        Arc::new(GatewayCmdbClient::new(
            config.http_client.clone(),
            settings.endpoint.clone(),
            auth,
        )) as Arc<dyn CmdbClient>
    }))
}

#[cfg(not(feature = "native-shims"))]
fn default_cmdb_client(config: &EngineConfig) -> Result<Option<Arc<dyn CmdbClient>>> {
    if config.cmdb.is_some() && config.sync.forward_to_cmdb {
        return Err(CoreError::CapabilityMissing {
            capability: "CmdbClient".to_string(),
            message: "CMDB forwarding is enabled without a CmdbClient. \
                      Enable the 'native-shims' feature or inject one with .cmdb_client()."
                .to_string(),
        });
    }
    Ok(None)
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct SyncService {
    pool: SqlitePool,
    event_bus: EventBus,
    resources: Arc<dyn ResourceStore>,
    jobs: Arc<dyn SyncJobRepository>,
    cmdb: Option<Arc<CmdbBridge>>,
    orchestrator: Arc<SyncOrchestrator>,
    cascade: Arc<CvmCascade>,
}

impl SyncService {
    pub fn builder(config: EngineConfig) -> SyncServiceBuilder {
        SyncServiceBuilder::new(config)
    }

    /// Build with defaults for everything not in `config`.
    pub async fn bootstrap(config: EngineConfig) -> Result<Self> {
        Self::builder(config).build().await
    }

    /// Reconcile one resource kind in `scope`.
    pub async fn sync(
        &self,
        kind: ResourceKind,
        scope: &SyncScope,
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        Ok(self.orchestrator.sync(kind, scope, options).await?)
    }

    /// Reconcile CVMs of `scope` together with their related resources.
    pub async fn sync_cvm_with_related(
        &self,
        scope: &SyncScope,
        options: &SyncOptions,
    ) -> Result<CascadeReport> {
        Ok(self.cascade.sync_with_related(scope, options).await?)
    }

    /// Remove stored records of `kind` the vendor no longer reports.
    pub async fn sweep_deleted(
        &self,
        kind: ResourceKind,
        scope: &SyncScope,
        options: &SyncOptions,
    ) -> Result<u64> {
        Ok(self.orchestrator.sweep_deleted(kind, scope, options).await?)
    }

    pub async fn associate_eip(
        &self,
        scope: &SyncScope,
        request: &EipAssociation,
        options: &SyncOptions,
    ) -> Result<CascadeReport> {
        Ok(self.cascade.associate_eip(scope, request, options).await?)
    }

    pub async fn disassociate_eip(
        &self,
        scope: &SyncScope,
        request: &EipAssociation,
        options: &SyncOptions,
    ) -> Result<CascadeReport> {
        Ok(self.cascade.disassociate_eip(scope, request, options).await?)
    }

    /// Assign CVM records (internal ids) to a business. With a CMDB bridge
    /// the hosts are mirrored once afterwards.
    pub async fn assign_business(&self, ids: &[String], business_id: i64) -> Result<u64> {
        match &self.cmdb {
            Some(bridge) => Ok(bridge.assign_business(ids, business_id).await?),
            None => {
                warn!("No CMDB bridge configured, assigning business in the store only");
                Ok(self
                    .resources
                    .assign_business(ResourceKind::Cvm, ids, business_id)
                    .await?)
            }
        }
    }

    pub async fn recent_jobs(&self, page: PageRequest) -> Result<Page<SyncJob>> {
        Ok(self.jobs.list_recent(page).await?)
    }

    pub async fn latest_job(&self, kind: ResourceKind, scope: &SyncScope) -> Result<Option<SyncJob>> {
        Ok(self.jobs.latest_for_scope(kind, scope).await?)
    }

    /// Stream of sync, relation and CMDB events.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// `(vendor, kind)` pairs with a registered client.
    pub fn supported(&self) -> Vec<ClientKey> {
        self.orchestrator.registry().supported()
    }

    pub fn resources(&self) -> &Arc<dyn ResourceStore> {
        &self.resources
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub fn cascade(&self) -> &Arc<CvmCascade> {
        &self.cascade
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
