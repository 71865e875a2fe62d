//! Scripted vendor and store doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::error::VendorError;
use bridge_traits::extension::{
    Extension, HuaWeiCvmExtension, HuaWeiDiskExtension, HuaWeiEipExtension,
    HuaWeiNetworkInterfaceExtension, TCloudCvmExtension, TCloudDiskExtension, TCloudEipExtension,
};
use bridge_traits::resource::{
    Attachment, CloudResource, ResourceKind, ResourceRef, SyncScope, Vendor,
};
use bridge_traits::vendor::{
    EipAssociation, EipAssociationClient, PageToken, ResourcePage, VendorResourceClient,
    VendorResult,
};
use core_inventory::db::create_test_pool;
use core_inventory::repositories::PageRequest;
use core_inventory::{
    InventoryError, NewResource, Page, RelationStore, ResourceFilter, ResourceRecord,
    ResourceStore, ResourceUpdate, SqliteRelationStore, SqliteResourceStore,
};
use core_runtime::config::SyncSettings;
use core_runtime::events::EventBus;
use bridge_traits::cmdb::CmdbClient;
use core_sync::{CmdbBridge, CvmCascade, SqliteSyncJobRepository, SyncOrchestrator, VendorRegistry};
use sqlx::SqlitePool;

pub const ACCOUNT: &str = "acct-1";
pub const REGION: &str = "ap-guangzhou";
pub const HW_REGION: &str = "cn-north-4";
pub const PAGE_SIZE: usize = 2;

pub fn scope() -> SyncScope {
    SyncScope::new(Vendor::TCloud, ACCOUNT, REGION)
}

pub fn huawei_scope() -> SyncScope {
    SyncScope::new(Vendor::HuaWei, ACCOUNT, HW_REGION)
}

pub fn eip(id: &str, bound_to: Option<&str>) -> CloudResource {
    let status = if bound_to.is_some() { "BIND" } else { "UNBIND" };
    CloudResource::new(
        id,
        status,
        REGION,
        Extension::TCloudEip(TCloudEipExtension::default()),
    )
    .with_attachment(bound_to.map(Attachment::instance))
}

pub fn cvm(id: &str, disks: &[&str]) -> CloudResource {
    disks.iter().fold(
        CloudResource::new(
            id,
            "RUNNING",
            REGION,
            Extension::TCloudCvm(TCloudCvmExtension {
                private_ips: vec!["10.0.0.8".into()],
                ..Default::default()
            }),
        )
        .with_name(format!("host-{}", id)),
        |c, disk| c.with_related(ResourceKind::Disk, ResourceRef::CloudId(disk.to_string())),
    )
}

pub fn disk(id: &str, attached_to: Option<&str>) -> CloudResource {
    CloudResource::new(
        id,
        if attached_to.is_some() { "ATTACHED" } else { "UNATTACHED" },
        REGION,
        Extension::TCloudDisk(TCloudDiskExtension {
            disk_size_gb: 50,
            ..Default::default()
        }),
    )
    .with_attachment(attached_to.map(Attachment::instance))
}

// HuaWei binds EIPs to ports, and servers report their volumes and ports.

pub fn huawei_eip(id: &str, port: Option<&str>) -> CloudResource {
    CloudResource::new(
        id,
        if port.is_some() { "ACTIVE" } else { "DOWN" },
        HW_REGION,
        Extension::HuaWeiEip(HuaWeiEipExtension {
            port_id: port.map(str::to_string),
            ..Default::default()
        }),
    )
    .with_attachment(port.map(Attachment::network_interface))
}

/// Ports stay ACTIVE whichever server they are plugged into.
pub fn huawei_port(id: &str, server: &str) -> CloudResource {
    CloudResource::new(
        id,
        "ACTIVE",
        HW_REGION,
        Extension::HuaWeiNetworkInterface(HuaWeiNetworkInterfaceExtension::default()),
    )
    .with_attachment(Some(Attachment::instance(server)))
}

pub fn huawei_server(id: &str, volumes: &[&str], ports: &[&str]) -> CloudResource {
    let server = CloudResource::new(
        id,
        "ACTIVE",
        HW_REGION,
        Extension::HuaWeiCvm(HuaWeiCvmExtension::default()),
    )
    .with_name(format!("ecs-{}", id));
    let server = volumes.iter().fold(server, |s, v| {
        s.with_related(ResourceKind::Disk, ResourceRef::CloudId(v.to_string()))
    });
    ports.iter().fold(server, |s, p| {
        s.with_related(ResourceKind::NetworkInterface, ResourceRef::CloudId(p.to_string()))
    })
}

pub fn huawei_volume(id: &str, server: &str) -> CloudResource {
    CloudResource::new(
        id,
        "in-use",
        HW_REGION,
        Extension::HuaWeiDisk(HuaWeiDiskExtension {
            size_gb: 40,
            ..Default::default()
        }),
    )
    .with_attachment(Some(Attachment::instance(server)))
}

// ============================================================================
// Fake Vendor
// ============================================================================

#[derive(Debug, Clone)]
pub enum Failure {
    Throttled,
    /// Never answers; trips the per-call timeout.
    Hang,
}

/// Mutable vendor state served with offset paging, `PAGE_SIZE` items per page.
pub struct FakeCloud {
    vendor: Vendor,
    items: Mutex<BTreeMap<ResourceKind, Vec<CloudResource>>>,
    failures: Mutex<HashMap<(ResourceKind, PageToken), Failure>>,
    hidden: Mutex<BTreeSet<String>>,
    calls: AtomicUsize,
    listed: Mutex<HashMap<ResourceKind, usize>>,
    confirm_association: AtomicBool,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Self::for_vendor(Vendor::TCloud)
    }

    pub fn for_vendor(vendor: Vendor) -> Arc<Self> {
        Arc::new(Self {
            vendor,
            items: Mutex::default(),
            failures: Mutex::default(),
            hidden: Mutex::default(),
            calls: AtomicUsize::new(0),
            listed: Mutex::default(),
            confirm_association: AtomicBool::new(true),
        })
    }

    pub fn put(&self, kind: ResourceKind, resource: CloudResource) {
        let mut items = self.items.lock().unwrap();
        let list = items.entry(kind).or_default();
        list.retain(|r| r.cloud_id != resource.cloud_id);
        list.push(resource);
    }

    pub fn remove(&self, kind: ResourceKind, cloud_id: &str) {
        if let Some(list) = self.items.lock().unwrap().get_mut(&kind) {
            list.retain(|r| r.cloud_id != cloud_id);
        }
    }

    pub fn fail_page(&self, kind: ResourceKind, token: &str, failure: Failure) {
        self.failures
            .lock()
            .unwrap()
            .insert((kind, token.to_string()), failure);
    }

    /// Omit an item from unfiltered listings while id-filtered queries still
    /// return it.
    pub fn hide_from_full_listing(&self, cloud_id: &str) {
        self.hidden.lock().unwrap().insert(cloud_id.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Make association calls succeed without changing vendor state.
    pub fn ignore_associations(&self) {
        self.confirm_association.store(false, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Page requests served for `kind`.
    pub fn listed(&self, kind: ResourceKind) -> usize {
        self.listed.lock().unwrap().get(&kind).copied().unwrap_or(0)
    }

    fn set_binding(&self, request: &EipAssociation, bound: bool) {
        if !self.confirm_association.load(Ordering::SeqCst) {
            return;
        }
        let eip_id = request.eip_cloud_id.as_str();
        let updated = match self.vendor {
            Vendor::HuaWei => huawei_eip(
                eip_id,
                request
                    .network_interface_cloud_id
                    .as_deref()
                    .filter(|_| bound),
            ),
            _ => eip(eip_id, Some(request.cvm_cloud_id.as_str()).filter(|_| bound)),
        };
        let mut items = self.items.lock().unwrap();
        if let Some(found) = items
            .get_mut(&ResourceKind::Eip)
            .and_then(|list| list.iter_mut().find(|r| r.cloud_id == eip_id))
        {
            *found = updated;
        }
    }
}

pub struct FakeClient {
    cloud: Arc<FakeCloud>,
    kind: ResourceKind,
}

impl FakeClient {
    pub fn new(cloud: Arc<FakeCloud>, kind: ResourceKind) -> Arc<Self> {
        Arc::new(Self { cloud, kind })
    }
}

#[async_trait]
impl VendorResourceClient for FakeClient {
    fn vendor(&self) -> Vendor {
        self.cloud.vendor
    }

    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn list_page(
        &self,
        scope: &SyncScope,
        page: Option<PageToken>,
    ) -> VendorResult<ResourcePage> {
        self.cloud.calls.fetch_add(1, Ordering::SeqCst);
        *self.cloud.listed.lock().unwrap().entry(self.kind).or_default() += 1;
        let token = page.unwrap_or_else(|| "0".to_string());

        let failure = self
            .cloud
            .failures
            .lock()
            .unwrap()
            .get(&(self.kind, token.clone()))
            .cloned();
        match failure {
            Some(Failure::Throttled) => {
                return Err(VendorError::Throttled {
                    message: "RequestLimitExceeded".into(),
                    retry_after: Some(Duration::from_secs(1)),
                })
            }
            Some(Failure::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            None => {}
        }

        let hidden = self.cloud.hidden.lock().unwrap().clone();
        let matching: Vec<CloudResource> = self
            .cloud
            .items
            .lock()
            .unwrap()
            .get(&self.kind)
            .map(|list| {
                list.iter()
                    .filter(|r| scope.admits(&r.cloud_id))
                    .filter(|r| scope.cloud_ids.is_some() || !hidden.contains(&r.cloud_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let offset: usize = token
            .parse()
            .map_err(|_| VendorError::Parse(format!("bad offset {}", token)))?;
        let items: Vec<CloudResource> =
            matching.iter().skip(offset).take(PAGE_SIZE).cloned().collect();
        let next = offset + PAGE_SIZE;
        let next_page = (next < matching.len()).then(|| next.to_string());
        Ok(ResourcePage::with_next(items, next_page))
    }
}

pub struct FakeAssociation {
    cloud: Arc<FakeCloud>,
}

#[async_trait]
impl EipAssociationClient for FakeAssociation {
    fn vendor(&self) -> Vendor {
        self.cloud.vendor
    }

    async fn associate(&self, _scope: &SyncScope, request: &EipAssociation) -> VendorResult<()> {
        if self.cloud.vendor == Vendor::HuaWei {
            request.require_network_interface(self.cloud.vendor)?;
        }
        self.cloud.set_binding(request, true);
        Ok(())
    }

    async fn disassociate(
        &self,
        _scope: &SyncScope,
        request: &EipAssociation,
    ) -> VendorResult<()> {
        self.cloud.set_binding(request, false);
        Ok(())
    }
}

// ============================================================================
// Counting Store
// ============================================================================

/// Counts batch calls made against the wrapped store.
pub struct CountingStore {
    inner: SqliteResourceStore,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl CountingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            inner: SqliteResourceStore::new(pool),
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn batch_calls(&self) -> (usize, usize, usize) {
        (
            self.creates.load(Ordering::SeqCst),
            self.updates.load(Ordering::SeqCst),
            self.deletes.load(Ordering::SeqCst),
        )
    }

    pub fn reset(&self) {
        self.creates.store(0, Ordering::SeqCst);
        self.updates.store(0, Ordering::SeqCst);
        self.deletes.store(0, Ordering::SeqCst);
    }
}

type StoreResult<T> = std::result::Result<T, InventoryError>;

#[async_trait]
impl ResourceStore for CountingStore {
    async fn list(
        &self,
        kind: ResourceKind,
        filter: &ResourceFilter,
        page: PageRequest,
    ) -> StoreResult<Page<ResourceRecord>> {
        self.inner.list(kind, filter, page).await
    }

    async fn batch_create(
        &self,
        kind: ResourceKind,
        items: Vec<NewResource>,
    ) -> StoreResult<Vec<String>> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.batch_create(kind, items).await
    }

    async fn batch_update_by_id(
        &self,
        kind: ResourceKind,
        items: Vec<ResourceUpdate>,
    ) -> StoreResult<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.batch_update_by_id(kind, items).await
    }

    async fn batch_delete_by_filter(
        &self,
        kind: ResourceKind,
        filter: &ResourceFilter,
    ) -> StoreResult<u64> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.batch_delete_by_filter(kind, filter).await
    }

    async fn assign_business(
        &self,
        kind: ResourceKind,
        ids: &[String],
        business_id: i64,
    ) -> StoreResult<u64> {
        self.inner.assign_business(kind, ids, business_id).await
    }

    async fn resolve_refs(
        &self,
        vendor: Vendor,
        kind: ResourceKind,
        account_id: &str,
        refs: &[ResourceRef],
    ) -> StoreResult<HashMap<ResourceRef, String>> {
        self.inner.resolve_refs(vendor, kind, account_id, refs).await
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub vendor: Vendor,
    pub pool: SqlitePool,
    pub cloud: Arc<FakeCloud>,
    pub store: Arc<CountingStore>,
    pub relations: Arc<SqliteRelationStore>,
    pub event_bus: EventBus,
    pub jobs: Arc<SqliteSyncJobRepository>,
    pub orchestrator: Arc<SyncOrchestrator>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(Vendor::TCloud, SyncSettings::default(), None).await
    }

    /// A vendor whose EIPs bind to network interfaces.
    pub async fn huawei() -> Self {
        Self::build(Vendor::HuaWei, SyncSettings::default(), None).await
    }

    pub async fn with_settings(settings: SyncSettings) -> Self {
        Self::build(Vendor::TCloud, settings, None).await
    }

    pub async fn with_cmdb(client: Arc<dyn CmdbClient>) -> Self {
        Self::build(Vendor::TCloud, SyncSettings::default(), Some(client)).await
    }

    async fn build(
        vendor: Vendor,
        settings: SyncSettings,
        cmdb: Option<Arc<dyn CmdbClient>>,
    ) -> Self {
        let pool = create_test_pool().await.unwrap();
        let cloud = FakeCloud::for_vendor(vendor);
        let store = Arc::new(CountingStore::new(pool.clone()));
        let relations = Arc::new(SqliteRelationStore::new(pool.clone()));
        let event_bus = EventBus::new(256);

        let registry = VendorRegistry::builder()
            .with_clients(vendor.supported_kinds().iter().map(|&kind| {
                FakeClient::new(cloud.clone(), kind) as Arc<dyn VendorResourceClient>
            }))
            .with_association(Arc::new(FakeAssociation {
                cloud: cloud.clone(),
            }))
            .build()
            .unwrap();

        let jobs = Arc::new(SqliteSyncJobRepository::new(pool.clone()));
        let mut orchestrator = SyncOrchestrator::new(
            Arc::new(registry),
            store.clone(),
            relations.clone(),
            event_bus.clone(),
            settings,
        )
        .with_job_repository(jobs.clone());
        if let Some(client) = cmdb {
            orchestrator = orchestrator.with_cmdb(Arc::new(CmdbBridge::new(
                client,
                store.clone(),
                event_bus.clone(),
            )));
        }

        Self {
            vendor,
            pool,
            cloud,
            store,
            relations,
            event_bus,
            jobs,
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn cascade(&self) -> CvmCascade {
        CvmCascade::new(self.orchestrator.clone())
    }

    pub fn scope(&self) -> SyncScope {
        match self.vendor {
            Vendor::HuaWei => huawei_scope(),
            _ => scope(),
        }
    }

    pub async fn stored(&self, kind: ResourceKind) -> Vec<ResourceRecord> {
        self.store
            .list(kind, &ResourceFilter::from_scope(&self.scope()), PageRequest::first(1000))
            .await
            .unwrap()
            .items
    }

    pub async fn stored_id(&self, kind: ResourceKind, cloud_id: &str) -> String {
        self.stored(kind)
            .await
            .into_iter()
            .find(|r| r.cloud_id == cloud_id)
            .map(|r| r.id)
            .unwrap()
    }

    pub async fn edges(&self, relation: core_inventory::RelationKind) -> Vec<(String, String)> {
        self.relations
            .list(&core_inventory::RelationFilter::new(relation).with_res_ids(
                self.stored(relation.resource_kind())
                    .await
                    .into_iter()
                    .map(|r| r.id)
                    .collect(),
            ))
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.res_id, e.cvm_id))
            .collect()
    }
}
